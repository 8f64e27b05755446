use std::process;
use std::thread;
use tracing::error;
use tracing_subscriber::EnvFilter;

use hoptrace::cli::Args;
use hoptrace::{ExitStatus, StdoutReporter};

fn main() {
    let argv: Vec<String> = std::env::args().collect();
    let verbose = Args::parse_argv(&argv)
        .map(|args| args.verbose)
        .unwrap_or(false);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // the engine blocks; keep it off the main thread
    let worker = thread::Builder::new()
        .name("hoptrace".to_string())
        .spawn(move || {
            let mut reporter = StdoutReporter::new();
            hoptrace::run(&argv, &mut reporter)
        });
    let code = match worker {
        Ok(handle) => handle
            .join()
            .unwrap_or(ExitStatus::NeverCompleted.code()),
        Err(e) => {
            error!(error = %e, "cannot start trace thread");
            ExitStatus::NeverCompleted.code()
        }
    };
    process::exit(code);
}
