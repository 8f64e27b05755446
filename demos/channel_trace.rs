use std::sync::mpsc;
use std::thread;
use hoptrace::{ChannelReporter, ReportEvent};

fn main() {
    // UDP traceroute to cloudflare's one.one.one.one (1.1.1.1)
    let argv = vec!["hoptrace", "-n", "-q", "2", "1.1.1.1"];
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let mut reporter = ChannelReporter::new(tx);
        hoptrace::run(argv, &mut reporter)
    });
    // Print progress
    for event in rx {
        match event {
            ReportEvent::Clear => println!("Progress:"),
            ReportEvent::Line(line) => println!("{}", line),
            ReportEvent::Finished(status) => println!("Status: {:?}", status),
        }
    }
    println!("Exit code: {}", handle.join().unwrap());
}
