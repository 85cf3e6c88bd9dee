//! JSON-RPC IPC worker holding one WMI connection.
//!
//! Reads line-delimited JSON requests from stdin, dispatches to
//! `wmisvc_cli::worker`, writes JSON responses to stdout.

use clap::Parser;

#[derive(Parser)]
#[command(name = "wmisvc-worker", about = "wmisvc IPC worker process")]
struct Args {
    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[cfg(windows)]
fn main() {
    use std::io::{self, BufRead, Write};

    use wmisvc_cli::worker::Worker;
    use wmisvc_core::ComRuntime;

    let args = Args::parse();
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut worker = Worker::<ComRuntime>::new();

    if args.verbose {
        eprintln!("wmisvc-worker: ready");
    }

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                if args.verbose {
                    eprintln!("wmisvc-worker: stdin read error: {e}");
                }
                break;
            }
        };

        if let Some(json) = worker.handle_line(&line) {
            let _ = writeln!(stdout, "{json}");
            let _ = stdout.flush();
        }
    }

    if args.verbose {
        eprintln!("wmisvc-worker: stdin closed, exiting");
    }
}

#[cfg(not(windows))]
fn main() {
    let _ = Args::parse();
    eprintln!("wmisvc-worker: WMI is only available on Windows");
    std::process::exit(1);
}
