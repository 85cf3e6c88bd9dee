//! Standalone CLI tool for deleting WMI instances by object path.

use std::process::ExitCode;

use clap::Parser;
use wmisvc_core::{ObjectPath, WmiError};

#[derive(Parser)]
#[cfg_attr(not(windows), allow(dead_code))]
#[command(name = "wmisvc-delete", about = "Delete WMI instances by object path")]
struct Args {
    /// Object path(s), e.g. Win32_Share.Name='scratch'
    #[arg(required = true)]
    paths: Vec<String>,

    /// WMI namespace to connect to
    #[arg(short, long, default_value = wmisvc_cli::DEFAULT_NAMESPACE)]
    namespace: String,

    /// Give up waiting for each delete after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Reject paths that do not parse locally instead of letting WMI decide
    /// (`[namespace:]Class.Key='v',...` or `[namespace:]Class=@`)
    #[arg(long)]
    strict: bool,

    /// Print failures as JSON records
    #[arg(long)]
    json: bool,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn report(args: &Args, path: &str, err: &WmiError) {
    if args.json {
        match serde_json::to_string(&err.to_record()) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("{path}: {err}"),
        }
    } else {
        eprintln!("{path}: {err}");
    }
}

#[cfg(windows)]
fn run(args: &Args) -> ExitCode {
    use std::time::Duration;

    use wmisvc_core::{Wait, WmiService};

    let service = match WmiService::connect(&args.namespace) {
        Ok(s) => s,
        Err(e) => {
            report(args, &args.namespace, &e);
            return ExitCode::FAILURE;
        }
    };
    if args.verbose {
        eprintln!("wmisvc-delete: connected to {}", args.namespace);
    }

    let wait = args
        .timeout_ms
        .map_or(Wait::Infinite, |ms| Wait::Bounded(Duration::from_millis(ms)));

    let mut failed = false;
    for path in &args.paths {
        if args.strict {
            if let Err(e) = path.parse::<ObjectPath>() {
                report(args, path, &e);
                failed = true;
                continue;
            }
        }
        match service
            .submit_delete(path, None)
            .and_then(|pending| pending.wait_for(wait))
        {
            Ok(()) => println!("deleted {path}"),
            Err(e) => {
                report(args, path, &e);
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(not(windows))]
fn run(args: &Args) -> ExitCode {
    for path in &args.paths {
        if let Err(e) = path.parse::<ObjectPath>() {
            report(args, path, &e);
        }
    }
    eprintln!("wmisvc-delete: WMI is only available on Windows");
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    let args = Args::parse();
    run(&args)
}
