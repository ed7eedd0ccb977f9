// src/bin/forkerd.rs
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use daemon::DaemonConfig;
use logging::SubscriberConfig;

/// The forker privilege-mediation daemon.
#[derive(Debug, Parser)]
#[command(name = "forkerd", version, about)]
struct Args {
    /// Loopback TCP port to listen on.
    #[arg(long, default_value_t = protocol::DEFAULT_PORT)]
    port: u16,

    /// Directory for the cookie file.
    #[arg(long, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    /// Seconds between SIGTERM and SIGKILL for orphaned children.
    #[arg(long, default_value_t = 5, value_name = "SECS")]
    grace: u64,

    /// Append logs to this file instead of stderr.
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Increase log verbosity. Repeatable.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log errors only.
    #[arg(long)]
    quiet: bool,

    /// Stay in the foreground instead of detaching.
    #[arg(long)]
    no_detach: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_cfg = SubscriberConfig::builder()
        .verbose(args.verbose)
        .quiet(args.quiet)
        .log_file(args.log_file.clone())
        .build();
    if let Err(e) = logging::init(&log_cfg) {
        eprintln!("forkerd: cannot initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let config = DaemonConfig {
        port: args.port,
        state_dir: args.state_dir.unwrap_or_else(command::default_state_dir),
        grace: Duration::from_secs(args.grace),
        ..DaemonConfig::default()
    };

    match daemon::run_daemon(config, args.no_detach) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("forkerd: {e}");
            ExitCode::FAILURE
        }
    }
}
