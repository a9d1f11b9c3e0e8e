//! ribd entry point.
//!
//! Builds the RIB from a YAML configuration, replays route updates from a
//! JSON-lines script (or stdin) and optionally dumps the final table.

use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};
use rib_daemon::{load_config, DaemonStats, RibDaemon};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{AsyncBufRead, BufReader};

/// Routing information base daemon
#[derive(Parser, Debug)]
#[command(name = "ribd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// RIB configuration (YAML)
    #[arg(short = 'c', long)]
    config: PathBuf,

    /// Route update script, one JSON object per line (default: stdin)
    #[arg(short = 'u', long)]
    updates: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Print the installed routes as JSON on exit
    #[arg(long)]
    dump: bool,
}

async fn open_updates(path: Option<&PathBuf>) -> Result<Box<dyn AsyncBufRead + Unpin>> {
    Ok(match path {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    })
}

async fn run(args: &Args) -> Result<(RibDaemon, DaemonStats)> {
    let config = load_config(&args.config).await?;
    info!(
        "Loaded {} protocols from {}",
        config.protocols.len(),
        args.config.display()
    );

    let mut daemon = RibDaemon::new(&config)?;
    let reader = open_updates(args.updates.as_ref()).await?;

    let finished = tokio::select! {
        stats = daemon.run(reader) => Some(stats?),
        _ = tokio::signal::ctrl_c() => {
            warn!("Received SIGINT, stopping early...");
            None
        }
    };
    let stats = finished.unwrap_or_else(|| daemon.stats());
    Ok((daemon, stats))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    info!("--- Starting ribd ---");

    let (mut daemon, stats) = match run(&args).await {
        Ok(done) => done,
        Err(e) => {
            error!("ribd: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Updates: {} propagated, {} suppressed, {} queued, {} rejected; {} resolutions",
        stats.propagated, stats.suppressed, stats.queued, stats.rejected, stats.resolutions
    );

    if args.dump {
        match serde_json::to_string_pretty(&daemon.installed_routes()) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("ribd: dumping routes: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    match daemon.shutdown() {
        Ok(dropped) => info!("ribd exiting, dropped {} routes", dropped),
        Err(e) => {
            error!("ribd: shutdown: {}", e);
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
