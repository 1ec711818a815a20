//! Bank Mail Sync CLI
//!
//! Reads bank notification emails, registers the transactions they describe
//! into each user's ledger and texts every user a summary.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --config settings.toml
//! cargo run -- --dry-run --debug
//! cargo run -- --since 2024-01-01 --timeout 300
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success, including runs where single transactions failed
//! - 1: Configuration or sanity error (bad settings, missing mailbox, ...)

use std::process;
use std::sync::Arc;

use bank_mail_sync::cli;
use bank_mail_sync::local::LocalDependencies;
use bank_mail_sync::settings::Settings;
use bank_mail_sync::sync::Synchronizer;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = cli::parse_args();

    let settings = match Settings::new(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: could not load settings from '{}': {}", args.config.display(), e);
            process::exit(1);
        }
    };

    let level = if args.debug { "debug" } else { settings.app.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bank_mail_sync={level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let options = settings.sync_options(args.dry_run, args.since);
    let factory = Arc::new(LocalDependencies::new(settings.storage));
    let synchronizer = Synchronizer::new(options, factory);

    let done = CancellationToken::new();
    let interrupt = done.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping the run");
            interrupt.cancel();
        }
    });

    let deadline = args.timeout().map(|timeout| Instant::now() + timeout);

    match synchronizer.run(done, deadline).await {
        Ok(report) => info!(
            registered = report.registered,
            failed = report.registration_failures,
            "done"
        ),
        Err(e) => {
            error!(error = %e, "sync failed");
            process::exit(1);
        }
    }
}
