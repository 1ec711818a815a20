use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Register bank notification emails into the accounting ledger
#[derive(Parser, Debug)]
#[command(name = "bank-mail-sync")]
#[command(about = "Register bank notification emails into the accounting ledger", long_about = None)]
pub struct CliArgs {
    /// Settings file
    #[arg(
        long = "config",
        short = 'c',
        value_name = "FILE",
        default_value = "settings.toml",
        help = "Path to the settings file"
    )]
    pub config: PathBuf,

    /// Log and report every decision without side effects
    #[arg(
        long = "dry-run",
        help = "Do not create entries, move messages, save the last processed date or send SMS"
    )]
    pub dry_run: bool,

    /// Force debug logging
    #[arg(long = "debug", help = "Log at debug level unless RUST_LOG is set")]
    pub debug: bool,

    /// Override of the stored last processed date
    #[arg(
        long = "since",
        value_name = "YYYY-MM-DD",
        env = "OVERRIDE_LAST_PROC_DATE",
        value_parser = parse_date,
        help = "Search messages from this day instead of the stored last processed date"
    )]
    pub since: Option<NaiveDate>,

    /// Time limit for the whole run
    #[arg(
        long = "timeout",
        value_name = "SECONDS",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Stop the run after this many seconds"
    )]
    pub timeout: Option<u64>,
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD, got '{value}': {e}"))
}

impl CliArgs {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}
