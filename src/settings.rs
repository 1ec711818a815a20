//! Handles settings for the application. Configuration is written in
//! `settings.toml`; any key can be overridden from the environment with the
//! `BANK_MAIL_SYNC__` prefix and `__` as the section separator, e.g.
//! `BANK_MAIL_SYNC__APP__TIMEZONE=America/Bogota`.
//!
//! ```toml
//! [app]
//! level = "info"
//! timezone = "America/Bogota"
//!
//! [mailboxes]
//! inbox = "INBOX"
//! parse_error = "parse-errors"
//! archive = "processed"
//!
//! [storage]
//! mail_dir = "data/mail"
//! date_file = "data/last_processed.json"
//! users_file = "data/users.json"
//! ledger_dir = "data/ledgers"
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::sync::{Mailboxes, SyncOptions};

const ENV_PREFIX: &str = "BANK_MAIL_SYNC";

#[derive(Debug, Clone, Deserialize)]
pub struct App {
    /// Log level used when `RUST_LOG` is not set
    #[serde(default = "default_level")]
    pub level: String,

    /// IANA timezone entry dates are expressed in
    pub timezone: String,

    /// Label prefixed to SMS summaries; the crate version when unset
    #[serde(default = "default_version")]
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailboxNames {
    #[serde(default = "default_inbox")]
    pub inbox: String,

    #[serde(default = "default_parse_error")]
    pub parse_error: String,

    #[serde(default = "default_archive")]
    pub archive: String,
}

impl Default for MailboxNames {
    fn default() -> Self {
        Self {
            inbox: default_inbox(),
            parse_error: default_parse_error(),
            archive: default_archive(),
        }
    }
}

/// Locations used by the file-backed collaborators
#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
    /// One sub-directory per mailbox, one `<uid>.eml` file per message
    pub mail_dir: PathBuf,
    pub date_file: PathBuf,
    pub users_file: PathBuf,

    /// One `<token>.json` ledger per user
    pub ledger_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub app: App,

    #[serde(default)]
    pub mailboxes: MailboxNames,

    pub storage: Storage,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_inbox() -> String {
    "INBOX".to_string()
}

fn default_parse_error() -> String {
    "parse-errors".to_string()
}

fn default_archive() -> String {
    "processed".to_string()
}

impl Settings {
    /// Load the settings file at `path` plus the environment overrides
    pub fn new(path: &Path) -> Result<Self, ConfigError> {
        Self::load(path, Environment::with_prefix(ENV_PREFIX).separator("__"))
    }

    fn load(path: &Path, environment: Environment) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path))
            .add_source(environment)
            .build()?;

        settings.try_deserialize()
    }

    /// Orchestrator options for a run
    pub fn sync_options(&self, dry_run: bool, since: Option<NaiveDate>) -> SyncOptions {
        SyncOptions {
            dry_run,
            since,
            mailboxes: Mailboxes {
                inbox: self.mailboxes.inbox.clone(),
                parse_error: self.mailboxes.parse_error.clone(),
                archive: self.mailboxes.archive.clone(),
            },
            timezone: self.app.timezone.clone(),
            version: self.app.version.clone(),
        }
    }
}
