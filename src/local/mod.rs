//! File-backed collaborators
//!
//! Lets the synchronizer run against a directory tree instead of remote
//! services: a maildir-like folder per mailbox, JSON documents for the
//! watermark, users and ledgers, and a log line in place of each SMS.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::accounting::AccountingService;
use crate::bank::banks;
use crate::mail::{MailClientPool, MailService};
use crate::notify::SmsSender;
use crate::settings::Storage;
use crate::sync::{Dependencies, DependencyFactory};
use crate::types::{NotifyError, SyncError};

mod ledger;
mod mail;
mod store;

pub use ledger::JsonLedgerClient;
pub use mail::{DirMailClient, DirMailConnector};
pub use store::{JsonDateStore, JsonUserConfigStore};

/// Writes every SMS to the log instead of delivering it
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSmsSender;

#[async_trait]
impl SmsSender for LogSmsSender {
    async fn send_sms(&self, to: &str, text: &str) -> Result<(), NotifyError> {
        info!(to, text, "sms");
        Ok(())
    }
}

/// Builds every dependency from the `[storage]` settings
#[derive(Debug, Clone)]
pub struct LocalDependencies {
    storage: Storage,
}

impl LocalDependencies {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl DependencyFactory for LocalDependencies {
    async fn build(&self) -> Result<Dependencies, SyncError> {
        let storage = &self.storage;

        if !tokio::fs::try_exists(&storage.ledger_dir)
            .await
            .unwrap_or(false)
        {
            return Err(SyncError::Configuration(format!(
                "ledger directory '{}' does not exist",
                storage.ledger_dir.display()
            )));
        }

        let connector = Arc::new(DirMailConnector::new(&storage.mail_dir));

        Ok(Dependencies {
            mail: MailService::new(MailClientPool::new(connector)),
            accounting: Arc::new(AccountingService::new(JsonLedgerClient::builder(
                &storage.ledger_dir,
            ))),
            dates: Arc::new(JsonDateStore::new(&storage.date_file)),
            users: Arc::new(JsonUserConfigStore::new(&storage.users_file)),
            sms: Arc::new(LogSmsSender),
            banks: banks(),
        })
    }
}
