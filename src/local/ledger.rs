//! File-backed accounting ledger
//!
//! Each token owns one `<token>.json` document with its accounts,
//! categories and entries. Accounts are maintained by hand; the
//! synchronizer only adds categories and entries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::accounting::{Account, AccountingClient, Category, ClientBuilder, Entry};
use crate::types::{AccountingError, TransactionKind};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Ledger {
    #[serde(default)]
    accounts: Vec<Account>,

    #[serde(default)]
    categories: Vec<Category>,

    #[serde(default)]
    entries: Vec<Entry>,
}

/// Keep tokens from escaping the ledger directory
fn ledger_file(dir: &Path, token: &str) -> PathBuf {
    let name: String = token
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    dir.join(format!("{name}.json"))
}

/// Ledger client of one token
///
/// The mutex serialises read-modify-write cycles on the document.
#[derive(Debug)]
pub struct JsonLedgerClient {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLedgerClient {
    pub fn new(dir: &Path, token: &str) -> Self {
        Self {
            path: ledger_file(dir, token),
            lock: Mutex::new(()),
        }
    }

    /// Builds one client per token, all inside `dir`
    pub fn builder(dir: impl Into<PathBuf>) -> ClientBuilder {
        let dir = dir.into();
        Arc::new(move |token: &str| {
            Arc::new(JsonLedgerClient::new(&dir, token)) as Arc<dyn AccountingClient>
        })
    }

    async fn load(&self) -> Result<Ledger, AccountingError> {
        let content = fs::read(&self.path).await.map_err(|e| {
            AccountingError::client(format!("ledger '{}': {e}", self.path.display()))
        })?;
        serde_json::from_slice(&content).map_err(AccountingError::client)
    }

    async fn store(&self, ledger: &Ledger) -> Result<(), AccountingError> {
        let content = serde_json::to_vec_pretty(ledger).map_err(AccountingError::client)?;
        fs::write(&self.path, content)
            .await
            .map_err(AccountingError::client)
    }
}

#[async_trait]
impl AccountingClient for JsonLedgerClient {
    async fn accounts(&self) -> Result<Vec<Account>, AccountingError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.accounts)
    }

    async fn categories(&self) -> Result<Vec<Category>, AccountingError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.categories)
    }

    async fn create_category(
        &self,
        name: &str,
        kind: TransactionKind,
    ) -> Result<Category, AccountingError> {
        let _guard = self.lock.lock().await;
        let mut ledger = self.load().await?;

        let category = Category {
            id: format!("cat-{}", ledger.categories.len() + 1),
            name: name.to_string(),
            kind: kind.to_string(),
        };
        ledger.categories.push(category.clone());
        self.store(&ledger).await?;

        debug!(ledger = %self.path.display(), id = %category.id, "category created");
        Ok(category)
    }

    async fn create_entry(&self, entry: &Entry) -> Result<(), AccountingError> {
        let _guard = self.lock.lock().await;
        let mut ledger = self.load().await?;

        ledger.entries.push(entry.clone());
        self.store(&ledger).await
    }
}
