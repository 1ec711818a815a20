//! Accounting registration
//!
//! Turns parsed transactions into entries of the user's accounting ledger.
//!
//! # Architecture
//!
//! ```text
//! Registrar                          (per run: caches, worker pool)
//!     ├── Arc<AccountingService>     (per process: clients memoized by token)
//!     │       └── Arc<dyn AccountingClient>
//!     └── Arc<UserConfigRepository>  (recipient email -> user config)
//! ```
//!
//! # Cancellation
//!
//! Every client call is spawned and raced against `done`. When `done` wins
//! the call keeps running in the background and only its result is
//! dropped; the caller sees [`AccountingError::Cancelled`].

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::types::{AccountingError, Amount, TransactionKind};

pub mod mapping;
pub mod register;

pub use register::{Outcome, Registrar, Registration};

/// Ledger account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,

    /// Display name; a leading run of numbers names the bank accounts it holds
    pub name: String,
}

/// Ledger category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,

    /// Category type as reported by the service (`expense`, `income`, ...)
    #[serde(rename = "type")]
    pub kind: String,
}

/// Ledger entry to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Signed amount: negative for expenses
    pub amount: Amount,

    /// Day of the transaction in the configured timezone
    pub date: NaiveDate,

    pub description: String,
    pub account_id: String,
    pub category_id: String,
}

/// Client of the accounting service, bound to one user token
#[async_trait]
pub trait AccountingClient: Send + Sync {
    async fn accounts(&self) -> Result<Vec<Account>, AccountingError>;

    async fn categories(&self) -> Result<Vec<Category>, AccountingError>;

    async fn create_category(
        &self,
        name: &str,
        kind: TransactionKind,
    ) -> Result<Category, AccountingError>;

    async fn create_entry(&self, entry: &Entry) -> Result<(), AccountingError>;
}

/// Builds the client for a token
pub type ClientBuilder = Arc<dyn Fn(&str) -> Arc<dyn AccountingClient> + Send + Sync>;

/// Token-addressed access to the accounting service
///
/// Clients are built on first use of a token and reused afterwards.
pub struct AccountingService {
    builder: ClientBuilder,
    clients: DashMap<String, Arc<dyn AccountingClient>>,
}

impl AccountingService {
    pub fn new(builder: ClientBuilder) -> Self {
        Self {
            builder,
            clients: DashMap::new(),
        }
    }

    fn client(&self, token: &str) -> Arc<dyn AccountingClient> {
        if let Some(client) = self.clients.get(token) {
            return Arc::clone(client.value());
        }

        Arc::clone(
            self.clients
                .entry(token.to_string())
                .or_insert_with(|| (self.builder)(token))
                .value(),
        )
    }

    pub async fn accounts(
        &self,
        done: &CancellationToken,
        token: &str,
    ) -> Result<Vec<Account>, AccountingError> {
        let client = self.client(token);
        detached(done, async move { client.accounts().await }).await
    }

    pub async fn categories(
        &self,
        done: &CancellationToken,
        token: &str,
    ) -> Result<Vec<Category>, AccountingError> {
        let client = self.client(token);
        detached(done, async move { client.categories().await }).await
    }

    pub async fn create_category(
        &self,
        done: &CancellationToken,
        token: &str,
        name: &str,
        kind: TransactionKind,
    ) -> Result<Category, AccountingError> {
        let client = self.client(token);
        let name = name.to_string();
        detached(done, async move { client.create_category(&name, kind).await }).await
    }

    pub async fn create_entry(
        &self,
        done: &CancellationToken,
        token: &str,
        entry: &Entry,
    ) -> Result<(), AccountingError> {
        let client = self.client(token);
        let entry = entry.clone();
        detached(done, async move { client.create_entry(&entry).await }).await
    }
}

async fn detached<T, F>(done: &CancellationToken, call: F) -> Result<T, AccountingError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, AccountingError>> + Send + 'static,
{
    let handle = tokio::spawn(call);

    tokio::select! {
        biased;
        _ = done.cancelled() => Err(AccountingError::Cancelled),
        joined = handle => joined.unwrap_or_else(|e| Err(AccountingError::client(e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowClient {
        delay: Duration,
    }

    #[async_trait]
    impl AccountingClient for SlowClient {
        async fn accounts(&self) -> Result<Vec<Account>, AccountingError> {
            tokio::time::sleep(self.delay).await;
            Ok(vec![Account {
                id: "1".to_string(),
                name: "1234 Savings".to_string(),
            }])
        }

        async fn categories(&self) -> Result<Vec<Category>, AccountingError> {
            Ok(vec![])
        }

        async fn create_category(
            &self,
            name: &str,
            kind: TransactionKind,
        ) -> Result<Category, AccountingError> {
            Ok(Category {
                id: "c".to_string(),
                name: name.to_string(),
                kind: kind.to_string(),
            })
        }

        async fn create_entry(&self, _entry: &Entry) -> Result<(), AccountingError> {
            Ok(())
        }
    }

    fn counting_service(built: Arc<AtomicUsize>, delay: Duration) -> AccountingService {
        AccountingService::new(Arc::new(move |_token: &str| {
            built.fetch_add(1, Ordering::SeqCst);
            Arc::new(SlowClient { delay }) as Arc<dyn AccountingClient>
        }))
    }

    #[tokio::test]
    async fn test_clients_are_memoized_per_token() {
        let built = Arc::new(AtomicUsize::new(0));
        let service = counting_service(built.clone(), Duration::ZERO);
        let done = CancellationToken::new();

        service.accounts(&done, "token-a").await.unwrap();
        service.accounts(&done, "token-a").await.unwrap();
        service.categories(&done, "token-b").await.unwrap();

        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelled_call_reports_cancelled() {
        let built = Arc::new(AtomicUsize::new(0));
        let service = counting_service(built, Duration::from_secs(60));
        let done = CancellationToken::new();

        let canceller = done.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = service.accounts(&done, "token").await.unwrap_err();
        assert_eq!(err, AccountingError::Cancelled);
    }
}
