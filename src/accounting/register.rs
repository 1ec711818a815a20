//! Per-transaction registration and the registration worker pool
//!
//! # Design
//!
//! A [`Registrar`] lives for one run. For every transaction it resolves the
//! owning user, the `PENDING_<KIND>` category and the ledger account, then
//! creates the entry. Categories and account mappings are fetched once per
//! token and kind and shared by all workers.
//!
//! # Thread Safety
//!
//! The caches are `DashMap`s of `Arc<OnceCell<_>>`. The map lock is only
//! held long enough to clone the cell out; the cell then guarantees a
//! single fetch (or a single category creation) per key even when several
//! workers ask for it at once.
//!
//! # Dry Run
//!
//! In dry-run mode every decision is made and logged, but no category or
//! entry is created. A category that would have been created resolves to
//! an empty id.

use std::sync::Arc;

use chrono_tz::Tz;
use dashmap::DashMap;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::mapping::{prefix_mapping, resolve_account, AccountsMapping};
use super::{AccountingService, Entry};
use crate::pipe;
use crate::repository::UserConfigRepository;
use crate::types::{
    AccountingError, Amount, PipeError, TransactionInfo, TransactionKind, UserConfig,
};

/// A transaction registered into a user's ledger
#[derive(Debug, Clone)]
pub struct Registration {
    /// Owner of the ledger the entry went to
    pub user: UserConfig,

    /// The entry as created (or as it would have been, under dry-run)
    pub entry: Entry,
}

/// Result of registering one transaction
#[derive(Debug, Clone)]
pub struct Outcome {
    pub transaction: TransactionInfo,
    pub result: Result<Registration, AccountingError>,
}

/// Registers transactions for one run
pub struct Registrar {
    accounting: Arc<AccountingService>,
    users: Arc<UserConfigRepository>,
    timezone: Tz,
    dry_run: bool,
    categories: DashMap<(String, TransactionKind), Arc<OnceCell<String>>>,
    accounts: DashMap<String, Arc<OnceCell<Arc<AccountsMapping>>>>,
}

impl Registrar {
    pub fn new(
        accounting: Arc<AccountingService>,
        users: Arc<UserConfigRepository>,
        timezone: Tz,
        dry_run: bool,
    ) -> Self {
        Self {
            accounting,
            users,
            timezone,
            dry_run,
            categories: DashMap::new(),
            accounts: DashMap::new(),
        }
    }

    /// Register every transaction over a bounded worker pool
    ///
    /// The transactions are split into `min(cpu, n)` buckets; each worker
    /// registers its bucket sequentially. Transactions left unprocessed
    /// because `done` fired come back as [`AccountingError::Cancelled`].
    ///
    /// # Returns
    ///
    /// One [`Outcome`] per input transaction, in no particular order.
    pub async fn register_all(
        self: &Arc<Self>,
        done: &CancellationToken,
        transactions: Vec<TransactionInfo>,
    ) -> Result<Vec<Outcome>, PipeError> {
        let workers = pipe::worker_count(transactions.len());
        if workers == 0 {
            return Ok(Vec::new());
        }

        let buckets = pipe::partition(workers, transactions)?;
        debug!(workers, buckets = buckets.len(), "registering transactions");

        let mut tasks = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            let registrar = Arc::clone(self);
            let done = done.clone();
            tasks.push(tokio::spawn(async move {
                registrar.register_bucket(&done, bucket).await
            }));
        }

        let mut outcomes = Vec::new();
        for task in tasks {
            match task.await {
                Ok(bucket) => outcomes.extend(bucket),
                Err(e) => error!(error = %e, "registration worker panicked"),
            }
        }

        Ok(outcomes)
    }

    async fn register_bucket(
        &self,
        done: &CancellationToken,
        bucket: Vec<TransactionInfo>,
    ) -> Vec<Outcome> {
        let mut outcomes = Vec::with_capacity(bucket.len());

        for transaction in bucket {
            let result = if done.is_cancelled() {
                Err(AccountingError::Cancelled)
            } else {
                self.register(done, &transaction).await
            };

            if let Err(e) = &result {
                warn!(
                    message_id = transaction.correlation_id,
                    account = %transaction.account,
                    error = %e,
                    "could not register transaction"
                );
            }

            outcomes.push(Outcome {
                transaction,
                result,
            });
        }

        outcomes
    }

    /// Register a single transaction
    ///
    /// # Errors
    ///
    /// Fails when no recipient of the origin message is a known user, when
    /// the bank account has no ledger account, or when the accounting
    /// service fails.
    pub async fn register(
        &self,
        done: &CancellationToken,
        transaction: &TransactionInfo,
    ) -> Result<Registration, AccountingError> {
        let user = self
            .users
            .user_config_from_candidates(done, &transaction.origin.to)
            .await?;
        let token = user.token();

        let mapping = self.account_mapping(done, token).await?;
        let category_id = self.category(done, token, transaction.kind).await?;

        let overrides = user.mappings.get(transaction.bank.name());
        let account = resolve_account(&mapping, overrides, &transaction.account).ok_or_else(
            || AccountingError::AccountNotMapped {
                account: transaction.account.clone(),
            },
        )?;

        let entry = Entry {
            amount: Amount::new(transaction.amount.code.clone(), transaction.signed_amount()),
            date: transaction.date.with_timezone(&self.timezone).date_naive(),
            description: format!("** {} de {}", transaction.action, transaction.description),
            account_id: account.id.clone(),
            category_id,
        };

        debug!(
            user = %user.email,
            message_id = transaction.correlation_id,
            ?entry,
            "entry to be created"
        );

        if self.dry_run {
            info!(message_id = transaction.correlation_id, "not creating entry due to dry run");
        } else {
            self.accounting.create_entry(done, token, &entry).await?;
        }

        Ok(Registration { user, entry })
    }

    async fn account_mapping(
        &self,
        done: &CancellationToken,
        token: &str,
    ) -> Result<Arc<AccountsMapping>, AccountingError> {
        let cell = Arc::clone(self.accounts.entry(token.to_string()).or_default().value());

        cell.get_or_try_init(|| async {
            let accounts = self.accounting.accounts(done, token).await?;
            Ok::<_, AccountingError>(Arc::new(prefix_mapping(&accounts)))
        })
        .await
        .cloned()
    }

    async fn category(
        &self,
        done: &CancellationToken,
        token: &str,
        kind: TransactionKind,
    ) -> Result<String, AccountingError> {
        let cell = Arc::clone(
            self.categories
                .entry((token.to_string(), kind))
                .or_default()
                .value(),
        );

        cell.get_or_try_init(|| self.find_or_create_category(done, token, kind))
            .await
            .cloned()
    }

    async fn find_or_create_category(
        &self,
        done: &CancellationToken,
        token: &str,
        kind: TransactionKind,
    ) -> Result<String, AccountingError> {
        let name = kind.pending_category();
        let categories = self.accounting.categories(done, token).await?;

        if let Some(existing) = categories.iter().find(|c| c.name == name) {
            if existing.kind.parse::<TransactionKind>().ok() != Some(kind) {
                warn!(
                    category = %name,
                    actual = %existing.kind,
                    expected = %kind,
                    "category types mismatch"
                );
            }
            return Ok(existing.id.clone());
        }

        if self.dry_run {
            info!(category = %name, "not creating category due to dry run");
            return Ok(String::new());
        }

        let created = self
            .accounting
            .create_category(done, token, &name, kind)
            .await?;
        info!(category = %name, id = %created.id, "created category");

        Ok(created.id)
    }
}
