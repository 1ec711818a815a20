//! Sync orchestrator
//!
//! One [`Synchronizer::run`] walks the whole state machine:
//!
//! ```text
//! configure ─► load watermark ─► check mailboxes ─► fetch + parse ─┬─► archive parse failures
//!                                                                  └─► register ─► archive successes
//!                                                                        ─► persist watermark ─► notify
//! ```
//!
//! # Design
//!
//! Dependencies are built once per synchronizer through a
//! [`DependencyFactory`], on the first run. Everything that only makes
//! sense for a single run (the user-config cache, the category and account
//! caches) is created inside `run`.
//!
//! Only configuration and sanity problems end a run with an error: a
//! missing mailbox, an unusable timezone, a failed mailbox search. Every
//! per-message and per-transaction failure is logged, counted in the
//! [`SyncReport`] and routed to archival or to the next watermark.
//!
//! # Deadlines
//!
//! With a deadline, the fetch phase gets [`FETCH_SHARE`] of the time left
//! and stops when it runs out, keeping what it already gathered. The
//! remaining phases run under the full deadline.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::accounting::{AccountingService, Outcome, Registrar};
use crate::bank::BankDelegate;
use crate::mail::MailService;
use crate::notify::{NotificationService, SmsSender};
use crate::pipe;
use crate::repository::{DateStore, UserConfigRepository, UserConfigStore};
use crate::types::{MailError, MessageId, SyncError};

pub mod extract;
pub mod watermark;

use extract::Extraction;

/// Fraction of the remaining time given to the fetch phase
pub const FETCH_SHARE: f64 = 0.4;

/// Mailboxes a run reads from and archives into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailboxes {
    /// Where notifications arrive
    pub inbox: String,

    /// Where messages from a known bank that failed to parse are moved
    pub parse_error: String,

    /// Where registered messages are moved
    pub archive: String,
}

impl Mailboxes {
    fn required(&self) -> [&str; 3] {
        [
            self.inbox.as_str(),
            self.parse_error.as_str(),
            self.archive.as_str(),
        ]
    }
}

/// Run-independent settings of the orchestrator
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Make every decision but perform no side effect
    pub dry_run: bool,

    /// Operator override of the stored watermark
    pub since: Option<NaiveDate>,

    pub mailboxes: Mailboxes,

    /// IANA name of the timezone entry dates are expressed in
    pub timezone: String,

    /// Label prefixed to the SMS summaries
    pub version: String,
}

/// External collaborators of the orchestrator
pub struct Dependencies {
    pub mail: MailService,
    pub accounting: Arc<AccountingService>,
    pub dates: Arc<dyn DateStore>,
    pub users: Arc<dyn UserConfigStore>,
    pub sms: Arc<dyn SmsSender>,
    pub banks: Vec<Arc<dyn BankDelegate>>,
}

/// Builds the orchestrator's dependencies
#[async_trait]
pub trait DependencyFactory: Send + Sync {
    async fn build(&self) -> Result<Dependencies, SyncError>;
}

/// Summary of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Lower bound the mailbox was searched from
    pub since: DateTime<Utc>,

    pub fetched: usize,
    pub fetch_errors: usize,
    pub skipped: usize,
    pub parsed: usize,
    pub parse_failures: usize,
    pub registered: usize,
    pub registration_failures: usize,
    pub notified_users: usize,

    /// Watermark computed for the next run, if any
    ///
    /// Under dry-run this is the value that would have been saved.
    pub watermark: Option<DateTime<Utc>>,

    /// Whether the fetch phase ran out of time
    pub fetch_truncated: bool,
}

struct Configured {
    deps: Dependencies,
    banks: Arc<Vec<Arc<dyn BankDelegate>>>,
    timezone: Tz,
}

/// The mail to accounting synchronizer
pub struct Synchronizer {
    options: SyncOptions,
    factory: Arc<dyn DependencyFactory>,
    configured: OnceCell<Arc<Configured>>,
}

/// Parse an IANA timezone name
///
/// # Errors
///
/// Returns [`SyncError::Configuration`] for an empty or unknown name.
pub fn parse_timezone(name: &str) -> Result<Tz, SyncError> {
    if name.trim().is_empty() {
        return Err(SyncError::Configuration(
            "timezone should not be empty".to_string(),
        ));
    }

    name.parse::<Tz>()
        .map_err(|_| SyncError::Configuration(format!("unknown timezone '{name}'")))
}

impl Synchronizer {
    pub fn new(options: SyncOptions, factory: Arc<dyn DependencyFactory>) -> Self {
        Self {
            options,
            factory,
            configured: OnceCell::new(),
        }
    }

    async fn configure(&self) -> Result<Arc<Configured>, SyncError> {
        self.configured
            .get_or_try_init(|| async {
                let timezone = parse_timezone(&self.options.timezone)?;
                let deps = self.factory.build().await?;
                let banks = Arc::new(deps.banks.clone());
                debug!(%timezone, banks = banks.len(), "dependencies configured");

                Ok::<_, SyncError>(Arc::new(Configured {
                    deps,
                    banks,
                    timezone,
                }))
            })
            .await
            .cloned()
    }

    /// Run one synchronization
    ///
    /// # Arguments
    ///
    /// * `done` - Cancels the run; in-flight calls finish but their results are dropped
    /// * `deadline` - Optional point in time the run must end by
    ///
    /// # Errors
    ///
    /// Returns a [`SyncError`] for configuration and sanity failures only.
    pub async fn run(
        &self,
        done: CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<SyncReport, SyncError> {
        let done = done.child_token();
        let _stop_timers = done.clone().drop_guard();
        if let Some(deadline) = deadline {
            cancel_at(done.clone(), deadline);
        }

        let configured = self.configure().await?;
        let deps = &configured.deps;
        let options = &self.options;
        let mut report = SyncReport {
            since: watermark::load(deps.dates.as_ref(), options.since, Utc::now()).await,
            ..Default::default()
        };

        info!(since = %report.since, dry_run = options.dry_run, "starting sync");

        self.check_mailboxes(&done, &deps.mail).await?;

        let fetch_done = done.child_token();
        if let Some(deadline) = deadline {
            cancel_at(fetch_done.clone(), fetch_deadline(deadline));
        }

        let extraction = extract::extract(
            &fetch_done,
            &deps.mail,
            Arc::clone(&configured.banks),
            &options.mailboxes.inbox,
            report.since,
        )
        .await?;

        report.fetch_truncated = fetch_done.is_cancelled();
        if report.fetch_truncated {
            warn!("fetch phase was cut short, continuing with partial results");
        }

        report.fetched = extraction.fetched();
        report.fetch_errors = extraction.fetch_errors;
        report.skipped = extraction.skipped;
        report.parsed = extraction.transactions.len();
        report.parse_failures = extraction.parse_failures.len();

        let Extraction {
            transactions,
            parse_failures,
            ..
        } = extraction;

        let parse_failure_ids: Vec<MessageId> = parse_failures.iter().map(|f| f.message.id).collect();
        let parse_archive = self.archive(
            &done,
            &deps.mail,
            &options.mailboxes.parse_error,
            parse_failure_ids,
        );

        let users = Arc::new(UserConfigRepository::new(Arc::clone(&deps.users)));
        let registrar = Arc::new(Registrar::new(
            Arc::clone(&deps.accounting),
            users,
            configured.timezone,
            options.dry_run,
        ));
        let outcomes = registrar.register_all(&done, transactions).await?;

        report.registered = outcomes.iter().filter(|o| o.result.is_ok()).count();
        report.registration_failures = outcomes.len() - report.registered;

        let registered_ids: Vec<MessageId> = outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.transaction.correlation_id)
            .collect();
        let success_archive =
            self.archive(&done, &deps.mail, &options.mailboxes.archive, registered_ids);

        await_archive(parse_archive, &options.mailboxes.parse_error).await;
        await_archive(success_archive, &options.mailboxes.archive).await;

        report.watermark = self.persist_watermark(deps.dates.as_ref(), &report, &outcomes).await;

        let notifications = NotificationService::new(
            Arc::clone(&deps.sms),
            configured.timezone,
            &options.version,
            options.dry_run,
        );
        report.notified_users = notifications.notify_users(&outcomes).await;

        info!(
            fetched = report.fetched,
            fetch_errors = report.fetch_errors,
            skipped = report.skipped,
            parsed = report.parsed,
            parse_failures = report.parse_failures,
            registered = report.registered,
            registration_failures = report.registration_failures,
            notified_users = report.notified_users,
            watermark = ?report.watermark,
            "sync finished"
        );

        Ok(report)
    }

    async fn check_mailboxes(
        &self,
        done: &CancellationToken,
        mail: &MailService,
    ) -> Result<(), SyncError> {
        let available = mail.mailboxes(done).await?;

        for required in self.options.mailboxes.required() {
            if !available.iter().any(|mailbox| mailbox == required) {
                return Err(SyncError::MissingMailbox {
                    mailbox: required.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Move `ids` out of the inbox in the background
    ///
    /// Returns `None` when there is nothing to move or when running dry.
    fn archive(
        &self,
        done: &CancellationToken,
        mail: &MailService,
        to: &str,
        ids: Vec<MessageId>,
    ) -> Option<tokio::sync::oneshot::Receiver<Result<(), MailError>>> {
        if ids.is_empty() {
            debug!(mailbox = to, "no messages to archive");
            return None;
        }

        if self.options.dry_run {
            info!(mailbox = to, ?ids, "not moving messages due to dry run");
            return None;
        }

        let mail = mail.clone();
        let from = self.options.mailboxes.inbox.clone();
        let to = to.to_string();

        Some(pipe::async_result(done.clone(), async move {
            mail.move_messages(&from, &to, &ids).await
        }))
    }

    /// Compute and, unless running dry, save the next watermark
    ///
    /// Nothing is computed for a run that fetched nothing, so an idle run
    /// leaves the stored date untouched. A truncated fetch never moves the
    /// watermark past the date this run started from.
    async fn persist_watermark(
        &self,
        dates: &dyn DateStore,
        report: &SyncReport,
        outcomes: &[Outcome],
    ) -> Option<DateTime<Utc>> {
        if report.fetched == 0 {
            debug!("nothing fetched, keeping last processed date");
            return None;
        }

        let mut next = watermark::next(outcomes, Utc::now());
        if report.fetch_truncated {
            next = next.min(report.since);
        }

        info!(watermark = %next, "setting new last processed date");

        if self.options.dry_run {
            info!("not changing last processed date due to dry run");
        } else if let Err(e) = dates.save_processed_date(next).await {
            error!(error = %e, "could not save last processed date");
        }

        Some(next)
    }
}

async fn await_archive(
    pending: Option<tokio::sync::oneshot::Receiver<Result<(), MailError>>>,
    mailbox: &str,
) {
    let Some(pending) = pending else {
        return;
    };

    match pending.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(mailbox, error = %e, "could not archive messages"),
        Err(_) => warn!(mailbox, "archive result discarded"),
    }
}

fn fetch_deadline(deadline: Instant) -> Instant {
    let now = Instant::now();
    now + deadline.saturating_duration_since(now).mul_f64(FETCH_SHARE)
}

fn cancel_at(token: CancellationToken, at: Instant) {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep_until(at) => {
                debug!("deadline reached");
                token.cancel();
            }
        }
    });
}
