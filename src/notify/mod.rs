//! SMS run summaries
//!
//! After a run every user with registered transactions gets one SMS:
//!
//! ```text
//! v1.4 Registered 3 transactions
//! 2022-09-20 "EXITO EXPRESS AVE 19" -$3150
//! 2022-09-21 "ACME SAS" $1500000
//! ... and 1 others
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono_tz::Tz;
use tracing::{error, info};

use crate::accounting::Outcome;
use crate::types::{NotifyError, TransactionInfo, TransactionKind, UserConfig};

/// Sample lines included in a summary
const SAMPLE_LIMIT: usize = 2;

/// Longest description shown in a sample line, in characters
const DESCRIPTION_LIMIT: usize = 20;

/// Delivery of text messages
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, to: &str, text: &str) -> Result<(), NotifyError>;
}

/// Sends the per-user run summaries
pub struct NotificationService {
    sender: Arc<dyn SmsSender>,
    timezone: Tz,
    version: String,
    dry_run: bool,
}

impl NotificationService {
    pub fn new(sender: Arc<dyn SmsSender>, timezone: Tz, version: &str, dry_run: bool) -> Self {
        let version = if version.is_empty() { "dev" } else { version };

        Self {
            sender,
            timezone,
            version: version.to_string(),
            dry_run,
        }
    }

    /// Notify every user that had at least one successful registration
    ///
    /// Failed deliveries are logged and do not stop the remaining users.
    ///
    /// # Returns
    ///
    /// The number of users a summary was sent to (or, under dry-run, would
    /// have been sent to).
    pub async fn notify_users(&self, outcomes: &[Outcome]) -> usize {
        let mut per_user: BTreeMap<&str, (&UserConfig, Vec<&TransactionInfo>)> = BTreeMap::new();

        for outcome in outcomes {
            if let Ok(registration) = &outcome.result {
                per_user
                    .entry(registration.user.email.as_str())
                    .or_insert_with(|| (&registration.user, Vec::new()))
                    .1
                    .push(&outcome.transaction);
            }
        }

        let mut notified = 0;
        for (email, (user, transactions)) in per_user {
            let text = self.summary(&transactions);

            if self.dry_run {
                info!(email, to = %user.sms_delivery_number, %text, "not sending sms due to dry run");
                notified += 1;
                continue;
            }

            match self.sender.send_sms(&user.sms_delivery_number, &text).await {
                Ok(()) => notified += 1,
                Err(e) => error!(
                    email,
                    to = %user.sms_delivery_number,
                    error = %e,
                    "could not send sms to user"
                ),
            }
        }

        notified
    }

    /// Summary text for one user's transactions
    pub fn summary(&self, transactions: &[&TransactionInfo]) -> String {
        let mut lines = vec![format!(
            "{} Registered {} transactions",
            self.version,
            transactions.len()
        )];

        for transaction in transactions.iter().take(SAMPLE_LIMIT) {
            lines.push(self.sample_line(transaction));
        }

        if transactions.len() > SAMPLE_LIMIT {
            lines.push(format!("... and {} others", transactions.len() - SAMPLE_LIMIT));
        }

        lines.join("\n")
    }

    fn sample_line(&self, transaction: &TransactionInfo) -> String {
        let date = transaction.date.with_timezone(&self.timezone).format("%Y-%m-%d");
        let description: String = transaction
            .description
            .chars()
            .take(DESCRIPTION_LIMIT)
            .collect();
        let sign = match transaction.kind {
            TransactionKind::Expense => "-",
            _ => "",
        };

        format!(
            "{date} \"{description}\" {sign}${}",
            transaction.amount.number.round_dp(0)
        )
    }
}
