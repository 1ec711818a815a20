//! Fetch, filter and parse stage
//!
//! ```text
//! messages ──tee──┬── only_on_error ──────────────────────────────► fetch errors
//!                 └── ignore_on_error ── concurrent_map(classify) ──tee──┬── ignore_on_error ► transactions
//!                                                                        └── only_on_error ──► parse failures
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bank::{sender_bank, BankDelegate};
use crate::mail::MailService;
use crate::pipe;
use crate::types::{BankError, MailError, Message, TransactionInfo};

/// A message from a known bank that could not be parsed
#[derive(Debug, Clone)]
pub struct ParseFailure {
    pub message: Arc<Message>,
    pub error: BankError,
}

/// Everything the fetch phase produced
#[derive(Debug, Default)]
pub struct Extraction {
    pub transactions: Vec<TransactionInfo>,
    pub parse_failures: Vec<ParseFailure>,
    pub fetch_errors: usize,

    /// Messages from senders no bank recognises
    pub skipped: usize,
}

impl Extraction {
    /// Every message the stage saw, whatever happened to it
    pub fn fetched(&self) -> usize {
        self.transactions.len() + self.parse_failures.len() + self.fetch_errors + self.skipped
    }
}

/// Fetch the messages of `mailbox` since `since` and sort them by outcome
///
/// When `done` fires the stage stops and returns what it gathered so far,
/// which is nothing when the search itself had not answered yet.
///
/// # Errors
///
/// Only a failed mailbox search is an error; every per-message problem is
/// absorbed into the returned counts.
pub async fn extract(
    done: &CancellationToken,
    mail: &MailService,
    banks: Arc<Vec<Arc<dyn BankDelegate>>>,
    mailbox: &str,
    since: DateTime<Utc>,
) -> Result<Extraction, MailError> {
    let fetched = match mail.messages(done.clone(), mailbox, since).await {
        Ok(fetched) => fetched,
        Err(MailError::Cancelled) => {
            warn!(mailbox, "search did not answer before the fetch deadline");
            return Ok(Extraction::default());
        }
        Err(e) => return Err(e),
    };

    let (messages, failures) = pipe::tee(done.clone(), fetched);
    let fetch_errors = pipe::only_on_error(done.clone(), failures);
    let messages = pipe::ignore_on_error(done.clone(), messages);

    let classified = pipe::concurrent_map(done.clone(), num_cpus::get(), messages, move |message| {
        let banks = Arc::clone(&banks);
        async move { classify(&banks, message) }
    });

    let (parsed, unparsed) = pipe::tee(done.clone(), classified);
    let parsed = pipe::ignore_on_error(done.clone(), parsed);
    let unparsed = pipe::only_on_error(done.clone(), unparsed);

    let (fetch_errors, parsed, parse_failures) = tokio::join!(
        pipe::gather(done, fetch_errors, |_| ()),
        pipe::gather(done, parsed, |transaction| transaction),
        pipe::gather(done, unparsed, |failure| failure),
    );

    let skipped = parsed.iter().filter(|parsed| parsed.is_none()).count();
    let extraction = Extraction {
        transactions: parsed.into_iter().flatten().collect(),
        parse_failures,
        fetch_errors: fetch_errors.len(),
        skipped,
    };

    debug!(
        transactions = extraction.transactions.len(),
        parse_failures = extraction.parse_failures.len(),
        fetch_errors = extraction.fetch_errors,
        skipped = extraction.skipped,
        "extraction finished"
    );

    Ok(extraction)
}

/// `Ok(None)` for messages no bank claims, `Err` for claimed messages that
/// do not parse
fn classify(
    banks: &[Arc<dyn BankDelegate>],
    message: Message,
) -> Result<Option<TransactionInfo>, ParseFailure> {
    let Some(bank) = sender_bank(banks, &message) else {
        return Ok(None);
    };

    let message = Arc::new(message);
    if !bank.filter_message(&message) {
        return Err(ParseFailure {
            error: BankError::NoMatch {
                bank: bank.name().to_string(),
            },
            message,
        });
    }

    Arc::clone(bank)
        .extract_transaction_info(Arc::clone(&message))
        .map(Some)
        .map_err(|error| ParseFailure { message, error })
}
