//! Bank parsing engine
//!
//! Each bank is a [`BankDelegate`]: a stateless strategy that recognises the
//! bank's notification senders and turns a notification body into a
//! [`TransactionInfo`] through an ordered list of patterns.
//!
//! The registry is a static list returned by [`banks`].

use std::fmt;
use std::sync::Arc;

use crate::types::{BankError, Message, TransactionInfo};

pub mod bancolombia;
pub mod currency;
pub mod rules;

pub use bancolombia::Bancolombia;

/// Strategy encapsulating one institution's notification format
///
/// Implementations hold no mutable state and are shared across every
/// worker of the pipeline.
pub trait BankDelegate: fmt::Debug + Send + Sync {
    /// Bank name, also the key of the per-user account overrides
    fn name(&self) -> &'static str;

    /// Whether any of `senders` is one of the bank's notification addresses
    ///
    /// Exact, case-sensitive comparison against a fixed allow-list.
    fn comes_from(&self, senders: &[String]) -> bool;

    /// Whether the message comes from the bank and its body matches a pattern
    fn filter_message(&self, message: &Message) -> bool;

    /// Extract the transaction described by the message body
    ///
    /// # Errors
    ///
    /// Returns a [`BankError`] when no pattern matches, when the winning
    /// pattern misses a required field, or when the amount is not a
    /// currency string.
    fn extract_transaction_info(
        self: Arc<Self>,
        message: Arc<Message>,
    ) -> Result<TransactionInfo, BankError>;
}

/// Every bank the synchronizer knows about
pub fn banks() -> Vec<Arc<dyn BankDelegate>> {
    vec![Arc::new(Bancolombia)]
}

/// First bank whose sender allow-list matches the message
pub fn sender_bank<'a>(
    banks: &'a [Arc<dyn BankDelegate>],
    message: &Message,
) -> Option<&'a Arc<dyn BankDelegate>> {
    banks.iter().find(|bank| bank.comes_from(&message.from))
}
