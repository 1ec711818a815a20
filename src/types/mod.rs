//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `message`: Notification emails
//! - `transaction`: Parsed transactions, kinds and amounts
//! - `user`: Per-user configuration
//! - `error`: Error types, one per module scope

pub mod error;
pub mod message;
pub mod transaction;
pub mod user;

pub use error::{
    AccountingError, BankError, MailError, NotifyError, PipeError, StoreError, SyncError,
};
pub use message::{Message, MessageId, RawMessage};
pub use transaction::{Amount, TransactionInfo, TransactionKind};
pub use user::{AccountMapping, AccountingConfig, UserConfig};
