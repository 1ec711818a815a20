//! Error types for the bank mail synchronizer
//!
//! Every module owns an error enum whose display string carries the module
//! prefix, so a wrapped error still tells where it was raised.
//!
//! # Error Categories
//!
//! - **Fetch errors** ([`MailError`]): per message, logged and skipped
//! - **Parse errors** ([`BankError`]): routed to the parse-error mailbox
//! - **Registration errors** ([`AccountingError`]): counted and kept for the watermark
//! - **Configuration/sanity errors** ([`SyncError`]): fatal, returned to the caller

use thiserror::Error;

/// Errors raised by the stream combinator library
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipeError {
    /// Items cannot be split into zero buckets
    #[error("pipe: bucket count must be greater than zero, got {count}")]
    InvalidBucketCount {
        /// Requested number of buckets
        count: usize,
    },
}

/// Errors raised while turning a notification into a transaction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BankError {
    /// None of the bank's ordered patterns matched the body
    #[error("{bank}: message did not match any pattern")]
    NoMatch {
        /// Bank that attempted the extraction
        bank: String,
    },

    /// The winning pattern did not capture every required field
    #[error("{bank}: message does not contain all required fields (missing: {})", missing.join(", "))]
    MissingFields {
        /// Bank that attempted the extraction
        bank: String,
        /// Names of the capture groups that were absent
        missing: Vec<String>,
    },

    /// The captured value is not a currency string
    #[error("{bank}: could not parse amount '{value}'")]
    InvalidAmount {
        /// Bank that attempted the extraction
        bank: String,
        /// The raw captured value
        value: String,
    },
}

/// Errors raised by the mail retrieval service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailError {
    /// The underlying mail client reported a failure
    #[error("mail: client error: {0}")]
    Client(String),

    /// No client could be obtained from the pool
    #[error("mail: could not create client: {0}")]
    ClientUnavailable(String),

    /// The raw message could not be parsed as MIME
    #[error("mail: could not parse message {id}: {message}")]
    Parse {
        /// Message sequence id
        id: u32,
        /// Parser failure description
        message: String,
    },

    /// A header the pipeline depends on is missing or malformed
    #[error("mail: message {id} has an invalid '{header}' header")]
    InvalidHeader {
        /// Message sequence id
        id: u32,
        /// Header name
        header: String,
    },

    /// The message carries no inline text part
    #[error("mail: no body found in message {id}")]
    NoBody {
        /// Message sequence id
        id: u32,
    },

    /// The fetch could not be split across workers
    #[error("mail: {0}")]
    Pipe(#[from] PipeError),

    /// The run was cancelled before the mail server answered
    #[error("mail: cancelled")]
    Cancelled,
}

impl MailError {
    pub fn client(error: impl std::fmt::Display) -> Self {
        MailError::Client(error.to_string())
    }
}

/// Errors raised by the date and user-config stores
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The requested item does not exist
    #[error("store: item '{key}' not found")]
    NotFound {
        /// Key that was looked up
        key: String,
    },

    /// The stored date is not in the expected format
    #[error("store: '{value}' is not a valid processed date")]
    InvalidDate {
        /// The stored string
        value: String,
    },

    /// The backing storage failed
    #[error("store: backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for StoreError {
    fn from(error: std::io::Error) -> Self {
        StoreError::Backend(error.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Backend(error.to_string())
    }
}

/// Errors raised while registering a transaction into the accounting service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountingError {
    /// No recipient of the origin message has a user config
    #[error("accounting: could not find user config from candidates [{}]", candidates.join(", "))]
    UserConfigNotFound {
        /// Recipient addresses that were tried
        candidates: Vec<String>,
    },

    /// The bank-local account has no accounting counterpart
    #[error("accounting: transaction does not have an assigned account '{account}'")]
    AccountNotMapped {
        /// Bank-local account identifier
        account: String,
    },

    /// The category kind is not one the service accepts
    #[error("accounting: '{0}' is not a valid category type")]
    InvalidCategoryType(String),

    /// The accounting service reported a failure
    #[error("accounting: client error: {0}")]
    Client(String),

    /// The user-config store failed for a reason other than a missing user
    #[error("accounting: {0}")]
    Store(#[from] StoreError),

    /// The run was cancelled while the registration was in flight
    #[error("accounting: cancelled")]
    Cancelled,
}

impl AccountingError {
    pub fn client(error: impl std::fmt::Display) -> Self {
        AccountingError::Client(error.to_string())
    }
}

/// Errors raised by the SMS notification service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// The message could not be delivered
    #[error("notify: could not send sms to {to}: {message}")]
    Send {
        /// Destination number
        to: String,
        /// Failure description
        message: String,
    },
}

/// Fatal errors returned by the sync orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Dependencies could not be built from the configuration
    #[error("sync: configuration error: {0}")]
    Configuration(String),

    /// A mailbox required by the run does not exist
    #[error("sync: mailbox '{mailbox}' not found")]
    MissingMailbox {
        /// Mailbox name
        mailbox: String,
    },

    /// A mail operation needed by the run failed
    #[error("sync: {0}")]
    Mail(#[from] MailError),

    /// A store operation needed by the run failed
    #[error("sync: {0}")]
    Store(#[from] StoreError),

    /// The pipeline could not be assembled
    #[error("sync: {0}")]
    Pipe(#[from] PipeError),
}
