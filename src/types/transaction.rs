//! Transaction-related types
//!
//! A [`TransactionInfo`] is what a bank delegate extracts from one
//! notification. It is created by the parsing engine and read-only afterwards.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::bank::BankDelegate;
use crate::types::{AccountingError, Message, MessageId};

/// Kind of movement a notification describes
///
/// The kind decides the sign of the accounting entry and the pending
/// category the entry lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money leaving the account; registered with a negative amount
    Expense,

    /// Money entering the account
    Income,

    /// Movement between own accounts
    Transaction,
}

impl TransactionKind {
    /// Lowercase name used by the accounting service for category types
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Expense => "expense",
            TransactionKind::Income => "income",
            TransactionKind::Transaction => "transaction",
        }
    }

    /// Name of the category entries of this kind are filed under until reviewed
    pub fn pending_category(&self) -> String {
        format!("PENDING_{}", self.as_str().to_uppercase())
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = AccountingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expense" => Ok(TransactionKind::Expense),
            "income" => Ok(TransactionKind::Income),
            "transaction" => Ok(TransactionKind::Transaction),
            other => Err(AccountingError::InvalidCategoryType(other.to_string())),
        }
    }
}

/// Monetary amount tagged with a 3-letter currency code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub code: String,
    pub number: Decimal,
}

impl Amount {
    pub fn new(code: impl Into<String>, number: Decimal) -> Self {
        Self {
            code: code.into(),
            number,
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2} {}", self.number, self.code)
    }
}

/// Transaction extracted from a bank notification
#[derive(Debug, Clone)]
pub struct TransactionInfo {
    /// Delegate that parsed the notification
    pub bank: Arc<dyn BankDelegate>,

    /// When the transaction happened (the message date)
    pub date: DateTime<Utc>,

    /// Free-text action label, e.g. "compra" or "Retiro"
    pub action: String,

    /// Free-text place or counterpart description
    pub description: String,

    /// Bank-local account identifier, usually the last 4 digits
    pub account: String,

    pub amount: Amount,

    pub kind: TransactionKind,

    /// Id of the origin message, used only to archive it
    pub correlation_id: MessageId,

    /// Origin message, used to resolve the owning user from its recipients
    pub origin: Arc<Message>,
}

impl TransactionInfo {
    /// Amount as it must be registered: negative for expenses
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            TransactionKind::Expense => -self.amount.number,
            _ => self.amount.number,
        }
    }
}
