//! Notification email as fetched from the mailbox

use chrono::{DateTime, Utc};

/// Message sequence identifier inside a mailbox
pub type MessageId = u32;

/// A fetched notification email
///
/// Immutable once fetched. The body is the first inline text part of the
/// MIME structure, already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sequence id used to move the message between mailboxes
    pub id: MessageId,

    /// Sender addresses (`From:`)
    pub from: Vec<String>,

    /// Recipient addresses (`To:`), in header order
    pub to: Vec<String>,

    pub subject: String,

    /// Date the message was sent
    pub date: DateTime<Utc>,

    /// Decoded text of the first inline part
    pub body: String,
}

/// Undecoded RFC 822 message as returned by a mail client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub id: MessageId,
    pub data: Vec<u8>,
}
