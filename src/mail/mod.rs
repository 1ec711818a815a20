//! Mail retrieval service
//!
//! Wraps a mailbox protocol client behind the [`MailClient`] trait and turns
//! a mailbox search into a stream of decoded [`Message`]s.
//!
//! # Design
//!
//! A protocol connection serves one command at a time, so concurrency comes
//! from holding several connections. [`MailClientPool`] hands out exclusive
//! [`PooledClient`] guards and takes the connection back when the guard is
//! dropped. A fetch splits the matching ids across `min(cpu, ids)` workers,
//! each with its own connection, and merges their outputs.
//!
//! # Architecture
//!
//! ```text
//! MailService
//!     └── Arc<MailClientPool>
//!             ├── Arc<dyn MailConnector>      (opens new connections)
//!             └── Mutex<Vec<Box<dyn MailClient>>>  (idle connections)
//! ```
//!
//! [`Message`]: crate::types::Message

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::types::{MailError, MessageId, RawMessage};

pub mod parse;
pub mod service;

pub use parse::parse_message;
pub use service::MailService;

/// Raw messages as they come off the wire
pub type RawMessages = BoxStream<'static, Result<RawMessage, MailError>>;

/// A single connection to a mail server
///
/// Every mailbox operation names its mailbox; selecting it (read-only for
/// searches and fetches) is the implementation's business.
#[async_trait]
pub trait MailClient: Send {
    /// Names of every mailbox on the account
    async fn list_mailboxes(&mut self) -> Result<Vec<String>, MailError>;

    /// Ids of the messages in `mailbox` received on or after `since`
    async fn search_since(
        &mut self,
        mailbox: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MessageId>, MailError>;

    /// Full RFC 822 content of the given messages
    ///
    /// Individual messages may fail without ending the stream.
    async fn fetch(&mut self, mailbox: &str, ids: &[MessageId]) -> Result<RawMessages, MailError>;

    /// Move messages from one mailbox to another
    async fn move_messages(
        &mut self,
        from: &str,
        to: &str,
        ids: &[MessageId],
    ) -> Result<(), MailError>;
}

/// Opens new connections for the pool
#[async_trait]
pub trait MailConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn MailClient>, MailError>;
}

/// Reusable set of mail connections
///
/// Connections are opened lazily and kept after use, so the pool grows to
/// the highest concurrency the run reached.
pub struct MailClientPool {
    connector: Arc<dyn MailConnector>,
    idle: Mutex<Vec<Box<dyn MailClient>>>,
}

impl MailClientPool {
    pub fn new(connector: Arc<dyn MailConnector>) -> Arc<Self> {
        Arc::new(Self {
            connector,
            idle: Mutex::new(Vec::new()),
        })
    }

    /// Take an idle connection or open a new one
    ///
    /// # Errors
    ///
    /// Returns [`MailError::ClientUnavailable`] when a new connection cannot
    /// be opened.
    pub async fn get(self: &Arc<Self>) -> Result<PooledClient, MailError> {
        let reused = self.idle.lock().ok().and_then(|mut idle| idle.pop());

        let client = match reused {
            Some(client) => client,
            None => self
                .connector
                .connect()
                .await
                .map_err(|e| MailError::ClientUnavailable(e.to_string()))?,
        };

        Ok(PooledClient {
            client,
            pool: Arc::clone(self),
        })
    }

    /// Number of connections waiting to be reused
    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    fn release(&self, client: Box<dyn MailClient>) {
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(client);
        }
    }
}

/// Exclusive use of a pooled connection; returned to the pool on drop
pub struct PooledClient {
    client: Box<dyn MailClient>,
    pool: Arc<MailClientPool>,
}

impl Deref for PooledClient {
    type Target = dyn MailClient;

    fn deref(&self) -> &Self::Target {
        &*self.client
    }
}

impl DerefMut for PooledClient {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.client
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        let client = std::mem::replace(&mut self.client, Box::new(Released));
        self.pool.release(client);
    }
}

/// Stand-in left behind once a pooled connection went back to the pool
struct Released;

#[async_trait]
impl MailClient for Released {
    async fn list_mailboxes(&mut self) -> Result<Vec<String>, MailError> {
        Err(MailError::client("connection already released"))
    }

    async fn search_since(
        &mut self,
        _mailbox: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<MessageId>, MailError> {
        Err(MailError::client("connection already released"))
    }

    async fn fetch(&mut self, _mailbox: &str, _ids: &[MessageId]) -> Result<RawMessages, MailError> {
        Err(MailError::client("connection already released"))
    }

    async fn move_messages(
        &mut self,
        _from: &str,
        _to: &str,
        _ids: &[MessageId],
    ) -> Result<(), MailError> {
        Err(MailError::client("connection already released"))
    }
}
