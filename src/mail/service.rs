//! Partitioned, concurrent message retrieval

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{parse_message, MailClientPool};
use crate::pipe::{self, send_or_done, Stream};
use crate::types::{MailError, Message, MessageId};

/// Mailbox-level operations used by the synchronizer
#[derive(Clone)]
pub struct MailService {
    pool: Arc<MailClientPool>,
}

impl MailService {
    pub fn new(pool: Arc<MailClientPool>) -> Self {
        Self { pool }
    }

    /// Names of every mailbox on the account
    ///
    /// Returns [`MailError::Cancelled`] when `done` fires first.
    pub async fn mailboxes(&self, done: &CancellationToken) -> Result<Vec<String>, MailError> {
        let pool = Arc::clone(&self.pool);

        detached(done, async move {
            let mut client = pool.get().await?;
            client.list_mailboxes().await
        })
        .await
    }

    /// Stream the messages of `mailbox` received on or after `since`
    ///
    /// The search runs once up front; the matching ids are then split into
    /// `min(cpu, ids)` buckets, each fetched by its own worker over its own
    /// connection. The merged stream carries one item per id: messages that
    /// fail to fetch or decode travel as `Err` items, and so does every id of
    /// a bucket whose worker cannot get a connection. Arrival order is not
    /// the mailbox order.
    ///
    /// # Errors
    ///
    /// Returns an error when the search itself fails, or
    /// [`MailError::Cancelled`] when `done` fires before it answers.
    pub async fn messages(
        &self,
        done: CancellationToken,
        mailbox: &str,
        since: DateTime<Utc>,
    ) -> Result<Stream<Result<Message, MailError>>, MailError> {
        let pool = Arc::clone(&self.pool);
        let searched = mailbox.to_string();
        let ids = detached(&done, async move {
            let mut client = pool.get().await?;
            client.search_since(&searched, since).await
        })
        .await?;

        let workers = pipe::worker_count(ids.len());
        debug!(mailbox, %since, found = ids.len(), workers, "searched mailbox");

        if workers == 0 {
            return Ok(pipe::closed());
        }

        let streams = pipe::partition(workers, ids)?
            .into_iter()
            .map(|bucket| self.fetch_bucket(done.clone(), mailbox.to_string(), bucket))
            .collect();

        Ok(pipe::fan_in(done, streams))
    }

    /// Move messages between mailboxes; a no-op for an empty id list
    pub async fn move_messages(
        &self,
        from: &str,
        to: &str,
        ids: &[MessageId],
    ) -> Result<(), MailError> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut client = self.pool.get().await?;
        client.move_messages(from, to, ids).await?;
        debug!(from, to, moved = ids.len(), "moved messages");

        Ok(())
    }

    fn fetch_bucket(
        &self,
        done: CancellationToken,
        mailbox: String,
        ids: Vec<MessageId>,
    ) -> Stream<Result<Message, MailError>> {
        let (tx, out) = mpsc::channel(1);
        let pool = Arc::clone(&self.pool);

        tokio::spawn(async move {
            // The connection stays checked out until the bucket is drained
            let mut client = match pool.get().await {
                Ok(client) => client,
                Err(e) => {
                    warn!(%mailbox, bucket = ids.len(), error = %e, "could not get mail client");
                    fail_bucket(&done, &tx, &ids, e).await;
                    return;
                }
            };

            let mut raws = match client.fetch(&mailbox, &ids).await {
                Ok(raws) => raws,
                Err(e) => {
                    warn!(%mailbox, bucket = ids.len(), error = %e, "fetch failed");
                    fail_bucket(&done, &tx, &ids, e).await;
                    return;
                }
            };

            loop {
                let next = tokio::select! {
                    biased;
                    _ = done.cancelled() => None,
                    next = raws.next() => next,
                };
                let Some(raw) = next else {
                    break;
                };

                let message = raw.and_then(|raw| parse_message(&raw));
                if let Err(e) = &message {
                    warn!(%mailbox, error = %e, "could not read message");
                }
                if !send_or_done(&done, &tx, message).await {
                    break;
                }
            }
        });

        out
    }
}

/// Report `error` once for every id of a bucket that could not be fetched
async fn fail_bucket(
    done: &CancellationToken,
    tx: &mpsc::Sender<Result<Message, MailError>>,
    ids: &[MessageId],
    error: MailError,
) {
    for _ in ids {
        if !send_or_done(done, tx, Err(error.clone())).await {
            break;
        }
    }
}

/// Run a mail call in the background and stop waiting for it when `done` fires
///
/// The call keeps its connection until it finishes; a call that never
/// finishes never hands a broken connection back to the pool.
async fn detached<T, F>(done: &CancellationToken, call: F) -> Result<T, MailError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, MailError>> + Send + 'static,
{
    match pipe::async_result(done.clone(), call).await {
        Ok(result) => result,
        Err(_) if done.is_cancelled() => Err(MailError::Cancelled),
        Err(_) => Err(MailError::client("mail call ended without a result")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::{MailClient, MailConnector, RawMessages};
    use crate::types::RawMessage;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;
    use tokio::time::Instant;

    /// Mailbox holding ids `1..=count`, shared by every connection
    #[derive(Default)]
    struct Mailbox {
        count: u32,
        search_delay: Duration,
        fetch_delay: Duration,
        barrier: Option<Barrier>,
        max_connections: Option<usize>,
        attempts: AtomicUsize,
    }

    fn eml(id: MessageId) -> Vec<u8> {
        format!(
            "From: bank@example.com\r\nTo: jane@example.com\r\nDate: Mon, 01 Jan 2024 10:00:00 +0000\r\nContent-Type: text/plain\r\n\r\nmessage {id}\r\n"
        )
        .into_bytes()
    }

    struct FakeClient(Arc<Mailbox>);

    #[async_trait]
    impl MailClient for FakeClient {
        async fn list_mailboxes(&mut self) -> Result<Vec<String>, MailError> {
            tokio::time::sleep(self.0.search_delay).await;
            Ok(vec!["INBOX".to_string()])
        }

        async fn search_since(
            &mut self,
            _mailbox: &str,
            _since: DateTime<Utc>,
        ) -> Result<Vec<MessageId>, MailError> {
            tokio::time::sleep(self.0.search_delay).await;
            Ok((1..=self.0.count).collect())
        }

        async fn fetch(&mut self, _mailbox: &str, ids: &[MessageId]) -> Result<RawMessages, MailError> {
            if let Some(barrier) = &self.0.barrier {
                barrier.wait().await;
            }
            tokio::time::sleep(self.0.fetch_delay).await;

            let raws: Vec<_> = ids
                .iter()
                .map(|&id| Ok(RawMessage { id, data: eml(id) }))
                .collect();
            Ok(Box::pin(futures::stream::iter(raws)))
        }

        async fn move_messages(
            &mut self,
            _from: &str,
            _to: &str,
            _ids: &[MessageId],
        ) -> Result<(), MailError> {
            Ok(())
        }
    }

    struct FakeConnector(Arc<Mailbox>);

    #[async_trait]
    impl MailConnector for FakeConnector {
        async fn connect(&self) -> Result<Box<dyn MailClient>, MailError> {
            let attempt = self.0.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.0.max_connections.is_some_and(|max| attempt > max) {
                return Err(MailError::client("too many connections"));
            }
            Ok(Box::new(FakeClient(Arc::clone(&self.0))))
        }
    }

    fn service(mailbox: &Arc<Mailbox>) -> MailService {
        MailService::new(MailClientPool::new(Arc::new(FakeConnector(Arc::clone(mailbox)))))
    }

    fn since() -> DateTime<Utc> {
        DateTime::from_timestamp(0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_messages_uses_one_connection_per_bucket() {
        let workers = pipe::worker_count(20);
        let mailbox = Arc::new(Mailbox {
            count: 20,
            barrier: Some(Barrier::new(workers)),
            ..Default::default()
        });
        let done = CancellationToken::new();

        let stream = service(&mailbox).messages(done.clone(), "INBOX", since()).await.unwrap();
        let messages = pipe::gather(&done, stream, |m| m.unwrap()).await;

        let ids: BTreeSet<_> = messages.iter().map(|m| m.id).collect();
        assert_eq!(messages.len(), 20);
        assert_eq!(ids, (1..=20).collect());
        // The search connection is reused by one of the buckets
        assert_eq!(mailbox.attempts.load(Ordering::SeqCst), workers);
    }

    #[tokio::test]
    async fn test_messages_without_matches_spawns_no_workers() {
        let mailbox = Arc::new(Mailbox::default());
        let done = CancellationToken::new();

        let stream = service(&mailbox).messages(done.clone(), "INBOX", since()).await.unwrap();

        assert!(pipe::gather(&done, stream, |m| m).await.is_empty());
        assert_eq!(mailbox.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_bucket_keeps_the_batch() {
        let workers = pipe::worker_count(20);
        let mailbox = Arc::new(Mailbox {
            count: 20,
            fetch_delay: Duration::from_secs(1),
            max_connections: Some(1),
            ..Default::default()
        });
        let done = CancellationToken::new();

        let stream = service(&mailbox).messages(done.clone(), "INBOX", since()).await.unwrap();
        let results = pipe::gather(&done, stream, |m| m).await;

        let fetched = results.iter().filter(|r| r.is_ok()).count();
        let failed: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();

        assert_eq!(results.len(), 20);
        assert!(fetched > 0);
        assert_eq!(failed.is_empty(), workers == 1);
        assert!(failed
            .iter()
            .all(|e| matches!(e, MailError::ClientUnavailable(_))));
    }

    #[tokio::test]
    async fn test_unreachable_bucket_fails_every_id() {
        let mailbox = Arc::new(Mailbox {
            max_connections: Some(0),
            ..Default::default()
        });
        let done = CancellationToken::new();

        let stream = service(&mailbox).fetch_bucket(done.clone(), "INBOX".to_string(), vec![4, 8, 12]);
        let results = pipe::gather(&done, stream, |m| m).await;

        assert_eq!(results.len(), 3);
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(MailError::ClientUnavailable(_)))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_search_stops_at_cancel() {
        let mailbox = Arc::new(Mailbox {
            count: 3,
            search_delay: Duration::from_secs(3600),
            ..Default::default()
        });
        let done = CancellationToken::new();
        let canceller = done.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            canceller.cancel();
        });
        let started = Instant::now();

        let err = service(&mailbox)
            .messages(done, "INBOX", since())
            .await
            .err()
            .unwrap();

        assert_eq!(err, MailError::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_listing_stops_at_cancel() {
        let mailbox = Arc::new(Mailbox {
            search_delay: Duration::from_secs(3600),
            ..Default::default()
        });
        let done = CancellationToken::new();
        let canceller = done.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            canceller.cancel();
        });
        let started = Instant::now();

        assert_eq!(
            service(&mailbox).mailboxes(&done).await,
            Err(MailError::Cancelled)
        );
        assert!(started.elapsed() < Duration::from_secs(11));
    }

    #[tokio::test]
    async fn test_mailboxes() {
        let mailbox = Arc::new(Mailbox::default());
        let done = CancellationToken::new();

        assert_eq!(service(&mailbox).mailboxes(&done).await.unwrap(), vec!["INBOX"]);
    }
}
