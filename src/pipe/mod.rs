//! Stream combinator library
//!
//! Composable concurrency primitives over bounded `tokio` channels. Every
//! stage is a spawned task reading from a [`Stream`] and writing to a new
//! one, and every suspension point also waits on a shared cancellation
//! token (`done`) so a pipeline unwinds as soon as the token fires.
//!
//! # Combinators
//!
//! - [`map`] / [`concurrent_map`]: transform items, sequentially or with a worker pool
//! - [`filter`]: drop items failing a predicate
//! - [`tee`] / [`fan_in`]: duplicate one stream, merge many
//! - [`on_error`] / [`ignore_on_error`] / [`only_on_error`]: partition `Result` streams
//! - [`async_result`] / [`gather`]: run a background computation, drain a stream
//!
//! # Ordering
//!
//! `map`, `filter`, `tee` and the error partitions preserve input order. `concurrent_map`
//! and `fan_in` do not: any idle worker may claim the next item.
//!
//! # Failure Semantics
//!
//! Nothing here retries. Errors travel as `Err` items and are only routed
//! to handlers or dropped.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod collect;
mod fan;
mod map;
mod route;
mod split;

pub use collect::{async_result, gather};
pub use fan::{fan_in, tee};
pub use map::{concurrent_map, filter, map};
pub use route::{ignore_on_error, on_error, only_on_error};
pub use split::{partition, worker_count};

/// Readable end of a pipeline stage
pub type Stream<T> = mpsc::Receiver<T>;

/// Receive the next item unless `done` fires first
///
/// Returns `None` when the token is cancelled or the stream is closed.
pub async fn recv_or_done<T>(done: &CancellationToken, input: &mut Stream<T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = done.cancelled() => None,
        value = input.recv() => value,
    }
}

/// Send an item unless `done` fires first
///
/// Returns `false` when the item was dropped, either because the token was
/// cancelled or because the receiving side is gone.
pub async fn send_or_done<T>(done: &CancellationToken, output: &mpsc::Sender<T>, value: T) -> bool {
    tokio::select! {
        biased;
        _ = done.cancelled() => false,
        sent = output.send(value) => sent.is_ok(),
    }
}

/// Forward `input` until it closes or `done` fires
pub fn or_done<T>(done: CancellationToken, mut input: Stream<T>) -> Stream<T>
where
    T: Send + 'static,
{
    let (tx, out) = mpsc::channel(1);

    tokio::spawn(async move {
        while let Some(value) = recv_or_done(&done, &mut input).await {
            if !send_or_done(&done, &tx, value).await {
                break;
            }
        }
    });

    out
}

/// Consume `input` until it closes or `done` fires, discarding every item
pub async fn wait_closed<T>(done: &CancellationToken, mut input: Stream<T>) {
    while recv_or_done(done, &mut input).await.is_some() {}
}

/// Feed the items of an iterator into a new stream
pub fn from_iter<I>(done: CancellationToken, items: I) -> Stream<I::Item>
where
    I: IntoIterator + Send + 'static,
    I::IntoIter: Send,
    I::Item: Send + 'static,
{
    let (tx, out) = mpsc::channel(1);

    tokio::spawn(async move {
        for value in items {
            if !send_or_done(&done, &tx, value).await {
                break;
            }
        }
    });

    out
}

/// A stream that is already closed
pub fn closed<T>() -> Stream<T> {
    let (_, out) = mpsc::channel(1);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_iter_then_gather_keeps_order() {
        let done = CancellationToken::new();
        let stream = from_iter(done.clone(), vec![1, 2, 3]);

        let values = gather(&done, stream, |v| v).await;
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_closed_stream_yields_nothing() {
        let done = CancellationToken::new();
        let mut stream = closed::<u32>();

        assert_eq!(recv_or_done(&done, &mut stream).await, None);
    }

    #[tokio::test]
    async fn test_or_done_stops_on_cancel() {
        let done = CancellationToken::new();
        let (tx, rx) = mpsc::channel::<u32>(1);
        let mut out = or_done(done.clone(), rx);

        tx.send(1).await.unwrap();
        assert_eq!(out.recv().await, Some(1));

        done.cancel();
        // the sender is still open, only cancellation can close the output
        assert_eq!(out.recv().await, None);
    }

    #[tokio::test]
    async fn test_wait_closed_drains_stream() {
        let done = CancellationToken::new();
        let stream = from_iter(done.clone(), 0..100);

        wait_closed(&done, stream).await;
    }
}
