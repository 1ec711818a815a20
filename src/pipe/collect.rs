//! Background computations and stream draining

use std::future::Future;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::{recv_or_done, Stream};

/// Run `future` in the background and deliver its output on a single-value channel
///
/// If `done` fires first the output is discarded and the receiver reports
/// a closed channel. The computation itself is detached rather than
/// aborted, so an in-flight call still runs to completion.
pub fn async_result<T, Fut>(done: CancellationToken, future: Fut) -> oneshot::Receiver<T>
where
    T: Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let handle = tokio::spawn(future);

    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = done.cancelled() => {}
            joined = handle => match joined {
                Ok(value) => {
                    let _ = tx.send(value);
                }
                Err(e) => tracing::error!(error = %e, "background computation panicked"),
            },
        }
    });

    rx
}

/// Drain `input` into memory, applying `mapper` to every item
///
/// Stops at the end of the stream or when `done` fires, returning whatever
/// was gathered so far.
pub async fn gather<T, U, F>(done: &CancellationToken, mut input: Stream<T>, mut mapper: F) -> Vec<U>
where
    F: FnMut(T) -> U,
{
    let mut gathered = Vec::new();

    while let Some(value) = recv_or_done(done, &mut input).await {
        gathered.push(mapper(value));
    }

    gathered
}
