//! Partitioning of `Result` streams

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{recv_or_done, send_or_done, Stream};

/// Forward the `Ok` values of `input` and hand every `Err` to `handler`
///
/// Each error is handled on its own spawned task: handlers are neither
/// ordered nor awaited, so use [`only_on_error`] when the errors must be
/// collected before moving on.
pub fn on_error<T, E, H>(done: CancellationToken, mut input: Stream<Result<T, E>>, handler: H) -> Stream<T>
where
    T: Send + 'static,
    E: Send + 'static,
    H: Fn(E) + Send + Sync + 'static,
{
    let (tx, out) = mpsc::channel(1);
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        while let Some(item) = recv_or_done(&done, &mut input).await {
            match item {
                Ok(value) => {
                    if !send_or_done(&done, &tx, value).await {
                        break;
                    }
                }
                Err(error) => {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move { handler(error) });
                }
            }
        }
    });

    out
}

/// Forward the `Ok` values of `input`, dropping errors
pub fn ignore_on_error<T, E>(done: CancellationToken, input: Stream<Result<T, E>>) -> Stream<T>
where
    T: Send + 'static,
    E: Send + 'static,
{
    on_error(done, input, |_: E| {})
}

/// Forward the `Err` values of `input`, dropping successes
pub fn only_on_error<T, E>(done: CancellationToken, mut input: Stream<Result<T, E>>) -> Stream<E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let (tx, out) = mpsc::channel(1);

    tokio::spawn(async move {
        while let Some(item) = recv_or_done(&done, &mut input).await {
            if let Err(error) = item {
                if !send_or_done(&done, &tx, error).await {
                    break;
                }
            }
        }
    });

    out
}
