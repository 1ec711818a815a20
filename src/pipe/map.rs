//! Item transforms: sequential and pooled

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::{recv_or_done, send_or_done, Stream};

/// Transform every item of `input` in order on a single task
///
/// The output closes when `input` closes or `done` fires. The mapper
/// usually returns a `Result` so failures travel downstream as items.
pub fn map<A, B, F>(done: CancellationToken, mut input: Stream<A>, mut mapper: F) -> Stream<B>
where
    A: Send + 'static,
    B: Send + 'static,
    F: FnMut(A) -> B + Send + 'static,
{
    let (tx, out) = mpsc::channel(1);

    tokio::spawn(async move {
        while let Some(value) = recv_or_done(&done, &mut input).await {
            if !send_or_done(&done, &tx, mapper(value)).await {
                break;
            }
        }
    });

    out
}

/// Keep the items of `input` for which `predicate` holds, in order
pub fn filter<T, F>(done: CancellationToken, mut input: Stream<T>, mut predicate: F) -> Stream<T>
where
    T: Send + 'static,
    F: FnMut(&T) -> bool + Send + 'static,
{
    let (tx, out) = mpsc::channel(1);

    tokio::spawn(async move {
        while let Some(value) = recv_or_done(&done, &mut input).await {
            if predicate(&value) && !send_or_done(&done, &tx, value).await {
                break;
            }
        }
    });

    out
}

/// Transform items of `input` on a pool of `workers` tasks
///
/// All workers pull from the shared input and push into a shared output
/// buffered to `workers` items, so outputs come in completion order, not
/// input order. A request for zero workers runs one. The output closes once
/// every worker has finished; when `done` fires, in-flight mappings still
/// complete but their result is only delivered if the send wins the race.
pub fn concurrent_map<A, B, F, Fut>(
    done: CancellationToken,
    workers: usize,
    input: Stream<A>,
    mapper: F,
) -> Stream<B>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = B> + Send + 'static,
{
    let workers = workers.max(1);
    let (tx, out) = mpsc::channel(workers);

    let input = Arc::new(Mutex::new(input));
    let mapper = Arc::new(mapper);

    for _ in 0..workers {
        let done = done.clone();
        let tx = tx.clone();
        let input = Arc::clone(&input);
        let mapper = Arc::clone(&mapper);

        tokio::spawn(async move {
            loop {
                let next = {
                    let mut input = input.lock().await;
                    recv_or_done(&done, &mut input).await
                };
                let Some(value) = next else {
                    break;
                };

                let result = mapper(value).await;
                if !send_or_done(&done, &tx, result).await {
                    break;
                }
            }
        });
    }

    out
}
