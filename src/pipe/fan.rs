//! Stream duplication and merging

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{recv_or_done, send_or_done, Stream};

/// Duplicate every item of `input` into two streams
///
/// Each item is offered to both branches with a fair select, so whichever
/// consumer is ready gets it first, but the next item is only read once
/// both branches have taken the current one. A slow branch therefore
/// throttles the whole upstream. A branch whose receiver is dropped counts
/// as delivered.
pub fn tee<T>(done: CancellationToken, mut input: Stream<T>) -> (Stream<T>, Stream<T>)
where
    T: Clone + Send + 'static,
{
    let (first_tx, first) = mpsc::channel(1);
    let (second_tx, second) = mpsc::channel(1);

    tokio::spawn(async move {
        while let Some(value) = recv_or_done(&done, &mut input).await {
            let mut first_pending = true;
            let mut second_pending = true;

            while first_pending || second_pending {
                tokio::select! {
                    _ = done.cancelled() => return,
                    _ = first_tx.send(value.clone()), if first_pending => first_pending = false,
                    _ = second_tx.send(value.clone()), if second_pending => second_pending = false,
                }
            }
        }
    });

    (first, second)
}

/// Merge several streams into one
///
/// Items keep their relative order per input but are interleaved across
/// inputs. The output closes when every input is closed or `done` fires.
pub fn fan_in<T>(done: CancellationToken, inputs: Vec<Stream<T>>) -> Stream<T>
where
    T: Send + 'static,
{
    let (tx, out) = mpsc::channel(inputs.len().max(1));

    for mut input in inputs {
        let done = done.clone();
        let tx = tx.clone();

        tokio::spawn(async move {
            while let Some(value) = recv_or_done(&done, &mut input).await {
                if !send_or_done(&done, &tx, value).await {
                    break;
                }
            }
        });
    }

    out
}
