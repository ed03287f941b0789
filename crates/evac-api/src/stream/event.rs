use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use super::Boxed;

/// The receiver fell behind and `0` events were discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event receiver lagged, {0} events skipped")]
pub struct Lagged(pub u64);

/// Turn a broadcast receiver into a pull-based stream.
///
/// Each pull races the next event against `signal`; cancellation wins ties
/// and ends the stream. The stream also ends when every sender is gone.
/// Overflow is surfaced as `Err(Lagged)` so the consumer can resync.
pub fn from_events<T>(
    mut rx: broadcast::Receiver<T>,
    signal: Option<CancellationToken>,
) -> Boxed<Result<T, Lagged>>
where
    T: Clone + Send + 'static,
{
    let signal = signal.unwrap_or_default();
    Box::pin(async_stream::stream! {
        loop {
            let received = tokio::select! {
                biased;
                () = signal.cancelled() => None,
                r = rx.recv() => Some(r),
            };
            match received {
                None | Some(Err(RecvError::Closed)) => break,
                Some(Ok(event)) => yield Ok(event),
                Some(Err(RecvError::Lagged(n))) => yield Err(Lagged(n)),
            }
        }
    })
}
