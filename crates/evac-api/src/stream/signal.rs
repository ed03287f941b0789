use futures_util::future::select_all;
use tokio_util::sync::CancellationToken;

/// Combine cancellation tokens into one that fires when any input fires.
///
/// A single input is returned as-is. If any input is already cancelled the
/// result is cancelled before this returns. Otherwise a small watcher task
/// is spawned that cancels the result on the first input to fire; the
/// watcher also exits if the result itself is cancelled. An empty input
/// yields a fresh token that only its holder can cancel.
///
/// Must be called from within a Tokio runtime when more than one live
/// token is passed.
pub fn merge_signals<I>(signals: I) -> CancellationToken
where
    I: IntoIterator<Item = CancellationToken>,
{
    let mut signals: Vec<CancellationToken> = signals.into_iter().collect();

    if signals.len() == 1 {
        if let Some(only) = signals.pop() {
            return only;
        }
    }

    let merged = CancellationToken::new();
    if signals.is_empty() {
        return merged;
    }
    if signals.iter().any(CancellationToken::is_cancelled) {
        merged.cancel();
        return merged;
    }

    let target = merged.clone();
    tokio::spawn(async move {
        let waits = signals
            .into_iter()
            .map(|token| Box::pin(token.cancelled_owned()));
        tokio::select! {
            _ = select_all(waits) => target.cancel(),
            () = target.cancelled() => {}
        }
    });
    merged
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn single_input_is_returned_unchanged() {
        let only = CancellationToken::new();
        let merged = merge_signals([only.clone()]);
        only.cancel();
        assert!(merged.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_input_cancels_immediately() {
        let live = CancellationToken::new();
        let dead = CancellationToken::new();
        dead.cancel();

        let merged = merge_signals([live.clone(), dead]);
        assert!(merged.is_cancelled());
        assert!(!live.is_cancelled());
    }

    #[tokio::test]
    async fn fires_when_any_input_fires() {
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        let merged = merge_signals([a.clone(), b.clone()]);
        assert!(!merged.is_cancelled());

        b.cancel();
        tokio::time::timeout(Duration::from_secs(2), merged.cancelled())
            .await
            .unwrap_or_else(|_| panic!("merged token never fired"));
        assert!(!a.is_cancelled());
    }

    #[tokio::test]
    async fn cancelling_merged_does_not_touch_inputs() {
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        let merged = merge_signals([a.clone(), b.clone()]);
        merged.cancel();
        tokio::task::yield_now().await;
        assert!(!a.is_cancelled());
        assert!(!b.is_cancelled());
    }
}
