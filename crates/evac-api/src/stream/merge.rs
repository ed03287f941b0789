// ── Fair stream merge ──
//
// Round-robin over a fixed set of pending sources. A source that just
// produced an item is moved behind every other live source, so a fast
// source can never re-enter the race ahead of a slow one that has been
// waiting longer.

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_core::stream::FusedStream;
use futures_util::StreamExt;

use super::Boxed;

/// A fair merge of N independently-paced streams.
///
/// Created by [`merge`] or [`try_merge`]. Dropping the merge drops every
/// source that is still live, exactly once; exhausted or failed sources are
/// dropped as soon as they finish.
pub struct Merge<T> {
    sources: VecDeque<Boxed<T>>,
    /// Items for which the producing source is retired after delivery.
    terminal: Option<fn(&T) -> bool>,
}

/// Merge `sources` into one stream that yields items in round-robin order.
pub fn merge<T, I>(sources: I) -> Merge<T>
where
    I: IntoIterator<Item = Boxed<T>>,
{
    Merge {
        sources: sources.into_iter().collect(),
        terminal: None,
    }
}

/// Like [`merge`], but a source that yields `Err` has the error delivered to
/// the consumer and is then dropped, while the remaining sources continue.
pub fn try_merge<T, E, I>(sources: I) -> Merge<Result<T, E>>
where
    I: IntoIterator<Item = Boxed<Result<T, E>>>,
{
    Merge {
        sources: sources.into_iter().collect(),
        terminal: Some(Result::is_err),
    }
}

impl<T> Merge<T> {
    /// Number of sources that have not finished yet.
    pub fn live(&self) -> usize {
        self.sources.len()
    }
}

impl<T> Stream for Merge<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = &mut *self;
        let mut index = 0;

        while let Some(source) = this.sources.get_mut(index) {
            match source.poll_next_unpin(cx) {
                Poll::Ready(Some(item)) => {
                    if let Some(source) = this.sources.remove(index) {
                        let retire = this.terminal.is_some_and(|is_terminal| is_terminal(&item));
                        if !retire {
                            this.sources.push_back(source);
                        }
                    }
                    return Poll::Ready(Some(item));
                }
                Poll::Ready(None) => {
                    // Exhausted: drop it and look at whatever slid into this slot.
                    this.sources.remove(index);
                }
                Poll::Pending => index += 1,
            }
        }

        if this.sources.is_empty() {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }
}

impl<T> FusedStream for Merge<T> {
    fn is_terminated(&self) -> bool {
        self.sources.is_empty()
    }
}

impl<T> fmt::Debug for Merge<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Merge")
            .field("live", &self.sources.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::stream;
    use pretty_assertions::assert_eq;

    use super::*;

    /// Counts drops of the stream that owns it.
    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counted<S>(inner: S, drops: &Arc<AtomicUsize>) -> Boxed<S::Item>
    where
        S: Stream + Send + 'static,
    {
        let counter = DropCounter(Arc::clone(drops));
        inner
            .map(move |item| {
                let _ = &counter;
                item
            })
            .boxed()
    }

    #[tokio::test]
    async fn slow_source_is_not_starved() {
        let pulls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&pulls);
        let fast = stream::iter(["a1", "a2", "a3", "a4", "a5"])
            .inspect(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .boxed();

        let gate = Arc::clone(&pulls);
        let mut sent = false;
        let slow = stream::poll_fn(move |_cx| {
            if sent {
                Poll::Ready(None)
            } else if gate.load(Ordering::SeqCst) >= 3 {
                sent = true;
                Poll::Ready(Some("b1"))
            } else {
                Poll::Pending
            }
        })
        .boxed();

        let merged: Vec<_> = merge([fast, slow]).collect().await;
        assert_eq!(merged, vec!["a1", "a2", "a3", "b1", "a4", "a5"]);
    }

    #[tokio::test]
    async fn alternates_between_ready_sources() {
        let left = stream::iter([1, 3, 5]).boxed();
        let right = stream::iter([2, 4, 6]).boxed();
        let merged: Vec<_> = merge([left, right]).collect().await;
        assert_eq!(merged, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn early_break_releases_every_live_source_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let sources = vec![
            counted(stream::iter([1, 2, 3]), &drops),
            counted(stream::pending::<i32>(), &drops),
            counted(stream::pending::<i32>(), &drops),
        ];

        let mut merged = merge(sources);
        assert_eq!(merged.next().await, Some(1));
        assert_eq!(merged.live(), 3);
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(merged);
        assert_eq!(drops.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_sources_are_dropped_immediately() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut merged = merge(vec![
            counted(stream::iter([1]), &drops),
            counted(stream::iter([2, 3]), &drops),
        ]);

        assert_eq!(merged.next().await, Some(1));
        assert_eq!(merged.next().await, Some(2));
        assert_eq!(merged.next().await, Some(3));
        // First source finished while we were waiting for its second item.
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(merged.next().await, None);
        assert!(merged.is_terminated());
        assert_eq!(drops.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn try_merge_surfaces_error_and_retires_source() {
        let failing = stream::iter([Ok(1), Err("boom"), Ok(99)]).boxed();
        let healthy = stream::iter([Ok(2), Ok(4)]).boxed();

        let merged: Vec<Result<i32, &str>> = try_merge([failing, healthy]).collect().await;
        assert_eq!(merged, vec![Ok(1), Ok(2), Err("boom"), Ok(4)]);
    }
}
