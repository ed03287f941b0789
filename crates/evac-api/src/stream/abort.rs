use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_core::stream::FusedStream;
use futures_util::StreamExt;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use super::Boxed;

/// A stream that ends as soon as any of its cancellation tokens fires.
///
/// Each pull checks the tokens first, so an already-cancelled wrapper never
/// touches the inner stream. Cancellation that arrives while the inner
/// stream is pending wakes the consumer immediately. The inner stream is
/// released exactly once: on cancellation, on exhaustion, or on drop.
pub struct Abortable<T> {
    inner: Option<Boxed<T>>,
    signals: Vec<CancellationToken>,
    waiters: Vec<Pin<Box<WaitForCancellationFutureOwned>>>,
}

/// Wrap `stream` so it completes when any of `signals` is cancelled.
pub fn abortable<S>(
    stream: S,
    signals: impl IntoIterator<Item = CancellationToken>,
) -> Abortable<S::Item>
where
    S: Stream + Send + 'static,
{
    let signals: Vec<_> = signals.into_iter().collect();
    let waiters = signals
        .iter()
        .map(|token| Box::pin(token.clone().cancelled_owned()))
        .collect();
    Abortable {
        inner: Some(stream.boxed()),
        signals,
        waiters,
    }
}

impl<T> Abortable<T> {
    /// Whether any of the tokens has been cancelled.
    pub fn is_aborted(&self) -> bool {
        self.signals.iter().any(CancellationToken::is_cancelled)
    }

    fn release(&mut self) {
        self.inner = None;
        self.waiters.clear();
    }
}

impl<T> Stream for Abortable<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = &mut *self;
        if this.inner.is_none() {
            return Poll::Ready(None);
        }
        if this.is_aborted() {
            this.release();
            return Poll::Ready(None);
        }

        // Register for cancellation before parking on the inner stream.
        if this
            .waiters
            .iter_mut()
            .any(|waiter| waiter.as_mut().poll(cx).is_ready())
        {
            this.release();
            return Poll::Ready(None);
        }

        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match inner.poll_next_unpin(cx) {
            Poll::Ready(None) => {
                this.release();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl<T> FusedStream for Abortable<T> {
    fn is_terminated(&self) -> bool {
        self.inner.is_none()
    }
}

impl<T> fmt::Debug for Abortable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Abortable")
            .field("released", &self.inner.is_none())
            .field("aborted", &self.is_aborted())
            .finish_non_exhaustive()
    }
}
