// ── Async stream primitives ──
//
// Fair merging, cooperative cancellation, and event→stream adaptation.
// Every long-running loop in the workspace is assembled from these.

mod abort;
mod event;
mod merge;
mod signal;

use futures_util::stream::BoxStream;

pub use abort::{Abortable, abortable};
pub use event::{Lagged, from_events};
pub use merge::{Merge, merge, try_merge};
pub use signal::merge_signals;

/// Owned, sendable, type-erased stream used across the workspace.
pub type Boxed<T> = BoxStream<'static, T>;
