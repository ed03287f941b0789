//! Wire layer for the EVAC operator protocol.
//!
//! - **[`Connection`]**: owns one WebSocket at a time, re-dials with
//!   exponential backoff after abnormal closes, broadcasts
//!   [`ConnectionEvent`]s and exposes inbound frames as a pull-based stream.
//!
//! - **[`stream`]**: the concurrency primitives the rest of the workspace is
//!   built from: a fair, promptly-teardownable [`merge`](stream::merge),
//!   cooperative [`abortable`](stream::abortable) wrapping,
//!   [`merge_signals`](stream::merge_signals), and the event→stream adapter
//!   [`from_events`](stream::from_events).

pub mod connection;
pub mod endpoint;
pub mod error;
pub mod stream;

pub use connection::{
    CloseInfo, Connection, ConnectionEvent, ConnectionOptions, DisposeGuard, ErrorKind, Frame,
    FrameStream, Outbound, Parser, ReadyState, RetryConfig,
};
pub use endpoint::{OPERATOR_PATH, websocket_url};
pub use error::Error;
