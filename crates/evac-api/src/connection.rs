//! WebSocket connection with reconnect-on-abnormal-close.
//!
//! A [`Connection`] owns at most one live socket. A background task dials,
//! reads frames, writes queued outbound messages and, after an abnormal
//! close, re-dials with exponential backoff until the retry budget is spent.
//! Everything that happens is broadcast as a [`ConnectionEvent`]; inbound
//! frames are also exposed as a pull-based stream via
//! [`messages`](Connection::messages).
//!
//! # Example
//!
//! ```rust,ignore
//! use evac_api::{Connection, ConnectionOptions};
//! use futures_util::StreamExt;
//!
//! let url = url::Url::parse("ws://127.0.0.1:3030/api/operator")?;
//! let connection = Connection::connect(url, ConnectionOptions::default(), None);
//! connection.opened().await?;
//!
//! let mut frames = connection.messages();
//! while let Some(Ok(frame)) = frames.next().await {
//!     println!("{frame}");
//! }
//! connection.dispose();
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::stream::{Boxed, Lagged, from_events};

// ── Constants ────────────────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Close code for a deliberate, orderly shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code reported when the socket dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code reported when a close frame carried no status.
pub const NO_STATUS: u16 = 1005;

const DISPOSED_REASON: &str = "Connection disposed";

// ── Public types ─────────────────────────────────────────────────────

/// A parsed inbound frame. Shared between every subscriber.
pub type Frame = Arc<Value>;

/// Stream of inbound frames as produced by [`Connection::messages`].
pub type FrameStream = Boxed<Result<Frame, Error>>;

/// Turns a raw payload (text or binary) into a frame.
pub type Parser = Arc<dyn Fn(&[u8]) -> Result<Value, String> + Send + Sync>;

/// Retry budget for abnormal closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Reconnect attempts before giving up. Reset on every successful open.
    pub count: u32,
    /// Base delay; attempt `n` waits `delay × 2^(n−1)`.
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            count: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryConfig {
    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.delay.saturating_mul(1_u32 << exponent)
    }
}

/// Construction options for [`Connection::connect`].
#[derive(Clone)]
pub struct ConnectionOptions {
    /// Payload parser. `None` means JSON.
    pub parser: Option<Parser>,
    /// Whether abnormal closes trigger a reconnect.
    pub reconnect: bool,
    pub retry: RetryConfig,
    /// Frame written immediately after every successful open, before the
    /// `Open` event is emitted.
    pub handshake: Option<Value>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            parser: None,
            reconnect: true,
            retry: RetryConfig::default(),
            handshake: None,
        }
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("parser", &self.parser.as_ref().map(|_| "custom"))
            .field("reconnect", &self.reconnect)
            .field("retry", &self.retry)
            .field("handshake", &self.handshake.is_some())
            .finish()
    }
}

/// Socket lifecycle, mirroring the browser `readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Distinguishes a bad frame from a broken socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    Transport,
}

/// Status carried by a close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: ABNORMAL_CLOSURE,
            reason: reason.into(),
        }
    }

    fn disposed() -> Self {
        Self {
            code: NORMAL_CLOSURE,
            reason: DISPOSED_REASON.to_owned(),
        }
    }

    pub fn is_normal(&self) -> bool {
        self.code == NORMAL_CLOSURE
    }
}

impl From<Option<CloseFrame>> for CloseInfo {
    fn from(frame: Option<CloseFrame>) -> Self {
        match frame {
            Some(frame) => Self {
                code: u16::from(frame.code),
                reason: frame.reason.to_string(),
            },
            None => Self {
                code: NO_STATUS,
                reason: String::new(),
            },
        }
    }
}

/// Everything observable about a connection.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Open,
    Message(Frame),
    Error { kind: ErrorKind, message: String },
    Close(CloseInfo),
    Retry {
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
    },
    /// Retry budget exhausted. Terminal for this connection.
    Failed { attempts: u32 },
}

/// An outbound payload. Strings and binary go out as-is, JSON values are
/// encoded to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Binary(Bytes),
}

impl Outbound {
    /// Encode any serializable value as a JSON text frame.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, Error> {
        Ok(Self::Text(serde_json::to_string(value)?))
    }

    fn into_message(self) -> Message {
        match self {
            Self::Text(text) => Message::text(text),
            Self::Binary(data) => Message::binary(data),
        }
    }
}

impl From<String> for Outbound {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Outbound {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Bytes> for Outbound {
    fn from(data: Bytes) -> Self {
        Self::Binary(data)
    }
}

impl From<Vec<u8>> for Outbound {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(data))
    }
}

impl From<Value> for Outbound {
    fn from(value: Value) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<&Value> for Outbound {
    fn from(value: &Value) -> Self {
        Self::Text(value.to_string())
    }
}

// ── Connection ───────────────────────────────────────────────────────

/// State shared between handles and the socket task.
struct Shared {
    url: Url,
    events: broadcast::Sender<ConnectionEvent>,
    state: watch::Sender<ReadyState>,
    /// Cancelled once the socket task has exited for good.
    terminated: CancellationToken,
}

impl Shared {
    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: ReadyState) {
        self.state.send_replace(state);
    }
}

/// Handle to one logical connection. Cheap to clone.
///
/// Disposal happens on [`dispose`](Self::dispose), when the signal passed
/// to [`connect`](Self::connect) is cancelled, or when the last handle is
/// dropped.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
}

impl Connection {
    /// Spawn the socket task and return immediately.
    ///
    /// The first dial happens asynchronously; use [`opened`](Self::opened)
    /// or [`subscribe`](Self::subscribe) to follow progress. Must be called
    /// from within a Tokio runtime.
    pub fn connect(url: Url, options: ConnectionOptions, signal: Option<&CancellationToken>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(ReadyState::Connecting);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let cancel = signal.map_or_else(CancellationToken::new, CancellationToken::child_token);

        let shared = Arc::new(Shared {
            url,
            events,
            state,
            terminated: CancellationToken::new(),
        });

        let task_shared = Arc::clone(&shared);
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            socket_loop(&task_shared, options, outbound_rx, &task_cancel).await;
            task_shared.set_state(ReadyState::Closed);
            task_shared.terminated.cancel();
            tracing::debug!(url = %task_shared.url, "connection task exiting");
        });

        Self {
            shared,
            outbound,
            cancel,
        }
    }

    pub fn url(&self) -> &Url {
        &self.shared.url
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.shared.state.borrow()
    }

    /// Watch the ready state.
    pub fn watch_state(&self) -> watch::Receiver<ReadyState> {
        self.shared.state.subscribe()
    }

    /// New receiver for every subsequent [`ConnectionEvent`].
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    /// Token cancelled when this connection is disposed.
    pub fn signal(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the socket task has exited (disposed, normal close or
    /// retries exhausted).
    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.is_cancelled()
    }

    /// Queue a payload on the open socket.
    ///
    /// Fails with [`Error::NotConnected`] unless the socket is open.
    pub fn send(&self, data: impl Into<Outbound>) -> Result<(), Error> {
        if self.ready_state() != ReadyState::Open {
            return Err(Error::NotConnected);
        }
        self.outbound
            .send(data.into().into_message())
            .map_err(|_| Error::NotConnected)
    }

    /// Close the socket with a normal status and stop any scheduled
    /// reconnect. Idempotent.
    pub fn dispose(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(url = %self.shared.url, "disposing connection");
        }
        self.cancel.cancel();
    }

    /// Dispose when the returned guard is dropped.
    pub fn dispose_guard(&self) -> DisposeGuard {
        DisposeGuard {
            connection: self.clone(),
        }
    }

    /// Resolve once the socket is open.
    ///
    /// Rejects on the first transport error, on a close before open, when
    /// retries are exhausted, or when the connection is disposed.
    pub async fn opened(&self) -> Result<(), Error> {
        let mut events = self.subscribe();
        if self.ready_state() == ReadyState::Open {
            return Ok(());
        }
        if self.is_terminated() {
            return Err(Error::WebSocketClosed {
                code: NORMAL_CLOSURE,
                reason: "connection terminated".into(),
            });
        }

        loop {
            let received = tokio::select! {
                biased;
                () = self.shared.terminated.cancelled() => None,
                event = events.recv() => Some(event),
            };
            match received {
                Some(Ok(ConnectionEvent::Open)) => return Ok(()),
                Some(Ok(ConnectionEvent::Error {
                    kind: ErrorKind::Transport,
                    message,
                })) => return Err(Error::WebSocketConnect(message)),
                Some(Ok(ConnectionEvent::Close(info))) => {
                    return Err(Error::WebSocketClosed {
                        code: info.code,
                        reason: info.reason,
                    });
                }
                Some(Ok(ConnectionEvent::Failed { attempts })) => {
                    return Err(Error::WebSocketConnect(format!(
                        "gave up after {attempts} attempts"
                    )));
                }
                Some(Ok(_)) => {}
                Some(Err(broadcast::error::RecvError::Lagged(_))) => {
                    if self.ready_state() == ReadyState::Open {
                        return Ok(());
                    }
                }
                None | Some(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(Error::WebSocketClosed {
                        code: NORMAL_CLOSURE,
                        reason: "connection terminated".into(),
                    });
                }
            }
        }
    }

    /// Pull-based view of inbound frames.
    ///
    /// The receiver is created immediately, so frames arriving after this
    /// call are never missed. Ends on close or disposal; a transport error
    /// is yielded once and then ends the stream. Unparseable frames are
    /// skipped.
    pub fn messages(&self) -> FrameStream {
        let url = self.shared.url.clone();
        let mut events = from_events(self.subscribe(), Some(self.cancel.clone()));
        Box::pin(async_stream::stream! {
            while let Some(event) = events.next().await {
                match event {
                    Ok(ConnectionEvent::Message(frame)) => yield Ok(frame),
                    Ok(ConnectionEvent::Close(info)) => {
                        tracing::debug!(url = %url, code = info.code, "message stream closed");
                        break;
                    }
                    Ok(ConnectionEvent::Error { kind: ErrorKind::Transport, message }) => {
                        yield Err(Error::Transport(message));
                        break;
                    }
                    Ok(ConnectionEvent::Error { kind: ErrorKind::Parse, message }) => {
                        tracing::debug!(url = %url, error = %message, "skipping unparseable frame");
                    }
                    Ok(_) => {}
                    Err(Lagged(skipped)) => {
                        tracing::warn!(url = %url, skipped, "message stream lagged");
                    }
                }
            }
        })
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.shared.url.as_str())
            .field("ready_state", &self.ready_state())
            .field("disposed", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Disposes its connection on drop.
#[derive(Debug)]
pub struct DisposeGuard {
    connection: Connection,
}

impl DisposeGuard {
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl Drop for DisposeGuard {
    fn drop(&mut self) {
        self.connection.dispose();
    }
}

// ── Socket task ──────────────────────────────────────────────────────

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How one socket generation ended.
enum Ended {
    Disposed,
    Closed(CloseInfo),
}

/// Dial → session → on abnormal close, backoff → dial again.
async fn socket_loop(
    shared: &Shared,
    options: ConnectionOptions,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
    cancel: &CancellationToken,
) {
    let parser = options.parser.clone().unwrap_or_else(json_parser);
    let mut attempt: u32 = 0;

    loop {
        shared.set_state(ReadyState::Connecting);
        tracing::info!(url = %shared.url, attempt, "connecting");

        let dialed = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            dialed = tokio_tungstenite::connect_async(shared.url.as_str()) => dialed,
        };

        let ended = match dialed {
            Ok((socket, _response)) => {
                attempt = 0;
                session(socket, shared, &options, &parser, &mut outbound_rx, cancel).await
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(url = %shared.url, error = %message, "dial failed");
                shared.emit(ConnectionEvent::Error {
                    kind: ErrorKind::Transport,
                    message: message.clone(),
                });
                Ended::Closed(CloseInfo::abnormal(message))
            }
        };

        shared.set_state(ReadyState::Closed);
        let info = match ended {
            Ended::Disposed => {
                shared.emit(ConnectionEvent::Close(CloseInfo::disposed()));
                break;
            }
            Ended::Closed(info) => info,
        };

        tracing::info!(url = %shared.url, code = info.code, reason = %info.reason, "closed");
        shared.emit(ConnectionEvent::Close(info.clone()));

        if info.is_normal() || !options.reconnect || cancel.is_cancelled() {
            break;
        }
        if attempt >= options.retry.count {
            tracing::error!(url = %shared.url, attempts = attempt, "reconnect attempts exhausted");
            shared.emit(ConnectionEvent::Failed { attempts: attempt });
            break;
        }

        attempt += 1;
        let delay = options.retry.delay_for(attempt);
        tracing::info!(
            url = %shared.url,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "scheduling reconnect"
        );
        shared.emit(ConnectionEvent::Retry {
            attempt,
            max_attempts: options.retry.count,
            delay,
        });

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }
}

/// Drive one open socket until it closes or the connection is disposed.
async fn session(
    socket: Socket,
    shared: &Shared,
    options: &ConnectionOptions,
    parser: &Parser,
    outbound_rx: &mut mpsc::UnboundedReceiver<Message>,
    cancel: &CancellationToken,
) -> Ended {
    let (mut write, mut read) = socket.split();

    // Anything queued for a previous socket is stale.
    while outbound_rx.try_recv().is_ok() {}

    if let Some(handshake) = &options.handshake {
        if let Err(e) = write.send(Message::text(handshake.to_string())).await {
            shared.emit(ConnectionEvent::Error {
                kind: ErrorKind::Transport,
                message: e.to_string(),
            });
            return Ended::Closed(CloseInfo::abnormal(e.to_string()));
        }
    }

    shared.set_state(ReadyState::Open);
    tracing::info!(url = %shared.url, "connected");
    shared.emit(ConnectionEvent::Open);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                shared.set_state(ReadyState::Closing);
                // Flush what callers queued before the close.
                while let Ok(message) = outbound_rx.try_recv() {
                    if write.send(message).await.is_err() {
                        break;
                    }
                }
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: DISPOSED_REASON.into(),
                };
                if let Err(e) = write.send(Message::Close(Some(frame))).await {
                    tracing::debug!(error = %e, "close frame not delivered");
                }
                return Ended::Disposed;
            }
            outgoing = outbound_rx.recv() => {
                let Some(message) = outgoing else {
                    // Every handle is gone.
                    cancel.cancel();
                    continue;
                };
                if let Err(e) = write.send(message).await {
                    let message = e.to_string();
                    shared.emit(ConnectionEvent::Error {
                        kind: ErrorKind::Transport,
                        message: message.clone(),
                    });
                    return Ended::Closed(CloseInfo::abnormal(message));
                }
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => deliver(shared, parser, text.as_bytes()),
                Some(Ok(Message::Binary(data))) => deliver(shared, parser, &data),
                Some(Ok(Message::Close(frame))) => return Ended::Closed(CloseInfo::from(frame)),
                Some(Ok(_)) => {
                    // Ping/pong are answered by tungstenite.
                }
                Some(Err(e)) => {
                    let message = e.to_string();
                    tracing::warn!(url = %shared.url, error = %message, "socket error");
                    shared.emit(ConnectionEvent::Error {
                        kind: ErrorKind::Transport,
                        message: message.clone(),
                    });
                    return Ended::Closed(CloseInfo::abnormal(message));
                }
                None => return Ended::Closed(CloseInfo::abnormal("stream ended without close frame")),
            }
        }
    }
}

fn deliver(shared: &Shared, parser: &Parser, payload: &[u8]) {
    match parser(payload) {
        Ok(value) => {
            tracing::trace!(url = %shared.url, "frame received");
            shared.emit(ConnectionEvent::Message(Arc::new(value)));
        }
        Err(message) => {
            tracing::debug!(url = %shared.url, error = %message, "failed to parse frame");
            shared.emit(ConnectionEvent::Error {
                kind: ErrorKind::Parse,
                message,
            });
        }
    }
}

fn json_parser() -> Parser {
    Arc::new(|payload: &[u8]| serde_json::from_slice(payload).map_err(|e| e.to_string()))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn default_retry_config() {
        let retry = RetryConfig::default();
        assert_eq!(retry.count, 3);
        assert_eq!(retry.delay, Duration::from_millis(1000));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for(1), Duration::from_millis(1000));
        assert_eq!(retry.delay_for(2), Duration::from_millis(2000));
        assert_eq!(retry.delay_for(3), Duration::from_millis(4000));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let retry = RetryConfig {
            count: u32::MAX,
            delay: Duration::from_secs(u64::MAX / 2),
        };
        assert_eq!(retry.delay_for(40), Duration::MAX);
    }

    #[test]
    fn json_values_are_encoded_as_text() {
        let outbound = Outbound::from(json!({ "LocationSet": { "name": "Lobby" } }));
        assert_eq!(
            outbound,
            Outbound::Text(r#"{"LocationSet":{"name":"Lobby"}}"#.to_owned())
        );
        assert_eq!(Outbound::from("raw"), Outbound::Text("raw".to_owned()));
        assert_eq!(
            Outbound::from(vec![1_u8, 2]),
            Outbound::Binary(Bytes::from_static(&[1, 2]))
        );
    }

    #[test]
    fn close_info_without_frame_has_no_status() {
        let info = CloseInfo::from(None);
        assert_eq!(info.code, NO_STATUS);
        assert!(!info.is_normal());
        assert!(CloseInfo::disposed().is_normal());
    }

    #[test]
    fn default_parser_decodes_json() {
        let parser = json_parser();
        assert_eq!(parser(br#"{"Config":{}}"#).unwrap(), json!({ "Config": {} }));
        assert!(parser(b"not json").is_err());
    }

    #[tokio::test]
    async fn send_before_open_is_rejected() {
        // Port 9 (discard) on loopback is never a WebSocket server.
        let url = Url::parse("ws://127.0.0.1:9/api/operator").unwrap();
        let options = ConnectionOptions {
            reconnect: false,
            ..ConnectionOptions::default()
        };
        let connection = Connection::connect(url, options, None);
        assert_eq!(connection.ready_state(), ReadyState::Connecting);
        assert!(matches!(connection.send("hello"), Err(Error::NotConnected)));
        connection.dispose();
    }

    #[tokio::test]
    async fn parent_signal_disposes_connection() {
        let url = Url::parse("ws://127.0.0.1:9/api/operator").unwrap();
        let parent = CancellationToken::new();
        let connection = Connection::connect(url, ConnectionOptions::default(), Some(&parent));
        parent.cancel();
        assert!(connection.signal().is_cancelled());
    }
}
