//! Connection behaviour against a real loopback WebSocket server.

#![allow(clippy::unwrap_used)]

use std::net::SocketAddr;
use std::time::Duration;

use evac_api::connection::NORMAL_CLOSURE;
use evac_api::{Connection, ConnectionEvent, ConnectionOptions, ErrorKind, ReadyState, RetryConfig};
use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

const WAIT: Duration = Duration::from_secs(5);

// ── Helpers ──────────────────────────────────────────────────────────

async fn listener() -> (TcpListener, Url) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let url = Url::parse(&format!("ws://{addr}/api/operator")).unwrap();
    (listener, url)
}

/// Collect events until `stop` matches, failing the test after `WAIT`.
async fn collect_until(
    rx: &mut broadcast::Receiver<ConnectionEvent>,
    mut stop: impl FnMut(&ConnectionEvent) -> bool,
) -> Vec<ConnectionEvent> {
    let mut seen = Vec::new();
    tokio::time::timeout(WAIT, async {
        loop {
            let event = rx.recv().await.unwrap();
            let done = stop(&event);
            seen.push(event);
            if done {
                break;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out; events so far: {seen:?}"));
    seen
}

fn quick_retry() -> ConnectionOptions {
    ConnectionOptions {
        retry: RetryConfig {
            count: 3,
            delay: Duration::from_millis(10),
        },
        ..ConnectionOptions::default()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[tokio::test]
async fn receives_frames_and_sends_json() {
    let (listener, url) = listener().await;
    let (got_tx, got_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::text(
            json!({ "LocationDetail": { "uuid": "u1", "name": "Lobby" } }).to_string(),
        ))
        .await
        .unwrap();
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                let _ = got_tx.send(text.to_string());
                break;
            }
        }
    });

    let connection = Connection::connect(url, ConnectionOptions::default(), None);
    let mut frames = connection.messages();
    connection.opened().await.unwrap();
    assert_eq!(connection.ready_state(), ReadyState::Open);

    let frame = tokio::time::timeout(WAIT, frames.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(*frame, json!({ "LocationDetail": { "uuid": "u1", "name": "Lobby" } }));

    connection
        .send(json!({ "LocationSet": { "name": "Lobby" } }))
        .unwrap();
    let sent = tokio::time::timeout(WAIT, got_rx).await.unwrap().unwrap();
    let sent: serde_json::Value = serde_json::from_str(&sent).unwrap();
    assert_eq!(sent, json!({ "LocationSet": { "name": "Lobby" } }));

    connection.dispose();
}

#[tokio::test]
async fn handshake_precedes_everything_else() {
    let (listener, url) = listener().await;
    let (got_tx, got_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            let _ = got_tx.send(text.to_string());
        }
        let _ = ws.next().await;
    });

    let login = json!({ "Login": { "Login": { "username": "admin", "password": "secret" } } });
    let options = ConnectionOptions {
        handshake: Some(login.clone()),
        ..ConnectionOptions::default()
    };
    let connection = Connection::connect(url, options, None);
    connection.opened().await.unwrap();

    let first: serde_json::Value =
        serde_json::from_str(&tokio::time::timeout(WAIT, got_rx).await.unwrap().unwrap()).unwrap();
    assert_eq!(first, login);
    connection.dispose();
}

#[tokio::test]
async fn malformed_frame_is_reported_but_socket_stays_open() {
    let (listener, url) = listener().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::text("not json")).await.unwrap();
        ws.send(Message::text(r#"{"Config":{}}"#)).await.unwrap();
        let _ = ws.next().await;
    });

    let connection = Connection::connect(url, ConnectionOptions::default(), None);
    let mut events = connection.subscribe();
    let mut frames = connection.messages();

    let frame = tokio::time::timeout(WAIT, frames.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(*frame, json!({ "Config": {} }));
    assert_eq!(connection.ready_state(), ReadyState::Open);

    let seen = collect_until(&mut events, |e| matches!(e, ConnectionEvent::Message(_))).await;
    assert!(seen.iter().any(|e| matches!(
        e,
        ConnectionEvent::Error { kind: ErrorKind::Parse, .. }
    )));
    connection.dispose();
}

#[tokio::test]
async fn normal_close_from_server_is_final() {
    let (listener, url) = listener().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .unwrap();
        while ws.next().await.is_some() {}
    });

    let connection = Connection::connect(url, quick_retry(), None);
    let mut events = connection.subscribe();
    let mut frames = connection.messages();

    let seen = collect_until(&mut events, |e| matches!(e, ConnectionEvent::Close(_))).await;
    let Some(ConnectionEvent::Close(info)) = seen.last() else {
        panic!("expected close, got {seen:?}");
    };
    assert_eq!(info.code, NORMAL_CLOSURE);
    assert_eq!(info.reason, "bye");

    assert!(tokio::time::timeout(WAIT, frames.next()).await.unwrap().is_none());
    let quiet = tokio::time::timeout(Duration::from_millis(100), events.recv()).await;
    assert!(quiet.is_err(), "no retry after a normal close");
}

#[tokio::test]
async fn dispose_closes_with_normal_status() {
    let (listener, url) = listener().await;
    let (got_tx, got_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Close(frame) = message {
                let _ = got_tx.send(frame);
                break;
            }
        }
    });

    let connection = Connection::connect(url, quick_retry(), None);
    let mut events = connection.subscribe();
    connection.opened().await.unwrap();

    let guard = connection.dispose_guard();
    drop(guard);
    // Second disposal is a no-op.
    connection.dispose();

    let frame = tokio::time::timeout(WAIT, got_rx).await.unwrap().unwrap().unwrap();
    assert_eq!(frame.code, CloseCode::Normal);
    assert_eq!(frame.reason.as_str(), "Connection disposed");

    let seen = collect_until(&mut events, |e| matches!(e, ConnectionEvent::Close(_))).await;
    assert!(
        !seen.iter().any(|e| matches!(e, ConnectionEvent::Retry { .. })),
        "disposal never schedules a reconnect: {seen:?}"
    );
}

#[tokio::test]
async fn dispose_flushes_queued_frames_before_closing() {
    let (listener, url) = listener().await;
    let (got_tx, got_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut texts = Vec::new();
        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Text(text) => texts.push(text.to_string()),
                Message::Close(_) => break,
                _ => {}
            }
        }
        let _ = got_tx.send(texts);
    });

    let connection = Connection::connect(url, quick_retry(), None);
    connection.opened().await.unwrap();
    connection.send(json!({ "Restore": "nightly" })).unwrap();
    connection.send("second").unwrap();
    connection.dispose();

    let texts = tokio::time::timeout(WAIT, got_rx).await.unwrap().unwrap();
    assert_eq!(texts, vec![r#"{"Restore":"nightly"}"#.to_owned(), "second".to_owned()]);
}

#[tokio::test]
async fn exhausts_retries_with_doubling_delays() {
    // Reserve a port, then free it so every dial is refused.
    let (listener, url) = listener().await;
    drop(listener);

    let connection = Connection::connect(url, quick_retry(), None);
    let mut events = connection.subscribe();

    let seen = collect_until(&mut events, |e| matches!(e, ConnectionEvent::Failed { .. })).await;

    let retries: Vec<(u32, Duration)> = seen
        .iter()
        .filter_map(|e| match e {
            ConnectionEvent::Retry { attempt, delay, .. } => Some((*attempt, *delay)),
            _ => None,
        })
        .collect();
    assert_eq!(
        retries,
        vec![
            (1, Duration::from_millis(10)),
            (2, Duration::from_millis(20)),
            (3, Duration::from_millis(40)),
        ]
    );
    assert!(matches!(seen.last(), Some(ConnectionEvent::Failed { attempts: 3 })));

    let closes = seen
        .iter()
        .filter(|e| matches!(e, ConnectionEvent::Close(info) if info.code == 1006))
        .count();
    assert_eq!(closes, 4);

    let quiet = tokio::time::timeout(Duration::from_millis(150), events.recv()).await;
    assert!(quiet.is_err(), "no attempts after failure");
    assert!(connection.opened().await.is_err());
}

#[tokio::test]
async fn abrupt_drop_reconnects_and_resets_budget() {
    let (listener, url) = listener().await;

    tokio::spawn(async move {
        // First socket: drop without a close frame.
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);

        // Second socket: stay up.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let connection = Connection::connect(url, quick_retry(), None);
    let mut events = connection.subscribe();

    let mut opens = 0;
    let seen = collect_until(&mut events, |e| {
        if matches!(e, ConnectionEvent::Open) {
            opens += 1;
        }
        opens == 2
    })
    .await;

    assert!(seen.iter().any(|e| matches!(
        e,
        ConnectionEvent::Retry { attempt: 1, max_attempts: 3, .. }
    )));
    assert_eq!(connection.ready_state(), ReadyState::Open);
    connection.dispose();
}
