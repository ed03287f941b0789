//! Orchestrator lifecycle against a loopback operator endpoint.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use evac_api::RetryConfig;
use evac_core::{
    ConnectionState, Credentials, MemoryStorage, Orchestrator, OrchestratorConfig, Services,
    SharedStorage, Storage,
};
use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use url::Url;

const WAIT: Duration = Duration::from_secs(5);
const LOBBY: &str = "6f1c0d2e-8a4b-4c57-9f1a-2b3c4d5e6f70";

fn config(url: Url) -> OrchestratorConfig {
    OrchestratorConfig {
        credentials: Some(Credentials {
            username: "operator".into(),
            password: SecretString::from("hunter2"),
        }),
        retry: RetryConfig {
            count: 1,
            delay: Duration::from_millis(10),
        },
        restart_delay: Duration::from_millis(20),
        ..OrchestratorConfig::new(url)
    }
}

async fn wait_for_state(
    orchestrator: &Orchestrator,
    wanted: impl Fn(&ConnectionState) -> bool,
) -> ConnectionState {
    let mut states = orchestrator.connection_state();
    let state = tokio::time::timeout(WAIT, states.wait_for(|state| wanted(state)))
        .await
        .expect("state not reached in time")
        .unwrap();
    *state
}

/// Serves `sessions` connections in turn. Each session reports its first
/// frame (the handshake), sends a location list, then closes normally.
async fn operator(sessions: usize) -> (Url, mpsc::UnboundedReceiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = Url::parse(&format!("ws://{}/api/operator", listener.local_addr().unwrap())).unwrap();
    let (handshakes, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for session in 0..sessions {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = handshakes.send(serde_json::from_str(text.as_str()).unwrap());
            }
            let name = format!("Lobby {session}");
            ws.send(Message::text(
                json!({ "LocationList": [{ "uuid": LOBBY, "name": name }] }).to_string(),
            ))
            .await
            .unwrap();

            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = ws
                .close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "bye".into(),
                }))
                .await;
            while let Some(Ok(_)) = ws.next().await {}
        }
        // Keep the port bound; later attempts stall in the handshake.
        std::future::pending::<()>().await;
    });

    (url, rx)
}

#[tokio::test]
async fn restarts_services_on_a_fresh_connection() {
    let (url, mut handshakes) = operator(2).await;
    let storage: SharedStorage = Arc::new(MemoryStorage::new());
    let services = Services::new();
    let orchestrator = Arc::new(Orchestrator::new(
        config(url),
        services.managed(),
        Some(Arc::clone(&storage)),
    ));
    let cancel = CancellationToken::new();

    let task = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let cancel = cancel.clone();
        async move { orchestrator.run(cancel).await }
    });

    let login = json!({ "Login": { "Login": { "username": "operator", "password": "hunter2" } } });
    for session in 0..2 {
        let handshake = tokio::time::timeout(WAIT, handshakes.recv()).await.unwrap().unwrap();
        assert_eq!(handshake, login);

        let mut updates = services.locations.subscribe();
        let expected = format!("Lobby {session}");
        tokio::time::timeout(WAIT, async {
            while let Some(locations) = updates.next().await {
                if locations.values().any(|l| l.name == expected) {
                    break;
                }
            }
        })
        .await
        .unwrap();
    }

    // The second close leads to another attempt.
    wait_for_state(&orchestrator, |state| {
        matches!(state, ConnectionState::Reconnecting { .. } | ConnectionState::Disconnected)
    })
    .await;

    cancel.cancel();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert_eq!(*orchestrator.connection_state().borrow(), ConnectionState::Disconnected);
    assert!(!services.locations.is_started());

    // The last accepted list was persisted in the locations namespace.
    let raw = storage.get_item_raw("locations:state").await.unwrap().unwrap();
    let persisted: Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(persisted[LOBBY]["name"], json!("Lobby 1"));
}

#[tokio::test]
async fn failed_attempts_count_up_until_cancelled() {
    let url = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Url::parse(&format!("ws://{}/api/operator", listener.local_addr().unwrap())).unwrap()
    };
    let services = Services::new();
    let orchestrator = Arc::new(Orchestrator::new(config(url), services.managed(), None));
    let cancel = CancellationToken::new();

    let task = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let cancel = cancel.clone();
        async move { orchestrator.run(cancel).await }
    });

    let reached = wait_for_state(&orchestrator, |state| {
        matches!(state, ConnectionState::Reconnecting { attempt } if *attempt >= 2)
    })
    .await;
    assert!(matches!(reached, ConnectionState::Reconnecting { .. }));
    assert!(!services.locations.is_started());

    cancel.cancel();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}
