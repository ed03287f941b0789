// ── Runtime configuration ──
//
// These types describe how to reach the operator endpoint and how the
// services behave. They carry credentials and tuning but never touch disk;
// the CLI builds them from `evac-config`.

use std::time::Duration;

use evac_api::RetryConfig;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use url::Url;

/// Default wait between orchestration attempts.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(1000);
/// Default deadline for resolving a `set` seed.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_millis(5000);

/// Operator login sent as the handshake frame of every connection.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    /// The `Login` frame understood by the operator endpoint.
    pub fn login_frame(&self) -> Value {
        json!({
            "Login": {
                "Login": {
                    "username": self.username,
                    "password": self.password.expose_secret(),
                }
            }
        })
    }
}

/// Everything the orchestrator needs for one connection lifecycle.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Operator WebSocket URL (`ws://` or `wss://`).
    pub url: Url,
    pub credentials: Option<Credentials>,
    /// Transport-level retry budget of each connection.
    pub retry: RetryConfig,
    /// Fixed wait before a failed attempt is retried.
    pub restart_delay: Duration,
}

impl OrchestratorConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            credentials: None,
            retry: RetryConfig::default(),
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }
}

/// Per-service tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Deadline for resolving the seed passed to `set`.
    pub action_timeout: Duration,
    /// Buffer size of the subscriber broadcast.
    pub channel_capacity: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            action_timeout: DEFAULT_ACTION_TIMEOUT,
            channel_capacity: 256,
        }
    }
}
