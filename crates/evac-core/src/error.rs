// ── Core error types ──
//
// User-facing errors from evac-core. Consumers never see raw socket errors;
// the `From<evac_api::Error>` impl translates wire-layer failures into
// domain-appropriate variants.

use thiserror::Error;

use crate::codec::CodecError;
use crate::storage::StorageError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Connection closed (code {code}): {reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("No open connection")]
    NotConnected,

    // ── Service errors ───────────────────────────────────────────────
    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Operation aborted")]
    Aborted,

    #[error("Service {service} is not started, cannot perform {action}")]
    NotStarted { service: String, action: String },

    #[error("No value to resolve: {message}")]
    EmptySeed { message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Storage error: {message}")]
    Storage { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {err}"))
    }
}

impl From<evac_api::Error> for CoreError {
    fn from(err: evac_api::Error) -> Self {
        match err {
            evac_api::Error::WebSocketConnect(reason) | evac_api::Error::Transport(reason) => {
                Self::ConnectionFailed {
                    url: String::new(),
                    reason,
                }
            }
            evac_api::Error::WebSocketClosed { code, reason } => {
                Self::ConnectionClosed { code, reason }
            }
            evac_api::Error::NotConnected => Self::NotConnected,
            evac_api::Error::InvalidUrl(e) => Self::Config {
                message: format!("Invalid URL: {e}"),
            },
            evac_api::Error::UnsupportedScheme(scheme) => Self::Config {
                message: format!("Unsupported URL scheme: {scheme}"),
            },
            evac_api::Error::Parse { message } => Self::Internal(format!("Parse error: {message}")),
            evac_api::Error::Encode(e) => Self::Internal(format!("Encode error: {e}")),
        }
    }
}
