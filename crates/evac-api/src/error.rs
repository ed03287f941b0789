use thiserror::Error;

/// Top-level error type for the `evac-api` crate.
///
/// Covers every failure mode of the wire layer: dialing, the live socket,
/// outbound encoding, and inbound parsing. `evac-core` maps these into
/// domain diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// WebSocket dial or handshake failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The live socket reported an error.
    #[error("WebSocket transport error: {0}")]
    Transport(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// `send` was called while no socket is open.
    #[error("WebSocket is not connected")]
    NotConnected,

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The URL scheme cannot be mapped to a WebSocket scheme.
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    // ── Data ────────────────────────────────────────────────────────
    /// An inbound frame could not be parsed.
    #[error("Failed to parse frame: {message}")]
    Parse { message: String },

    /// An outbound payload could not be encoded.
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if a later attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WebSocketConnect(_)
                | Self::Transport(_)
                | Self::WebSocketClosed { .. }
                | Self::NotConnected
        )
    }
}
