// ── Endpoint derivation ──
//
// The operator socket lives on the same host as the page that serves the
// application, under a fixed path.

use url::Url;

use crate::error::Error;

/// Default path of the operator WebSocket endpoint.
pub const OPERATOR_PATH: &str = "/api/operator";

/// Derive the WebSocket URL for `path` from an HTTP(S) origin.
///
/// `http` maps to `ws`, `https` to `wss`; `ws`/`wss` origins pass through.
/// Host and port are preserved, any path on the origin is replaced.
pub fn websocket_url(origin: &Url, path: &str) -> Result<Url, Error> {
    let scheme = match origin.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(Error::UnsupportedScheme(other.to_owned())),
    };
    let host = origin.host_str().unwrap_or("localhost");
    let raw = match origin.port() {
        Some(p) => format!("{scheme}://{host}:{p}"),
        None => format!("{scheme}://{host}"),
    };
    Ok(Url::parse(&raw)?.join(path)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn http_origin_maps_to_ws() {
        let origin = Url::parse("http://192.168.1.10:3030/dashboard").unwrap();
        let url = websocket_url(&origin, OPERATOR_PATH).unwrap();
        assert_eq!(url.as_str(), "ws://192.168.1.10:3030/api/operator");
    }

    #[test]
    fn https_origin_maps_to_wss() {
        let origin = Url::parse("https://evac.example.org").unwrap();
        let url = websocket_url(&origin, "/api/operator").unwrap();
        assert_eq!(url.as_str(), "wss://evac.example.org/api/operator");
    }

    #[test]
    fn rejects_unknown_scheme() {
        let origin = Url::parse("ftp://example.org").unwrap();
        assert!(matches!(
            websocket_url(&origin, OPERATOR_PATH),
            Err(Error::UnsupportedScheme(s)) if s == "ftp"
        ));
    }
}
