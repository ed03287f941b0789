//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use evac_config::ConfigError;
use evac_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the operator endpoint at {url}: {reason}")]
    #[diagnostic(
        code(evac::connection_failed),
        help(
            "Check that the EVAC server is running and accessible.\n\
             URL: {url}\n\
             Try: evac watch -v"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("No password configured for profile '{profile}'")]
    #[diagnostic(
        code(evac::no_credentials),
        help(
            "Set password_env or password in the profile,\n\
             or export EVAC_PASSWORD."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("No cached snapshot for {service}")]
    #[diagnostic(
        code(evac::no_snapshot),
        help("Run `evac watch` once to populate the cache.")
    )]
    NoSnapshot { service: String },

    // ── Operations ───────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(evac::operation_failed))]
    OperationFailed { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(evac::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(evac::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Or pass --server to connect without a profile."
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No server configured")]
    #[diagnostic(
        code(evac::no_config),
        help(
            "Pass --server (or EVAC_SERVER), or add a profile to\n\
             {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(evac::config))]
    Config(ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Gave up after {after}")]
    #[diagnostic(
        code(evac::timeout),
        help("Increase --timeout or check that the server echoes operator actions.")
    )]
    Timeout { after: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(evac::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML rendering failed: {0}")]
    #[diagnostic(code(evac::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML rendering failed: {0}")]
    #[diagnostic(code(evac::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout {
            after: humantime::format_duration(after).to_string(),
        }
    }

    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NoSnapshot { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::UnknownProfile { profile } => Self::ProfileNotFound {
                name: profile,
                available: String::new(),
            },
            other => Self::Config(other),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed { url, reason },

            CoreError::ConnectionClosed { code, reason } => Self::ConnectionFailed {
                url: "(closed)".into(),
                reason: format!("code {code}: {reason}"),
            },

            CoreError::NotConnected => Self::ConnectionFailed {
                url: "(disconnected)".into(),
                reason: "no open connection".into(),
            },

            CoreError::Timeout { timeout_ms } => Self::timeout(Duration::from_millis(timeout_ms)),

            CoreError::Validation { message } => Self::Validation {
                field: "input".into(),
                reason: message,
            },

            other => Self::OperationFailed {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let err = CliError::from(CoreError::Timeout { timeout_ms: 5000 });
        assert_eq!(err.exit_code(), exit_code::TIMEOUT);
        assert_eq!(err.to_string(), "Gave up after 5s");

        let err = CliError::from(CoreError::Validation {
            message: "name is required".into(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);

        let err = CliError::from(CoreError::Aborted);
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }

    #[test]
    fn missing_password_is_an_auth_failure() {
        let err = CliError::from(ConfigError::NoCredentials {
            profile: "site".into(),
        });
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }
}
