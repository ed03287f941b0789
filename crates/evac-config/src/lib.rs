//! Shared configuration for EVAC tools.
//!
//! TOML profiles, credential resolution (env + plaintext), and translation
//! to `evac_core::OrchestratorConfig` / `ServiceOptions`. The CLI adds
//! flag-aware wrappers on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use evac_api::{OPERATOR_PATH, RetryConfig, websocket_url};
use evac_core::{Credentials, OrchestratorConfig, ServiceOptions};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "EVAC_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("unknown profile '{profile}'")]
    UnknownProfile { profile: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Reconnect attempts per connection after an abnormal close.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base reconnect delay; doubles per attempt.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Wait between orchestration attempts.
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,

    /// Deadline for resolving a service write.
    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,

    /// Root of the snapshot cache. Defaults to the platform cache dir.
    pub cache_dir: Option<PathBuf>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            restart_delay_ms: default_restart_delay_ms(),
            action_timeout_ms: default_action_timeout_ms(),
            cache_dir: None,
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_retry_count() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_restart_delay_ms() -> u64 {
    1000
}
fn default_action_timeout_ms() -> u64 {
    5000
}

/// A named server profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Origin of the EVAC server (e.g., "http://192.168.1.10:3030").
    pub server: String,

    /// Path of the operator WebSocket.
    #[serde(default = "default_path")]
    pub path: String,

    /// Operator login. No handshake is sent when absent.
    pub username: Option<String>,

    /// Password in plaintext. Prefer `password_env`.
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    pub retry_count: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub restart_delay_ms: Option<u64>,
    pub action_timeout_ms: Option<u64>,

    /// Override the snapshot cache directory.
    pub cache_dir: Option<PathBuf>,
}

fn default_path() -> String {
    OPERATOR_PATH.into()
}

impl Profile {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            path: default_path(),
            username: None,
            password: None,
            password_env: None,
            retry_count: None,
            retry_delay_ms: None,
            restart_delay_ms: None,
            action_timeout_ms: None,
            cache_dir: None,
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "evac", "evac")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Platform cache directory for service snapshots.
pub fn default_cache_dir() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".cache"),
        |dirs| dirs.cache_dir().to_path_buf(),
    )
}

fn dirs_fallback(kind: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(kind);
    p.push("evac");
    p
}

// ── Config loading ──────────────────────────────────────────────────

fn figment(path: &Path) -> Figment {
    // `__` separates nesting so snake_case keys survive:
    // EVAC_DEFAULTS__RETRY_COUNT=5 → defaults.retry_count.
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment(path).extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profile selection ───────────────────────────────────────────────

impl Config {
    /// Pick `name`, else the default profile.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());
        let profile = self
            .profiles
            .get(&name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.clone(),
            })?;
        Ok((name, profile))
    }
}

// ── Credential resolution (without CLI flags) ───────────────────────

/// Resolve the operator login, if the profile has one.
///
/// Username: profile, then `EVAC_USERNAME`. Password: the profile's
/// `password_env`, then `EVAC_PASSWORD`, then plaintext config.
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<Option<Credentials>, ConfigError> {
    let Some(username) = profile
        .username
        .clone()
        .or_else(|| std::env::var("EVAC_USERNAME").ok())
    else {
        return Ok(None);
    };

    // 1. Profile's password_env → env var lookup
    if let Some(ref env_name) = profile.password_env {
        if let Ok(pw) = std::env::var(env_name) {
            return Ok(Some(Credentials {
                username,
                password: SecretString::from(pw),
            }));
        }
    }

    // 2. Global env var
    if let Ok(pw) = std::env::var("EVAC_PASSWORD") {
        return Ok(Some(Credentials {
            username,
            password: SecretString::from(pw),
        }));
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(Some(Credentials {
            username,
            password: SecretString::from(pw.clone()),
        }));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

// ── Translation to runtime config ───────────────────────────────────

/// Operator WebSocket URL of a profile.
pub fn profile_url(profile: &Profile) -> Result<Url, ConfigError> {
    let origin: Url = profile.server.parse().map_err(|_| ConfigError::Validation {
        field: "server".into(),
        reason: format!("invalid URL: {}", profile.server),
    })?;
    websocket_url(&origin, &profile.path).map_err(|e| ConfigError::Validation {
        field: "server".into(),
        reason: e.to_string(),
    })
}

/// Build an `OrchestratorConfig` from a profile, without CLI flag overrides.
pub fn profile_to_orchestrator_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<OrchestratorConfig, ConfigError> {
    let url = profile_url(profile)?;
    let credentials = resolve_credentials(profile, profile_name)?;

    let retry = RetryConfig {
        count: profile.retry_count.unwrap_or(defaults.retry_count),
        delay: Duration::from_millis(profile.retry_delay_ms.unwrap_or(defaults.retry_delay_ms)),
    };
    let restart_delay =
        Duration::from_millis(profile.restart_delay_ms.unwrap_or(defaults.restart_delay_ms));

    Ok(OrchestratorConfig {
        url,
        credentials,
        retry,
        restart_delay,
    })
}

/// Per-service tuning of a profile.
pub fn profile_to_service_options(profile: &Profile, defaults: &Defaults) -> ServiceOptions {
    ServiceOptions {
        action_timeout: Duration::from_millis(
            profile.action_timeout_ms.unwrap_or(defaults.action_timeout_ms),
        ),
        ..ServiceOptions::default()
    }
}

/// Snapshot cache directory of a profile; each profile gets its own.
pub fn profile_cache_dir(profile: &Profile, profile_name: &str, defaults: &Defaults) -> PathBuf {
    profile.cache_dir.clone().unwrap_or_else(|| {
        defaults
            .cache_dir
            .clone()
            .unwrap_or_else(default_cache_dir)
            .join(profile_name)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    const CONFIG: &str = r#"
        default_profile = "site"

        [defaults]
        retry_count = 5

        [profiles.site]
        server = "http://192.168.1.10:3030"
        username = "operator"
        password = "plain"
        restart_delay_ms = 250
    "#;

    #[test]
    fn file_and_env_layer_over_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", CONFIG)?;
            jail.set_env("EVAC_DEFAULTS__OUTPUT", "json");

            let config = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.defaults.output, "json");
            assert_eq!(config.defaults.retry_count, 5);
            assert_eq!(config.defaults.action_timeout_ms, 5000);

            let (name, profile) = config.profile(None).map_err(|e| e.to_string())?;
            assert_eq!(name, "site");
            assert_eq!(profile.path, "/api/operator");
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_| {
            let config = load_config_from(Path::new("absent.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn profile_translates_to_runtime_config() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", CONFIG)?;
            let config = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;
            let (name, profile) = config.profile(Some("site")).map_err(|e| e.to_string())?;

            let runtime = profile_to_orchestrator_config(profile, &name, &config.defaults)
                .map_err(|e| e.to_string())?;
            assert_eq!(runtime.url.as_str(), "ws://192.168.1.10:3030/api/operator");
            assert_eq!(runtime.retry.count, 5);
            assert_eq!(runtime.restart_delay, Duration::from_millis(250));

            let credentials = runtime.credentials.unwrap();
            assert_eq!(credentials.username, "operator");
            assert_eq!(credentials.password.expose_secret(), "plain");
            Ok(())
        });
    }

    #[test]
    fn password_env_wins_over_plaintext() {
        Jail::expect_with(|jail| {
            jail.set_env("SITE_PASSWORD", "from-env");
            let mut profile = Profile::new("http://localhost:3030");
            profile.username = Some("operator".into());
            profile.password = Some("plain".into());
            profile.password_env = Some("SITE_PASSWORD".into());

            let credentials = resolve_credentials(&profile, "site")
                .map_err(|e| e.to_string())?
                .unwrap();
            assert_eq!(credentials.password.expose_secret(), "from-env");
            Ok(())
        });
    }

    #[test]
    fn username_without_password_is_an_error() {
        let mut profile = Profile::new("http://localhost:3030");
        profile.username = Some("operator".into());
        profile.password_env = Some("EVAC_TEST_UNSET_PASSWORD".into());
        if std::env::var("EVAC_PASSWORD").is_err() {
            assert!(matches!(
                resolve_credentials(&profile, "site"),
                Err(ConfigError::NoCredentials { .. })
            ));
        }
    }

    #[test]
    fn unknown_profile_is_reported() {
        let config = Config::default();
        assert!(matches!(
            config.profile(Some("nope")),
            Err(ConfigError::UnknownProfile { profile }) if profile == "nope"
        ));
    }

    #[test]
    fn bad_server_is_a_validation_error() {
        let profile = Profile::new("ftp://example.org");
        assert!(matches!(profile_url(&profile), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn cache_dir_is_per_profile() {
        let defaults = Defaults {
            cache_dir: Some(PathBuf::from("/tmp/evac")),
            ..Defaults::default()
        };
        let profile = Profile::new("http://localhost:3030");
        assert_eq!(
            profile_cache_dir(&profile, "site", &defaults),
            PathBuf::from("/tmp/evac/site")
        );
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config
            .profiles
            .insert("default".into(), Profile::new("https://evac.example.org"));

        save_config_to(&config, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let loaded: Config = toml::from_str(&text).unwrap();
        assert_eq!(loaded, config);
    }
}
