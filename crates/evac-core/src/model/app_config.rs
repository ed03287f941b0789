// ── Server configuration as pushed by `{"Config": ...}` ──

use serde::{Deserialize, Serialize};

use super::{Identity, require};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub base: BaseConfig,
    pub notification: NotificationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseConfig {
    /// Seconds after which a sighting counts as stale.
    #[serde(default = "defaults::activity_diff")]
    pub activity_diff: f64,
    #[serde(default = "defaults::config_path")]
    pub config_path: String,
    #[serde(default = "defaults::data_path")]
    pub data_path: String,
    #[serde(default = "defaults::frontend_path")]
    pub frontend_path: String,
    #[serde(default = "defaults::port_broadcast")]
    pub port_broadcast: String,
    #[serde(default = "defaults::port_scanner")]
    pub port_scanner: String,
    #[serde(default = "defaults::port_web")]
    pub port_web: String,
    #[serde(default = "defaults::query_size")]
    pub query_size: u16,
    #[serde(default = "defaults::routine")]
    pub routine: f64,
    #[serde(default = "defaults::salt")]
    pub salt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub email: EmailConfig,
    pub sms: SmsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfig {
    pub from: EmailAddress,
    pub password: String,
    #[serde(default = "defaults::smtp_port")]
    pub port: u16,
    #[serde(default = "defaults::smtp_server")]
    pub server: String,
    #[serde(default)]
    pub tls: bool,
    pub username: String,
}

/// Sender identity. Travels as a `[name, address]` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct EmailAddress {
    pub name: String,
    pub address: String,
}

impl From<(String, String)> for EmailAddress {
    fn from((name, address): (String, String)) -> Self {
        Self { name, address }
    }
}

impl From<EmailAddress> for (String, String) {
    fn from(email: EmailAddress) -> Self {
        (email.name, email.address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsConfig {
    pub auth: String,
    pub login: String,
    pub url: String,
}

impl Identity for AppConfig {
    fn validate(&self) -> Result<(), String> {
        let base = &self.base;
        if base.activity_diff.is_nan() || base.activity_diff < 0.0 {
            return Err("activityDiff must be >= 0".into());
        }
        if !(1..=1000).contains(&base.query_size) {
            return Err(format!("querySize must be 1..=1000, got {}", base.query_size));
        }
        if base.routine.is_nan() || base.routine < 0.0 {
            return Err("routine must be >= 0".into());
        }
        if base.salt.chars().count() < 5 {
            return Err("salt must be at least 5 characters".into());
        }

        let email = &self.notification.email;
        require("email.from.name", &email.from.name)?;
        if !email.from.address.contains('@') {
            return Err(format!("email.from.address is not an address: {}", email.from.address));
        }
        require("email.password", &email.password)?;
        require("email.server", &email.server)?;
        require("email.username", &email.username)?;
        if email.port == 0 {
            return Err("email.port must be 1..=65535".into());
        }
        Ok(())
    }
}

mod defaults {
    pub fn activity_diff() -> f64 {
        15.0
    }
    pub fn config_path() -> String {
        "data/server.json".into()
    }
    pub fn data_path() -> String {
        "data/database.json".into()
    }
    pub fn frontend_path() -> String {
        "./frontend/dist".into()
    }
    pub fn port_broadcast() -> String {
        "192.168.1.255:4242".into()
    }
    pub fn port_scanner() -> String {
        "0.0.0.0:4242".into()
    }
    pub fn port_web() -> String {
        "0.0.0.0:3030".into()
    }
    pub fn query_size() -> u16 {
        16
    }
    pub fn routine() -> f64 {
        5.0
    }
    pub fn salt() -> String {
        "change-me!".into()
    }
    pub fn smtp_port() -> u16 {
        587
    }
    pub fn smtp_server() -> String {
        "smtp".into()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn wire() -> serde_json::Value {
        json!({
            "base": {},
            "notification": {
                "email": {
                    "from": ["Evac", "evac@example.org"],
                    "password": "pw",
                    "username": "evac"
                },
                "sms": { "auth": "token", "login": "evac", "url": "https://sms.example.org" }
            }
        })
    }

    #[test]
    fn missing_base_fields_take_defaults() {
        let config: AppConfig = serde_json::from_value(wire()).unwrap();
        assert!((config.base.activity_diff - 15.0).abs() < f64::EPSILON);
        assert_eq!(config.base.port_web, "0.0.0.0:3030");
        assert_eq!(config.notification.email.port, 587);
        assert_eq!(config.notification.email.from.address, "evac@example.org");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sender_round_trips_as_pair() {
        let config: AppConfig = serde_json::from_value(wire()).unwrap();
        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["notification"]["email"]["from"], json!(["Evac", "evac@example.org"]));
    }

    #[test]
    fn short_salt_is_invalid() {
        let mut config: AppConfig = serde_json::from_value(wire()).unwrap();
        config.base.salt = "abc".into();
        assert!(config.validate().is_err());
    }
}
