use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Entity, Identity, MacAddress};

/// A wearable tag carried by a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub uuid: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    pub mac: MacAddress,
    pub last_activity: DateTime<Utc>,
    pub enabled: bool,
    /// Charge in percent.
    #[serde(default)]
    pub battery: Option<u8>,
}

impl Identity for Device {
    fn validate(&self) -> Result<(), String> {
        match self.battery {
            Some(level) if level > 100 => Err(format!("battery must be 0..=100, got {level}")),
            _ => Ok(()),
        }
    }
}

impl Entity for Device {
    const SCOPE: &'static str = "devices";
    const TAG: &'static str = "Device";

    fn key(&self) -> Uuid {
        self.uuid
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn optional_fields_accept_null_and_absence() {
        let device: Device = serde_json::from_value(json!({
            "uuid": "3f2a1b4c-5d6e-4f70-8a9b-0c1d2e3f4a5b",
            "name": null,
            "mac": [1, 2, 3, 4, 5, 6],
            "lastActivity": "2025-03-01T12:00:00Z",
            "enabled": true
        }))
        .unwrap();
        assert!(device.name.is_none());
        assert!(device.battery.is_none());
        assert!(device.validate().is_ok());
    }

    #[test]
    fn battery_above_hundred_is_invalid() {
        let device: Device = serde_json::from_value(json!({
            "uuid": "3f2a1b4c-5d6e-4f70-8a9b-0c1d2e3f4a5b",
            "mac": [1, 2, 3, 4, 5, 6],
            "lastActivity": "2025-03-01T12:00:00Z",
            "enabled": false,
            "battery": 101
        }))
        .unwrap();
        assert!(device.validate().is_err());
    }
}
