use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Entity, Identity, MacAddress, require, require_v4};

/// A fixed BLE scanner installed in a room. Scanners register themselves
/// with the server, so the operator can only edit or remove them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scanner {
    pub uuid: Uuid,
    pub name: String,
    pub room: Uuid,
    pub ip: IpAddr,
    pub port: u16,
    pub mac: MacAddress,
    pub buzzer: bool,
    pub scan: bool,
    pub led: bool,
    pub last_activity: DateTime<Utc>,
}

impl Identity for Scanner {
    fn validate(&self) -> Result<(), String> {
        require_v4("uuid", self.uuid)?;
        require("name", &self.name)
    }
}

impl Entity for Scanner {
    const SCOPE: &'static str = "scanners";
    const TAG: &'static str = "Scanner";

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
    fn decodes_wire_form() {
        let scanner: Scanner = serde_json::from_value(json!({
            "uuid": "5d7a1c9e-2f4b-4e8a-9c3d-1a2b3c4d5e6f",
            "name": "Hall",
            "room": "8e2f4a6b-1c3d-4e5f-8a9b-0c1d2e3f4a5b",
            "ip": "192.168.1.40",
            "port": 4242,
            "mac": [0, 17, 34, 51, 68, 85],
            "buzzer": false,
            "scan": true,
            "led": true,
            "lastActivity": "2025-03-01T12:00:00Z"
        }))
        .unwrap();

        assert_eq!(scanner.mac.to_string(), "00:11:22:33:44:55");
        assert_eq!(scanner.port, 4242);
        assert!(scanner.validate().is_ok());

        let back = serde_json::to_value(&scanner).unwrap();
        assert_eq!(back["lastActivity"], "2025-03-01T12:00:00Z");
    }

    #[test]
    fn port_out_of_range_fails_to_decode() {
        let result = serde_json::from_value::<Scanner>(json!({
            "uuid": "5d7a1c9e-2f4b-4e8a-9c3d-1a2b3c4d5e6f",
            "name": "Hall",
            "room": "8e2f4a6b-1c3d-4e5f-8a9b-0c1d2e3f4a5b",
            "ip": "::1",
            "port": 70000,
            "mac": [0, 0, 0, 0, 0, 0],
            "buzzer": false,
            "scan": false,
            "led": false,
            "lastActivity": "2025-03-01T12:00:00Z"
        }));
        assert!(result.is_err());
    }
}
