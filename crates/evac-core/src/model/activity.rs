use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Collection, Entity, Identity, require_v4};

/// The most recent sighting of a device by a scanner. At most one per
/// device is kept, so the collection is keyed by `device`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub device: Uuid,
    pub scanner: Uuid,
    pub rssi: f64,
    pub timestamp: Timestamp,
}

/// When a sighting happened. The server sends either an RFC 3339 string
/// or epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    Text(String),
}

impl Timestamp {
    /// Epoch milliseconds, if the value can be interpreted.
    pub fn as_millis(&self) -> Option<i64> {
        match self {
            Self::Millis(ms) => Some(*ms),
            Self::Text(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|t| t.timestamp_millis()),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Millis(ms) => match DateTime::<Utc>::from_timestamp_millis(*ms) {
                Some(t) => write!(f, "{}", t.to_rfc3339()),
                None => write!(f, "{ms}"),
            },
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl Identity for Activity {
    fn validate(&self) -> Result<(), String> {
        require_v4("device", self.device)?;
        require_v4("scanner", self.scanner)
    }
}

impl Entity for Activity {
    const SCOPE: &'static str = "activity";
    const TAG: &'static str = "Activity";

    fn key(&self) -> Uuid {
        self.device
    }
}

/// Drop sightings older than `threshold` relative to `now`.
///
/// Entries whose timestamp cannot be interpreted are kept.
pub fn retain_recent(
    activities: &Collection<Activity>,
    threshold: Duration,
    now: DateTime<Utc>,
) -> Collection<Activity> {
    let threshold_ms = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
    let now_ms = now.timestamp_millis();
    activities
        .iter()
        .filter(|(_, activity)| {
            activity
                .timestamp
                .as_millis()
                .is_none_or(|seen| now_ms.saturating_sub(seen) <= threshold_ms)
        })
        .map(|(key, activity)| (*key, activity.clone()))
        .collect()
}
