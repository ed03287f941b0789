// ── Domain model ──
//
// Canonical types for everything the operator endpoint manages. Each
// collection entity is keyed by a UUID and speaks the same five wire tags
// (`<Tag>List`, `<Tag>Set`, `<Tag>Detail`, `<Tag>Remove`, `<Tag>Removed`).
// Backups are the exception: a set of names.

pub mod activity;
pub mod alarm;
pub mod app_config;
pub mod backup;
pub mod contact;
pub mod device;
pub mod email;
pub mod location;
pub mod mac;
pub mod room;
pub mod scanner;

use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

pub use activity::{Activity, Timestamp};
pub use alarm::{Alarm, AlarmForm};
pub use app_config::{AppConfig, BaseConfig, EmailAddress, EmailConfig, NotificationConfig, SmsConfig};
pub use backup::{BACKUP_SCOPE, Backups};
pub use contact::{Contact, ContactChannel, ContactForm, ContactKind};
pub use device::Device;
pub use email::{Email, EmailForm};
pub use location::{Location, LocationForm};
pub use mac::MacAddress;
pub use room::{Point, Room, RoomForm};
pub use scanner::Scanner;

/// A value a service can hold, persist and trust.
///
/// Anything read back from storage or off the wire is only accepted after
/// [`validate`](Self::validate) passes.
pub trait Identity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// A keyed member of a [`Collection`].
pub trait Entity: Identity + PartialEq {
    /// Service name and storage namespace.
    const SCOPE: &'static str;
    /// Wire tag stem, e.g. `"Location"`.
    const TAG: &'static str;

    fn key(&self) -> Uuid;
}

/// An entity the operator may create from a form; the key is synthesized.
pub trait Creatable: Entity {
    type Form: Clone + Send + Sync + std::fmt::Debug + 'static;

    fn create(form: Self::Form, uuid: Uuid) -> Self;
}

/// Entities keyed by UUID, in wire order.
pub type Collection<E> = IndexMap<Uuid, E>;

impl<E: Entity> Identity for Collection<E> {
    fn validate(&self) -> Result<(), String> {
        for (key, entity) in self {
            if entity.key() != *key {
                return Err(format!("entry {key} holds {}", entity.key()));
            }
            entity.validate()?;
        }
        Ok(())
    }
}

// ── Validation helpers ───────────────────────────────────────────────

pub(crate) fn require(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        Err(format!("{field} is required"))
    } else {
        Ok(())
    }
}

pub(crate) fn require_v4(field: &str, value: Uuid) -> Result<(), String> {
    if value.get_version_num() == 4 {
        Ok(())
    } else {
        Err(format!("{field} must be a version 4 UUID, got {value}"))
    }
}
