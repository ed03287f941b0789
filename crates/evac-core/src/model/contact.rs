use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Creatable, Entity, Identity};

/// Someone to notify when an alarm fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub uuid: Uuid,
    pub name: String,
    pub kind: ContactKind,
}

/// Delivery channel. Externally tagged on the wire:
/// `{"sms": {"number": ...}}` or `{"email": {"email": ...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
    Sms { number: String },
    Email { email: String },
}

/// Channel selector without an address, for forms and CLI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ContactChannel {
    Sms,
    Email,
}

impl ContactKind {
    /// The address to deliver to, whatever the channel.
    pub fn address(&self) -> &str {
        match self {
            Self::Sms { number } => number,
            Self::Email { email } => email,
        }
    }

    /// Blank kind for a form of the given channel.
    pub fn empty(channel: ContactChannel) -> Self {
        match channel {
            ContactChannel::Sms => Self::Sms {
                number: String::new(),
            },
            ContactChannel::Email => Self::Email {
                email: String::new(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactForm {
    pub name: String,
    pub kind: ContactKind,
}

impl Identity for Contact {}

impl Entity for Contact {
    const SCOPE: &'static str = "contacts";
    const TAG: &'static str = "Contact";

    fn key(&self) -> Uuid {
        self.uuid
    }
}

impl Creatable for Contact {
    type Form = ContactForm;

    fn create(form: ContactForm, uuid: Uuid) -> Self {
        Self {
            uuid,
            name: form.name,
            kind: form.kind,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn kind_is_externally_tagged() {
        let contact = Contact {
            uuid: Uuid::nil(),
            name: "Warden".into(),
            kind: ContactKind::Sms {
                number: "+4412345".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&contact).unwrap(),
            json!({
                "uuid": "00000000-0000-0000-0000-000000000000",
                "name": "Warden",
                "kind": { "sms": { "number": "+4412345" } }
            })
        );
    }

    #[test]
    fn channel_parses_from_lowercase() {
        let channel: ContactChannel = "email".parse().unwrap();
        assert_eq!(ContactKind::empty(channel).address(), "");
        assert_eq!(ContactChannel::Sms.to_string(), "sms");
    }
}
