use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Creatable, Entity, Identity, require_v4};

/// An alarm template: what gets sent and which signals fire on the tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub uuid: Uuid,
    pub name: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub buzzer: bool,
    pub led: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmForm {
    pub name: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub buzzer: bool,
    pub led: bool,
}

impl Identity for Alarm {
    fn validate(&self) -> Result<(), String> {
        require_v4("uuid", self.uuid)
    }
}

impl Entity for Alarm {
    const SCOPE: &'static str = "alarms";
    const TAG: &'static str = "Alarm";

    fn key(&self) -> Uuid {
        self.uuid
    }
}

impl Creatable for Alarm {
    type Form = AlarmForm;

    fn create(form: AlarmForm, uuid: Uuid) -> Self {
        let AlarmForm {
            name,
            subject,
            text,
            html,
            buzzer,
            led,
        } = form;
        Self {
            uuid,
            name,
            subject,
            text,
            html,
            buzzer,
            led,
        }
    }
}
