use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Creatable, Entity, Identity, require_v4};

/// A reusable message template for mail notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub uuid: Uuid,
    pub name: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailForm {
    pub name: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl Identity for Email {
    fn validate(&self) -> Result<(), String> {
        require_v4("uuid", self.uuid)
    }
}

impl Entity for Email {
    const SCOPE: &'static str = "emails";
    const TAG: &'static str = "Email";

    fn key(&self) -> Uuid {
        self.uuid
    }
}

impl Creatable for Email {
    type Form = EmailForm;

    fn create(form: EmailForm, uuid: Uuid) -> Self {
        let EmailForm {
            name,
            subject,
            text,
            html,
        } = form;
        Self {
            uuid,
            name,
            subject,
            text,
            html,
        }
    }
}
