use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Creatable, Entity, Identity, require};

/// A site (building, campus wing) that rooms belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationForm {
    pub name: String,
}

impl Identity for Location {
    fn validate(&self) -> Result<(), String> {
        require("name", &self.name)
    }
}

impl Entity for Location {
    const SCOPE: &'static str = "locations";
    const TAG: &'static str = "Location";

    fn key(&self) -> Uuid {
        self.uuid
    }
}

impl Creatable for Location {
    type Form = LocationForm;

    fn create(form: LocationForm, uuid: Uuid) -> Self {
        Self {
            uuid,
            name: form.name,
        }
    }
}
