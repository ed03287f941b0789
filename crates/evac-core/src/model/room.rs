use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Creatable, Entity, Identity, require_v4};

/// A point `[x, y]` on the floor plan.
pub type Point = [f64; 2];

/// A room inside a location, outlined by a polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub uuid: Uuid,
    pub name: String,
    /// Owning location.
    pub location: Uuid,
    /// Boundary polygon.
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomForm {
    pub name: String,
    pub location: Uuid,
    pub points: Vec<Point>,
}

impl Identity for Room {
    fn validate(&self) -> Result<(), String> {
        require_v4("uuid", self.uuid)?;
        if self.points.iter().flatten().any(|c| !c.is_finite()) {
            return Err("points must be finite".into());
        }
        Ok(())
    }
}

impl Entity for Room {
    const SCOPE: &'static str = "rooms";
    const TAG: &'static str = "Room";

    fn key(&self) -> Uuid {
        self.uuid
    }
}

impl Creatable for Room {
    type Form = RoomForm;

    fn create(form: RoomForm, uuid: Uuid) -> Self {
        Self {
            uuid,
            name: form.name,
            location: form.location,
            points: form.points,
        }
    }
}
