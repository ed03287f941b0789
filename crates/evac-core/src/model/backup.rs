use indexmap::IndexSet;

use super::{Identity, require};

/// Service name and storage namespace of the backup list.
pub const BACKUP_SCOPE: &str = "backups";

/// Names of the configuration backups held by the server, in wire order.
pub type Backups = IndexSet<String>;

impl Identity for Backups {
    fn validate(&self) -> Result<(), String> {
        self.iter().try_for_each(|name| require("backup name", name))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn blank_names_are_rejected() {
        let backups: Backups = ["2024-05-01".to_owned()].into_iter().collect();
        assert!(backups.validate().is_ok());

        let backups: Backups = [String::new()].into_iter().collect();
        assert_eq!(backups.validate().unwrap_err(), "backup name is required");
    }

    #[test]
    fn wire_shape_is_a_plain_array() {
        let backups: Backups = serde_json::from_str(r#"["b", "a", "b"]"#).unwrap();
        assert_eq!(backups.len(), 2);
        assert_eq!(serde_json::to_string(&backups).unwrap(), r#"["b","a"]"#);
    }
}
