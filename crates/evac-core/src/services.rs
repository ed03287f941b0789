// ── Entity services ──
//
// One service per entity, built once at the composition root and handed
// around by reference. `Services::managed()` is the heterogeneous list the
// orchestrator starts and stops.

use std::sync::Arc;

use crate::config::ServiceOptions;
use crate::model::{
    Activity, Alarm, AppConfig, BACKUP_SCOPE, Backups, Collection, Contact, Creatable, Device,
    Email, Entity, Location, Room, Scanner,
};
use crate::service::{
    ActionSet, ActivityActions, BackupActions, CollectionActions, EditActions, ManagedService,
    MessageParser, Service, ServiceDefinition, backup_added_source, backup_list_source,
    backup_removed_source, config_source, detail_source, list_source, location_removed_source,
    removed_source, upsert_source,
};
use crate::storage::SharedStorage;

pub type Locations = Service<Collection<Location>, CollectionActions<Location>>;
pub type Rooms = Service<Collection<Room>, CollectionActions<Room>>;
pub type Scanners = Service<Collection<Scanner>, EditActions<Scanner>>;
pub type Devices = Service<Collection<Device>, EditActions<Device>>;
pub type Alarms = Service<Collection<Alarm>, CollectionActions<Alarm>>;
pub type Contacts = Service<Collection<Contact>, CollectionActions<Contact>>;
pub type Emails = Service<Collection<Email>, CollectionActions<Email>>;
pub type Activities = Service<Collection<Activity>, ActivityActions>;
pub type ConfigService = Service<AppConfig>;
pub type BackupService = Service<Backups, BackupActions>;

/// Service name of the server configuration.
pub const CONFIG_SERVICE: &str = "config";

// ── Definitions ──────────────────────────────────────────────────────

/// List, detail and removed sources of a keyed entity.
pub fn entity_definition<E, A>(actions: A) -> ServiceDefinition<Collection<E>, A>
where
    E: Entity,
    A: ActionSet<Collection<E>>,
{
    ServiceDefinition::new(E::SCOPE)
        .source(list_source::<E>())
        .source(detail_source::<E>())
        .source(removed_source::<E>())
        .actions(actions)
}

fn creatable<E: Creatable>() -> ServiceDefinition<Collection<E>, CollectionActions<E>> {
    entity_definition(CollectionActions::default())
}

fn editable<E: Entity>() -> ServiceDefinition<Collection<E>, EditActions<E>> {
    entity_definition(EditActions::default())
}

pub fn locations() -> ServiceDefinition<Collection<Location>, CollectionActions<Location>> {
    creatable()
}

pub fn rooms() -> ServiceDefinition<Collection<Room>, CollectionActions<Room>> {
    creatable().source(location_removed_source())
}

pub fn scanners() -> ServiceDefinition<Collection<Scanner>, EditActions<Scanner>> {
    editable()
}

pub fn devices() -> ServiceDefinition<Collection<Device>, EditActions<Device>> {
    editable()
}

pub fn alarms() -> ServiceDefinition<Collection<Alarm>, CollectionActions<Alarm>> {
    creatable()
}

pub fn contacts() -> ServiceDefinition<Collection<Contact>, CollectionActions<Contact>> {
    creatable()
}

pub fn emails() -> ServiceDefinition<Collection<Email>, CollectionActions<Email>> {
    creatable()
}

/// `ActivityList` resets, `{ "Activity": ... }` upserts by device.
pub fn activity() -> ServiceDefinition<Collection<Activity>, ActivityActions> {
    ServiceDefinition::new(Activity::SCOPE)
        .source(list_source::<Activity>())
        .source(upsert_source::<Activity>("activity", Activity::TAG))
        .actions(ActivityActions)
}

pub fn config() -> ServiceDefinition<AppConfig> {
    ServiceDefinition::new(CONFIG_SERVICE).source(config_source())
}

pub fn backups() -> ServiceDefinition<Backups, BackupActions> {
    ServiceDefinition::new(BACKUP_SCOPE)
        .source(backup_list_source())
        .source(backup_added_source())
        .source(backup_removed_source())
        .actions(BackupActions)
}

// ── Registry ─────────────────────────────────────────────────────────

/// How the registry builds its services.
#[derive(Clone, Default)]
pub struct ServicesBuilder {
    options: ServiceOptions,
    storage: Option<SharedStorage>,
    parsers: Vec<(String, MessageParser)>,
}

impl ServicesBuilder {
    pub fn options(mut self, options: ServiceOptions) -> Self {
        self.options = options;
        self
    }

    /// Bind a shared store at construction, so cached values are readable
    /// before the first connection.
    pub fn storage(mut self, storage: SharedStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Feed the named service from `parser` instead of the raw messages.
    pub fn parser(mut self, service: impl Into<String>, parser: MessageParser) -> Self {
        self.parsers.push((service.into(), parser));
        self
    }

    fn finish<T, A>(&self, definition: ServiceDefinition<T, A>, name: &str) -> Service<T, A>
    where
        T: crate::model::Identity,
        A: ActionSet<T>,
    {
        let mut definition = definition.options(self.options);
        if let Some(storage) = &self.storage {
            definition = definition.storage(Arc::clone(storage));
        }
        if let Some((_, parser)) = self.parsers.iter().find(|(service, _)| service == name) {
            definition = definition.parser(Arc::clone(parser));
        }
        definition.build()
    }

    pub fn build(self) -> Services {
        Services {
            locations: self.finish(locations(), Location::SCOPE),
            rooms: self.finish(rooms(), Room::SCOPE),
            scanners: self.finish(scanners(), Scanner::SCOPE),
            devices: self.finish(devices(), Device::SCOPE),
            alarms: self.finish(alarms(), Alarm::SCOPE),
            contacts: self.finish(contacts(), Contact::SCOPE),
            emails: self.finish(emails(), Email::SCOPE),
            activity: self.finish(activity(), Activity::SCOPE),
            config: self.finish(config(), CONFIG_SERVICE),
            backups: self.finish(backups(), BACKUP_SCOPE),
        }
    }
}

impl std::fmt::Debug for ServicesBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicesBuilder")
            .field("options", &self.options)
            .field("storage", &self.storage)
            .field(
                "parsers",
                &self.parsers.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Every entity service, one instance each.
#[derive(Debug, Clone)]
pub struct Services {
    pub locations: Locations,
    pub rooms: Rooms,
    pub scanners: Scanners,
    pub devices: Devices,
    pub alarms: Alarms,
    pub contacts: Contacts,
    pub emails: Emails,
    pub activity: Activities,
    pub config: ConfigService,
    pub backups: BackupService,
}

impl Services {
    pub fn builder() -> ServicesBuilder {
        ServicesBuilder::default()
    }

    /// Services with default options and no storage.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// All services behind the type-erased lifecycle surface.
    pub fn managed(&self) -> Vec<Arc<dyn ManagedService>> {
        vec![
            Arc::new(self.locations.clone()),
            Arc::new(self.rooms.clone()),
            Arc::new(self.scanners.clone()),
            Arc::new(self.devices.clone()),
            Arc::new(self.alarms.clone()),
            Arc::new(self.contacts.clone()),
            Arc::new(self.emails.clone()),
            Arc::new(self.activity.clone()),
            Arc::new(self.config.clone()),
            Arc::new(self.backups.clone()),
        ]
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<dyn ManagedService>> {
        self.managed().into_iter().find(|service| service.name() == name)
    }

    /// Names of every service, in start order.
    pub fn names() -> [&'static str; 10] {
        [
            Location::SCOPE,
            Room::SCOPE,
            Scanner::SCOPE,
            Device::SCOPE,
            Alarm::SCOPE,
            Contact::SCOPE,
            Email::SCOPE,
            Activity::SCOPE,
            CONFIG_SERVICE,
            BACKUP_SCOPE,
        ]
    }
}

impl Default for Services {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn registry_lists_every_service_in_order() {
        let services = Services::new();
        let names: Vec<String> = services
            .managed()
            .iter()
            .map(|service| service.name().to_owned())
            .collect();
        assert_eq!(names, Services::names().map(str::to_owned).to_vec());
    }

    #[test]
    fn lookup_by_name() {
        let services = Services::new();
        assert_eq!(services.by_name("rooms").unwrap().name(), "rooms");
        assert_eq!(services.by_name("emails").unwrap().name(), "emails");
        assert_eq!(services.by_name("backups").unwrap().name(), "backups");
        assert!(services.by_name("nope").is_none());
    }

    #[test]
    fn services_start_stopped() {
        let services = Services::new();
        assert!(!services.locations.is_started());
        assert!(services.locations.connection().is_none());
    }
}
