//! Reactive data layer between `evac-api` and its consumers (CLI, UIs).
//!
//! - **[`Service`]**: a named, persisted, reactive value. Sources fold the
//!   inbound frame stream into full replacements, fairly merged; consumers
//!   use [`get()`](Service::get), [`set()`](Service::set),
//!   [`subscribe()`](Service::subscribe) and typed actions such as
//!   `Locations::create`.
//!
//! - **[`Orchestrator`]**: binds one [`Connection`](evac_api::Connection)
//!   to every service and restarts the whole pipeline after any failure.
//!
//! - **[`Services`]**: the registry of entity services, built once at the
//!   composition root.
//!
//! - **[`storage`]**: the raw key-value collaborator services persist
//!   through, with in-memory, on-disk and namespaced implementations.
//!
//! - **Domain model** ([`model`]) and the tagged wire [`codec`]s.

pub mod codec;
pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod service;
pub mod services;
pub mod storage;

// ── Primary re-exports ──────────────────────────────────────────────
pub use codec::{Codec, CodecError, ItemCodec, KeyCodec, ListCodec, NameCodec};
pub use config::{Credentials, OrchestratorConfig, ServiceOptions};
pub use error::CoreError;
pub use orchestrator::{ConnectionState, Orchestrator, orchestrate};
pub use service::{
    ManagedService, MessageParser, RunningService, Seed, Service, ServiceDefinition,
    StartOptions, StateHandle,
};
pub use services::{
    Activities, Alarms, BackupService, ConfigService, Contacts, Devices, Emails, Locations, Rooms,
    Scanners, Services,
};
pub use storage::{FileStorage, MemoryStorage, SharedStorage, Storage, StorageError};

pub use model::{
    Activity, Alarm, AlarmForm, AppConfig, Backups, Collection, Contact, ContactChannel,
    ContactForm, ContactKind, Creatable, Device, Email, EmailForm, Entity, Identity, Location,
    LocationForm, MacAddress, Room, RoomForm, Scanner,
};
