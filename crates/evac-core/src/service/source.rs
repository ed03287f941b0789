// ── Sources ──
//
// A source turns the run's frame stream into full replacements of the
// service value. Frames it does not recognise are ignored; frames that
// carry its tag but fail to decode are logged and skipped. Incremental
// sources fold over the last accepted value, never over a store read.

use std::fmt;
use std::sync::Arc;

use async_stream::stream;
use evac_api::Frame;
use evac_api::stream::Boxed;
use futures_util::{StreamExt, future};
use tracing::{debug, info, trace};

use super::StateHandle;
use crate::codec::{Codec, ItemCodec, KeyCodec, ListCodec, NameCodec};
use crate::model::{AppConfig, Backups, Collection, Entity, Identity, Location, Room};

type Build<T> = dyn Fn(StateHandle<T>, Boxed<Frame>) -> Boxed<T> + Send + Sync;

/// A named fold from frames to service values. Instantiated afresh on
/// every start.
pub struct Source<T> {
    name: String,
    build: Arc<Build<T>>,
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            build: Arc::clone(&self.build),
        }
    }
}

impl<T: Identity> Source<T> {
    pub fn new(
        name: impl Into<String>,
        build: impl Fn(StateHandle<T>, Boxed<Frame>) -> Boxed<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            build: Arc::new(build),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn bind(&self, state: StateHandle<T>, frames: Boxed<Frame>) -> Boxed<T> {
        (self.build)(state, frames)
    }
}

impl<T> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source").field("name", &self.name).finish()
    }
}

/// Values `codec` accepts, in frame order.
pub(crate) fn recognised<C>(service: &str, codec: C, frames: Boxed<Frame>) -> Boxed<C::Output>
where
    C: Codec + 'static,
    C::Output: Send + 'static,
{
    let service = service.to_owned();
    frames
        .filter_map(move |frame| {
            future::ready(match codec.safe_parse(&frame) {
                Ok(value) => Some(value),
                Err(e) if e.is_unrecognized() => None,
                Err(e) => {
                    debug!(service = %service, error = %e, "skipping frame");
                    None
                }
            })
        })
        .boxed()
}

// ── Collection sources ───────────────────────────────────────────────

/// `<Tag>List` replaces the whole collection.
pub fn list_source<E: Entity>() -> Source<Collection<E>> {
    Source::new("list", |state: StateHandle<Collection<E>>, frames| {
        recognised(state.name(), ListCodec::<E>::new(), frames)
    })
}

/// `<Tag>Detail` inserts or replaces one entity.
pub fn detail_source<E: Entity>() -> Source<Collection<E>> {
    upsert_source::<E>("detail", format!("{}Detail", E::TAG))
}

/// Upsert every `{ tag: entity }` frame into the collection.
pub fn upsert_source<E: Entity>(
    name: impl Into<String>,
    tag: impl Into<String>,
) -> Source<Collection<E>> {
    let tag = tag.into();
    Source::new(name, move |state: StateHandle<Collection<E>>, frames| {
        let mut entities = recognised(state.name(), ItemCodec::<E>::with_tag(tag.clone()), frames);
        Box::pin(stream! {
            while let Some(entity) = entities.next().await {
                let mut current = state.current().unwrap_or_default();
                trace!(service = %state.name(), key = %entity.key(), "upsert");
                current.insert(entity.key(), entity);
                yield current;
            }
        })
    })
}

/// `<Tag>Removed` drops one entity. Unknown keys leave the value as is.
pub fn removed_source<E: Entity>() -> Source<Collection<E>> {
    Source::new("removed", |state: StateHandle<Collection<E>>, frames| {
        let mut keys = recognised(state.name(), KeyCodec::removed::<E>(), frames);
        Box::pin(stream! {
            while let Some(key) = keys.next().await {
                let Some(mut current) = state.current() else {
                    continue;
                };
                if current.shift_remove(&key).is_none() {
                    trace!(service = %state.name(), key = %key, "removed unknown key");
                    continue;
                }
                yield current;
            }
        })
    })
}

/// Rooms disappear together with their location.
pub fn location_removed_source() -> Source<Collection<Room>> {
    Source::new("location-removed", |state: StateHandle<Collection<Room>>, frames| {
        let mut locations = recognised(state.name(), KeyCodec::removed::<Location>(), frames);
        Box::pin(stream! {
            while let Some(location) = locations.next().await {
                let Some(rooms) = state.current() else {
                    continue;
                };
                let before = rooms.len();
                let kept: Collection<Room> = rooms
                    .into_iter()
                    .filter(|(_, room)| room.location != location)
                    .collect();
                let affected = before - kept.len();
                if affected == 0 {
                    continue;
                }
                info!(service = %state.name(), %location, affected, "dropped rooms of removed location");
                yield kept;
            }
        })
    })
}

// ── Backup sources ───────────────────────────────────────────────────

/// `BackupList` replaces the set of backup names.
pub fn backup_list_source() -> Source<Backups> {
    Source::new("list", |state: StateHandle<Backups>, frames| {
        recognised(state.name(), ItemCodec::<Backups>::with_tag("BackupList"), frames)
    })
}

/// `{ "Backup": name }` announces a new backup.
pub fn backup_added_source() -> Source<Backups> {
    Source::new("detail", |state: StateHandle<Backups>, frames| {
        let mut names = recognised(state.name(), NameCodec::with_tag("Backup"), frames);
        Box::pin(stream! {
            while let Some(name) = names.next().await {
                let mut current = state.current().unwrap_or_default();
                current.insert(name);
                yield current;
            }
        })
    })
}

/// `{ "BackupRemove": name }` drops one backup.
pub fn backup_removed_source() -> Source<Backups> {
    Source::new("removed", |state: StateHandle<Backups>, frames| {
        let mut names = recognised(state.name(), NameCodec::with_tag("BackupRemove"), frames);
        Box::pin(stream! {
            while let Some(name) = names.next().await {
                let Some(mut current) = state.current() else {
                    continue;
                };
                if !current.shift_remove(&name) {
                    trace!(service = %state.name(), %name, "removed unknown backup");
                    continue;
                }
                yield current;
            }
        })
    })
}

// ── Single-value sources ─────────────────────────────────────────────

/// `{ "Config": ... }` replaces the server configuration.
pub fn config_source() -> Source<AppConfig> {
    Source::new("config", |state: StateHandle<AppConfig>, frames| {
        recognised(state.name(), ItemCodec::<AppConfig>::with_tag("Config"), frames)
    })
}
