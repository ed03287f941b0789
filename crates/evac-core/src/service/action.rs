// ── Actions ──
//
// Outbound, connection-gated operations. Each service resolves its action
// set once at construction; `Service::invoke` dispatches a tagged action
// variant to it with the active connection.

use std::convert::Infallible;
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use chrono::Utc;
use evac_api::Connection;
use futures_util::future::{self, BoxFuture, FutureExt};
use serde::Serialize;
use strum::IntoStaticStr;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Seed, Service, StateHandle};
use crate::codec::{Codec, ItemCodec, KeyCodec, NameCodec};
use crate::error::CoreError;
use crate::model::activity::retain_recent;
use crate::model::{Activity, Backups, Collection, Creatable, Entity, Identity};

/// What an action handler gets to work with.
#[derive(Debug, Clone)]
pub struct ActionContext<T> {
    pub state: StateHandle<T>,
    pub connection: Connection,
}

/// The static dispatch table of a service.
pub trait ActionSet<T: Identity>: Send + Sync + 'static {
    type Action: Send + 'static;
    type Output: Send + 'static;

    /// Short name used in logs and errors.
    fn name(action: &Self::Action) -> &'static str;

    fn perform(
        &self,
        context: ActionContext<T>,
        action: Self::Action,
    ) -> BoxFuture<'static, Result<Self::Output, CoreError>>;
}

/// A service without actions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoActions;

impl<T: Identity> ActionSet<T> for NoActions {
    type Action = Infallible;
    type Output = ();

    fn name(action: &Infallible) -> &'static str {
        match *action {}
    }

    fn perform(&self, _: ActionContext<T>, action: Infallible) -> BoxFuture<'static, Result<(), CoreError>> {
        match action {}
    }
}

// ── Wire helpers ─────────────────────────────────────────────────────

fn send_set<E: Entity>(connection: &Connection, entity: &E) -> Result<(), CoreError> {
    entity.validate().map_err(CoreError::validation)?;
    let frame = ItemCodec::<E>::set().encode(entity)?;
    connection.send(frame)?;
    Ok(())
}

fn send_remove<E: Entity>(connection: &Connection, key: Uuid) -> Result<(), CoreError> {
    let frame = KeyCodec::remove::<E>().encode(&key)?;
    connection.send(frame)?;
    Ok(())
}

// ── Create / update / remove ─────────────────────────────────────────

#[derive(Clone, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum CollectionAction<E: Creatable> {
    Create(E::Form),
    Update(E),
    Remove(Uuid),
}

impl<E: Creatable + fmt::Debug> fmt::Debug for CollectionAction<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create(form) => f.debug_tuple("Create").field(form).finish(),
            Self::Update(entity) => f.debug_tuple("Update").field(entity).finish(),
            Self::Remove(key) => f.debug_tuple("Remove").field(key).finish(),
        }
    }
}

/// Actions of an entity the operator may create. Every variant resolves to
/// the key it touched; `Create` synthesizes a fresh v4 key.
pub struct CollectionActions<E>(PhantomData<fn() -> E>);

impl<E> Default for CollectionActions<E> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<E> fmt::Debug for CollectionActions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CollectionActions")
    }
}

impl<E: Creatable> ActionSet<Collection<E>> for CollectionActions<E> {
    type Action = CollectionAction<E>;
    type Output = Uuid;

    fn name(action: &CollectionAction<E>) -> &'static str {
        action.into()
    }

    fn perform(
        &self,
        context: ActionContext<Collection<E>>,
        action: CollectionAction<E>,
    ) -> BoxFuture<'static, Result<Uuid, CoreError>> {
        let connection = &context.connection;
        let result = match action {
            CollectionAction::Create(form) => {
                let key = Uuid::new_v4();
                let entity = E::create(form, key);
                send_set(connection, &entity).map(|()| key)
            }
            CollectionAction::Update(entity) => send_set(connection, &entity).map(|()| entity.key()),
            CollectionAction::Remove(key) => send_remove::<E>(connection, key).map(|()| key),
        };
        if let Ok(key) = &result {
            debug!(service = %context.state.name(), %key, "request sent");
        }
        future::ready(result).boxed()
    }
}

// ── Update / remove ──────────────────────────────────────────────────

#[derive(Debug, Clone, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum EditAction<E> {
    Update(E),
    Remove(Uuid),
}

/// Actions of an entity that only the server creates.
pub struct EditActions<E>(PhantomData<fn() -> E>);

impl<E> Default for EditActions<E> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<E> fmt::Debug for EditActions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EditActions")
    }
}

impl<E: Entity> ActionSet<Collection<E>> for EditActions<E> {
    type Action = EditAction<E>;
    type Output = Uuid;

    fn name(action: &EditAction<E>) -> &'static str {
        action.into()
    }

    fn perform(
        &self,
        context: ActionContext<Collection<E>>,
        action: EditAction<E>,
    ) -> BoxFuture<'static, Result<Uuid, CoreError>> {
        let connection = &context.connection;
        let result = match action {
            EditAction::Update(entity) => send_set(connection, &entity).map(|()| entity.key()),
            EditAction::Remove(key) => send_remove::<E>(connection, key).map(|()| key),
        };
        future::ready(result).boxed()
    }
}

// ── Activity ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ActivityAction {
    /// Forget sightings older than the threshold.
    Clean(Duration),
}

/// Local housekeeping for the activity log. Resolves to the number of
/// entries dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityActions;

impl ActionSet<Collection<Activity>> for ActivityActions {
    type Action = ActivityAction;
    type Output = usize;

    fn name(action: &ActivityAction) -> &'static str {
        action.into()
    }

    fn perform(
        &self,
        context: ActionContext<Collection<Activity>>,
        action: ActivityAction,
    ) -> BoxFuture<'static, Result<usize, CoreError>> {
        let ActivityAction::Clean(threshold) = action;
        async move {
            let state = context.state;
            let current = state.get().await.unwrap_or_default();
            let kept = retain_recent(&current, threshold, Utc::now());
            let dropped = current.len() - kept.len();
            state.set(kept, Seed::None).await?;
            info!(service = %state.name(), dropped, "activity cleaned");
            Ok(dropped)
        }
        .boxed()
    }
}

// ── Backups ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum BackupAction {
    /// Snapshot the server configuration under a name.
    Save(String),
    Remove(String),
    /// Roll the server configuration back to a named backup.
    Restore(String),
}

fn send_name(connection: &Connection, tag: &str, name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::validation("backup name is required"));
    }
    let frame = NameCodec::with_tag(tag).encode(&name.to_owned())?;
    connection.send(frame)?;
    Ok(())
}

/// Requests against the server's configuration backups. Nothing changes
/// locally until the server announces the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackupActions;

impl ActionSet<Backups> for BackupActions {
    type Action = BackupAction;
    type Output = ();

    fn name(action: &BackupAction) -> &'static str {
        action.into()
    }

    fn perform(
        &self,
        context: ActionContext<Backups>,
        action: BackupAction,
    ) -> BoxFuture<'static, Result<(), CoreError>> {
        let (tag, name) = match &action {
            BackupAction::Save(name) => ("Backup", name),
            BackupAction::Remove(name) => ("BackupRemove", name),
            BackupAction::Restore(name) => ("Restore", name),
        };
        let result = send_name(&context.connection, tag, name);
        if result.is_ok() {
            debug!(service = %context.state.name(), %name, tag, "request sent");
        }
        future::ready(result).boxed()
    }
}

// ── Named convenience methods ────────────────────────────────────────

impl<E: Creatable> Service<Collection<E>, CollectionActions<E>> {
    /// Ask the server to create an entity; resolves to the synthesized key.
    pub async fn create(&self, form: E::Form) -> Result<Uuid, CoreError> {
        self.invoke(CollectionAction::Create(form)).await
    }

    pub async fn update(&self, entity: E) -> Result<Uuid, CoreError> {
        self.invoke(CollectionAction::Update(entity)).await
    }

    pub async fn remove(&self, key: Uuid) -> Result<Uuid, CoreError> {
        self.invoke(CollectionAction::Remove(key)).await
    }
}

impl<E: Entity> Service<Collection<E>, EditActions<E>> {
    pub async fn update(&self, entity: E) -> Result<Uuid, CoreError> {
        self.invoke(EditAction::Update(entity)).await
    }

    pub async fn remove(&self, key: Uuid) -> Result<Uuid, CoreError> {
        self.invoke(EditAction::Remove(key)).await
    }
}

impl Service<Collection<Activity>, ActivityActions> {
    pub async fn clean(&self, threshold: Duration) -> Result<usize, CoreError> {
        self.invoke(ActivityAction::Clean(threshold)).await
    }
}

impl Service<Backups, BackupActions> {
    pub async fn save(&self, name: impl Into<String>) -> Result<(), CoreError> {
        self.invoke(BackupAction::Save(name.into())).await
    }

    pub async fn remove(&self, name: impl Into<String>) -> Result<(), CoreError> {
        self.invoke(BackupAction::Remove(name.into())).await
    }

    pub async fn restore(&self, name: impl Into<String>) -> Result<(), CoreError> {
        self.invoke(BackupAction::Restore(name.into())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Location, LocationForm, Scanner};

    #[test]
    fn action_names_are_snake_case() {
        let create: CollectionAction<Location> = CollectionAction::Create(LocationForm::default());
        assert_eq!(CollectionActions::<Location>::name(&create), "create");
        assert_eq!(
            CollectionActions::<Location>::name(&CollectionAction::Remove(Uuid::nil())),
            "remove"
        );
        assert_eq!(
            EditActions::<Scanner>::name(&EditAction::Remove(Uuid::nil())),
            "remove"
        );
        assert_eq!(
            ActivityActions::name(&ActivityAction::Clean(Duration::from_secs(1))),
            "clean"
        );
        assert_eq!(BackupActions::name(&BackupAction::Restore("nightly".into())), "restore");
    }
}
