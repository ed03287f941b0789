//! Location, room, alarm, contact, email, backup and activity command handlers.
//!
//! Each one connects, invokes a single action, waits for the server to echo
//! the change back, then disconnects. `backup restore` has no echo and only
//! sends.

use std::fmt;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use evac_core::service::CollectionActions;
use evac_core::{
    Collection, ContactChannel, ContactForm, ContactKind, Creatable, EmailForm, LocationForm,
    RoomForm, Service,
};

use crate::cli::{
    ActivityArgs, ActivityCommand, AlarmArgs, AlarmCommand, BackupArgs, BackupCommand,
    ContactArgs, ContactCommand, EmailArgs, EmailCommand, GlobalOpts, LocationArgs,
    LocationCommand, RoomArgs, RoomCommand,
};
use crate::config::Session;
use crate::error::CliError;
use crate::output;

use super::runtime::{Runtime, await_echo};

// ── Outcome ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Outcome<K> {
    service: &'static str,
    action: &'static str,
    key: K,
}

fn report<K>(outcome: &Outcome<K>, global: &GlobalOpts) -> Result<(), CliError>
where
    K: Serialize + fmt::Display,
{
    let out = output::render_single(
        global.output,
        outcome,
        |o| format!("{} {}: {}", o.service, o.action, o.key),
        |o| o.key.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Shared create / remove ──────────────────────────────────────────

async fn create<E: Creatable>(
    service: &Service<Collection<E>, CollectionActions<E>>,
    form: E::Form,
) -> Result<Uuid, CliError> {
    let updates = service.subscribe();
    let uuid = service.create(form).await?;
    await_echo(updates, |collection| collection.contains_key(&uuid)).await?;
    Ok(uuid)
}

async fn remove<E: Creatable>(
    service: &Service<Collection<E>, CollectionActions<E>>,
    uuid: Uuid,
) -> Result<Uuid, CliError> {
    let updates = service.subscribe();
    service.remove(uuid).await?;
    if service.get().await.is_none() {
        debug!(service = service.name(), %uuid, "nothing cached, no echo to wait for");
        return Ok(uuid);
    }
    await_echo(updates, |collection| !collection.contains_key(&uuid)).await?;
    Ok(uuid)
}

/// Start a runtime, run the body under the deadline, then shut down.
macro_rules! connected {
    ($session:expr, $global:expr, |$services:ident| $body:expr) => {{
        let runtime = Runtime::start($session, $global.timeout);
        let result = {
            let $services = &runtime.services;
            runtime.within($body).await
        };
        runtime.shutdown().await;
        result
    }};
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn location(
    args: LocationArgs,
    session: &Session,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (action, uuid) = match args.command {
        LocationCommand::Create { name } => {
            let form = LocationForm { name };
            ("create", connected!(session, global, |s| create(&s.locations, form))?)
        }
        LocationCommand::Remove { uuid } => {
            ("remove", connected!(session, global, |s| remove(&s.locations, uuid))?)
        }
    };
    report(
        &Outcome {
            service: "locations",
            action,
            key: uuid,
        },
        global,
    )
}

pub async fn room(args: RoomArgs, session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let (action, uuid) = match args.command {
        RoomCommand::Create {
            name,
            location,
            points,
        } => {
            let form = RoomForm {
                name,
                location,
                points,
            };
            ("create", connected!(session, global, |s| create(&s.rooms, form))?)
        }
        RoomCommand::Remove { uuid } => {
            ("remove", connected!(session, global, |s| remove(&s.rooms, uuid))?)
        }
    };
    report(
        &Outcome {
            service: "rooms",
            action,
            key: uuid,
        },
        global,
    )
}

pub async fn alarm(args: AlarmArgs, session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let AlarmCommand::Remove { uuid } = args.command;
    let uuid = connected!(session, global, |s| remove(&s.alarms, uuid))?;
    report(
        &Outcome {
            service: "alarms",
            action: "remove",
            key: uuid,
        },
        global,
    )
}

pub async fn contact(
    args: ContactArgs,
    session: &Session,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (action, uuid) = match args.command {
        ContactCommand::Create {
            name,
            channel,
            address,
        } => {
            let kind = match channel {
                ContactChannel::Sms => ContactKind::Sms { number: address },
                ContactChannel::Email => ContactKind::Email { email: address },
            };
            let form = ContactForm { name, kind };
            ("create", connected!(session, global, |s| create(&s.contacts, form))?)
        }
        ContactCommand::Remove { uuid } => {
            ("remove", connected!(session, global, |s| remove(&s.contacts, uuid))?)
        }
    };
    report(
        &Outcome {
            service: "contacts",
            action,
            key: uuid,
        },
        global,
    )
}

pub async fn email(args: EmailArgs, session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let (action, uuid) = match args.command {
        EmailCommand::Create {
            name,
            subject,
            text,
            html,
        } => {
            let form = EmailForm {
                name,
                subject,
                text,
                html,
            };
            ("create", connected!(session, global, |s| create(&s.emails, form))?)
        }
        EmailCommand::Remove { uuid } => {
            ("remove", connected!(session, global, |s| remove(&s.emails, uuid))?)
        }
    };
    report(
        &Outcome {
            service: "emails",
            action,
            key: uuid,
        },
        global,
    )
}

pub async fn backup(args: BackupArgs, session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let (action, name) = match args.command {
        BackupCommand::Save { name } => {
            let saved = connected!(session, global, |s| async {
                let backups = &s.backups;
                let updates = backups.subscribe();
                backups.save(name.as_str()).await?;
                await_echo(updates, |names| names.contains(&name)).await?;
                Ok::<_, CliError>(name.clone())
            })?;
            ("save", saved)
        }
        BackupCommand::Remove { name } => {
            let removed = connected!(session, global, |s| async {
                let backups = &s.backups;
                let updates = backups.subscribe();
                backups.remove(name.as_str()).await?;
                if backups.get().await.is_some() {
                    await_echo(updates, |names| !names.contains(&name)).await?;
                }
                Ok::<_, CliError>(name.clone())
            })?;
            ("remove", removed)
        }
        BackupCommand::Restore { name } => {
            // The server answers with fresh config, not an echo.
            connected!(session, global, |s| async {
                s.backups.restore(name.as_str()).await.map_err(CliError::from)
            })?;
            ("restore", name)
        }
    };
    report(
        &Outcome {
            service: "backups",
            action,
            key: name,
        },
        global,
    )
}

pub async fn activity(
    args: ActivityArgs,
    session: &Session,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let ActivityCommand::Clean { older_than } = args.command;
    let dropped = connected!(session, global, |s| async {
        s.activity.clean(older_than).await.map_err(CliError::from)
    })?;
    output::print_output(
        &format!(
            "dropped {dropped} sighting(s) older than {}",
            humantime::format_duration(older_than)
        ),
        global.quiet,
    );
    Ok(())
}
