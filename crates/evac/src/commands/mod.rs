//! Command handlers and dispatch for connected commands.

pub mod config_cmd;
pub mod entities;
pub mod runtime;
pub mod show;
pub mod watch;

use crate::cli::{Command, GlobalOpts};
use crate::config::Session;
use crate::error::CliError;

/// Route a command that needs an operator connection.
pub async fn dispatch(cmd: Command, session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(args, session, global).await,
        Command::Location(args) => entities::location(args, session, global).await,
        Command::Room(args) => entities::room(args, session, global).await,
        Command::Alarm(args) => entities::alarm(args, session, global).await,
        Command::Contact(args) => entities::contact(args, session, global).await,
        Command::Email(args) => entities::email(args, session, global).await,
        Command::Backup(args) => entities::backup(args, session, global).await,
        Command::Activity(args) => entities::activity(args, session, global).await,
        // Handled before a session is resolved.
        Command::Show(_) | Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
