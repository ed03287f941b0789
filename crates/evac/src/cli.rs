//! Clap derive structures for the `evac` CLI.
//!
//! Defines the command tree, global flags, and shared value types.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use evac_core::ContactChannel;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// evac -- operator console for the EVAC evacuation-alert network
#[derive(Debug, Parser)]
#[command(
    name = "evac",
    version,
    about = "Operate an EVAC evacuation-alert network from the command line",
    long_about = "Connects to the operator endpoint of an EVAC server, keeps a local\n\
        snapshot of every entity service, and sends create/remove actions.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Server profile to use
    #[arg(long, short = 'p', env = "EVAC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Server origin, e.g. http://10.0.0.2:3030 (overrides profile)
    #[arg(long, short = 's', env = "EVAC_SERVER", global = true)]
    pub server: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "EVAC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Give up on a one-shot command after this long (e.g. 10s, 1m)
    #[arg(
        long,
        env = "EVAC_TIMEOUT",
        default_value = "10s",
        value_parser = humantime::parse_duration,
        global = true
    )]
    pub timeout: Duration,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect and print every state replacement until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Print the cached snapshot of a service
    #[command(alias = "ls")]
    Show(ShowArgs),

    /// Manage locations
    #[command(alias = "loc")]
    Location(LocationArgs),

    /// Manage rooms
    Room(RoomArgs),

    /// Manage alarms
    Alarm(AlarmArgs),

    /// Manage notification contacts
    Contact(ContactArgs),

    /// Manage email templates
    Email(EmailArgs),

    /// Save, remove and restore server configuration backups
    Backup(BackupArgs),

    /// Maintain the local activity log
    Activity(ActivityArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch / Show ─────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only print this service
    #[arg(long, value_enum)]
    pub service: Option<ServiceName>,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Service whose snapshot to print
    #[arg(value_enum)]
    pub service: ServiceName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ServiceName {
    Locations,
    Rooms,
    Scanners,
    Devices,
    Alarms,
    Contacts,
    Emails,
    Activity,
    Config,
    Backups,
}

impl ServiceName {
    /// Registry name of the service.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Locations => "locations",
            Self::Rooms => "rooms",
            Self::Scanners => "scanners",
            Self::Devices => "devices",
            Self::Alarms => "alarms",
            Self::Contacts => "contacts",
            Self::Emails => "emails",
            Self::Activity => "activity",
            Self::Config => "config",
            Self::Backups => "backups",
        }
    }
}

// ── Entity commands ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct LocationArgs {
    #[command(subcommand)]
    pub command: LocationCommand,
}

#[derive(Debug, Subcommand)]
pub enum LocationCommand {
    /// Create a location and wait for the server to confirm it
    Create {
        #[arg(long)]
        name: String,
    },

    /// Remove a location (its rooms go with it)
    #[command(alias = "rm")]
    Remove { uuid: Uuid },
}

#[derive(Debug, Args)]
pub struct RoomArgs {
    #[command(subcommand)]
    pub command: RoomCommand,
}

#[derive(Debug, Subcommand)]
pub enum RoomCommand {
    /// Create a room inside a location
    Create {
        #[arg(long)]
        name: String,

        /// Owning location
        #[arg(long)]
        location: Uuid,

        /// Boundary corner as "x,y" (repeatable)
        #[arg(long = "point", value_parser = parse_point)]
        points: Vec<[f64; 2]>,
    },

    /// Remove a room
    #[command(alias = "rm")]
    Remove { uuid: Uuid },
}

#[derive(Debug, Args)]
pub struct AlarmArgs {
    #[command(subcommand)]
    pub command: AlarmCommand,
}

#[derive(Debug, Subcommand)]
pub enum AlarmCommand {
    /// Remove an alarm
    #[command(alias = "rm")]
    Remove { uuid: Uuid },
}

#[derive(Debug, Args)]
pub struct ContactArgs {
    #[command(subcommand)]
    pub command: ContactCommand,
}

#[derive(Debug, Subcommand)]
pub enum ContactCommand {
    /// Create a contact
    Create {
        #[arg(long)]
        name: String,

        /// Delivery channel (sms, email)
        #[arg(long)]
        channel: ContactChannel,

        /// Phone number or email address
        #[arg(long)]
        address: String,
    },

    /// Remove a contact
    #[command(alias = "rm")]
    Remove { uuid: Uuid },
}

#[derive(Debug, Args)]
pub struct EmailArgs {
    #[command(subcommand)]
    pub command: EmailCommand,
}

#[derive(Debug, Subcommand)]
pub enum EmailCommand {
    /// Create an email template
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        subject: String,

        /// Plain-text body
        #[arg(long)]
        text: String,

        /// HTML body
        #[arg(long, default_value = "")]
        html: String,
    },

    /// Remove an email template
    #[command(alias = "rm")]
    Remove { uuid: Uuid },
}

#[derive(Debug, Args)]
pub struct BackupArgs {
    #[command(subcommand)]
    pub command: BackupCommand,
}

#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    /// Snapshot the server configuration and wait for it to be listed
    Save { name: String },

    /// Delete a backup
    #[command(alias = "rm")]
    Remove { name: String },

    /// Roll the server configuration back to a backup
    Restore { name: String },
}

#[derive(Debug, Args)]
pub struct ActivityArgs {
    #[command(subcommand)]
    pub command: ActivityCommand,
}

#[derive(Debug, Subcommand)]
pub enum ActivityCommand {
    /// Drop entries older than the given age from the local log
    Clean {
        /// Maximum age to keep (e.g. 15m, 2h)
        #[arg(long, value_parser = humantime::parse_duration)]
        older_than: Duration,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display current resolved configuration
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

// ── Value parsers ────────────────────────────────────────────────────

fn parse_point(raw: &str) -> Result<[f64; 2], String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected \"x,y\", got \"{raw}\""))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid coordinate \"{v}\": {e}"))
    };
    Ok([parse(x)?, parse(y)?])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn points_parse_from_pairs() {
        assert_eq!(parse_point("1.5, -2").unwrap(), [1.5, -2.0]);
        assert!(parse_point("1.5").is_err());
        assert!(parse_point("a,b").is_err());
    }

    #[test]
    fn service_names_match_the_registry() {
        let names: Vec<_> = ServiceName::value_variants()
            .iter()
            .map(|s| s.as_str())
            .collect();
        assert_eq!(names, evac_core::Services::names());
    }
}
