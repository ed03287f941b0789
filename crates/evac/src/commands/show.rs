//! `evac show`: render a cached snapshot without connecting.

use std::fmt::Write as _;

use tabled::Tabled;

use evac_core::{Activity, Alarm, AppConfig, Contact, Device, Email, Location, Room, Scanner};

use crate::cli::{GlobalOpts, ServiceName, ShowArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::runtime::cached_services;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct LocationRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
}

impl From<&Location> for LocationRow {
    fn from(l: &Location) -> Self {
        Self {
            id: l.uuid.to_string(),
            name: l.name.clone(),
        }
    }
}

#[derive(Tabled)]
struct RoomRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Corners")]
    corners: usize,
}

impl From<&Room> for RoomRow {
    fn from(r: &Room) -> Self {
        Self {
            id: r.uuid.to_string(),
            name: r.name.clone(),
            location: r.location.to_string(),
            corners: r.points.len(),
        }
    }
}

#[derive(Tabled)]
struct ScannerRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Scan")]
    scan: bool,
    #[tabled(rename = "Last Seen")]
    last_activity: String,
}

impl From<&Scanner> for ScannerRow {
    fn from(s: &Scanner) -> Self {
        Self {
            id: s.uuid.to_string(),
            name: s.name.clone(),
            address: format!("{}:{}", s.ip, s.port),
            mac: s.mac.to_string(),
            scan: s.scan,
            last_activity: s.last_activity.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Enabled")]
    enabled: bool,
    #[tabled(rename = "Battery")]
    battery: String,
    #[tabled(rename = "Last Seen")]
    last_activity: String,
}

impl From<&Device> for DeviceRow {
    fn from(d: &Device) -> Self {
        Self {
            id: d.uuid.to_string(),
            name: d.name.clone().unwrap_or_default(),
            mac: d.mac.to_string(),
            enabled: d.enabled,
            battery: d.battery.map_or_else(|| "-".into(), |b| format!("{b}%")),
            last_activity: d.last_activity.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

#[derive(Tabled)]
struct AlarmRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Buzzer")]
    buzzer: bool,
    #[tabled(rename = "LED")]
    led: bool,
}

impl From<&Alarm> for AlarmRow {
    fn from(a: &Alarm) -> Self {
        Self {
            id: a.uuid.to_string(),
            name: a.name.clone(),
            subject: a.subject.clone(),
            buzzer: a.buzzer,
            led: a.led,
        }
    }
}

#[derive(Tabled)]
struct ContactRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
}

impl From<&Contact> for ContactRow {
    fn from(c: &Contact) -> Self {
        Self {
            id: c.uuid.to_string(),
            name: c.name.clone(),
            address: c.kind.address().to_owned(),
        }
    }
}

#[derive(Tabled)]
struct EmailRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Subject")]
    subject: String,
}

impl From<&Email> for EmailRow {
    fn from(e: &Email) -> Self {
        Self {
            id: e.uuid.to_string(),
            name: e.name.clone(),
            subject: e.subject.clone(),
        }
    }
}

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "Backup")]
    name: String,
}

#[derive(Tabled)]
struct ActivityRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Scanner")]
    scanner: String,
    #[tabled(rename = "RSSI")]
    rssi: String,
    #[tabled(rename = "When")]
    timestamp: String,
}

impl From<&Activity> for ActivityRow {
    fn from(a: &Activity) -> Self {
        Self {
            device: a.device.to_string(),
            scanner: a.scanner.to_string(),
            rssi: format!("{:.1}", a.rssi),
            timestamp: a.timestamp.to_string(),
        }
    }
}

fn config_detail(c: &AppConfig) -> String {
    let mut out = String::new();
    let base = &c.base;
    let _ = writeln!(out, "Web port:        {}", base.port_web);
    let _ = writeln!(out, "Scanner port:    {}", base.port_scanner);
    let _ = writeln!(out, "Broadcast port:  {}", base.port_broadcast);
    let _ = writeln!(out, "Activity diff:   {}s", base.activity_diff);
    let _ = writeln!(out, "Routine:         {}s", base.routine);
    let _ = writeln!(out, "Query size:      {}", base.query_size);
    let _ = write!(out, "Data path:       {}", base.data_path);
    out
}

// ── Handler ─────────────────────────────────────────────────────────

/// Render one cached collection, or fail when nothing was ever cached.
macro_rules! render_collection {
    ($service:expr, $name:expr, $row:ty, $id:expr, $global:expr) => {{
        let snapshot = $service.peek().await.ok_or_else(|| CliError::NoSnapshot {
            service: $name.into(),
        })?;
        let items: Vec<_> = snapshot.into_values().collect();
        output::render_list($global.output, &items, |item| <$row>::from(item), $id)?
    }};
}

pub async fn handle(args: ShowArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (services, _) = cached_services(&config::cache_dir(global), None);
    let name = args.service.as_str();

    let out = match args.service {
        ServiceName::Locations => {
            render_collection!(services.locations, name, LocationRow, |l: &Location| l.uuid.to_string(), global)
        }
        ServiceName::Rooms => {
            render_collection!(services.rooms, name, RoomRow, |r: &Room| r.uuid.to_string(), global)
        }
        ServiceName::Scanners => {
            render_collection!(services.scanners, name, ScannerRow, |s: &Scanner| s.uuid.to_string(), global)
        }
        ServiceName::Devices => {
            render_collection!(services.devices, name, DeviceRow, |d: &Device| d.uuid.to_string(), global)
        }
        ServiceName::Alarms => {
            render_collection!(services.alarms, name, AlarmRow, |a: &Alarm| a.uuid.to_string(), global)
        }
        ServiceName::Contacts => {
            render_collection!(services.contacts, name, ContactRow, |c: &Contact| c.uuid.to_string(), global)
        }
        ServiceName::Emails => {
            render_collection!(services.emails, name, EmailRow, |e: &Email| e.uuid.to_string(), global)
        }
        ServiceName::Activity => {
            render_collection!(services.activity, name, ActivityRow, |a: &Activity| a.device.to_string(), global)
        }
        ServiceName::Config => {
            let snapshot = services.config.peek().await.ok_or_else(|| CliError::NoSnapshot {
                service: name.into(),
            })?;
            output::render_single(global.output, &snapshot, config_detail, |c| {
                c.base.port_web.clone()
            })?
        }
        ServiceName::Backups => {
            let snapshot = services.backups.peek().await.ok_or_else(|| CliError::NoSnapshot {
                service: name.into(),
            })?;
            let names: Vec<String> = snapshot.into_iter().collect();
            output::render_list(
                global.output,
                &names,
                |name| BackupRow { name: name.clone() },
                String::clone,
            )?
        }
    };

    output::print_output(&out, global.quiet);
    Ok(())
}
