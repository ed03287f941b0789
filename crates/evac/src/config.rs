//! CLI configuration: thin wrapper around `evac_config` shared types.
//!
//! Re-exports the shared types and adds resolution that respects
//! `GlobalOpts` flag overrides (--profile, --server).

use std::path::PathBuf;

use evac_core::{OrchestratorConfig, ServiceOptions};

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use evac_config::{
    Config, Profile, config_path, load_config_or_default, save_config,
};

/// Everything a connected command needs, resolved once.
#[derive(Debug, Clone)]
pub struct Session {
    pub profile_name: String,
    pub orchestrator: OrchestratorConfig,
    pub options: ServiceOptions,
    pub cache_dir: PathBuf,
}

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// The active profile with `--server` applied; `None` when neither exists.
fn active_profile(global: &GlobalOpts, config: &Config, name: &str) -> Option<Profile> {
    let mut profile = config.profiles.get(name).cloned();
    if let Some(ref server) = global.server {
        match profile {
            Some(ref mut p) => p.server.clone_from(server),
            None => profile = Some(Profile::new(server.clone())),
        }
    }
    profile
}

/// Snapshot directory of the active profile. Works without a server.
pub fn cache_dir(global: &GlobalOpts) -> PathBuf {
    let cfg = load_config_or_default();
    let name = active_profile_name(global, &cfg);
    let profile =
        active_profile(global, &cfg, &name).unwrap_or_else(|| Profile::new(String::new()));
    evac_config::profile_cache_dir(&profile, &name, &cfg.defaults)
}

/// Build the connected-command context from config, profile and flags.
pub fn resolve_session(global: &GlobalOpts) -> Result<Session, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let Some(profile) = active_profile(global, &cfg, &profile_name) else {
        // An explicit --profile that doesn't exist is a different mistake
        // than having nothing configured at all.
        if global.profile.is_some() {
            let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
            available.sort();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available.join(", "),
            });
        }
        return Err(CliError::NoConfig {
            path: config_path().display().to_string(),
        });
    };

    let orchestrator =
        evac_config::profile_to_orchestrator_config(&profile, &profile_name, &cfg.defaults)?;
    let options = evac_config::profile_to_service_options(&profile, &cfg.defaults);
    let cache_dir = evac_config::profile_cache_dir(&profile, &profile_name, &cfg.defaults);

    Ok(Session {
        profile_name,
        orchestrator,
        options,
        cache_dir,
    })
}
