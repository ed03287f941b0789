//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Config as TOML with every stored password masked.
fn format_config_redacted(cfg: &Config) -> Result<String, CliError> {
    let mut redacted = cfg.clone();
    for profile in redacted.profiles.values_mut() {
        if profile.password.is_some() {
            profile.password = Some("****".into());
        }
    }
    Ok(toml::to_string_pretty(&redacted)?)
}

fn profile_names(cfg: &Config) -> Vec<&str> {
    let mut names: Vec<_> = cfg.profiles.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
        }

        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            output::print_output(&format_config_redacted(&cfg)?, global.quiet);
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let active = config::active_profile_name(global, &cfg);
            let lines: Vec<String> = profile_names(&cfg)
                .into_iter()
                .map(|name| {
                    let marker = if name == active { "*" } else { " " };
                    let server = &cfg.profiles[name].server;
                    format!("{marker} {name}\t{server}")
                })
                .collect();
            output::print_output(&lines.join("\n"), global.quiet);
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: profile_names(&cfg).join(", "),
                    name,
                });
            }
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            output::print_output(&format!("default profile set to '{name}'"), global.quiet);
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Profile;

    #[test]
    fn passwords_are_masked() {
        let mut cfg = Config::default();
        let mut profile = Profile::new("http://localhost:3030");
        profile.password = Some("hunter2".into());
        cfg.profiles.insert("site".into(), profile);

        let text = format_config_redacted(&cfg).unwrap();
        assert!(text.contains("****"));
        assert!(!text.contains("hunter2"));
    }
}
