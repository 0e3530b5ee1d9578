//! Config commands

use std::path::{Path, PathBuf};

use super::CommandResult;
use crate::config::{self, SimConfig};
use crate::ConfigCommands;

pub fn handle(
    action: ConfigCommands,
    config: &SimConfig,
    explicit: Option<&Path>,
) -> CommandResult {
    match action {
        ConfigCommands::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        ConfigCommands::Path => match target_path(explicit) {
            Some(path) => println!("{}", path.display()),
            None => return Err("no config directory on this platform".into()),
        },
        ConfigCommands::Init { force } => {
            let path = target_path(explicit).ok_or("no config directory on this platform")?;
            if path.exists() && !force {
                return Err(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )
                .into());
            }
            SimConfig::default().save(&path)?;
            println!("Configuration initialized at {}", path.display());
        }
    }
    Ok(())
}

fn target_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit.map(Path::to_path_buf).or_else(config::config_path)
}
