//! Configuration commands: `config init`, `show`, `get`, `set` and `path`.

use std::path::Path;

use clap::Subcommand;
use smartfetch::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Write the configuration file, keeping existing values
    Init,

    /// Show all configuration settings
    Show,

    /// Get a configuration value
    Get {
        /// Configuration key as section.key (e.g. update.smart_period_secs)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key as section.key (e.g. update.smart_period_secs)
        key: String,

        /// Value to set
        value: String,
    },

    /// Show the configuration file path
    Path,
}

pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init => run_init(),
        ConfigCommands::Show => run_show(),
        ConfigCommands::Get { key } => run_get(&key),
        ConfigCommands::Set { key, value } => run_set(&key, &value),
        ConfigCommands::Path => run_path(),
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'smartfetch config show' to see available keys.",
            key
        ))
    })
}

fn run_init() -> Result<(), CliError> {
    let config = init_at(&config_file_path())?;
    println!("Configuration file: {}", config_file_path().display());
    println!("Data directory:     {}", config.storage.data_dir.display());
    println!();
    println!("Edit this file to customize SmartFetch settings.");
    Ok(())
}

fn run_show() -> Result<(), CliError> {
    let config = ConfigFile::load().unwrap_or_default();
    let mut current_section = "";

    for key in ConfigKey::all() {
        let section = key.section();
        if section != current_section {
            if !current_section.is_empty() {
                println!();
            }
            println!("[{}]", section);
            current_section = section;
        }

        let value = key.get(&config);
        if value.is_empty() {
            println!("  {} = (not set)", key.key_name());
        } else {
            println!("  {} = {}", key.key_name(), value);
        }
    }
    Ok(())
}

fn run_get(key: &str) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let config = ConfigFile::load().unwrap_or_default();
    let value = key.get(&config);
    if value.is_empty() {
        println!("(not set)");
    } else {
        println!("{}", value);
    }
    Ok(())
}

fn run_set(key: &str, value: &str) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let config = set_at(&config_file_path(), key, value)?;
    println!("Set {} = {}", key.name(), key.get(&config));
    Ok(())
}

/// Rewrite the file at `path` with every key. An unreadable file is an
/// error so its settings are never replaced by defaults.
fn init_at(path: &Path) -> Result<ConfigFile, CliError> {
    let config = ConfigFile::load_from(path)?;
    config.save_to(path)?;
    Ok(config)
}

fn set_at(path: &Path, key: ConfigKey, value: &str) -> Result<ConfigFile, CliError> {
    let mut config = ConfigFile::load_from(path)?;
    key.set(&mut config, value)?;
    config.save_to(path)?;
    Ok(config)
}

fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_set_keeps_other_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        fs::write(&path, "[update]\nsmart_workers = 4\n").unwrap();

        let config = set_at(&path, ConfigKey::NetworkTimeoutSecs, "12").unwrap();

        assert_eq!(config.network.timeout_secs, 12);
        let reloaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(reloaded.update.smart_workers, 4);
        assert_eq!(reloaded.network.timeout_secs, 12);
    }

    #[test]
    fn test_malformed_file_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        let original = "[update]\nsmart_workers = 4\n\n[network]\ntimeout_secs = soon\n";
        fs::write(&path, original).unwrap();

        assert!(matches!(
            set_at(&path, ConfigKey::UpdateNowWorkers, "2"),
            Err(CliError::Config(_))
        ));
        assert!(matches!(init_at(&path), Err(CliError::Config(_))));
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_init_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.ini");

        init_at(&path).unwrap();

        let reloaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(reloaded.update.smart_workers, ConfigFile::default().update.smart_workers);
    }
}
