//! Configuration management CLI commands.
//!
//! Provides `config get`, `config set`, `config list`, and `config path` commands
//! for viewing and modifying configuration settings from the command line.

use clap::Subcommand;
use slymaps::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key in format section.key (e.g., onebusaway.api_key)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key in format section.key (e.g., onebusaway.api_key)
        key: String,

        /// Value to set; an empty string clears optional keys
        value: String,
    },

    /// List all configuration settings
    List,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => run_get(&key),
        ConfigCommands::Set { key, value } => run_set(&key, &value),
        ConfigCommands::List => run_list(),
        ConfigCommands::Path => run_path(),
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'slymaps config list' to see available keys.",
            key
        ))
    })
}

/// Get a configuration value, including environment overrides.
fn run_get(key: &str) -> Result<(), CliError> {
    let config_key = parse_key(key)?;
    let config = ConfigFile::load()?;
    let value = config_key.get(&config);

    if value.is_empty() {
        println!("(not set)");
    } else {
        println!("{}", value);
    }

    Ok(())
}

/// Set a configuration value in the file. Environment overrides are not
/// written back.
fn run_set(key: &str, value: &str) -> Result<(), CliError> {
    let config_key = parse_key(key)?;
    let path = config_file_path();

    let mut config = ConfigFile::load_from(&path)?;
    config_key.set(&mut config, value)?;
    config.save_to(&path)?;

    println!("Set {} = {}", config_key.name(), config_key.display_value(&config));

    Ok(())
}

/// List all configuration settings. Credentials are masked and values
/// replaced by an environment variable are flagged.
fn run_list() -> Result<(), CliError> {
    let path = config_file_path();
    let file = ConfigFile::load_from(&path)?;
    let effective = ConfigFile::load()?;

    println!("# {}", path.display());

    let width = ConfigKey::all()
        .iter()
        .map(|k| k.name().len())
        .max()
        .unwrap_or(0);

    for (key, (name, shown)) in ConfigKey::all().iter().zip(effective.entries()) {
        let shown = if shown.is_empty() { "-".to_string() } else { shown };
        let origin = if key.get(&file) != key.get(&effective) {
            "  (env)"
        } else {
            ""
        };
        println!("{:<width$}  {}{}", name, shown, origin, width = width);
    }

    Ok(())
}

/// Show the configuration file path.
fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}
