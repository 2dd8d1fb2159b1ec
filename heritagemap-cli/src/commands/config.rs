//! `config` subcommands: read and edit the config file by dotted key.

use clap::Subcommand;
use heritagemap::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print one value
    Get {
        /// Key as section.key (e.g. proximity.default_radius_m)
        key: String,
    },

    /// Change one value and save the file
    Set {
        /// Key as section.key (e.g. proximity.default_radius_m)
        key: String,

        /// New value; empty unsets an optional key
        value: String,
    },

    /// Print every key with its current value
    List,

    /// Print the config file location
    Path,
}

pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => run_get(&key),
        ConfigCommands::Set { key, value } => run_set(&key, &value),
        ConfigCommands::List => run_list(),
        ConfigCommands::Path => {
            println!("{}", config_file_path().display());
            Ok(())
        }
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'heritagemap config list' to see available keys.",
            key
        ))
    })
}

fn run_get(key: &str) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let config = ConfigFile::load()?;
    println!("{}", display_value(&key.get(&config)));
    Ok(())
}

fn run_set(key: &str, value: &str) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let mut config = ConfigFile::load()?;
    key.set(&mut config, value)?;
    config.save()?;
    println!("Set {} = {}", key, display_value(&key.get(&config)));
    Ok(())
}

fn run_list() -> Result<(), CliError> {
    let config = ConfigFile::load()?;
    print!("{}", render_list(&config));
    Ok(())
}

fn display_value(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

/// All keys grouped under `[section]` headers.
fn render_list(config: &ConfigFile) -> String {
    let mut out = String::new();
    let mut current_section = "";
    for key in ConfigKey::all() {
        let section = key.section();
        if section != current_section {
            if !current_section.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", section));
            current_section = section;
        }
        out.push_str(&format!(
            "  {} = {}\n",
            key.key_name(),
            display_value(&key.get(config))
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_key_is_a_config_error() {
        assert!(matches!(
            parse_key("panel.wobble"),
            Err(CliError::Config(msg)) if msg.contains("panel.wobble")
        ));
    }

    #[test]
    fn test_list_has_every_section_once() {
        let listing = render_list(&ConfigFile::default());
        for section in ["location", "proximity", "api", "bridge", "panel", "logging"] {
            assert_eq!(listing.matches(&format!("[{}]", section)).count(), 1);
        }
        assert!(listing.contains("  default_radius_m = 500\n"));
        assert!(listing.contains("  access_token = (not set)\n"));
    }
}
