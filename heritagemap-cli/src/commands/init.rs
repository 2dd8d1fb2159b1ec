//! Init command - write a config file with every default filled in.

use heritagemap::config::{config_file_path, ConfigFile};

use crate::error::CliError;

pub fn run(force: bool) -> Result<(), CliError> {
    let path = config_file_path();

    // Keep what is there unless asked to reset, but fill in missing keys
    let config = if force {
        ConfigFile::default()
    } else {
        ConfigFile::load()?
    };
    config.save()?;

    println!("Configuration file: {}", path.display());
    println!();
    if config.api.access_token.is_none() {
        println!("No API access token set; nearby queries will be rejected until one is:");
        println!("  heritagemap config set api.access_token <token>");
        println!();
    }
    println!("Edit this file to customize HeritageMap settings.");
    println!("CLI arguments override config file values when specified.");
    Ok(())
}
