//! Shared setup for long-running commands.

use heritagemap::config::{config_file_path, ConfigFile};
use heritagemap::logging::{init_logging, LoggingGuard};
use tokio::runtime::Runtime;
use tracing::info;

use crate::error::CliError;

/// Loaded configuration plus the installed logger.
///
/// Logging is initialized before any runtime exists, then the runtime is
/// built on demand.
pub struct CliRunner {
    config: ConfigFile,
    _log_guard: LoggingGuard,
}

impl CliRunner {
    /// Load the config file (defaults if absent) and install logging.
    pub fn new() -> Result<Self, CliError> {
        let config = ConfigFile::load()?;
        let log_guard = init_logging(&config.logging_config())?;
        Ok(Self {
            config,
            _log_guard: log_guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            version = heritagemap::VERSION,
            command,
            config = %config_file_path().display(),
            "HeritageMap starting"
        );
    }

    /// Multi-threaded runtime for the session.
    pub fn runtime(&self) -> Result<Runtime, CliError> {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("heritagemap")
            .build()
            .map_err(CliError::Io)
    }
}
