//! Configuration
//!
//! Settings live in an INI file at `~/.config/heritagemap/config.ini` (or the
//! platform equivalent). Every key is optional; missing keys take the
//! component defaults.
//!
//! ```ini
//! [proximity]
//! debounce_ms = 300
//! default_radius_m = 500
//!
//! [api]
//! base_url = https://api.example.org/
//! ```

mod file;
mod keys;

pub use file::{
    config_dir, config_file_path, ApiSettings, BridgeSettings, ConfigError, ConfigFile,
    LocationSettings, LoggingSettings, PanelSettings, ProximitySettings,
};
pub use keys::ConfigKey;
