//! INI configuration file.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::bridge::{BridgeConfig, DEFAULT_BRIDGE_EVENT_CAPACITY, DEFAULT_LISTEN_ADDR};
use crate::location::{TrackerConfig, DEFAULT_BACKGROUND_INTERVAL, DEFAULT_FOREGROUND_MIN_DISTANCE_M};
use crate::logging::{LoggingConfig, DEFAULT_LOG_FILE_PREFIX, DEFAULT_LOG_LEVEL};
use crate::panel::{PanelConfig, SpringParams, DEFAULT_DRAG_THRESHOLD_PX};
use crate::proximity::{
    ApiConfig, ProximityConfig, DEFAULT_API_TIMEOUT_SECS, DEFAULT_DEBOUNCE,
    DEFAULT_MIN_DISPLACEMENT_M, DEFAULT_RADIUS_M,
};

/// Errors loading, validating or saving the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Directory holding the configuration file.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("heritagemap")
}

/// Default configuration file location.
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.ini")
}

/// `[location]`
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSettings {
    pub foreground_min_distance_m: f64,
    pub background_interval_secs: u64,
    pub request_background: bool,
}

/// `[proximity]`
#[derive(Debug, Clone, PartialEq)]
pub struct ProximitySettings {
    pub debounce_ms: u64,
    pub min_displacement_m: f64,
    pub default_radius_m: u32,
}

/// `[api]`
#[derive(Debug, Clone, PartialEq)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub access_token: Option<String>,
}

/// `[bridge]`
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeSettings {
    pub listen_addr: String,
    pub event_capacity: usize,
}

/// `[panel]`
#[derive(Debug, Clone, PartialEq)]
pub struct PanelSettings {
    pub viewport_height: f64,
    pub top_fraction: f64,
    pub middle_fraction: f64,
    pub bottom_fraction: f64,
    pub drag_threshold_px: f64,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

/// The whole configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub location: LocationSettings,
    pub proximity: ProximitySettings,
    pub api: ApiSettings,
    pub bridge: BridgeSettings,
    pub panel: PanelSettings,
    pub logging: LoggingSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let panel = PanelConfig::default();
        Self {
            location: LocationSettings {
                foreground_min_distance_m: DEFAULT_FOREGROUND_MIN_DISTANCE_M,
                background_interval_secs: DEFAULT_BACKGROUND_INTERVAL.as_secs(),
                request_background: true,
            },
            proximity: ProximitySettings {
                debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
                min_displacement_m: DEFAULT_MIN_DISPLACEMENT_M,
                default_radius_m: DEFAULT_RADIUS_M,
            },
            api: ApiSettings {
                base_url: ApiConfig::default().base_url,
                timeout_secs: DEFAULT_API_TIMEOUT_SECS,
                access_token: None,
            },
            bridge: BridgeSettings {
                listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
                event_capacity: DEFAULT_BRIDGE_EVENT_CAPACITY,
            },
            panel: PanelSettings {
                viewport_height: panel.viewport_height,
                top_fraction: panel.top_fraction,
                middle_fraction: panel.middle_fraction,
                bottom_fraction: panel.bottom_fraction,
                drag_threshold_px: DEFAULT_DRAG_THRESHOLD_PX,
            },
            logging: LoggingSettings {
                level: DEFAULT_LOG_LEVEL.to_string(),
                directory: None,
                file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
            },
        }
    }
}

/// Reads typed values out of an [`Ini`], falling back to defaults for
/// missing keys and naming `section.key` in errors.
struct Reader<'a> {
    ini: &'a Ini,
}

impl Reader<'_> {
    fn raw(&self, section: &str, key: &str) -> Option<&str> {
        self.ini
            .get_from(Some(section), key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, section: &str, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.raw(section, key) {
            None => Ok(default),
            Some(value) => value
                .parse()
                .map_err(|e: T::Err| invalid(section, key, value, e.to_string())),
        }
    }

    fn string(&self, section: &str, key: &str, default: String) -> String {
        self.raw(section, key).map(str::to_string).unwrap_or(default)
    }

    fn optional(&self, section: &str, key: &str) -> Option<String> {
        self.raw(section, key).map(str::to_string)
    }
}

fn invalid(section: &str, key: &str, value: impl Display, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: format!("{}.{}", section, key),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn require(
    ok: bool,
    section: &str,
    key: &str,
    value: impl Display,
    reason: &str,
) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(invalid(section, key, value, reason))
    }
}

impl ConfigFile {
    /// Load from [`config_file_path`]. A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let ini = Ini::load_from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Save to [`config_file_path`], creating the directory if needed.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        self.to_ini()
            .write_to_file(path)
            .map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Build from parsed INI, validating every value.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let r = Reader { ini };
        let d = Self::default();

        let location = LocationSettings {
            foreground_min_distance_m: r.parse(
                "location",
                "foreground_min_distance_m",
                d.location.foreground_min_distance_m,
            )?,
            background_interval_secs: r.parse(
                "location",
                "background_interval_secs",
                d.location.background_interval_secs,
            )?,
            request_background: r.parse(
                "location",
                "request_background",
                d.location.request_background,
            )?,
        };
        require(
            location.foreground_min_distance_m >= 0.0,
            "location",
            "foreground_min_distance_m",
            location.foreground_min_distance_m,
            "must not be negative",
        )?;
        require(
            location.background_interval_secs > 0,
            "location",
            "background_interval_secs",
            location.background_interval_secs,
            "must be positive",
        )?;

        let proximity = ProximitySettings {
            debounce_ms: r.parse("proximity", "debounce_ms", d.proximity.debounce_ms)?,
            min_displacement_m: r.parse(
                "proximity",
                "min_displacement_m",
                d.proximity.min_displacement_m,
            )?,
            default_radius_m: r.parse(
                "proximity",
                "default_radius_m",
                d.proximity.default_radius_m,
            )?,
        };
        require(
            proximity.min_displacement_m >= 0.0,
            "proximity",
            "min_displacement_m",
            proximity.min_displacement_m,
            "must not be negative",
        )?;
        require(
            proximity.default_radius_m > 0,
            "proximity",
            "default_radius_m",
            proximity.default_radius_m,
            "must be positive",
        )?;

        let api = ApiSettings {
            base_url: r.string("api", "base_url", d.api.base_url),
            timeout_secs: r.parse("api", "timeout_secs", d.api.timeout_secs)?,
            access_token: r.optional("api", "access_token"),
        };
        require(
            api.timeout_secs > 0,
            "api",
            "timeout_secs",
            api.timeout_secs,
            "must be positive",
        )?;

        let bridge = BridgeSettings {
            listen_addr: r.string("bridge", "listen_addr", d.bridge.listen_addr),
            event_capacity: r.parse("bridge", "event_capacity", d.bridge.event_capacity)?,
        };
        require(
            bridge.event_capacity > 0,
            "bridge",
            "event_capacity",
            bridge.event_capacity,
            "must be positive",
        )?;

        let panel = PanelSettings {
            viewport_height: r.parse("panel", "viewport_height", d.panel.viewport_height)?,
            top_fraction: r.parse("panel", "top_fraction", d.panel.top_fraction)?,
            middle_fraction: r.parse("panel", "middle_fraction", d.panel.middle_fraction)?,
            bottom_fraction: r.parse("panel", "bottom_fraction", d.panel.bottom_fraction)?,
            drag_threshold_px: r.parse("panel", "drag_threshold_px", d.panel.drag_threshold_px)?,
        };
        require(
            panel.viewport_height > 0.0,
            "panel",
            "viewport_height",
            panel.viewport_height,
            "must be positive",
        )?;
        require(
            0.0 <= panel.top_fraction
                && panel.top_fraction < panel.middle_fraction
                && panel.middle_fraction < panel.bottom_fraction
                && panel.bottom_fraction <= 1.0,
            "panel",
            "middle_fraction",
            panel.middle_fraction,
            "fractions must satisfy 0 <= top < middle < bottom <= 1",
        )?;
        require(
            panel.drag_threshold_px >= 0.0,
            "panel",
            "drag_threshold_px",
            panel.drag_threshold_px,
            "must not be negative",
        )?;

        let logging = LoggingSettings {
            level: r.string("logging", "level", d.logging.level),
            directory: r.optional("logging", "directory").map(PathBuf::from),
            file_prefix: r.string("logging", "file_prefix", d.logging.file_prefix),
        };

        Ok(Self {
            location,
            proximity,
            api,
            bridge,
            panel,
            logging,
        })
    }

    /// Render as INI. Unset optional values are omitted.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some("location"))
            .set(
                "foreground_min_distance_m",
                self.location.foreground_min_distance_m.to_string(),
            )
            .set(
                "background_interval_secs",
                self.location.background_interval_secs.to_string(),
            )
            .set(
                "request_background",
                self.location.request_background.to_string(),
            );
        ini.with_section(Some("proximity"))
            .set("debounce_ms", self.proximity.debounce_ms.to_string())
            .set(
                "min_displacement_m",
                self.proximity.min_displacement_m.to_string(),
            )
            .set(
                "default_radius_m",
                self.proximity.default_radius_m.to_string(),
            );
        ini.with_section(Some("api"))
            .set("base_url", self.api.base_url.as_str())
            .set("timeout_secs", self.api.timeout_secs.to_string());
        if let Some(token) = &self.api.access_token {
            ini.with_section(Some("api"))
                .set("access_token", token.as_str());
        }
        ini.with_section(Some("bridge"))
            .set("listen_addr", self.bridge.listen_addr.as_str())
            .set("event_capacity", self.bridge.event_capacity.to_string());
        ini.with_section(Some("panel"))
            .set("viewport_height", self.panel.viewport_height.to_string())
            .set("top_fraction", self.panel.top_fraction.to_string())
            .set("middle_fraction", self.panel.middle_fraction.to_string())
            .set("bottom_fraction", self.panel.bottom_fraction.to_string())
            .set("drag_threshold_px", self.panel.drag_threshold_px.to_string());
        ini.with_section(Some("logging"))
            .set("level", self.logging.level.as_str())
            .set("file_prefix", self.logging.file_prefix.as_str());
        if let Some(dir) = &self.logging.directory {
            ini.with_section(Some("logging"))
                .set("directory", dir.to_string_lossy().to_string());
        }
        ini
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            foreground_min_distance_m: self.location.foreground_min_distance_m,
            background_interval: Duration::from_secs(self.location.background_interval_secs),
            request_background: self.location.request_background,
        }
    }

    pub fn proximity_config(&self) -> ProximityConfig {
        ProximityConfig {
            debounce: Duration::from_millis(self.proximity.debounce_ms),
            min_displacement_m: self.proximity.min_displacement_m,
            default_radius_m: self.proximity.default_radius_m,
        }
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.api.base_url.clone(),
            timeout: Duration::from_secs(self.api.timeout_secs),
        }
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            listen_addr: self.bridge.listen_addr.clone(),
            event_capacity: self.bridge.event_capacity,
        }
    }

    pub fn panel_config(&self) -> PanelConfig {
        PanelConfig {
            viewport_height: self.panel.viewport_height,
            top_fraction: self.panel.top_fraction,
            middle_fraction: self.panel.middle_fraction,
            bottom_fraction: self.panel.bottom_fraction,
            drag_threshold_px: self.panel.drag_threshold_px,
            spring: SpringParams::default(),
        }
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.logging.level.clone(),
            directory: self.logging.directory.clone(),
            file_prefix: self.logging.file_prefix.clone(),
        }
    }
}
