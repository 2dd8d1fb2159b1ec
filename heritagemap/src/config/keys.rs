//! Addressable configuration keys for `config get/set/list`.

use std::str::FromStr;

use super::file::{ConfigError, ConfigFile};

/// Every key of the configuration file, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    LocationForegroundMinDistance,
    LocationBackgroundInterval,
    LocationRequestBackground,
    ProximityDebounce,
    ProximityMinDisplacement,
    ProximityDefaultRadius,
    ApiBaseUrl,
    ApiTimeout,
    ApiAccessToken,
    BridgeListenAddr,
    BridgeEventCapacity,
    PanelViewportHeight,
    PanelTopFraction,
    PanelMiddleFraction,
    PanelBottomFraction,
    PanelDragThreshold,
    LoggingLevel,
    LoggingDirectory,
    LoggingFilePrefix,
}

const ALL_KEYS: [ConfigKey; 19] = [
    ConfigKey::LocationForegroundMinDistance,
    ConfigKey::LocationBackgroundInterval,
    ConfigKey::LocationRequestBackground,
    ConfigKey::ProximityDebounce,
    ConfigKey::ProximityMinDisplacement,
    ConfigKey::ProximityDefaultRadius,
    ConfigKey::ApiBaseUrl,
    ConfigKey::ApiTimeout,
    ConfigKey::ApiAccessToken,
    ConfigKey::BridgeListenAddr,
    ConfigKey::BridgeEventCapacity,
    ConfigKey::PanelViewportHeight,
    ConfigKey::PanelTopFraction,
    ConfigKey::PanelMiddleFraction,
    ConfigKey::PanelBottomFraction,
    ConfigKey::PanelDragThreshold,
    ConfigKey::LoggingLevel,
    ConfigKey::LoggingDirectory,
    ConfigKey::LoggingFilePrefix,
];

impl ConfigKey {
    pub fn all() -> &'static [ConfigKey] {
        &ALL_KEYS
    }

    /// `(section, key)` as written in the file.
    fn parts(&self) -> (&'static str, &'static str) {
        match self {
            ConfigKey::LocationForegroundMinDistance => ("location", "foreground_min_distance_m"),
            ConfigKey::LocationBackgroundInterval => ("location", "background_interval_secs"),
            ConfigKey::LocationRequestBackground => ("location", "request_background"),
            ConfigKey::ProximityDebounce => ("proximity", "debounce_ms"),
            ConfigKey::ProximityMinDisplacement => ("proximity", "min_displacement_m"),
            ConfigKey::ProximityDefaultRadius => ("proximity", "default_radius_m"),
            ConfigKey::ApiBaseUrl => ("api", "base_url"),
            ConfigKey::ApiTimeout => ("api", "timeout_secs"),
            ConfigKey::ApiAccessToken => ("api", "access_token"),
            ConfigKey::BridgeListenAddr => ("bridge", "listen_addr"),
            ConfigKey::BridgeEventCapacity => ("bridge", "event_capacity"),
            ConfigKey::PanelViewportHeight => ("panel", "viewport_height"),
            ConfigKey::PanelTopFraction => ("panel", "top_fraction"),
            ConfigKey::PanelMiddleFraction => ("panel", "middle_fraction"),
            ConfigKey::PanelBottomFraction => ("panel", "bottom_fraction"),
            ConfigKey::PanelDragThreshold => ("panel", "drag_threshold_px"),
            ConfigKey::LoggingLevel => ("logging", "level"),
            ConfigKey::LoggingDirectory => ("logging", "directory"),
            ConfigKey::LoggingFilePrefix => ("logging", "file_prefix"),
        }
    }

    pub fn section(&self) -> &'static str {
        self.parts().0
    }

    pub fn key_name(&self) -> &'static str {
        self.parts().1
    }

    /// Dotted name, e.g. `proximity.default_radius_m`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as text; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        config
            .to_ini()
            .get_from(Some(self.section()), self.key_name())
            .unwrap_or_default()
            .to_string()
    }

    /// Set from text. The value goes through the same validation as a loaded
    /// file; on error `config` is left untouched. An empty value unsets an
    /// optional key.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let mut ini = config.to_ini();
        ini.with_section(Some(self.section()))
            .set(self.key_name(), value.trim());
        *config = ConfigFile::from_ini(&ini)?;
        Ok(())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ALL_KEYS
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(wanted.to_string()))
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_every_key_by_name() {
        for key in ConfigKey::all() {
            assert_eq!(key.name().parse::<ConfigKey>().unwrap(), *key);
        }
        assert!(matches!(
            "proximity.warp_factor".parse::<ConfigKey>(),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_get_and_set() {
        let mut config = ConfigFile::default();
        assert_eq!(ConfigKey::ProximityDefaultRadius.get(&config), "500");
        assert_eq!(ConfigKey::ApiAccessToken.get(&config), "");

        ConfigKey::ProximityDefaultRadius
            .set(&mut config, "1000")
            .unwrap();
        ConfigKey::ApiAccessToken.set(&mut config, "tok").unwrap();
        assert_eq!(config.proximity.default_radius_m, 1000);
        assert_eq!(config.api.access_token.as_deref(), Some("tok"));

        ConfigKey::ApiAccessToken.set(&mut config, "").unwrap();
        assert_eq!(config.api.access_token, None);
    }

    #[test]
    fn test_invalid_set_leaves_config_untouched() {
        let mut config = ConfigFile::default();
        let before = config.clone();
        assert!(ConfigKey::PanelBottomFraction
            .set(&mut config, "0.1")
            .is_err());
        assert_eq!(config, before);
    }

    #[test]
    fn test_keys_are_grouped_by_section() {
        let sections: Vec<&str> = ConfigKey::all().iter().map(|k| k.section()).collect();
        let mut seen: Vec<&str> = Vec::new();
        for section in sections {
            if seen.last() != Some(&section) {
                assert!(!seen.contains(&section), "section {} split", section);
                seen.push(section);
            }
        }
        assert_eq!(
            seen,
            vec!["location", "proximity", "api", "bridge", "panel", "logging"]
        );
    }
}
