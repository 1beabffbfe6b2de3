use crate::error::{BouwbotError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration source for tracking where values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Built-in default
    Default,
    /// Loaded from config file
    File,
    /// Loaded from environment variable
    Environment,
}

impl ConfigSource {
    /// Returns the precedence level (higher = higher priority)
    pub fn precedence(&self) -> u8 {
        match self {
            ConfigSource::Default => 0,
            ConfigSource::File => 1,
            ConfigSource::Environment => 2,
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// Update the value if the new source has higher precedence
    pub fn update(&mut self, value: T, source: ConfigSource) {
        if source.precedence() > self.source.precedence() {
            self.value = value;
            self.source = source;
        }
    }
}

/// Layered engine configuration: defaults < config file < environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Building layer (GeoJSON feature collection)
    pub buildings_path: ConfigValue<PathBuf>,
    /// City boundary layer (GeoJSON, geographic coordinates)
    pub boundary_path: ConfigValue<PathBuf>,
    /// Directory generated GeoJSON files are written to (and served from)
    pub output_dir: ConfigValue<PathBuf>,
    /// Projected metric CRS used for buffering and area math
    pub metric_epsg: ConfigValue<u32>,
    /// Hard cap on features exported per query
    pub max_export_features: ConfigValue<usize>,
    /// Upper bound on buffer radius in meters
    pub max_radius_m: ConfigValue<f64>,
    /// Initial map center (lat, lon)
    pub default_center: ConfigValue<[f64; 2]>,
    /// Initial map zoom level
    pub default_zoom: ConfigValue<u32>,
}

impl EngineConfig {
    /// Create a configuration with default values (Utrecht dataset, RD New).
    pub fn with_defaults() -> Self {
        Self {
            buildings_path: ConfigValue::new(
                PathBuf::from("static/data/utrecht_pand_clip.geojson"),
                ConfigSource::Default,
            ),
            boundary_path: ConfigValue::new(
                PathBuf::from("static/data/utrecht.geojson"),
                ConfigSource::Default,
            ),
            output_dir: ConfigValue::new(PathBuf::from("output"), ConfigSource::Default),
            metric_epsg: ConfigValue::new(28992, ConfigSource::Default),
            max_export_features: ConfigValue::new(5000, ConfigSource::Default),
            max_radius_m: ConfigValue::new(15_000.0, ConfigSource::Default),
            // Amsterdam, matching the untouched initial map view
            default_center: ConfigValue::new([52.3730796, 4.8924534], ConfigSource::Default),
            default_zoom: ConfigValue::new(12, ConfigSource::Default),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| BouwbotError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to read config file: {}", e),
            })?;

        let file_config: FileConfig =
            toml::from_str(&content).map_err(|e| BouwbotError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to parse TOML: {}", e),
            })?;

        if let Some(p) = file_config.buildings_path {
            self.buildings_path.update(p, ConfigSource::File);
        }
        if let Some(p) = file_config.boundary_path {
            self.boundary_path.update(p, ConfigSource::File);
        }
        if let Some(p) = file_config.output_dir {
            self.output_dir.update(p, ConfigSource::File);
        }
        if let Some(epsg) = file_config.metric_epsg {
            self.metric_epsg.update(epsg, ConfigSource::File);
        }
        if let Some(cap) = file_config.max_export_features {
            self.max_export_features.update(cap, ConfigSource::File);
        }
        if let Some(r) = file_config.max_radius_m {
            self.max_radius_m.update(r, ConfigSource::File);
        }
        if let Some(c) = file_config.default_center {
            self.default_center.update(c, ConfigSource::File);
        }
        if let Some(z) = file_config.default_zoom {
            self.default_zoom.update(z, ConfigSource::File);
        }

        Ok(self)
    }

    /// Load configuration from `BOUWBOT_*` environment variables
    pub fn load_from_env(mut self) -> Self {
        if let Ok(p) = env::var("BOUWBOT_BUILDINGS_PATH") {
            self.buildings_path.update(PathBuf::from(p), ConfigSource::Environment);
        }

        if let Ok(p) = env::var("BOUWBOT_BOUNDARY_PATH") {
            self.boundary_path.update(PathBuf::from(p), ConfigSource::Environment);
        }

        if let Ok(p) = env::var("BOUWBOT_OUTPUT_DIR") {
            self.output_dir.update(PathBuf::from(p), ConfigSource::Environment);
        }

        if let Ok(epsg_str) = env::var("BOUWBOT_METRIC_EPSG") {
            match epsg_str.parse::<u32>() {
                Ok(epsg) => self.metric_epsg.update(epsg, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid BOUWBOT_METRIC_EPSG value '{}': expected integer EPSG code",
                    epsg_str
                ),
            }
        }

        if let Ok(cap_str) = env::var("BOUWBOT_MAX_EXPORT_FEATURES") {
            match cap_str.parse::<usize>() {
                Ok(cap) => self.max_export_features.update(cap, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid BOUWBOT_MAX_EXPORT_FEATURES value '{}': expected integer",
                    cap_str
                ),
            }
        }

        if let Ok(r_str) = env::var("BOUWBOT_MAX_RADIUS_M") {
            match r_str.parse::<f64>() {
                Ok(r) if r > 0.0 => self.max_radius_m.update(r, ConfigSource::Environment),
                _ => tracing::warn!(
                    "Invalid BOUWBOT_MAX_RADIUS_M value '{}': expected positive number",
                    r_str
                ),
            }
        }

        self
    }
}

/// Read an environment variable that has no default, such as an API key.
/// Unset or empty both count as missing.
pub fn require_env(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(BouwbotError::ConfigMissing { key: key.to_string() }),
    }
}

/// Configuration loaded from TOML file
#[derive(Debug, Deserialize, Serialize)]
struct FileConfig {
    buildings_path: Option<PathBuf>,
    boundary_path: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    metric_epsg: Option<u32>,
    max_export_features: Option<usize>,
    max_radius_m: Option<f64>,
    default_center: Option<[f64; 2]>,
    default_zoom: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::with_defaults();
        assert_eq!(config.metric_epsg.value, 28992);
        assert_eq!(config.metric_epsg.source, ConfigSource::Default);
        assert_eq!(config.max_export_features.value, 5000);
        assert_eq!(config.max_radius_m.value, 15_000.0);
    }

    #[test]
    fn test_config_precedence() {
        let mut value = ConfigValue::new(100, ConfigSource::Default);

        // File should override default
        value.update(200, ConfigSource::File);
        assert_eq!(value.value, 200);
        assert_eq!(value.source, ConfigSource::File);

        // Environment should override file
        value.update(300, ConfigSource::Environment);
        assert_eq!(value.value, 300);
        assert_eq!(value.source, ConfigSource::Environment);

        // Lower precedence should not override
        value.update(400, ConfigSource::File);
        assert_eq!(value.value, 300);
        assert_eq!(value.source, ConfigSource::Environment);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
buildings_path = "data/pand.geojson"
output_dir = "generated"
metric_epsg = 28992
max_export_features = 2500
default_center = [52.0907, 5.1214]
"#
        )
        .unwrap();

        let config = EngineConfig::with_defaults().load_from_file(file.path()).unwrap();

        assert_eq!(config.buildings_path.value, PathBuf::from("data/pand.geojson"));
        assert_eq!(config.buildings_path.source, ConfigSource::File);
        assert_eq!(config.output_dir.value, PathBuf::from("generated"));
        assert_eq!(config.max_export_features.value, 2500);
        assert_eq!(config.default_center.value, [52.0907, 5.1214]);
        // Untouched key keeps its default
        assert_eq!(config.max_radius_m.source, ConfigSource::Default);
    }

    #[test]
    fn test_require_env_missing_and_blank() {
        // Unique names so parallel tests cannot interfere
        let err = require_env("BOUWBOT_TEST_REQUIRE_ENV_UNSET").unwrap_err();
        assert!(matches!(err, BouwbotError::ConfigMissing { ref key } if key.contains("UNSET")));
        assert!(err.to_string().contains("BOUWBOT_TEST_REQUIRE_ENV_UNSET"));

        env::set_var("BOUWBOT_TEST_REQUIRE_ENV_BLANK", "   ");
        assert!(require_env("BOUWBOT_TEST_REQUIRE_ENV_BLANK").is_err());

        env::set_var("BOUWBOT_TEST_REQUIRE_ENV_SET", "sk-test");
        assert_eq!(require_env("BOUWBOT_TEST_REQUIRE_ENV_SET").unwrap(), "sk-test");
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "max_export_features = \"lots\"").unwrap();

        let result = EngineConfig::with_defaults().load_from_file(file.path());
        assert!(result.is_err());
    }
}
