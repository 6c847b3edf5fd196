//! Configuration file support for the annotation engine.
//!
//! Holds the tunables of the interpolation algorithm, the history depth and
//! the colour palette handed to newly created objects. The configuration can
//! be exported to and imported from JSON.

use serde::{Deserialize, Serialize};

/// Log verbosity an embedding application should install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    /// Import, export and save summaries
    #[default]
    Info,
    /// Per-edit detail, history and interpolation fallbacks
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Format version written to config files. Newer files are rejected.
pub const CONFIG_VERSION: u32 = 1;

/// File name of the config under the platform config directory.
pub const CONFIG_FILENAME: &str = "vatcore-config.json";

/// Engine configuration that can be exported and imported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Version of the configuration file format
    pub version: u32,

    /// Log verbosity requested by the embedding application
    #[serde(default)]
    pub log_level: LogLevel,

    /// Track interpolation tunables
    #[serde(default)]
    pub interpolation: InterpolationConfig,

    /// Undo/redo history settings
    #[serde(default)]
    pub history: HistoryConfig,

    /// Colours assigned to new objects, picked by client ID
    #[serde(default = "default_palette")]
    pub palette: Vec<String>,
}

/// Tunables of the polygon point-correspondence algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterpolationConfig {
    /// Width of the box substituted for degenerate bounding boxes
    #[serde(default = "default_reference_width")]
    pub reference_width: f64,

    /// Height of the box substituted for degenerate bounding boxes
    #[serde(default = "default_reference_height")]
    pub reference_height: f64,

    /// Boxes thinner than this (in pixels) count as degenerate
    #[serde(default = "default_degenerate_delta")]
    pub degenerate_delta: f64,

    /// Matches farther than `mean + sigma_factor * sigma` are dropped
    #[serde(default = "default_sigma_factor")]
    pub sigma_factor: f64,
}

fn default_reference_width() -> f64 {
    1024.0
}

fn default_reference_height() -> f64 {
    768.0
}

fn default_degenerate_delta() -> f64 {
    1.0
}

fn default_sigma_factor() -> f64 {
    3.0
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            reference_width: default_reference_width(),
            reference_height: default_reference_height(),
            degenerate_delta: default_degenerate_delta(),
            sigma_factor: default_sigma_factor(),
        }
    }
}

/// Undo/redo history settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum number of commands to keep in history
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_max_history() -> usize {
    100
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
        }
    }
}

fn default_palette() -> Vec<String> {
    [
        "#FF355E", "#FD5B78", "#FF6037", "#FF9966", "#FF9933", "#FFCC33", "#FFFF66", "#CCFF00",
        "#66FF66", "#AAF0D1", "#50BFE6", "#FF6EFF", "#EE34D2", "#FF00CC", "#A7F432", "#5DADEC",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

impl EngineConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            log_level: LogLevel::default(),
            interpolation: InterpolationConfig::default(),
            history: HistoryConfig::default(),
            palette: default_palette(),
        }
    }

    /// Colour for an object with the given client ID.
    pub fn color_for(&self, client_id: u32) -> String {
        if self.palette.is_empty() {
            return "#FFFFFF".to_string();
        }
        self.palette[client_id as usize % self.palette.len()].clone()
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }

        Ok(config)
    }

    /// Default config location under the platform config directory.
    ///
    /// Not available on WASM.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn default_path() -> Option<std::path::PathBuf> {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .map(|dir| dir.join("vatcore").join(CONFIG_FILENAME))
    }

    /// Load the configuration at [`default_path`](Self::default_path).
    ///
    /// Unreadable or invalid files are logged and ignored.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_default_path() -> Option<Self> {
        let path = Self::default_path()?;
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring config file {}: {e}", path.display());
                None
            }
        }
    }

    /// Load a configuration file. A missing file yields `Ok(None)`.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from(path: &std::path::Path) -> Result<Option<Self>, ConfigError> {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config file at {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let config = Self::from_json(&json)?;
        log::info!("Loaded engine config from {}", path.display());
        Ok(Some(config))
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to_default_path(&self) -> Result<(), ConfigError> {
        let path = Self::default_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Write the configuration, creating missing parent directories.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, self.to_json()?)?;
        log::info!("Saved engine config to {}", path.display());
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors of loading or storing an [`EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid engine config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Engine config version {file_version} is newer than supported version {supported_version}")]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    #[error("Engine config I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("No config directory on this platform")]
    NoConfigDir,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.interpolation.reference_width, 1024.0);
        assert_eq!(config.interpolation.reference_height, 768.0);
        assert_eq!(config.interpolation.sigma_factor, 3.0);
        assert_eq!(config.history.max_history, 100);
        assert!(!config.palette.is_empty());
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = EngineConfig::new();
        config.log_level = LogLevel::Debug;
        config.interpolation.sigma_factor = 2.5;

        let json = config.to_json().expect("serialize");
        let loaded = EngineConfig::from_json(&json).expect("deserialize");
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let loaded = EngineConfig::from_json(r#"{ "version": 1 }"#).expect("deserialize");
        assert_eq!(loaded.interpolation, InterpolationConfig::default());
        assert_eq!(loaded.history, HistoryConfig::default());
        assert_eq!(loaded.log_level, LogLevel::Info);
    }

    #[test]
    fn test_version_too_new() {
        let json = format!(r#"{{ "version": {} }}"#, CONFIG_VERSION + 1);
        let result = EngineConfig::from_json(&json);
        assert!(matches!(result, Err(ConfigError::VersionTooNew { .. })));
    }

    #[test]
    fn test_color_for_wraps_palette() {
        let config = EngineConfig::new();
        let len = config.palette.len() as u32;
        assert_eq!(config.color_for(1), config.color_for(1 + len));
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir()
            .join(format!("vatcore-config-test-{}", std::process::id()))
            .join(CONFIG_FILENAME);
        assert!(EngineConfig::load_from(&path).expect("missing file").is_none());

        let config = EngineConfig::new();
        config.save_to(&path).expect("save");
        let loaded = EngineConfig::load_from(&path).expect("load");
        assert_eq!(loaded, Some(config));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
