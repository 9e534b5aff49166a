//! Application Configuration
//! Handles saving and loading of tempo limits, media host and logging settings

use crate::catalog::DEFAULT_MEDIA_BASE_URL;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default tempo
pub const DEFAULT_BPM: f64 = 120.0;

/// Lowest tempo the tempo control accepts
pub const DEFAULT_MIN_BPM: f64 = 60.0;

/// Highest tempo the tempo control accepts
pub const DEFAULT_MAX_BPM: f64 = 200.0;

/// Get config directory path
fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("loopgraph"))
}

/// Get config file path
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|p| p.join("config.json"))
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Config version (for future migrations)
    pub version: u32,
    /// Tempo a fresh patch starts at
    pub default_bpm: f64,
    pub min_bpm: f64,
    pub max_bpm: f64,
    /// Host that catalog media paths are appended to
    pub media_base_url: String,
    /// Catalog file, `~` allowed
    pub catalog_path: Option<String>,
    /// `tracing` filter used when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            default_bpm: DEFAULT_BPM,
            min_bpm: DEFAULT_MIN_BPM,
            max_bpm: DEFAULT_MAX_BPM,
            media_base_url: DEFAULT_MEDIA_BASE_URL.to_string(),
            catalog_path: None,
            log_filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk
    pub fn load() -> Self {
        match get_config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::warn!("[Config] Could not determine config path, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("[Config] No config file found, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
                Ok(config) => {
                    tracing::info!("[Config] Loaded configuration from {:?}", path);
                    config.normalized()
                }
                Err(e) => {
                    tracing::error!("[Config] Failed to parse config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::error!("[Config] Failed to read config: {}", e);
                Self::default()
            }
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = get_config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Create directory if needed
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;

        tracing::info!("[Config] Saved configuration to {:?}", path);
        Ok(())
    }

    /// Repair a tempo range that is empty or not finite
    fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.min_bpm.is_finite() && self.min_bpm > 0.0) {
            self.min_bpm = defaults.min_bpm;
        }
        if !(self.max_bpm.is_finite() && self.max_bpm >= self.min_bpm) {
            self.max_bpm = self.min_bpm.max(defaults.max_bpm);
        }
        if !self.default_bpm.is_finite() {
            self.default_bpm = defaults.default_bpm;
        }
        self.default_bpm = self.clamp_bpm(self.default_bpm);
        self
    }

    /// Pin a tempo into the configured range
    pub fn clamp_bpm(&self, bpm: f64) -> f64 {
        if bpm.is_nan() {
            return self.default_bpm.clamp(self.min_bpm, self.max_bpm);
        }
        bpm.clamp(self.min_bpm, self.max_bpm)
    }

    /// Catalog path with `~` and environment variables expanded
    pub fn expanded_catalog_path(&self) -> Option<String> {
        self.catalog_path.as_deref().map(|path| {
            shellexpand::full(path)
                .map(|p| p.into_owned())
                .unwrap_or_else(|_| path.to_string())
        })
    }
}

// --- Global config state ---

use parking_lot::RwLock;
use std::sync::LazyLock;

static APP_CONFIG: LazyLock<RwLock<AppConfig>> = LazyLock::new(|| RwLock::new(AppConfig::load()));

/// Get full config
pub fn get_config() -> AppConfig {
    APP_CONFIG.read().clone()
}

/// Replace the config and persist it
pub fn update_config(config: AppConfig) -> Result<(), ConfigError> {
    let mut current = APP_CONFIG.write();
    *current = config.normalized();
    current.save()
}

/// Save the tempo a fresh patch starts at
pub fn save_default_bpm(bpm: f64) -> Result<(), ConfigError> {
    let mut config = APP_CONFIG.write();
    config.default_bpm = config.clamp_bpm(bpm);
    config.save()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.default_bpm, 120.0);
        assert_eq!(config.min_bpm, 60.0);
        assert_eq!(config.max_bpm, 200.0);
        assert_eq!(config.media_base_url, DEFAULT_MEDIA_BASE_URL);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_clamp_bpm() {
        let config = AppConfig::default();
        assert_eq!(config.clamp_bpm(30.0), 60.0);
        assert_eq!(config.clamp_bpm(500.0), 200.0);
        assert_eq!(config.clamp_bpm(96.0), 96.0);
        assert_eq!(config.clamp_bpm(f64::NAN), 120.0);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{ "max_bpm": 240.0 }"#).unwrap();
        assert_eq!(config.max_bpm, 240.0);
        assert_eq!(config.min_bpm, 60.0);
    }

    #[test]
    fn test_normalize_inverted_range() {
        let config = AppConfig {
            min_bpm: 150.0,
            max_bpm: 100.0,
            default_bpm: 90.0,
            ..AppConfig::default()
        }
        .normalized();
        assert_eq!(config.min_bpm, 150.0);
        assert_eq!(config.max_bpm, 200.0);
        assert_eq!(config.default_bpm, 150.0);
    }
}
