use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio_system::effects::ease::Ease;
use crate::audio_system::effects::fade::{DEFAULT_FADE_MS, FRAME_RATE};
use crate::audio_system::effects::volume::{MAX_VOLUME, MIN_VOLUME};
use crate::audio_system::manager::MAX_RECYCLED_SOUNDS;
use crate::error::ConfigError;

fn default_master_volume() -> f64 {
    100.0
}

fn default_max_recycled_sounds() -> usize {
    MAX_RECYCLED_SOUNDS
}

fn default_frame_rate() -> f64 {
    FRAME_RATE
}

fn default_fade_ms() -> f64 {
    DEFAULT_FADE_MS
}

fn default_ease() -> String {
    Ease::default().name().to_string()
}

/// Sound bus settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Initial master volume (0-200, 100 is unity gain)
    #[serde(default = "default_master_volume")]
    pub master_volume: f64,

    /// Most wiped sounds kept for reuse
    #[serde(default = "default_max_recycled_sounds")]
    pub max_recycled_sounds: usize,

    /// Logical frames per second for fades
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,

    /// Fade duration used by `SoundBus::fade_request`
    #[serde(default = "default_fade_ms")]
    pub default_fade_ms: f64,

    /// Curve name used by `SoundBus::fade_request`
    #[serde(default = "default_ease")]
    pub default_ease: String,

    /// Directory relative sound paths are read from
    #[serde(default)]
    pub asset_dir: Option<PathBuf>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            master_volume: default_master_volume(),
            max_recycled_sounds: default_max_recycled_sounds(),
            frame_rate: default_frame_rate(),
            default_fade_ms: default_fade_ms(),
            default_ease: default_ease(),
            asset_dir: None,
        }
    }
}

impl BusConfig {
    /// Load configuration from the platform-specific config directory.
    /// Creates default config if file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, writing the defaults there if the
    /// file is missing
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = BusConfig::default();
            config.save_to(path)?;
            tracing::info!("Created default config at: {}", path.display());
            return Ok(config);
        }

        let load_failed = |source: Box<dyn std::error::Error + Send + Sync>| ConfigError::LoadFailed {
            path: path.display().to_string(),
            source,
        };

        let content = fs::read_to_string(path).map_err(|e| load_failed(Box::new(e)))?;
        let config: BusConfig = serde_json::from_str(&content).map_err(|e| load_failed(Box::new(e)))?;
        config.validate()?;

        tracing::info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Save configuration to the platform-specific config directory
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::DirectoryCreationFailed {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let save_failed = |source: Box<dyn std::error::Error + Send + Sync>| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source,
        };

        let json = serde_json::to_string_pretty(self).map_err(|e| save_failed(Box::new(e)))?;
        fs::write(path, json).map_err(|e| save_failed(Box::new(e)))?;

        Ok(())
    }

    /// Config file path in the user config folder
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("SoundBus"))
            .unwrap_or_else(|| PathBuf::from("config"))
            .join("config.json")
    }

    /// Check every value is usable by the bus
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_VOLUME..=MAX_VOLUME).contains(&self.master_volume) {
            return Err(ConfigError::Invalid(format!(
                "master_volume {} is outside {}..={}",
                self.master_volume, MIN_VOLUME, MAX_VOLUME
            )));
        }
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "frame_rate must be positive, got {}",
                self.frame_rate
            )));
        }
        if !self.default_fade_ms.is_finite() || self.default_fade_ms < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "default_fade_ms must not be negative, got {}",
                self.default_fade_ms
            )));
        }
        if self.default_ease.parse::<Ease>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown default_ease \"{}\"",
                self.default_ease
            )));
        }

        Ok(())
    }

    /// Resolve a sound path against `asset_dir`
    pub fn asset_path(&self, path: &str) -> PathBuf {
        match &self.asset_dir {
            Some(dir) => dir.join(path),
            None => PathBuf::from(path),
        }
    }
}
