//! Persistent user settings for FailFixer
//!
//! Settings are stored in a TOML configuration file at:
//! - Linux: `~/.config/failfixer/failfixer_config.toml`
//! - macOS: `~/Library/Application Support/failfixer/failfixer_config.toml`
//! - Windows: `%APPDATA%\failfixer\failfixer_config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! [resume]
//! mode = "in_air"
//! z_offset = 0.0
//! profile = "auto"
//!
//! [profiles]
//! dir = "/home/me/printer-profiles"
//!
//! [behavior]
//! skip_confirmation = false
//! quiet = false
//! ```

use crate::generator::ResumeMode;
use crate::profile::AUTO_PROFILE_NAME;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration file name
const CONFIG_FILE_NAME: &str = "failfixer_config.toml";

/// Application name for config directory
const APP_NAME: &str = "failfixer";

/// User settings loaded from configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Resume defaults
    pub resume: ResumeSettings,

    /// Profile directory settings
    pub profiles: ProfileSettings,

    /// Behavior settings
    pub behavior: BehaviorSettings,
}

/// Defaults for the `resume` command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResumeSettings {
    /// Default resume mode
    pub mode: ResumeMode,

    /// Default Z offset in mm
    pub z_offset: f64,

    /// Default profile name (`auto` detects the firmware)
    pub profile: String,
}

impl Default for ResumeSettings {
    fn default() -> Self {
        Self {
            mode: ResumeMode::InAir,
            z_offset: 0.0,
            profile: AUTO_PROFILE_NAME.to_string(),
        }
    }
}

/// Where printer profiles are looked up
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProfileSettings {
    /// Profile directory; unset uses the standard search order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// General behavior settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BehaviorSettings {
    /// Whether to skip confirmation prompts by default
    pub skip_confirmation: bool,

    /// Whether to suppress non-error output
    pub quiet: bool,
}

impl Settings {
    /// Load settings from the configuration file
    ///
    /// Returns default settings if the file doesn't exist or can't be parsed
    pub fn load() -> Self {
        Self::load_from_path(Self::config_path())
    }

    /// Load settings from a specific path
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            tracing::debug!("No config path available, using defaults");
            return Self::default();
        };

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Self::default();
        }

        match Self::try_load(&path) {
            Ok(settings) => {
                tracing::debug!("Loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                tracing::warn!("{}; using defaults", e);
                Self::default()
            }
        }
    }

    /// Load settings, reporting read and parse failures
    pub fn try_load(path: &std::path::Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&contents).map_err(SettingsError::Deserialize)
    }

    /// Save settings to a specific path
    pub fn save_to_path(&self, path: Option<PathBuf>) -> Result<PathBuf, SettingsError> {
        let path = path.ok_or(SettingsError::NoConfigDir)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let contents = toml::to_string_pretty(self).map_err(SettingsError::Serialize)?;

        std::fs::write(&path, contents).map_err(|e| SettingsError::Io {
            path: path.clone(),
            source: e,
        })?;

        tracing::info!("Saved settings to {:?}", path);
        Ok(path)
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|p| p.join(APP_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a default configuration file content as a string
    pub fn default_config_string() -> String {
        let default = Self::default();
        toml::to_string_pretty(&default)
            .unwrap_or_else(|_| String::from("# Failed to generate default config"))
    }
}

/// Errors that can occur when working with settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// No configuration directory available
    #[error("Could not determine configuration directory")]
    NoConfigDir,

    /// Failed to read or write config file
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path that caused the error
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// Failed to serialize settings
    #[error("Failed to serialize settings: {0}")]
    Serialize(toml::ser::Error),

    /// Failed to deserialize settings
    #[error("Failed to parse settings: {0}")]
    Deserialize(toml::de::Error),
}
