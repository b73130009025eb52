use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::SignalConfig;
use crate::error::SettingsError;

pub const DEFAULT_SETTINGS_PATH: &str = "data/settings.json";
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub timezone: String,
    pub gemini_api_key: String,
    pub signals: SignalConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            gemini_api_key: String::new(),
            signals: SignalConfig::default(),
        }
    }
}

impl Settings {
    /// Display timezone; anything unparseable falls back to UTC.
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(Tz::UTC)
    }

    pub fn has_api_key(&self) -> bool {
        !self.gemini_api_key.trim().is_empty()
    }
}

/// JSON settings file that survives restarts.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `SETTINGS_PATH` or `data/settings.json`.
    pub fn from_env() -> Self {
        let path = std::env::var("SETTINGS_PATH").unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.to_string());
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the file with defaults on first run. Missing keys are
    /// back-filled; a corrupt file reads as defaults.
    pub fn load(&self) -> Result<Settings, SettingsError> {
        self.ensure_file()?;
        let text = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&text) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable settings, using defaults");
                Ok(Settings::default())
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        self.ensure_dir()?;
        fs::write(&self.path, serde_json::to_string_pretty(settings)?)?;
        info!(path = %self.path.display(), "saved settings");
        Ok(())
    }

    fn ensure_dir(&self) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    fn ensure_file(&self) -> Result<(), SettingsError> {
        if !self.path.exists() {
            self.save(&Settings::default())?;
        }
        Ok(())
    }
}
