//! Launcher settings.
//!
//! Stored as JSON, typically in ~/.config/keikai/settings.json. A missing or
//! unreadable file means defaults.

use keikai_apps::{Enumeration, SortOrder, detect_enumeration};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which application directories to enumerate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumerationSetting {
    /// Decide at startup from what exists on disk.
    #[default]
    Auto,
    Basic,
    ProfileAware,
}

impl EnumerationSetting {
    pub fn resolve(self) -> Enumeration {
        match self {
            EnumerationSetting::Auto => detect_enumeration(),
            EnumerationSetting::Basic => Enumeration::Basic,
            EnumerationSetting::ProfileAware => Enumeration::ProfileAware,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    pub order: SortOrder,
    pub icons_enabled: bool,
    /// Icons larger than this are scaled down.
    pub icon_size_px: u32,
    pub max_icon_threads: usize,
    /// 0 or less = unbounded.
    pub icon_queue_capacity: i32,
    pub enumeration: EnumerationSetting,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            order: SortOrder::Alphabetical,
            icons_enabled: true,
            icon_size_px: 48,
            max_icon_threads: 4,
            icon_queue_capacity: 300,
            enumeration: EnumerationSetting::Auto,
        }
    }
}

impl LauncherSettings {
    /// Load from config file
    pub fn load(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Ignoring invalid settings {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Save to config file
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
