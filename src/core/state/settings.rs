use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::launch::CompatDefaults;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoUpdate {
    Enabled,
    Disabled,
}

/// `Config/settings.json`. Missing keys fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    /// Runner name used when a game is added without one.
    pub default_runner: String,
    pub auto_update: AutoUpdate,
    pub enable_esync: bool,
    pub enable_fsync: bool,
    pub enable_dxvk_async: bool,
    pub enable_dxvk: bool,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            default_runner: "Proton".to_string(),
            auto_update: AutoUpdate::Enabled,
            enable_esync: true,
            enable_fsync: true,
            enable_dxvk_async: false,
            enable_dxvk: false,
        }
    }
}

impl LauncherSettings {
    /// Read the settings file. A missing or unreadable file yields defaults.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                warn!("Could not read {:?}, using defaults: {}", path, err);
                return Self::default();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!("Corrupt settings file {:?}, using defaults: {}", path, err);
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> LauncherResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LauncherError::io(parent, source))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| LauncherError::io(path, source))
    }

    pub fn auto_update_enabled(&self) -> bool {
        self.auto_update == AutoUpdate::Enabled
    }

    /// Launcher-wide values for the per-game override switches.
    pub fn compat_defaults(&self) -> CompatDefaults {
        CompatDefaults {
            esync: self.enable_esync,
            fsync: self.enable_fsync,
            dxvk_async: self.enable_dxvk_async,
            dxvk: self.enable_dxvk,
        }
    }
}
