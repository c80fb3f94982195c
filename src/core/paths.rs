use std::path::{Path, PathBuf};

use crate::core::error::{LauncherError, LauncherResult};

const HOME_ENV_OVERRIDE: &str = "HACKER_LAUNCHER_HOME";
const APP_DIR_NAME: &str = "Hacker-Launcher";

/// On-disk layout of the launcher home.
///
/// ```text
/// <base>/Protons/<version>/    installed runtimes
/// <base>/Prefixes/<game>/      per-game Wine prefixes
/// <base>/Config/games.json
/// <base>/Config/settings.json
/// <base>/Logs/<game>.log
/// ```
#[derive(Debug, Clone)]
pub struct LauncherPaths {
    base_dir: PathBuf,
}

impl LauncherPaths {
    pub fn from_base(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// `$HACKER_LAUNCHER_HOME`, falling back to `~/.hackeros/Hacker-Launcher`.
    pub fn from_env() -> Self {
        if let Some(base) = std::env::var_os(HOME_ENV_OVERRIDE).filter(|v| !v.is_empty()) {
            return Self::from_base(PathBuf::from(base));
        }

        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::from_base(home.join(".hackeros").join(APP_DIR_NAME))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn protons_dir(&self) -> PathBuf {
        self.base_dir.join("Protons")
    }

    pub fn prefixes_dir(&self) -> PathBuf {
        self.base_dir.join("Prefixes")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.base_dir.join("Config")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("Logs")
    }

    pub fn games_file(&self) -> PathBuf {
        self.config_dir().join("games.json")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir().join("settings.json")
    }

    /// Default prefix location for a game that has none configured.
    pub fn default_prefix_for(&self, game_name: &str) -> PathBuf {
        self.prefixes_dir().join(file_safe_name(game_name))
    }

    /// Per-game launch log, named deterministically from the display name.
    pub fn game_log_file(&self, game_name: &str) -> PathBuf {
        self.logs_dir()
            .join(format!("{}.log", file_safe_name(game_name)))
    }

    /// Create every directory of the layout.
    pub fn ensure_layout(&self) -> LauncherResult<()> {
        for dir in [
            self.config_dir(),
            self.prefixes_dir(),
            self.protons_dir(),
            self.logs_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|source| LauncherError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Replace whitespace and path separators so a display name is a single file name.
pub fn file_safe_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|ch| match ch {
            ' ' | '\t' | '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}
