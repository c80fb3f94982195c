use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

use crate::core::error::{LauncherError, LauncherResult};

/// How a game is started.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunnerKind {
    /// Run the executable directly.
    Native,
    /// System Wine.
    Wine,
    /// An installed Proton runtime, by identifier.
    Proton(String),
    /// `flatpak run <app-id>`.
    Flatpak,
    /// `steam -applaunch <app-id>`.
    Steam,
}

impl RunnerKind {
    pub fn needs_prefix(&self) -> bool {
        matches!(self, RunnerKind::Wine | RunnerKind::Proton(_))
    }

    /// Runner from its display name, case-insensitive. Proton needs the
    /// identifier of an installed runtime.
    pub fn from_name(name: &str, runtime: Option<&str>) -> Result<Self, String> {
        match name.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(RunnerKind::Native),
            "wine" => Ok(RunnerKind::Wine),
            "flatpak" => Ok(RunnerKind::Flatpak),
            "steam" => Ok(RunnerKind::Steam),
            "proton" => runtime
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| RunnerKind::Proton(id.to_string()))
                .ok_or_else(|| "a Proton version is required for Proton games".to_string()),
            other => Err(format!("unknown runner: {other}")),
        }
    }
}

impl std::fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunnerKind::Native => write!(f, "Native"),
            RunnerKind::Wine => write!(f, "Wine"),
            RunnerKind::Proton(id) => write!(f, "Proton ({id})"),
            RunnerKind::Flatpak => write!(f, "Flatpak"),
            RunnerKind::Steam => write!(f, "Steam"),
        }
    }
}

/// Per-game tweaks. `None` falls back to the launcher-wide default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub esync: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fsync: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dxvk_async: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dxvk: Option<bool>,
}

/// One entry of `games.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameEntry {
    pub name: String,
    /// A path for Native, Wine and Proton; the app id for Steam and Flatpak.
    #[serde(alias = "exe")]
    pub executable: String,
    pub runner: RunnerKind,
    #[serde(default)]
    pub prefix: Option<PathBuf>,
    #[serde(default, deserialize_with = "deserialize_launch_options")]
    pub launch_options: Vec<String>,
    #[serde(default)]
    pub overrides: GameOverrides,
    #[serde(default)]
    pub fps_limit: Option<u32>,
}

impl GameEntry {
    pub fn new(name: impl Into<String>, executable: impl Into<String>, runner: RunnerKind) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            runner,
            prefix: None,
            launch_options: Vec::new(),
            overrides: GameOverrides::default(),
            fps_limit: None,
        }
    }

    /// Checks that do not touch the filesystem. Prefix and executable
    /// presence are checked when a launch is built.
    pub fn validate(&self) -> LauncherResult<()> {
        if self.name.trim().is_empty() {
            return Err(self.invalid("name is empty"));
        }

        match self.runner {
            RunnerKind::Steam => {
                let app_id = self.executable.trim();
                if app_id.is_empty() || !app_id.chars().all(|c| c.is_ascii_digit()) {
                    return Err(self.invalid("Steam app id must be numeric"));
                }
            }
            RunnerKind::Flatpak => {
                if self.executable.trim().is_empty() {
                    return Err(self.invalid("Flatpak app id is empty"));
                }
            }
            RunnerKind::Proton(ref runtime) if runtime.trim().is_empty() => {
                return Err(self.invalid("no Proton version selected"));
            }
            _ => {
                if self.executable.trim().is_empty() {
                    return Err(self.invalid("executable is empty"));
                }
            }
        }

        Ok(())
    }

    fn invalid(&self, reason: &str) -> LauncherError {
        LauncherError::InvalidGame {
            game: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Split a launch-options string on whitespace.
pub fn parse_launch_options(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Accept both a token list and a single whitespace-separated string.
fn deserialize_launch_options<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawOptions {
        Tokens(Vec<String>),
        Line(String),
    }

    Ok(match Option::<RawOptions>::deserialize(deserializer)? {
        Some(RawOptions::Tokens(tokens)) => tokens,
        Some(RawOptions::Line(line)) => parse_launch_options(&line),
        None => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_options_accept_string_or_list() {
        let from_line: GameEntry = serde_json::from_str(
            r#"{"name":"Celeste","exe":"/games/celeste.exe","runner":"Wine","prefix":"/p","launch_options":"--gamescope  --fullscreen"}"#,
        )
        .unwrap();
        assert_eq!(from_line.launch_options, vec!["--gamescope", "--fullscreen"]);
        assert_eq!(from_line.executable, "/games/celeste.exe");

        let from_list: GameEntry = serde_json::from_str(
            r#"{"name":"Hades","executable":"/g/hades","runner":{"Proton":"GE-Proton9-7"},"launch_options":["-dx11"]}"#,
        )
        .unwrap();
        assert_eq!(from_list.launch_options, vec!["-dx11"]);
        assert_eq!(from_list.runner, RunnerKind::Proton("GE-Proton9-7".into()));
        assert_eq!(from_list.prefix, None);
    }

    #[test]
    fn steam_app_id_must_be_numeric() {
        let ok = GameEntry::new("Portal 2", "620", RunnerKind::Steam);
        assert!(ok.validate().is_ok());

        let bad = GameEntry::new("Portal 2", "portal2", RunnerKind::Steam);
        assert!(matches!(bad.validate(), Err(LauncherError::InvalidGame { .. })));
    }

    #[test]
    fn flatpak_needs_app_id() {
        let bad = GameEntry::new("Minetest", " ", RunnerKind::Flatpak);
        assert!(bad.validate().is_err());
        let ok = GameEntry::new("Minetest", "net.minetest.Minetest", RunnerKind::Flatpak);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn runner_from_name() {
        assert_eq!(RunnerKind::from_name("wine", None), Ok(RunnerKind::Wine));
        assert_eq!(RunnerKind::from_name(" Steam ", None), Ok(RunnerKind::Steam));
        assert_eq!(
            RunnerKind::from_name("Proton", Some("GE-Proton9-7")),
            Ok(RunnerKind::Proton("GE-Proton9-7".into()))
        );
        assert!(RunnerKind::from_name("Proton", None).is_err());
        assert!(RunnerKind::from_name("Proton", Some("  ")).is_err());
        assert!(RunnerKind::from_name("dosbox", None).is_err());
    }

    #[test]
    fn parse_launch_options_drops_empty_tokens() {
        assert_eq!(
            parse_launch_options("  --width=1920\t--height=1080 "),
            vec!["--width=1920", "--height=1080"]
        );
        assert!(parse_launch_options("").is_empty());
    }
}
