// ─── Launch Plan ───
// Maps a game and its runner to the argument vector and environment of the
// process to spawn. Nothing here spawns anything.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::game::{GameEntry, RunnerKind};

use super::wrapper::{translate_gamescope, wants_gamescope, GAMESCOPE_BINARY};

const STEAM_FLATPAK_APP: &str = "com.valvesoftware.Steam";
const DXVK_DLL_OVERRIDES: &str = "d3d11=n,b;dxgi=n,b";

/// The process to spawn: program first, then its arguments, plus the
/// variables layered over the inherited environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LaunchPlan {
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl LaunchPlan {
    pub fn program(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }

    pub fn args(&self) -> &[String] {
        self.command.get(1..).unwrap_or_default()
    }

    /// Copy/paste-able rendering for logs.
    pub fn display_command(&self) -> String {
        self.command
            .iter()
            .map(|part| shell_escape(part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '=' | ',')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}

// ── Host lookups ────────────────────────────────────────

/// Finds executables on the host.
pub trait BinaryLocator: Send + Sync {
    fn find(&self, name: &str) -> Option<PathBuf>;
}

/// `PATH` lookup through `which`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLocator;

impl BinaryLocator for SystemLocator {
    fn find(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }
}

/// Launcher-wide defaults for the per-game override switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompatDefaults {
    pub esync: bool,
    pub fsync: bool,
    pub dxvk_async: bool,
    pub dxvk: bool,
}

impl Default for CompatDefaults {
    fn default() -> Self {
        Self {
            esync: true,
            fsync: true,
            dxvk_async: false,
            dxvk: false,
        }
    }
}

/// Everything the builder reads from the host.
#[derive(Clone)]
pub struct LaunchContext {
    pub defaults: CompatDefaults,
    /// Steam client directory, `~/.local/share/Steam` on a typical install.
    pub steam_dir: PathBuf,
    /// `LD_LIBRARY_PATH` of the launcher process, appended for Proton.
    pub inherited_library_path: Option<String>,
    pub locator: Arc<dyn BinaryLocator>,
}

impl LaunchContext {
    pub fn from_host(defaults: CompatDefaults) -> Self {
        let steam_dir = dirs::data_local_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Steam");

        Self {
            defaults,
            steam_dir,
            inherited_library_path: std::env::var("LD_LIBRARY_PATH")
                .ok()
                .filter(|value| !value.trim().is_empty()),
            locator: Arc::new(SystemLocator),
        }
    }

    fn require(&self, binary: &str, hint: &str) -> LauncherResult<PathBuf> {
        self.locator
            .find(binary)
            .ok_or_else(|| LauncherError::DependencyMissing {
                binary: binary.to_string(),
                hint: hint.to_string(),
            })
    }
}

// ── Builder ─────────────────────────────────────────────

/// Builds [`LaunchPlan`]s against a [`LaunchContext`].
#[derive(Clone)]
pub struct LaunchEnvironmentBuilder {
    context: LaunchContext,
}

impl LaunchEnvironmentBuilder {
    pub fn new(context: LaunchContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &LaunchContext {
        &self.context
    }

    /// Build the plan for `game`. `runtime_executable` is the resolved
    /// `proton` entry point and is only read for Proton games.
    ///
    /// Validation happens before any side effect; the only thing written is
    /// the Wine prefix directory.
    pub fn build(
        &self,
        game: &GameEntry,
        runtime_executable: Option<&Path>,
    ) -> LauncherResult<LaunchPlan> {
        game.validate()?;

        let prefix = if game.runner.needs_prefix() {
            Some(require_prefix(game)?)
        } else {
            None
        };

        if matches!(
            game.runner,
            RunnerKind::Native | RunnerKind::Wine | RunnerKind::Proton(_)
        ) && !Path::new(&game.executable).exists()
        {
            return Err(LauncherError::InvalidGame {
                game: game.name.clone(),
                reason: format!("executable does not exist: {}", game.executable),
            });
        }

        let mut tokens = game.launch_options.clone();
        let wrapper = if wants_gamescope(&tokens) {
            self.context.require(
                GAMESCOPE_BINARY,
                "Install it with your package manager (e.g. dnf install gamescope).",
            )?;
            let translated = translate_gamescope(&tokens, game.fps_limit);
            tokens = translated.remaining;
            Some(translated.wrapper_args)
        } else {
            None
        };

        let mut env = BTreeMap::new();
        let runner_command = match &game.runner {
            RunnerKind::Native => {
                let mut command = vec![game.executable.clone()];
                command.extend(tokens);
                command
            }
            RunnerKind::Wine => {
                self.context.require(
                    "wine",
                    "Install it with your package manager (e.g. dnf install wine).",
                )?;
                self.apply_wine_env(game, prefix.as_deref(), &mut env);

                let mut command = vec!["wine".to_string(), game.executable.clone()];
                command.extend(tokens);
                command
            }
            RunnerKind::Proton(runtime_id) => {
                let proton = runtime_executable
                    .filter(|path| path.exists())
                    .ok_or_else(|| LauncherError::RuntimeNotFound(runtime_id.clone()))?;
                self.apply_wine_env(game, prefix.as_deref(), &mut env);
                self.apply_steam_env(prefix.as_deref(), &mut env);

                let mut command = vec![
                    proton.to_string_lossy().to_string(),
                    "waitforexitandrun".to_string(),
                    game.executable.clone(),
                ];
                command.extend(tokens);
                command
            }
            RunnerKind::Flatpak => {
                self.context.require(
                    "flatpak",
                    "Install it with your package manager (e.g. dnf install flatpak).",
                )?;

                let mut command = vec![
                    "flatpak".to_string(),
                    "run".to_string(),
                    game.executable.trim().to_string(),
                ];
                command.extend(tokens);
                command
            }
            RunnerKind::Steam => {
                let app_id = game.executable.trim().to_string();
                let mut command = if self.context.locator.find("steam").is_some() {
                    vec!["steam".to_string(), "-applaunch".to_string(), app_id]
                } else if self.context.locator.find("flatpak").is_some() {
                    vec![
                        "flatpak".to_string(),
                        "run".to_string(),
                        STEAM_FLATPAK_APP.to_string(),
                        "-applaunch".to_string(),
                        app_id,
                    ]
                } else {
                    return Err(LauncherError::DependencyMissing {
                        binary: "steam".to_string(),
                        hint: "Install Steam (e.g. flatpak install flathub com.valvesoftware.Steam)."
                            .to_string(),
                    });
                };
                command.extend(tokens);
                command
            }
        };

        if let Some(prefix) = &prefix {
            std::fs::create_dir_all(prefix).map_err(|source| LauncherError::Io {
                path: prefix.clone(),
                source,
            })?;
        }

        let command = match wrapper {
            Some(wrapper_args) => {
                let mut command = vec![GAMESCOPE_BINARY.to_string()];
                command.extend(wrapper_args);
                command.push("--".to_string());
                command.extend(runner_command);
                command
            }
            None => runner_command,
        };

        let plan = LaunchPlan { command, env };
        debug!("Launch plan for {}: {}", game.name, plan.display_command());
        Ok(plan)
    }

    fn apply_wine_env(&self, game: &GameEntry, prefix: Option<&Path>, env: &mut BTreeMap<String, String>) {
        let defaults = self.context.defaults;
        let overrides = &game.overrides;

        if let Some(prefix) = prefix {
            env.insert("WINEPREFIX".into(), prefix.to_string_lossy().to_string());
        }
        env.insert("WINEESYNC".into(), flag(overrides.esync.unwrap_or(defaults.esync)));
        env.insert("WINEFSYNC".into(), flag(overrides.fsync.unwrap_or(defaults.fsync)));
        env.insert(
            "DXVK_ASYNC".into(),
            flag(overrides.dxvk_async.unwrap_or(defaults.dxvk_async)),
        );
        if overrides.dxvk.unwrap_or(defaults.dxvk) {
            env.insert("WINEDLLOVERRIDES".into(), DXVK_DLL_OVERRIDES.into());
        }
    }

    fn apply_steam_env(&self, prefix: Option<&Path>, env: &mut BTreeMap<String, String>) {
        let steam = &self.context.steam_dir;

        if let Some(prefix) = prefix {
            env.insert(
                "STEAM_COMPAT_DATA_PATH".into(),
                prefix.to_string_lossy().to_string(),
            );
        }
        env.insert(
            "STEAM_COMPAT_CLIENT_INSTALL_PATH".into(),
            steam.to_string_lossy().to_string(),
        );
        env.insert(
            "STEAM_RUNTIME".into(),
            steam
                .join("ubuntu12_32")
                .join("steam-runtime")
                .to_string_lossy()
                .to_string(),
        );

        let mut library_path = format!(
            "{}:{}",
            steam.join("ubuntu12_32").to_string_lossy(),
            steam.join("ubuntu12_64").to_string_lossy()
        );
        if let Some(inherited) = &self.context.inherited_library_path {
            library_path.push(':');
            library_path.push_str(inherited);
        }
        env.insert("LD_LIBRARY_PATH".into(), library_path);
    }
}

fn require_prefix(game: &GameEntry) -> LauncherResult<PathBuf> {
    game.prefix
        .as_ref()
        .filter(|prefix| !prefix.as_os_str().is_empty())
        .cloned()
        .ok_or_else(|| LauncherError::MissingPrefix {
            game: game.name.clone(),
        })
}

fn flag(enabled: bool) -> String {
    let value = if enabled { "1" } else { "0" };
    value.to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Locator that only knows the binaries it was given.
    pub(crate) struct FakeLocator(pub HashSet<&'static str>);

    impl BinaryLocator for FakeLocator {
        fn find(&self, name: &str) -> Option<PathBuf> {
            self.0
                .contains(name)
                .then(|| PathBuf::from("/usr/bin").join(name))
        }
    }

    pub(crate) fn context_with(binaries: &[&'static str]) -> LaunchContext {
        LaunchContext {
            defaults: CompatDefaults::default(),
            steam_dir: PathBuf::from("/home/u/.local/share/Steam"),
            inherited_library_path: None,
            locator: Arc::new(FakeLocator(binaries.iter().copied().collect())),
        }
    }

    fn builder(binaries: &[&'static str]) -> LaunchEnvironmentBuilder {
        LaunchEnvironmentBuilder::new(context_with(binaries))
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        exe: PathBuf,
        prefix: PathBuf,
        proton: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let exe = tmp.path().join("game.exe");
        std::fs::write(&exe, b"MZ").unwrap();
        let proton = tmp.path().join("GE-Proton9-7/proton");
        std::fs::create_dir_all(proton.parent().unwrap()).unwrap();
        std::fs::write(&proton, b"#!/bin/sh").unwrap();
        let prefix = tmp.path().join("Prefixes/Game");
        Fixture {
            exe,
            prefix,
            proton,
            _tmp: tmp,
        }
    }

    fn game(fx: &Fixture, runner: RunnerKind) -> GameEntry {
        let mut game = GameEntry::new("Game", fx.exe.to_string_lossy(), runner);
        game.prefix = Some(fx.prefix.clone());
        game
    }

    #[test]
    fn native_runs_executable_with_tokens() {
        let fx = fixture();
        let mut entry = game(&fx, RunnerKind::Native);
        entry.launch_options = vec!["-windowed".into()];

        let plan = builder(&[]).build(&entry, None).unwrap();
        assert_eq!(plan.command, vec![fx.exe.to_string_lossy().to_string(), "-windowed".into()]);
        assert!(plan.env.is_empty());
        assert!(!fx.prefix.exists());
    }

    #[test]
    fn wine_without_prefix_fails_before_anything_else() {
        let fx = fixture();
        let mut entry = game(&fx, RunnerKind::Wine);
        entry.prefix = None;

        let err = builder(&[]).build(&entry, None).unwrap_err();
        assert!(matches!(err, LauncherError::MissingPrefix { .. }));

        entry.prefix = Some(PathBuf::new());
        let err = builder(&["wine"]).build(&entry, None).unwrap_err();
        assert!(matches!(err, LauncherError::MissingPrefix { .. }));
    }

    #[test]
    fn wine_env_uses_overrides_then_defaults() {
        let fx = fixture();
        let mut entry = game(&fx, RunnerKind::Wine);
        entry.overrides.fsync = Some(false);
        entry.overrides.dxvk = Some(true);

        let plan = builder(&["wine"]).build(&entry, None).unwrap();
        assert_eq!(plan.program(), Some("wine"));
        assert_eq!(plan.env["WINEPREFIX"], fx.prefix.to_string_lossy());
        assert_eq!(plan.env["WINEESYNC"], "1");
        assert_eq!(plan.env["WINEFSYNC"], "0");
        assert_eq!(plan.env["DXVK_ASYNC"], "0");
        assert_eq!(plan.env["WINEDLLOVERRIDES"], "d3d11=n,b;dxgi=n,b");
        assert!(fx.prefix.is_dir());
    }

    #[test]
    fn wine_requires_binary() {
        let fx = fixture();
        let err = builder(&[]).build(&game(&fx, RunnerKind::Wine), None).unwrap_err();
        assert!(matches!(err, LauncherError::DependencyMissing { ref binary, .. } if binary == "wine"));
        assert!(!fx.prefix.exists());
    }

    #[test]
    fn missing_executable_is_rejected() {
        let fx = fixture();
        let mut entry = game(&fx, RunnerKind::Native);
        entry.executable = "/definitely/not/here.exe".into();
        let err = builder(&[]).build(&entry, None).unwrap_err();
        assert!(matches!(err, LauncherError::InvalidGame { .. }));
    }

    #[test]
    fn proton_sets_steam_compat_environment() {
        let fx = fixture();
        let mut context = context_with(&[]);
        context.inherited_library_path = Some("/opt/lib".into());
        let entry = game(&fx, RunnerKind::Proton("GE-Proton9-7".into()));

        let plan = LaunchEnvironmentBuilder::new(context)
            .build(&entry, Some(&fx.proton))
            .unwrap();

        assert_eq!(
            plan.command,
            vec![
                fx.proton.to_string_lossy().to_string(),
                "waitforexitandrun".to_string(),
                fx.exe.to_string_lossy().to_string(),
            ]
        );
        assert_eq!(plan.env["STEAM_COMPAT_DATA_PATH"], fx.prefix.to_string_lossy());
        assert_eq!(
            plan.env["STEAM_COMPAT_CLIENT_INSTALL_PATH"],
            "/home/u/.local/share/Steam"
        );
        assert_eq!(
            plan.env["STEAM_RUNTIME"],
            "/home/u/.local/share/Steam/ubuntu12_32/steam-runtime"
        );
        assert_eq!(
            plan.env["LD_LIBRARY_PATH"],
            "/home/u/.local/share/Steam/ubuntu12_32:/home/u/.local/share/Steam/ubuntu12_64:/opt/lib"
        );
        assert_eq!(plan.env["WINEPREFIX"], fx.prefix.to_string_lossy());
    }

    #[test]
    fn proton_without_runtime_is_not_found() {
        let fx = fixture();
        let entry = game(&fx, RunnerKind::Proton("GE-Proton9-7".into()));

        let err = builder(&[]).build(&entry, None).unwrap_err();
        assert!(matches!(err, LauncherError::RuntimeNotFound(ref id) if id == "GE-Proton9-7"));

        let err = builder(&[])
            .build(&entry, Some(Path::new("/nope/proton")))
            .unwrap_err();
        assert!(matches!(err, LauncherError::RuntimeNotFound(_)));
    }

    #[test]
    fn gamescope_wraps_runner_command() {
        let fx = fixture();
        let mut entry = game(&fx, RunnerKind::Wine);
        entry.launch_options = ["--gamescope", "--fullscreen", "--width=1920", "--height=1080", "-novid"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        entry.fps_limit = Some(60);

        let plan = builder(&["wine", "gamescope"]).build(&entry, None).unwrap();
        let exe = fx.exe.to_string_lossy().to_string();
        assert_eq!(
            plan.command,
            vec![
                "gamescope", "-W", "1920", "-H", "1080", "-f", "-r", "60", "--", "wine", exe.as_str(), "-novid"
            ]
        );
    }

    #[test]
    fn gamescope_must_be_installed() {
        let fx = fixture();
        let mut entry = game(&fx, RunnerKind::Native);
        entry.launch_options = vec!["--gamescope".into()];

        let err = builder(&[]).build(&entry, None).unwrap_err();
        assert!(matches!(err, LauncherError::DependencyMissing { ref binary, .. } if binary == "gamescope"));
    }

    #[test]
    fn steam_prefers_native_client() {
        let entry = GameEntry::new("Portal 2", "620", RunnerKind::Steam);

        let plan = builder(&["steam", "flatpak"]).build(&entry, None).unwrap();
        assert_eq!(plan.command, vec!["steam", "-applaunch", "620"]);

        let plan = builder(&["flatpak"]).build(&entry, None).unwrap();
        assert_eq!(
            plan.command,
            vec!["flatpak", "run", "com.valvesoftware.Steam", "-applaunch", "620"]
        );

        let err = builder(&[]).build(&entry, None).unwrap_err();
        assert!(matches!(err, LauncherError::DependencyMissing { .. }));
    }

    #[test]
    fn flatpak_runs_app_id() {
        let mut entry = GameEntry::new("Minetest", "net.minetest.Minetest", RunnerKind::Flatpak);
        entry.launch_options = vec!["--go".into()];

        let plan = builder(&["flatpak"]).build(&entry, None).unwrap();
        assert_eq!(plan.command, vec!["flatpak", "run", "net.minetest.Minetest", "--go"]);

        assert!(matches!(
            builder(&[]).build(&entry, None),
            Err(LauncherError::DependencyMissing { .. })
        ));
    }

    #[test]
    fn display_command_quotes_spaces() {
        let plan = LaunchPlan {
            command: vec!["wine".into(), "/games/My Game/game.exe".into()],
            env: BTreeMap::new(),
        };
        assert_eq!(plan.display_command(), "wine \"/games/My Game/game.exe\"");
    }
}
