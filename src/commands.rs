// ─── Commands ───
// Async operations exposed to front ends. Every command takes the shared
// `AppState` and returns `LauncherResult`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::game::{GameEntry, RunnerKind};
use crate::core::launch::{LaunchContext, LaunchEnvironmentBuilder, LaunchedProcess};
use crate::core::runtime::extract::strip_archive_extension;
use crate::core::runtime::{
    ArchiveSource, AvailableUpdate, ProgressFn, ReleaseDescriptor, RuntimeChannel,
    RuntimePackage,
};
use crate::core::state::{AppState, LauncherSettings};

#[derive(Debug, Clone, Serialize)]
pub struct InstalledRuntimeInfo {
    pub identifier: String,
    pub channel: RuntimeChannel,
    pub installed_at: DateTime<Utc>,
    pub root: PathBuf,
    /// Only filled when automatic update checks are enabled.
    pub update: Option<AvailableUpdate>,
}

impl InstalledRuntimeInfo {
    fn from_package(package: RuntimePackage, update: Option<AvailableUpdate>) -> Self {
        Self {
            identifier: package.identifier,
            channel: package.channel,
            installed_at: package.installed_at,
            root: package.root,
            update,
        }
    }

    /// "Installed" or "Update Available (<tag>)".
    pub fn status(&self) -> String {
        match &self.update {
            Some(update) => format!("Update Available ({})", update.version),
            None => "Installed".to_string(),
        }
    }
}

// ─── Runtimes ───

pub async fn installed_runtimes(state: &AppState) -> LauncherResult<Vec<InstalledRuntimeInfo>> {
    let packages = state.registry.list_installed().await?;
    let check_updates = state.settings.read().await.auto_update_enabled();

    let mut infos = Vec::with_capacity(packages.len());
    for package in packages {
        let update = if check_updates && package.channel != RuntimeChannel::Custom {
            state
                .updates
                .check_update(&package.identifier, package.channel)
                .await
        } else {
            None
        };
        infos.push(InstalledRuntimeInfo::from_package(package, update));
    }
    Ok(infos)
}

pub async fn available_runtimes(
    state: &AppState,
    channel: RuntimeChannel,
) -> LauncherResult<Vec<ReleaseDescriptor>> {
    if channel == RuntimeChannel::Custom {
        return Ok(Vec::new());
    }
    Ok(state.resolver.list_available(channel).await.as_ref().clone())
}

/// Download and install one release of a channel. The tag becomes the
/// runtime identifier.
#[instrument(skip(state, progress, cancel))]
pub async fn install_release(
    state: &AppState,
    channel: RuntimeChannel,
    tag: &str,
    progress: ProgressFn,
    cancel: CancellationToken,
) -> LauncherResult<RuntimePackage> {
    let release = state.resolver.find_release(channel, tag).await?;
    let package = state
        .installer
        .install_from_archive(ArchiveSource::Remote(release), tag, progress, cancel)
        .await?;
    info!("Installed {} from {}", package.identifier, channel);
    Ok(package)
}

/// Install a local `.tar.gz` or `.zip`. Without `name` the identifier is the
/// file name minus its archive extension.
#[instrument(skip(state, progress, cancel))]
pub async fn install_custom_archive(
    state: &AppState,
    archive: &Path,
    name: Option<&str>,
    progress: ProgressFn,
    cancel: CancellationToken,
) -> LauncherResult<RuntimePackage> {
    let identifier = match name {
        Some(name) => name.trim().to_string(),
        None => identifier_from_path(archive)?,
    };

    state
        .installer
        .install_from_archive(
            ArchiveSource::Local(archive.to_path_buf()),
            &identifier,
            progress,
            cancel,
        )
        .await
}

#[instrument(skip(state))]
pub async fn install_custom_folder(
    state: &AppState,
    folder: &Path,
    name: Option<&str>,
) -> LauncherResult<RuntimePackage> {
    let identifier = match name {
        Some(name) => name.trim().to_string(),
        None => identifier_from_path(folder)?,
    };

    state.installer.install_from_folder(folder, &identifier).await
}

fn identifier_from_path(path: &Path) -> LauncherResult<String> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| LauncherError::Other(format!("Cannot derive a name from {path:?}")))?;
    Ok(strip_archive_extension(&file_name).to_string())
}

/// Returns `false` when nothing was installed under `identifier`.
pub async fn remove_runtime(state: &AppState, identifier: &str) -> LauncherResult<bool> {
    state.registry.runtime_dir(identifier)?;
    Ok(state.registry.remove(identifier).await)
}

/// Head release of the runtime's channel, when it differs. Custom runtimes
/// never have updates.
pub async fn check_runtime_update(
    state: &AppState,
    identifier: &str,
) -> LauncherResult<Option<AvailableUpdate>> {
    let package = state.registry.get(identifier).await?;
    if package.channel == RuntimeChannel::Custom {
        return Ok(None);
    }
    Ok(state
        .updates
        .check_update(&package.identifier, package.channel)
        .await)
}

// ─── Games ───

pub async fn list_games(state: &AppState) -> LauncherResult<Vec<GameEntry>> {
    state.games.load().await
}

/// Store a game. Wine and Proton games without a prefix get the default
/// `Prefixes/<name>` location.
pub async fn add_game(state: &AppState, mut game: GameEntry) -> LauncherResult<GameEntry> {
    if game.runner.needs_prefix() && game.prefix.is_none() {
        game.prefix = Some(state.paths.default_prefix_for(&game.name));
    }
    state.games.add(game.clone()).await?;
    Ok(game)
}

/// Runner for a new game. Without an explicit `runner` the configured
/// default runner is used.
pub async fn resolve_runner(
    state: &AppState,
    game: &str,
    runner: Option<&str>,
    runtime: Option<&str>,
) -> LauncherResult<RunnerKind> {
    let name = match runner {
        Some(runner) => runner.to_string(),
        None => state.settings.read().await.default_runner.clone(),
    };

    RunnerKind::from_name(&name, runtime).map_err(|reason| LauncherError::InvalidGame {
        game: game.to_string(),
        reason,
    })
}

pub async fn remove_game(state: &AppState, name: &str) -> LauncherResult<bool> {
    state.games.remove(name).await
}

/// Start a stored game. Returns once the process has been spawned.
#[instrument(skip(state))]
pub async fn launch_game(state: &AppState, name: &str) -> LauncherResult<LaunchedProcess> {
    state.throttle.check_and_record(name)?;

    let outcome = spawn_game(state, name).await;
    if outcome.is_err() {
        state.throttle.forget(name);
    }
    outcome
}

async fn spawn_game(state: &AppState, name: &str) -> LauncherResult<LaunchedProcess> {
    let game = state
        .games
        .find(name)
        .await?
        .ok_or_else(|| LauncherError::InvalidGame {
            game: name.to_string(),
            reason: "no game with this name".into(),
        })?;

    let runtime_executable = match &game.runner {
        RunnerKind::Proton(identifier) => {
            Some(state.registry.resolve_executable_path(identifier)?)
        }
        _ => None,
    };

    let context = LaunchContext {
        defaults: state.settings.read().await.compat_defaults(),
        ..state.launch_context.clone()
    };
    let plan = LaunchEnvironmentBuilder::new(context).build(&game, runtime_executable.as_deref())?;

    if matches!(game.runner, RunnerKind::Proton(_)) {
        let compat_root = state
            .launch_context
            .steam_dir
            .join("steamapps")
            .join("compatdata");
        tokio::fs::create_dir_all(&compat_root)
            .await
            .map_err(|source| LauncherError::io(&compat_root, source))?;
    }

    let log_path = state.paths.game_log_file(&game.name);
    let process = state.launcher.launch(&plan, &log_path)?;
    info!("Launched {} with {}", game.name, game.runner);
    Ok(process)
}

// ─── Settings ───

pub async fn get_settings(state: &AppState) -> LauncherSettings {
    state.settings.read().await.clone()
}

pub async fn update_settings(
    state: &AppState,
    settings: LauncherSettings,
) -> LauncherResult<LauncherSettings> {
    let mut current = state.settings.write().await;
    if let Err(err) = settings.save(&state.paths.settings_file()) {
        warn!("Could not save settings: {}", err);
        return Err(err);
    }

    *current = settings.clone();
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::core::launch::plan::tests::context_with;
    use crate::core::paths::LauncherPaths;
    use crate::core::runtime::extract::tests::write_tar_gz;
    use crate::core::runtime::{no_progress, ReleaseResolver, RetryPolicy, UpdateChecker};
    use crate::core::runtime::releases::tests::{ge_source, FakeSource};
    use crate::core::state::AutoUpdate;

    fn test_state(tmp: &Path, source: FakeSource) -> AppState {
        let paths = LauncherPaths::from_base(tmp.join("home"));
        paths.ensure_layout().unwrap();

        let mut context = context_with(&["wine"]);
        context.steam_dir = tmp.join("Steam");

        let source = Arc::new(source);
        let mut state = AppState::with_parts(
            paths,
            LauncherSettings::default(),
            reqwest::Client::new(),
            source.clone(),
            context,
        );
        state.resolver = Arc::new(ReleaseResolver::new(source).with_retry(RetryPolicy {
            attempts: 3,
            delay: Duration::ZERO,
        }));
        state.updates = UpdateChecker::new(state.resolver.clone());
        state.installer = state.installer.clone().with_min_free_bytes(0);
        state
    }

    async fn install_local(state: &AppState, tmp: &Path, file: &str) -> RuntimePackage {
        let archive = tmp.join(file);
        write_tar_gz(&archive, &[("dist/proton", b"#!/bin/sh\n")]);
        install_custom_archive(state, &archive, None, no_progress(), CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn custom_archive_is_named_after_its_file() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), FakeSource::failing());

        let package = install_local(&state, tmp.path(), "GE-Proton9-7.tar.gz").await;
        assert_eq!(package.identifier, "GE-Proton9-7");
        assert!(state.registry.resolve_executable_path("GE-Proton9-7").is_ok());
    }

    #[tokio::test]
    async fn installed_runtimes_report_updates() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), ge_source(&["GE-Proton9-6", "GE-Proton9-7"]));
        install_local(&state, tmp.path(), "GE-Proton9-6.tar.gz").await;

        let infos = installed_runtimes(&state).await.unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].status(), "Update Available (GE-Proton9-7)");

        state.settings.write().await.auto_update = AutoUpdate::Disabled;
        let infos = installed_runtimes(&state).await.unwrap();
        assert_eq!(infos[0].status(), "Installed");
    }

    #[tokio::test]
    async fn check_update_for_missing_runtime_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), ge_source(&["GE-Proton9-7"]));

        let err = check_runtime_update(&state, "GE-Proton9-1").await.unwrap_err();
        assert!(matches!(err, LauncherError::NotInstalled(_)));
    }

    #[tokio::test]
    async fn unknown_release_tag_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), ge_source(&["GE-Proton9-7"]));

        let err = install_release(
            &state,
            RuntimeChannel::VendorCurated,
            "GE-Proton1-0",
            no_progress(),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LauncherError::ReleaseNotFound { .. }));
    }

    #[tokio::test]
    async fn offline_listing_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), FakeSource::failing());

        let releases = available_runtimes(&state, RuntimeChannel::VendorCurated)
            .await
            .unwrap();
        assert!(releases.is_empty());
    }

    #[tokio::test]
    async fn remove_runtime_twice() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), FakeSource::failing());
        install_local(&state, tmp.path(), "custom.tar.gz").await;

        assert!(remove_runtime(&state, "custom").await.unwrap());
        assert!(!remove_runtime(&state, "custom").await.unwrap());
    }

    #[tokio::test]
    async fn wine_game_gets_default_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), FakeSource::failing());

        let game = add_game(&state, GameEntry::new("My Game", "/g/game.exe", RunnerKind::Wine))
            .await
            .unwrap();
        assert_eq!(game.prefix, Some(state.paths.default_prefix_for("My Game")));
        assert_eq!(list_games(&state).await.unwrap(), vec![game]);
        assert!(remove_game(&state, "My Game").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_game_does_not_start_cooldown() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), FakeSource::failing());

        for _ in 0..2 {
            let err = launch_game(&state, "Nope").await.unwrap_err();
            assert!(matches!(err, LauncherError::InvalidGame { .. }));
        }
    }

    #[tokio::test]
    async fn proton_game_without_runtime_is_not_installed() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), FakeSource::failing());
        let exe = tmp.path().join("game.exe");
        std::fs::write(&exe, b"MZ").unwrap();
        add_game(
            &state,
            GameEntry::new(
                "Hades",
                exe.to_string_lossy(),
                RunnerKind::Proton("GE-Proton9-7".into()),
            ),
        )
        .await
        .unwrap();

        let err = launch_game(&state, "Hades").await.unwrap_err();
        assert!(matches!(err, LauncherError::NotInstalled(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn native_launch_writes_log_and_throttles() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), FakeSource::failing());
        let script = tmp.path().join("run.sh");
        std::fs::write(&script, "#!/bin/sh\necho started \"$@\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut game = GameEntry::new("Tiny Game", script.to_string_lossy(), RunnerKind::Native);
        game.launch_options = vec!["-quick".into()];
        add_game(&state, game).await.unwrap();

        let mut process = launch_game(&state, "Tiny Game").await.unwrap();
        assert_eq!(process.wait().unwrap(), Some(0));
        assert_eq!(process.log_path, state.paths.game_log_file("Tiny Game"));
        let log = std::fs::read_to_string(&process.log_path).unwrap();
        assert!(log.contains("started -quick"));

        let err = launch_game(&state, "Tiny Game").await.unwrap_err();
        assert!(matches!(err, LauncherError::LaunchCooldown { .. }));
    }

    #[tokio::test]
    async fn runner_defaults_to_setting() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), FakeSource::failing());

        let runner = resolve_runner(&state, "Hades", None, Some("GE-Proton9-7"))
            .await
            .unwrap();
        assert_eq!(runner, RunnerKind::Proton("GE-Proton9-7".into()));

        let err = resolve_runner(&state, "Hades", None, None).await.unwrap_err();
        assert!(matches!(err, LauncherError::InvalidGame { .. }));

        state.settings.write().await.default_runner = "Wine".into();
        assert_eq!(
            resolve_runner(&state, "Hades", None, None).await.unwrap(),
            RunnerKind::Wine
        );
        assert_eq!(
            resolve_runner(&state, "Hades", Some("native"), None).await.unwrap(),
            RunnerKind::Native
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_settings_save_keeps_previous_values() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), FakeSource::failing());
        // A directory where the settings file should be makes the write fail.
        std::fs::create_dir_all(state.paths.settings_file()).unwrap();

        let mut settings = get_settings(&state).await;
        settings.enable_esync = false;
        let err = update_settings(&state, settings).await.unwrap_err();

        assert!(matches!(err, LauncherError::Io { .. }));
        assert!(get_settings(&state).await.enable_esync);
    }

    #[tokio::test]
    async fn settings_update_is_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), FakeSource::failing());

        let mut settings = get_settings(&state).await;
        settings.enable_esync = false;
        let saved = update_settings(&state, settings.clone()).await.unwrap();

        assert_eq!(saved, settings);
        assert_eq!(
            LauncherSettings::load(&state.paths.settings_file()),
            settings
        );
    }
}
