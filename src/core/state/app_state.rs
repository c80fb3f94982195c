use std::sync::Arc;

use reqwest::Client;
use tokio::sync::RwLock;
use tracing::info;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::game::GameStore;
use crate::core::http::build_http_client;
use crate::core::launch::{LaunchContext, LaunchThrottle, ProcessLauncher};
use crate::core::paths::LauncherPaths;
use crate::core::runtime::{
    ArchiveInstaller, GithubReleaseSource, ReleaseResolver, ReleaseSource, RuntimeRegistry,
    UpdateChecker,
};

use super::settings::LauncherSettings;

/// Everything the command layer needs, built once per process.
pub struct AppState {
    pub paths: LauncherPaths,
    pub settings: RwLock<LauncherSettings>,
    pub http_client: Client,
    pub registry: RuntimeRegistry,
    pub resolver: Arc<ReleaseResolver>,
    pub installer: ArchiveInstaller,
    pub updates: UpdateChecker,
    pub games: GameStore,
    /// Host lookups; the compat defaults are replaced from the settings on
    /// every launch.
    pub launch_context: LaunchContext,
    pub launcher: ProcessLauncher,
    pub throttle: LaunchThrottle,
}

impl AppState {
    /// Create the directory layout, load the settings and wire the services
    /// against GitHub and the host.
    pub fn new(paths: LauncherPaths) -> LauncherResult<Self> {
        paths.ensure_layout()?;
        let settings = LauncherSettings::load(&paths.settings_file());

        let http_client = build_http_client()
            .map_err(|e| LauncherError::Other(format!("Failed to build HTTP client: {e}")))?;
        let source = Arc::new(GithubReleaseSource::new(http_client.clone()));
        let launch_context = LaunchContext::from_host(settings.compat_defaults());

        info!("Launcher home: {:?}", paths.base_dir());
        Ok(Self::with_parts(
            paths,
            settings,
            http_client,
            source,
            launch_context,
        ))
    }

    /// Wire the services around an explicit release source and launch
    /// context.
    pub fn with_parts(
        paths: LauncherPaths,
        settings: LauncherSettings,
        http_client: Client,
        source: Arc<dyn ReleaseSource>,
        launch_context: LaunchContext,
    ) -> Self {
        let registry = RuntimeRegistry::new(paths.protons_dir());
        let resolver = Arc::new(ReleaseResolver::new(source));
        let installer = ArchiveInstaller::new(registry.clone(), http_client.clone());
        let updates = UpdateChecker::new(resolver.clone());
        let games = GameStore::new(paths.games_file());

        Self {
            paths,
            settings: RwLock::new(settings),
            http_client,
            registry,
            resolver,
            installer,
            updates,
            games,
            launch_context,
            launcher: ProcessLauncher,
            throttle: LaunchThrottle::default(),
        }
    }
}
