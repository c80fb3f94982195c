pub mod commands;
pub mod core;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::error::{LauncherError, LauncherResult};

const LAUNCHER_LOG_FILE: &str = "launcher.log";

/// Install structured logging: stderr plus `<logs_dir>/launcher.log`,
/// filtered by `RUST_LOG`.
pub fn init_logging(logs_dir: &Path) -> LauncherResult<()> {
    std::fs::create_dir_all(logs_dir).map_err(|source| LauncherError::io(logs_dir, source))?;
    let log_path = logs_dir.join(LAUNCHER_LOG_FILE);
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|source| LauncherError::io(&log_path, source))?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,hacker_launcher_lib=debug")),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .try_init()
        .map_err(|e| LauncherError::Other(format!("Failed to install logger: {e}")))?;

    tracing::info!("Hacker Launcher starting...");
    Ok(())
}
