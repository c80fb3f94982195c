use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the launcher core.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Could not reach {0}; check your internet connection")]
    NetworkUnavailable(String),

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-512 mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive entry {entry:?} would be written outside the install directory")]
    PathTraversal { entry: String },

    #[error("Unsupported archive format: {0:?}")]
    UnsupportedArchive(PathBuf),

    #[error("Not enough free disk space at {path:?}: {available} bytes available, {required} required")]
    InsufficientSpace {
        path: PathBuf,
        available: u64,
        required: u64,
    },

    #[error("Operation cancelled")]
    Cancelled,

    // ── Runtimes ────────────────────────────────────────
    #[error("Proton {0} is not installed")]
    NotInstalled(String),

    #[error("Proton {identifier} was removed after installing: {reason}")]
    IncompleteInstall { identifier: String, reason: String },

    #[error("Proton binary not found for {0}")]
    RuntimeNotFound(String),

    #[error("No release found for {tag}")]
    ReleaseNotFound { tag: String },

    // ── Games / launch ──────────────────────────────────
    #[error("Prefix not set for {game}; Wine and Proton games need one")]
    MissingPrefix { game: String },

    #[error("{binary} is not installed. {hint}")]
    DependencyMissing { binary: String, hint: String },

    #[error("Invalid game {game}: {reason}")]
    InvalidGame { game: String, reason: String },

    #[error("Please wait {remaining_secs} seconds before launching {game} again")]
    LaunchCooldown { game: String, remaining_secs: u64 },

    #[error("Failed to start {program}: {reason}")]
    LaunchFailed { program: String, reason: String },

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

/// Stable classification of a [`LauncherError`], separate from its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Network,
    NetworkUnavailable,
    Integrity,
    Serialization,
    Archive,
    PathTraversal,
    InsufficientSpace,
    Cancelled,
    NotInstalled,
    IncompleteInstall,
    RuntimeNotFound,
    ReleaseNotFound,
    MissingPrefix,
    DependencyMissing,
    InvalidGame,
    LaunchCooldown,
    LaunchFailed,
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Io => "io",
            ErrorKind::Network => "network",
            ErrorKind::NetworkUnavailable => "network_unavailable",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Archive => "archive",
            ErrorKind::PathTraversal => "path_traversal",
            ErrorKind::InsufficientSpace => "insufficient_space",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::NotInstalled => "not_installed",
            ErrorKind::IncompleteInstall => "incomplete_install",
            ErrorKind::RuntimeNotFound => "runtime_not_found",
            ErrorKind::ReleaseNotFound => "release_not_found",
            ErrorKind::MissingPrefix => "missing_prefix",
            ErrorKind::DependencyMissing => "dependency_missing",
            ErrorKind::InvalidGame => "invalid_game",
            ErrorKind::LaunchCooldown => "launch_cooldown",
            ErrorKind::LaunchFailed => "launch_failed",
            ErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

impl LauncherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LauncherError::Io { .. } => ErrorKind::Io,
            LauncherError::Http(_) | LauncherError::DownloadFailed { .. } => ErrorKind::Network,
            LauncherError::NetworkUnavailable(_) => ErrorKind::NetworkUnavailable,
            LauncherError::ChecksumMismatch { .. } => ErrorKind::Integrity,
            LauncherError::Json(_) => ErrorKind::Serialization,
            LauncherError::Zip(_) | LauncherError::UnsupportedArchive(_) => ErrorKind::Archive,
            LauncherError::PathTraversal { .. } => ErrorKind::PathTraversal,
            LauncherError::InsufficientSpace { .. } => ErrorKind::InsufficientSpace,
            LauncherError::Cancelled => ErrorKind::Cancelled,
            LauncherError::NotInstalled(_) => ErrorKind::NotInstalled,
            LauncherError::IncompleteInstall { .. } => ErrorKind::IncompleteInstall,
            LauncherError::RuntimeNotFound(_) => ErrorKind::RuntimeNotFound,
            LauncherError::ReleaseNotFound { .. } => ErrorKind::ReleaseNotFound,
            LauncherError::MissingPrefix { .. } => ErrorKind::MissingPrefix,
            LauncherError::DependencyMissing { .. } => ErrorKind::DependencyMissing,
            LauncherError::InvalidGame { .. } => ErrorKind::InvalidGame,
            LauncherError::LaunchCooldown { .. } => ErrorKind::LaunchCooldown,
            LauncherError::LaunchFailed { .. } => ErrorKind::LaunchFailed,
            LauncherError::Other(_) => ErrorKind::Other,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_is_distinct_from_kind() {
        let errors = vec![
            LauncherError::MissingPrefix {
                game: "Celeste".into(),
            },
            LauncherError::PathTraversal {
                entry: "../../evil".into(),
            },
            LauncherError::RuntimeNotFound("GE-Proton9-7".into()),
            LauncherError::DependencyMissing {
                binary: "wine".into(),
                hint: "Install it with your package manager.".into(),
            },
        ];

        for err in errors {
            let message = err.to_string();
            assert!(!message.is_empty());
            assert_ne!(message, err.kind().to_string());
        }
    }

    #[test]
    fn kind_maps_install_errors() {
        let err = LauncherError::IncompleteInstall {
            identifier: "GE-Proton9-7".into(),
            reason: "no proton".into(),
        };
        assert_eq!(err.kind(), ErrorKind::IncompleteInstall);
        assert_eq!(LauncherError::Cancelled.kind(), ErrorKind::Cancelled);
    }
}
