use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tag prefix used by the GloriousEggroll builds.
pub const VENDOR_TAG_PREFIX: &str = "GE-Proton";

/// Provenance of a runtime release.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeChannel {
    /// GE-Proton builds.
    VendorCurated,
    /// Valve Proton stable releases.
    OfficialStable,
    /// Valve Proton experimental and hotfix builds.
    OfficialExperimental,
    /// Archives or folders supplied by the user.
    Custom,
}

impl RuntimeChannel {
    /// Classify an identifier by name: `GE-Proton` prefix, then a
    /// case-insensitive "experimental", otherwise official stable.
    pub fn classify(identifier: &str) -> Self {
        if identifier.starts_with(VENDOR_TAG_PREFIX) {
            RuntimeChannel::VendorCurated
        } else if identifier.to_lowercase().contains("experimental") {
            RuntimeChannel::OfficialExperimental
        } else {
            RuntimeChannel::OfficialStable
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RuntimeChannel::VendorCurated => "GE",
            RuntimeChannel::OfficialStable => "Official",
            RuntimeChannel::OfficialExperimental => "Experimental",
            RuntimeChannel::Custom => "Custom",
        }
    }
}

impl std::fmt::Display for RuntimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for RuntimeChannel {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "ge" | "vendor" | "vendor_curated" => Ok(RuntimeChannel::VendorCurated),
            "official" | "stable" | "official_stable" => Ok(RuntimeChannel::OfficialStable),
            "experimental" | "official_experimental" => Ok(RuntimeChannel::OfficialExperimental),
            "custom" => Ok(RuntimeChannel::Custom),
            other => Err(format!("unknown runtime channel: {other}")),
        }
    }
}

/// One installed runtime under the runtime storage root.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimePackage {
    pub identifier: String,
    pub channel: RuntimeChannel,
    pub installed_at: DateTime<Utc>,
    pub root: PathBuf,
    /// Filled in on demand by the registry, never persisted.
    #[serde(skip)]
    pub executable_path: Option<PathBuf>,
}

/// One remotely available release of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseDescriptor {
    pub tag: String,
    pub channel: RuntimeChannel,
    pub download_url: String,
    pub checksum_url: Option<String>,
}

/// `runtime.json`, written next to every runtime this launcher installs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RuntimeMetadata {
    pub identifier: String,
    pub channel: RuntimeChannel,
    pub installed_at: DateTime<Utc>,
    pub source: String,
}

pub(crate) const METADATA_FILE: &str = "runtime.json";

/// Which stage of an install a progress report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallPhase {
    Downloading,
    Extracting,
}

/// Progress payload handed to install callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InstallProgress {
    pub phase: InstallPhase,
    pub done_bytes: u64,
    pub total_bytes: u64,
}

impl InstallProgress {
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.done_bytes as f64 / self.total_bytes as f64
    }
}

/// Progress callback shared with blocking extraction tasks.
pub type ProgressFn = std::sync::Arc<dyn Fn(InstallProgress) + Send + Sync>;

/// A callback that ignores every report.
pub fn no_progress() -> ProgressFn {
    std::sync::Arc::new(|_| {})
}
