use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};

use super::model::{RuntimeChannel, RuntimeMetadata, RuntimePackage, METADATA_FILE};

/// File name of the runtime entry point inside an install.
pub const RUNTIME_EXECUTABLE: &str = "proton";

/// Depth limit for the entry point search. Release tarballs keep `proton`
/// at the top level once unwrapped; custom bundles nest it a few levels down.
pub const EXECUTABLE_SEARCH_DEPTH: usize = 5;

/// Installed runtimes, one directory per version under `root`.
#[derive(Debug, Clone)]
pub struct RuntimeRegistry {
    root: PathBuf,
}

impl RuntimeRegistry {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory an identifier installs to. Identifiers are single path
    /// components; hidden names are reserved for staging.
    pub fn runtime_dir(&self, identifier: &str) -> LauncherResult<PathBuf> {
        validate_identifier(identifier)?;
        Ok(self.root.join(identifier))
    }

    /// Every installed runtime, sorted by identifier.
    pub async fn list_installed(&self) -> LauncherResult<Vec<RuntimePackage>> {
        let mut packages = Vec::new();
        if !self.root.exists() {
            return Ok(packages);
        }

        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|source| LauncherError::io(&self.root, source))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| LauncherError::io(&self.root, source))?
        {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string)
            else {
                continue;
            };
            if name.starts_with('.') || !path.is_dir() {
                continue;
            }

            packages.push(describe_runtime(&path, &name).await);
        }

        packages.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(packages)
    }

    /// Installed runtime with its entry point resolved.
    pub async fn get(&self, identifier: &str) -> LauncherResult<RuntimePackage> {
        let dir = self.runtime_dir(identifier)?;
        if !dir.is_dir() {
            return Err(LauncherError::NotInstalled(identifier.to_string()));
        }

        let mut package = describe_runtime(&dir, identifier).await;
        package.executable_path = Some(self.resolve_executable_path(identifier)?);
        Ok(package)
    }

    /// Locate the `proton` entry point of an installed runtime.
    pub fn resolve_executable_path(&self, identifier: &str) -> LauncherResult<PathBuf> {
        let dir = self.runtime_dir(identifier)?;
        if !dir.is_dir() {
            return Err(LauncherError::NotInstalled(identifier.to_string()));
        }

        find_runtime_executable(&dir)
            .ok_or_else(|| LauncherError::RuntimeNotFound(identifier.to_string()))
    }

    /// Delete an installed runtime. Returns `false` when it does not exist or
    /// could not be deleted.
    pub async fn remove(&self, identifier: &str) -> bool {
        let Ok(dir) = self.runtime_dir(identifier) else {
            return false;
        };
        if !dir.exists() {
            return false;
        }

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!("Removed Proton {}", identifier);
                true
            }
            Err(err) => {
                warn!("Error removing Proton {}: {}", identifier, err);
                false
            }
        }
    }
}

fn validate_identifier(identifier: &str) -> LauncherResult<()> {
    let valid = !identifier.trim().is_empty()
        && !identifier.starts_with('.')
        && !identifier.contains(['/', '\\'])
        && Path::new(identifier).components().count() == 1;

    if valid {
        Ok(())
    } else {
        Err(LauncherError::Other(format!(
            "Invalid runtime identifier: {identifier:?}"
        )))
    }
}

async fn describe_runtime(dir: &Path, identifier: &str) -> RuntimePackage {
    if let Some(metadata) = read_metadata(dir).await {
        return RuntimePackage {
            identifier: identifier.to_string(),
            channel: metadata.channel,
            installed_at: metadata.installed_at,
            root: dir.to_path_buf(),
            executable_path: None,
        };
    }

    RuntimePackage {
        identifier: identifier.to_string(),
        channel: RuntimeChannel::classify(identifier),
        installed_at: directory_timestamp(dir),
        root: dir.to_path_buf(),
        executable_path: None,
    }
}

async fn read_metadata(dir: &Path) -> Option<RuntimeMetadata> {
    let path = dir.join(METADATA_FILE);
    let bytes = tokio::fs::read(&path).await.ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(metadata) => Some(metadata),
        Err(err) => {
            warn!("Ignoring corrupt {:?}: {}", path, err);
            None
        }
    }
}

pub(crate) async fn write_metadata(dir: &Path, metadata: &RuntimeMetadata) -> LauncherResult<()> {
    let path = dir.join(METADATA_FILE);
    let payload = serde_json::to_vec_pretty(metadata)?;
    tokio::fs::write(&path, payload)
        .await
        .map_err(|source| LauncherError::io(path, source))
}

fn directory_timestamp(dir: &Path) -> DateTime<Utc> {
    std::fs::metadata(dir)
        .and_then(|meta| meta.created().or_else(|_| meta.modified()))
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

/// Bounded depth-first search for the runtime entry point. Files of a
/// directory are checked before its subdirectories, which are visited in
/// name order so the first match is stable.
pub fn find_runtime_executable(root: &Path) -> Option<PathBuf> {
    find_executable_recursive(root, EXECUTABLE_SEARCH_DEPTH)
}

fn find_executable_recursive(dir: &Path, depth_left: usize) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();

    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            subdirs.push(path);
        } else if path.file_name().and_then(|n| n.to_str()) == Some(RUNTIME_EXECUTABLE)
            && path.is_file()
        {
            debug!("Found runtime entry point at {:?}", path);
            return Some(path);
        }
    }

    if depth_left == 0 {
        return None;
    }

    subdirs.sort();
    subdirs
        .iter()
        .find_map(|subdir| find_executable_recursive(subdir, depth_left - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"#!/bin/sh\n").unwrap();
    }

    #[tokio::test]
    async fn list_installed_sorts_and_classifies() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = RuntimeRegistry::new(tmp.path().to_path_buf());
        touch(&tmp.path().join("proton-9.0-4/proton"));
        touch(&tmp.path().join("GE-Proton9-7/proton"));
        touch(&tmp.path().join("Proton-Experimental/proton"));
        std::fs::create_dir_all(tmp.path().join(".staging/abc")).unwrap();
        std::fs::write(tmp.path().join("stray-file"), b"").unwrap();

        let installed = registry.list_installed().await.unwrap();
        let summary: Vec<(&str, RuntimeChannel)> = installed
            .iter()
            .map(|p| (p.identifier.as_str(), p.channel))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("GE-Proton9-7", RuntimeChannel::VendorCurated),
                ("Proton-Experimental", RuntimeChannel::OfficialExperimental),
                ("proton-9.0-4", RuntimeChannel::OfficialStable),
            ]
        );
    }

    #[tokio::test]
    async fn list_installed_prefers_metadata_channel() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = RuntimeRegistry::new(tmp.path().to_path_buf());
        let dir = tmp.path().join("my-proton");
        touch(&dir.join("proton"));
        write_metadata(
            &dir,
            &RuntimeMetadata {
                identifier: "my-proton".into(),
                channel: RuntimeChannel::Custom,
                installed_at: Utc::now(),
                source: "folder:/tmp/my-proton".into(),
            },
        )
        .await
        .unwrap();

        let installed = registry.list_installed().await.unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].channel, RuntimeChannel::Custom);
    }

    #[tokio::test]
    async fn list_installed_without_root_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = RuntimeRegistry::new(tmp.path().join("missing"));
        assert!(registry.list_installed().await.unwrap().is_empty());
    }

    #[test]
    fn resolve_finds_nested_entry_point() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = RuntimeRegistry::new(tmp.path().to_path_buf());
        let nested = tmp.path().join("custom/a/b/proton");
        touch(&nested);

        assert_eq!(registry.resolve_executable_path("custom").unwrap(), nested);
    }

    #[test]
    fn resolve_prefers_shallow_match() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = RuntimeRegistry::new(tmp.path().to_path_buf());
        touch(&tmp.path().join("GE-Proton9-7/files/proton"));
        touch(&tmp.path().join("GE-Proton9-7/proton"));

        assert_eq!(
            registry.resolve_executable_path("GE-Proton9-7").unwrap(),
            tmp.path().join("GE-Proton9-7/proton")
        );
    }

    #[test]
    fn resolve_gives_up_past_depth_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = RuntimeRegistry::new(tmp.path().to_path_buf());
        touch(&tmp.path().join("deep/1/2/3/4/5/6/proton"));

        assert!(matches!(
            registry.resolve_executable_path("deep"),
            Err(LauncherError::RuntimeNotFound(_))
        ));
    }

    #[test]
    fn resolve_reports_missing_install() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = RuntimeRegistry::new(tmp.path().to_path_buf());

        assert!(matches!(
            registry.resolve_executable_path("GE-Proton9-7"),
            Err(LauncherError::NotInstalled(_))
        ));
    }

    #[test]
    fn identifiers_cannot_escape_root() {
        let registry = RuntimeRegistry::new(PathBuf::from("/tmp/protons"));
        assert!(registry.runtime_dir("../etc").is_err());
        assert!(registry.runtime_dir("a/b").is_err());
        assert!(registry.runtime_dir(".staging").is_err());
        assert!(registry.runtime_dir("").is_err());
        assert!(registry.runtime_dir("GE-Proton9-7").is_ok());
    }

    #[tokio::test]
    async fn remove_missing_returns_false() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = RuntimeRegistry::new(tmp.path().to_path_buf());
        assert!(!registry.remove("GE-Proton9-7").await);

        touch(&tmp.path().join("GE-Proton9-7/proton"));
        assert!(registry.remove("GE-Proton9-7").await);
        assert!(!tmp.path().join("GE-Proton9-7").exists());
    }
}
