use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::core::error::{LauncherError, LauncherResult};

use super::download::{parse_checksum, verify_digest, Downloader};
use super::extract::{archive_kind_from_name, detect_archive_kind, extract_archive, ArchiveKind};
use super::model::{ProgressFn, ReleaseDescriptor, RuntimeChannel, RuntimeMetadata, RuntimePackage};
use super::registry::{find_runtime_executable, write_metadata, RuntimeRegistry};

const STAGING_DIR: &str = ".staging";
pub const MIN_FREE_DISK_BYTES: u64 = 512 * 1024 * 1024;

/// Where an archive install gets its bytes from.
#[derive(Debug, Clone)]
pub enum ArchiveSource {
    /// A `.tar.gz`, `.tgz` or `.zip` already on disk.
    Local(PathBuf),
    /// A published release, downloaded first.
    Remote(ReleaseDescriptor),
}

/// Unpacks runtime bundles into the registry root.
///
/// Every install is staged under `<root>/.staging/<uuid>` and only swapped
/// into `<root>/<identifier>` once the entry point has been found.
#[derive(Debug, Clone)]
pub struct ArchiveInstaller {
    registry: RuntimeRegistry,
    downloader: Downloader,
    min_free_bytes: u64,
}

impl ArchiveInstaller {
    pub fn new(registry: RuntimeRegistry, client: reqwest::Client) -> Self {
        Self {
            registry,
            downloader: Downloader::new(client),
            min_free_bytes: MIN_FREE_DISK_BYTES,
        }
    }

    pub fn with_min_free_bytes(mut self, bytes: u64) -> Self {
        self.min_free_bytes = bytes;
        self
    }

    #[instrument(skip(self, progress, cancel), fields(root = ?self.registry.root()))]
    pub async fn install_from_archive(
        &self,
        source: ArchiveSource,
        identifier: &str,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> LauncherResult<RuntimePackage> {
        let destination = self.registry.runtime_dir(identifier)?;
        if let ArchiveSource::Local(path) = &source {
            if !path.is_file() {
                return Err(LauncherError::io(
                    path,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "archive not found"),
                ));
            }
            detect_archive_kind(path)?;
        }

        let staging_root = self.prepare_staging_root()?;
        let staging_id = Uuid::new_v4().to_string();
        let staging = staging_root.join(&staging_id);

        let (archive, kind, downloaded) = match &source {
            ArchiveSource::Local(path) => (path.clone(), detect_archive_kind(path)?, false),
            ArchiveSource::Remote(release) => {
                let kind = archive_kind_from_name(&release.download_url).unwrap_or(ArchiveKind::TarGz);
                let path = staging_root.join(format!("{staging_id}.{}", kind.extension()));
                (path, kind, true)
            }
        };

        let outcome = self
            .stage_archive(&source, &archive, kind, &staging, &progress, &cancel)
            .await;
        if downloaded {
            let _ = tokio::fs::remove_file(&archive).await;
        }

        let (channel, source_label) = match &source {
            ArchiveSource::Local(path) => (
                RuntimeChannel::classify(identifier),
                format!("archive:{}", path.display()),
            ),
            ArchiveSource::Remote(release) => (release.channel, release.download_url.clone()),
        };

        match outcome {
            Ok(()) => {
                self.finish_install(&staging, &destination, identifier, channel, source_label)
                    .await
            }
            Err(err) => {
                discard_staging(&staging_root, &staging).await;
                Err(err)
            }
        }
    }

    /// Copy an unpacked runtime directory into the registry. Recorded as
    /// [`RuntimeChannel::Custom`].
    #[instrument(skip(self), fields(root = ?self.registry.root()))]
    pub async fn install_from_folder(
        &self,
        source_dir: &Path,
        identifier: &str,
    ) -> LauncherResult<RuntimePackage> {
        let destination = self.registry.runtime_dir(identifier)?;
        if !source_dir.is_dir() {
            return Err(LauncherError::io(
                source_dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "folder not found"),
            ));
        }

        let staging_root = self.prepare_staging_root()?;
        let staging = staging_root.join(Uuid::new_v4().to_string());

        let from = source_dir.to_path_buf();
        let to = staging.clone();
        let copied = tokio::task::spawn_blocking(move || copy_dir_recursive(&from, &to))
            .await
            .map_err(|e| LauncherError::Other(format!("Task join error: {e}")));

        if let Err(err) = copied.and_then(|inner| inner) {
            discard_staging(&staging_root, &staging).await;
            return Err(err);
        }

        self.finish_install(
            &staging,
            &destination,
            identifier,
            RuntimeChannel::Custom,
            format!("folder:{}", source_dir.display()),
        )
        .await
    }

    fn prepare_staging_root(&self) -> LauncherResult<PathBuf> {
        let root = self.registry.root();
        std::fs::create_dir_all(root).map_err(|source| LauncherError::io(root, source))?;
        ensure_min_disk_space(root, self.min_free_bytes)?;

        let staging_root = root.join(STAGING_DIR);
        std::fs::create_dir_all(&staging_root)
            .map_err(|source| LauncherError::io(&staging_root, source))?;
        Ok(staging_root)
    }

    async fn stage_archive(
        &self,
        source: &ArchiveSource,
        archive: &Path,
        kind: ArchiveKind,
        staging: &Path,
        progress: &ProgressFn,
        cancel: &CancellationToken,
    ) -> LauncherResult<()> {
        if let ArchiveSource::Remote(release) = source {
            let started = Instant::now();
            info!("Downloading {} from {}", release.tag, release.download_url);
            let actual = self
                .downloader
                .download(&release.download_url, archive, progress, cancel)
                .await?;
            info!("Download of {} finished in {:?}", release.tag, started.elapsed());

            if let Some(checksum_url) = &release.checksum_url {
                let body = self.downloader.fetch_text(checksum_url).await?;
                let file_name = release
                    .download_url
                    .rsplit('/')
                    .next()
                    .unwrap_or(release.tag.as_str());
                match parse_checksum(&body, file_name) {
                    Some(expected) => verify_digest(archive, &expected, &actual)?,
                    None => warn!("No usable digest in {}, skipping verification", checksum_url),
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(LauncherError::Cancelled);
        }

        let started = Instant::now();
        let archive = archive.to_path_buf();
        let target = staging.to_path_buf();
        let progress = progress.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            extract_archive(&archive, kind, &target, &progress, &cancel)?;
            hoist_single_directory(&target)
        })
        .await
        .map_err(|e| LauncherError::Other(format!("Task join error: {e}")))??;
        info!("Extraction finished in {:?}", started.elapsed());

        Ok(())
    }

    /// Validate the staged tree, record metadata and swap it into place.
    async fn finish_install(
        &self,
        staging: &Path,
        destination: &Path,
        identifier: &str,
        channel: RuntimeChannel,
        source: String,
    ) -> LauncherResult<RuntimePackage> {
        let staging_root = self.registry.root().join(STAGING_DIR);

        let Some(entry_point) = find_runtime_executable(staging) else {
            discard_staging(&staging_root, staging).await;
            return Err(LauncherError::IncompleteInstall {
                identifier: identifier.to_string(),
                reason: "no proton executable found in the installed files".into(),
            });
        };

        let metadata = RuntimeMetadata {
            identifier: identifier.to_string(),
            channel,
            installed_at: Utc::now(),
            source,
        };

        let committed =
            commit_staging(self.registry.root(), staging, destination, &entry_point, &metadata).await;
        if let Err(err) = committed {
            discard_staging(&staging_root, staging).await;
            return Err(err);
        }
        remove_if_empty(&staging_root).await;

        info!("Installed Proton {} ({})", identifier, channel);
        let relative = entry_point.strip_prefix(staging).unwrap_or(&entry_point);
        Ok(RuntimePackage {
            identifier: identifier.to_string(),
            channel,
            installed_at: metadata.installed_at,
            root: destination.to_path_buf(),
            executable_path: Some(destination.join(relative)),
        })
    }
}

async fn commit_staging(
    root: &Path,
    staging: &Path,
    destination: &Path,
    entry_point: &Path,
    metadata: &RuntimeMetadata,
) -> LauncherResult<()> {
    ensure_executable(entry_point)?;
    write_metadata(staging, metadata).await?;
    swap_into_place(root, staging, destination, &metadata.identifier).await
}

/// Replace `destination` with `staging`. The previous install is moved to a
/// hidden backup and only deleted once the new tree is in place.
async fn swap_into_place(
    root: &Path,
    staging: &Path,
    destination: &Path,
    identifier: &str,
) -> LauncherResult<()> {
    let backup = root.join(format!(".backup-{}-{}", identifier, Uuid::new_v4()));
    let had_previous = destination.exists();
    if had_previous {
        tokio::fs::rename(destination, &backup)
            .await
            .map_err(|source| LauncherError::io(&backup, source))?;
    }

    if let Err(source) = tokio::fs::rename(staging, destination).await {
        if had_previous {
            let _ = tokio::fs::rename(&backup, destination).await;
        }
        return Err(LauncherError::io(destination, source));
    }

    if had_previous {
        if let Err(err) = tokio::fs::remove_dir_all(&backup).await {
            warn!("Could not delete previous install {:?}: {}", backup, err);
        }
    }
    Ok(())
}

async fn discard_staging(staging_root: &Path, staging: &Path) {
    if staging.exists() {
        if let Err(err) = tokio::fs::remove_dir_all(staging).await {
            warn!("Could not clean staging directory {:?}: {}", staging, err);
        }
    }
    remove_if_empty(staging_root).await;
}

async fn remove_if_empty(dir: &Path) {
    // Fails while another install is staging; that one cleans up after itself.
    let _ = tokio::fs::remove_dir(dir).await;
}

/// Release tarballs wrap everything in one `GE-Proton9-7/` directory. When
/// that single directory is all there is, move its contents up one level.
fn hoist_single_directory(staging: &Path) -> LauncherResult<()> {
    let entries: Vec<std::fs::DirEntry> = std::fs::read_dir(staging)
        .map_err(|source| LauncherError::io(staging, source))?
        .filter_map(Result::ok)
        .collect();

    let [only] = entries.as_slice() else {
        return Ok(());
    };
    let is_dir = only.file_type().map(|t| t.is_dir()).unwrap_or(false);
    if !is_dir {
        return Ok(());
    }

    let wrapper = staging.join(format!(".hoist-{}", Uuid::new_v4()));
    std::fs::rename(only.path(), &wrapper).map_err(|source| LauncherError::io(&wrapper, source))?;

    for child in std::fs::read_dir(&wrapper).map_err(|source| LauncherError::io(&wrapper, source))? {
        let child = child.map_err(|source| LauncherError::io(&wrapper, source))?;
        let target = staging.join(child.file_name());
        std::fs::rename(child.path(), &target).map_err(|source| LauncherError::io(&target, source))?;
    }

    std::fs::remove_dir(&wrapper).map_err(|source| LauncherError::io(&wrapper, source))?;
    debug!("Hoisted single top-level directory in {:?}", staging);
    Ok(())
}

fn ensure_executable(path: &Path) -> LauncherResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)
            .map_err(|source| LauncherError::io(path, source))?
            .permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms).map_err(|source| LauncherError::io(path, source))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

fn ensure_min_disk_space(path: &Path, minimum_bytes: u64) -> LauncherResult<()> {
    if minimum_bytes == 0 {
        return Ok(());
    }

    let disks = sysinfo::Disks::new_with_refreshed_list();
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let mut best_len = 0usize;
    let mut available = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if canonical.starts_with(mount) {
            let len = mount.as_os_str().len();
            if len >= best_len {
                best_len = len;
                available = Some(disk.available_space());
            }
        }
    }

    match available {
        Some(bytes) if bytes < minimum_bytes => Err(LauncherError::InsufficientSpace {
            path: path.to_path_buf(),
            available: bytes,
            required: minimum_bytes,
        }),
        _ => Ok(()),
    }
}

fn copy_dir_recursive(source: &Path, destination: &Path) -> LauncherResult<()> {
    std::fs::create_dir_all(destination)
        .map_err(|source_err| LauncherError::io(destination, source_err))?;

    for entry in std::fs::read_dir(source).map_err(|source_err| LauncherError::io(source, source_err))? {
        let entry = entry.map_err(|source_err| LauncherError::io(source, source_err))?;
        let src_path = entry.path();
        let dst_path = destination.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|source_err| LauncherError::io(&src_path, source_err))?;

        if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else if file_type.is_symlink() {
            copy_symlink(&src_path, &dst_path)?;
        } else if file_type.is_file() {
            std::fs::copy(&src_path, &dst_path)
                .map_err(|source_err| LauncherError::io(&dst_path, source_err))?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> LauncherResult<()> {
    let target = std::fs::read_link(src).map_err(|source| LauncherError::io(src, source))?;
    std::os::unix::fs::symlink(&target, dst).map_err(|source| LauncherError::io(dst, source))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> LauncherResult<()> {
    if src.is_file() {
        std::fs::copy(src, dst).map_err(|source| LauncherError::io(dst, source))?;
    }
    Ok(())
}
