use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};

use super::model::{InstallPhase, InstallProgress, ProgressFn};

/// Archive formats a runtime can ship in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Zip,
}

impl ArchiveKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveKind::TarGz => "tar.gz",
            ArchiveKind::Zip => "zip",
        }
    }
}

/// Detect the archive format from a file name.
pub fn detect_archive_kind(path: &Path) -> LauncherResult<ArchiveKind> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    archive_kind_from_name(&name).ok_or_else(|| LauncherError::UnsupportedArchive(path.to_path_buf()))
}

pub(crate) fn archive_kind_from_name(name: &str) -> Option<ArchiveKind> {
    let name = name.to_ascii_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(ArchiveKind::TarGz)
    } else if name.ends_with(".zip") {
        Some(ArchiveKind::Zip)
    } else {
        None
    }
}

/// Strip an archive extension from a file name, for deriving an identifier.
pub fn strip_archive_extension(name: &str) -> &str {
    let lower = name.to_ascii_lowercase();
    for suffix in [".tar.gz", ".tgz", ".zip"] {
        if lower.ends_with(suffix) {
            return &name[..name.len() - suffix.len()];
        }
    }
    name
}

/// Extract `archive` into `dest`.
///
/// Every entry is validated before anything is written, so a traversal
/// attempt leaves `dest` untouched. Blocking; run it on the blocking pool.
pub fn extract_archive(
    archive: &Path,
    kind: ArchiveKind,
    dest: &Path,
    progress: &ProgressFn,
    cancel: &CancellationToken,
) -> LauncherResult<()> {
    std::fs::create_dir_all(dest).map_err(|source| LauncherError::io(dest, source))?;

    match kind {
        ArchiveKind::TarGz => extract_tar_gz(archive, dest, progress, cancel),
        ArchiveKind::Zip => extract_zip(archive, dest, progress, cancel),
    }
}

// ── Path validation ─────────────────────────────────────

/// Lexically normalise `relative`, refusing absolute paths and `..`
/// components that climb above the root.
fn normalize_inside(relative: &Path) -> Option<PathBuf> {
    let mut resolved = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

fn check_entry_path(entry: &Path) -> LauncherResult<PathBuf> {
    normalize_inside(entry).ok_or_else(|| LauncherError::PathTraversal {
        entry: entry.display().to_string(),
    })
}

/// Symlink targets are relative to the link's own directory.
fn check_symlink_target(entry: &Path, target: &Path) -> LauncherResult<()> {
    let entry = check_entry_path(entry)?;
    let base = entry.parent().map(Path::to_path_buf).unwrap_or_default();
    if target.is_absolute() || normalize_inside(&base.join(target)).is_none() {
        return Err(LauncherError::PathTraversal {
            entry: format!("{} -> {}", entry.display(), target.display()),
        });
    }
    Ok(())
}

/// Hard link targets are relative to the archive root.
fn check_hardlink_target(entry: &Path, target: &Path) -> LauncherResult<()> {
    if normalize_inside(target).is_none() {
        return Err(LauncherError::PathTraversal {
            entry: format!("{} -> {}", entry.display(), target.display()),
        });
    }
    Ok(())
}

/// Symlink entries seen so far. Nothing may be written at or below one,
/// since the link on disk would redirect the write.
#[derive(Debug, Default)]
struct LinkGuard {
    links: HashSet<PathBuf>,
}

impl LinkGuard {
    fn check(&self, entry: &Path) -> LauncherResult<()> {
        let mut prefix = PathBuf::new();
        for component in entry.components() {
            prefix.push(component);
            let Some(resolved) = normalize_inside(&prefix) else {
                continue;
            };
            if self.links.contains(&resolved) {
                return Err(LauncherError::PathTraversal {
                    entry: format!("{} (through symlink {})", entry.display(), resolved.display()),
                });
            }
        }
        Ok(())
    }

    fn record(&mut self, entry: &Path) -> LauncherResult<()> {
        self.links.insert(check_entry_path(entry)?);
        Ok(())
    }
}

/// Refuse to write below a symlink that already exists under `dest`.
fn ensure_no_symlink_ancestor(dest: &Path, relative: &Path) -> LauncherResult<()> {
    let mut current = dest.to_path_buf();
    let Some(parent) = relative.parent() else {
        return Ok(());
    };
    for component in parent.components() {
        current.push(component);
        match current.symlink_metadata() {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(LauncherError::PathTraversal {
                    entry: relative.display().to_string(),
                });
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
    Ok(())
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> LauncherResult<()> {
    if cancel.is_cancelled() {
        return Err(LauncherError::Cancelled);
    }
    Ok(())
}

// ── tar.gz ──────────────────────────────────────────────

fn open_tar(archive: &Path) -> LauncherResult<tar::Archive<GzDecoder<BufReader<File>>>> {
    let file = File::open(archive).map_err(|source| LauncherError::io(archive, source))?;
    Ok(tar::Archive::new(GzDecoder::new(BufReader::new(file))))
}

/// First pass: validate every entry and sum the extracted size.
fn scan_tar(archive: &Path, cancel: &CancellationToken) -> LauncherResult<u64> {
    let mut tar = open_tar(archive)?;
    let mut total = 0u64;
    let mut links = LinkGuard::default();

    let entries = tar
        .entries()
        .map_err(|source| LauncherError::io(archive, source))?;
    for entry in entries {
        ensure_not_cancelled(cancel)?;
        let entry = entry.map_err(|source| LauncherError::io(archive, source))?;
        let path = entry
            .path()
            .map_err(|source| LauncherError::io(archive, source))?
            .into_owned();
        check_entry_path(&path)?;
        links.check(&path)?;

        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            let target = entry
                .link_name()
                .map_err(|source| LauncherError::io(archive, source))?
                .map(|t| t.into_owned())
                .unwrap_or_default();
            if entry_type.is_symlink() {
                check_symlink_target(&path, &target)?;
                links.record(&path)?;
            } else {
                check_hardlink_target(&path, &target)?;
                links.check(&target)?;
            }
        }

        total = total.saturating_add(entry.size());
    }

    Ok(total)
}

fn extract_tar_gz(
    archive: &Path,
    dest: &Path,
    progress: &ProgressFn,
    cancel: &CancellationToken,
) -> LauncherResult<()> {
    let total = scan_tar(archive, cancel)?;
    debug!("Validated {:?}, {} bytes to extract", archive, total);

    let mut tar = open_tar(archive)?;
    tar.set_overwrite(true);
    let mut done = 0u64;

    let entries = tar
        .entries()
        .map_err(|source| LauncherError::io(archive, source))?;
    for entry in entries {
        ensure_not_cancelled(cancel)?;
        let mut entry = entry.map_err(|source| LauncherError::io(archive, source))?;
        let size = entry.size();
        let path = entry
            .path()
            .map_err(|source| LauncherError::io(archive, source))?
            .into_owned();
        ensure_no_symlink_ancestor(dest, &check_entry_path(&path)?)?;
        entry
            .unpack_in(dest)
            .map_err(|source| LauncherError::io(dest, source))?;

        done = done.saturating_add(size);
        progress(InstallProgress {
            phase: InstallPhase::Extracting,
            done_bytes: done,
            total_bytes: total,
        });
    }

    Ok(())
}

// ── zip ─────────────────────────────────────────────────

const UNIX_FILE_TYPE_MASK: u32 = 0o170000;
const UNIX_SYMLINK: u32 = 0o120000;

fn is_symlink_mode(mode: Option<u32>) -> bool {
    mode.map(|mode| mode & UNIX_FILE_TYPE_MASK == UNIX_SYMLINK)
        .unwrap_or(false)
}

fn read_zip_link_target(entry: &mut impl Read, archive: &Path) -> LauncherResult<PathBuf> {
    let mut target = String::new();
    entry
        .read_to_string(&mut target)
        .map_err(|source| LauncherError::io(archive, source))?;
    Ok(PathBuf::from(target))
}

fn extract_zip(
    archive: &Path,
    dest: &Path,
    progress: &ProgressFn,
    cancel: &CancellationToken,
) -> LauncherResult<()> {
    let file = File::open(archive).map_err(|source| LauncherError::io(archive, source))?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))?;

    let mut total = 0u64;
    let mut links = LinkGuard::default();
    for index in 0..zip.len() {
        ensure_not_cancelled(cancel)?;
        let mut entry = zip.by_index(index)?;
        let name = PathBuf::from(entry.name());
        check_entry_path(&name)?;
        links.check(&name)?;
        if is_symlink_mode(entry.unix_mode()) {
            let target = read_zip_link_target(&mut entry, archive)?;
            check_symlink_target(&name, &target)?;
            links.record(&name)?;
        }
        total = total.saturating_add(entry.size());
    }

    let mut done = 0u64;
    for index in 0..zip.len() {
        ensure_not_cancelled(cancel)?;
        let mut entry = zip.by_index(index)?;
        let relative = check_entry_path(Path::new(entry.name()))?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        ensure_no_symlink_ancestor(dest, &relative)?;
        let out_path = dest.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|source| LauncherError::io(&out_path, source))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LauncherError::io(parent, source))?;
        }

        if is_symlink_mode(entry.unix_mode()) {
            let target = read_zip_link_target(&mut entry, archive)?;
            create_symlink(&target, &out_path)?;
        } else {
            let mut out =
                File::create(&out_path).map_err(|source| LauncherError::io(&out_path, source))?;
            std::io::copy(&mut entry, &mut out)
                .map_err(|source| LauncherError::io(&out_path, source))?;
            apply_unix_mode(&out_path, entry.unix_mode())?;
        }

        done = done.saturating_add(entry.size());
        progress(InstallProgress {
            phase: InstallPhase::Extracting,
            done_bytes: done,
            total_bytes: total,
        });
    }

    Ok(())
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> LauncherResult<()> {
    if link.symlink_metadata().is_ok() {
        std::fs::remove_file(link).map_err(|source| LauncherError::io(link, source))?;
    }
    std::os::unix::fs::symlink(target, link).map_err(|source| LauncherError::io(link, source))
}

#[cfg(not(unix))]
fn create_symlink(_target: &Path, link: &Path) -> LauncherResult<()> {
    debug!("Skipping symlink {:?} on this platform", link);
    Ok(())
}

#[cfg(unix)]
fn apply_unix_mode(path: &Path, mode: Option<u32>) -> LauncherResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let Some(mode) = mode else {
        return Ok(());
    };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o777))
        .map_err(|source| LauncherError::io(path, source))
}

#[cfg(not(unix))]
fn apply_unix_mode(_path: &Path, _mode: Option<u32>) -> LauncherResult<()> {
    Ok(())
}
