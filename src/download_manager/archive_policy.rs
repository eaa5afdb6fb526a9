//! Resolution of destination paths already holding different content.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

/// What to do when the rendered path is occupied by a file whose digest
/// differs from the one being stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchivePolicy {
    /// Keep the existing file, drop the new content.
    #[default]
    #[serde(alias = "skip-keep-existing", alias = "keep")]
    Skip,
    /// Replace the existing file.
    #[serde(alias = "replace")]
    Overwrite,
    /// Store the new content next to it under a free name.
    #[serde(alias = "auto-rename")]
    Rename,
    /// Fail the item, touch nothing.
    #[serde(alias = "error-on-conflict", alias = "fail")]
    Error,
}

impl ArchivePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchivePolicy::Skip => "skip",
            ArchivePolicy::Overwrite => "overwrite",
            ArchivePolicy::Rename => "rename",
            ArchivePolicy::Error => "error",
        }
    }
}

/// First `stem-N.ext` next to `path` (N from 1) that does not exist.
pub fn free_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut n: u64 = 1;
    loop {
        let name = match &ext {
            Some(ext) => format!("{}-{}.{}", stem, n, ext),
            None => format!("{}-{}", stem, n),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Move `old` under `archive_dir`, keeping its location relative to
/// `download_root` (just the file name when it lives outside the root).
/// An existing archived copy is never clobbered. Returns the new location.
pub fn archive_replaced(
    old: &Path,
    download_root: &Path,
    archive_dir: &Path,
) -> std::io::Result<PathBuf> {
    let relative = match old.strip_prefix(download_root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
        _ => old
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("replaced")),
    };

    let mut target = archive_dir.join(relative);
    if target.exists() {
        target = free_path(&target);
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    move_file(old, &target)?;
    info!("Archived replaced file {:?} -> {:?}", old, target);
    Ok(target)
}

/// Rename, falling back to copy + delete across filesystems.
pub(crate) fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}
