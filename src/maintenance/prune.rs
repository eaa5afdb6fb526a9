//! Deleting archived files together with their ledger entries.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{ArchiverError, ArchiverResult};
use crate::hash_ledger::{normalize_path, HashLedger, HashRecord};

#[derive(Debug, Default)]
pub struct PruneReport {
    pub deleted: Vec<PathBuf>,
    /// Targets that were already gone; their entries are dropped too.
    pub missing: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
    pub removed_entries: Vec<HashRecord>,
}

impl PruneReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Turn user-supplied paths into absolute targets under `root`.
///
/// Relative paths are taken from `root`. The root itself and anything outside
/// it are refused, and the whole batch fails before anything is touched.
pub fn resolve_targets(root: &Path, inputs: &[PathBuf]) -> ArchiverResult<Vec<PathBuf>> {
    let root = normalize_path(root);
    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for input in inputs {
        let candidate = if input.is_absolute() {
            input.clone()
        } else {
            root.join(input)
        };
        let target = normalize_path(&candidate);
        if target == root {
            return Err(ArchiverError::Config(format!(
                "refusing to prune the download root itself ({:?})",
                input
            )));
        }
        if !target.starts_with(&root) {
            return Err(ArchiverError::Config(format!(
                "{:?} is outside the download root {:?}",
                input, root
            )));
        }
        if seen.insert(target.clone()) {
            targets.push(target);
        }
    }
    Ok(targets)
}

/// Delete `inputs` under `root` and drop the ledger entries of every target
/// that no longer exists afterwards. Entries of files that could not be
/// deleted are kept.
pub fn prune(ledger: &mut HashLedger, root: &Path, inputs: &[PathBuf]) -> ArchiverResult<PruneReport> {
    let targets = resolve_targets(root, inputs)?;
    let mut report = PruneReport::default();

    for target in targets {
        match fs::remove_file(&target) {
            Ok(()) => {
                info!("Deleted {:?}", target);
                report.deleted.push(target);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Already gone: {:?}", target);
                report.missing.push(target);
            }
            Err(e) => {
                warn!("Failed to delete {:?}: {}", target, e);
                report.failed.push((target, e.to_string()));
            }
        }
    }

    let gone: Vec<PathBuf> = report
        .deleted
        .iter()
        .chain(report.missing.iter())
        .cloned()
        .collect();
    report.removed_entries = ledger.remove_paths(&gone)?;
    Ok(report)
}
