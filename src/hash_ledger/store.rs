//! JSONL-backed ledger with an in-memory digest index.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};

use super::models::HashRecord;
use crate::error::ArchiverResult;
use crate::jsonl;

/// Digest -> record mapping backed by an append-only log file.
///
/// Each ledger owns its own map; nothing is shared between instances, so tests
/// can load as many isolated ledgers as they like.
#[derive(Debug)]
pub struct HashLedger {
    path: PathBuf,
    entries: HashMap<String, HashRecord>,
    /// Digests in the order they were first seen, so compaction keeps file order.
    order: Vec<String>,
    malformed_lines: usize,
}

impl HashLedger {
    /// Rebuild the ledger from `path`. A missing file yields an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> ArchiverResult<Self> {
        let path = path.into();
        let loaded = jsonl::read_records::<HashRecord>(&path)?;

        let mut entries = HashMap::with_capacity(loaded.records.len());
        let mut order = Vec::with_capacity(loaded.records.len());
        for record in loaded.records {
            if entries.contains_key(&record.sha256) {
                debug!(
                    "Ignoring repeated ledger line for {} ({:?})",
                    record.sha256, record.filepath
                );
                continue;
            }
            order.push(record.sha256.clone());
            entries.insert(record.sha256.clone(), record);
        }

        if loaded.malformed > 0 {
            warn!(
                "Ledger {:?}: skipped {} malformed line(s)",
                path, loaded.malformed
            );
        }
        info!("Loaded {} ledger entries from {:?}", entries.len(), path);

        Ok(Self {
            path,
            entries,
            order,
            malformed_lines: loaded.malformed,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of lines that could not be decoded on load.
    pub fn malformed_lines(&self) -> usize {
        self.malformed_lines
    }

    pub fn contains(&self, digest: &str) -> bool {
        self.entries.contains_key(digest)
    }

    pub fn get(&self, digest: &str) -> Option<&HashRecord> {
        self.entries.get(digest)
    }

    /// Records in first-seen order.
    pub fn records(&self) -> impl Iterator<Item = &HashRecord> {
        self.order.iter().filter_map(|d| self.entries.get(d))
    }

    /// Find the record whose stored path is `path` (compared after normalization).
    pub fn find_by_path(&self, path: &Path) -> Option<&HashRecord> {
        let target = normalize_path(path);
        self.records()
            .find(|record| normalize_path(&record.filepath) == target)
    }

    /// Insert a record unless its digest is already known.
    ///
    /// Returns `true` when a line was appended. A known digest is a no-op: the
    /// file is not touched and the existing record is kept as is.
    pub fn record(&mut self, record: HashRecord) -> ArchiverResult<bool> {
        if self.entries.contains_key(&record.sha256) {
            return Ok(false);
        }

        jsonl::append_record(&self.path, &record)?;
        self.order.push(record.sha256.clone());
        self.entries.insert(record.sha256.clone(), record);
        Ok(true)
    }

    /// Point the record stored at `from` to `to` and compact the log.
    ///
    /// Returns `false` when no record lives at `from`.
    pub fn relocate(&mut self, from: &Path, to: &Path) -> ArchiverResult<bool> {
        let Some(digest) = self.find_by_path(from).map(|r| r.sha256.clone()) else {
            return Ok(false);
        };
        if let Some(record) = self.entries.get_mut(&digest) {
            record.filepath = to.to_path_buf();
        }
        jsonl::rewrite_records(&self.path, self.records())?;
        info!("Ledger entry {} moved to {:?}", digest, to);
        Ok(true)
    }

    /// Remove every record stored at one of `paths` and compact the log.
    ///
    /// Returns the removed records. The file is only rewritten when something
    /// was removed.
    pub fn remove_paths(&mut self, paths: &[PathBuf]) -> ArchiverResult<Vec<HashRecord>> {
        let targets: HashSet<PathBuf> = paths.iter().map(|p| normalize_path(p)).collect();
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let doomed: Vec<String> = self
            .records()
            .filter(|record| targets.contains(&normalize_path(&record.filepath)))
            .map(|record| record.sha256.clone())
            .collect();
        if doomed.is_empty() {
            return Ok(Vec::new());
        }

        let survivors: Vec<&HashRecord> = self
            .records()
            .filter(|record| !doomed.contains(&record.sha256))
            .collect();
        jsonl::rewrite_records(&self.path, survivors)?;

        let mut removed = Vec::with_capacity(doomed.len());
        for digest in &doomed {
            if let Some(record) = self.entries.remove(digest) {
                removed.push(record);
            }
        }
        self.order.retain(|d| self.entries.contains_key(d));

        info!(
            "Removed {} ledger entries, {} remain in {:?}",
            removed.len(),
            self.entries.len(),
            self.path
        );
        Ok(removed)
    }
}

/// Make `path` absolute and lexically resolve `.` and `..` without touching
/// the filesystem, so stored and user-supplied paths compare equal.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
