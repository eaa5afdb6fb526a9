//! Per-item download pipeline.
//!
//! Work for one media item is split in two halves:
//!
//! - [`DownloadManager::acquire`] does everything that may run concurrently:
//!   the removed-media check, rate limiting, the request with its retries and
//!   streaming the body into a private temporary file while hashing it.
//! - [`DownloadManager::settle`] commits the result. It takes the ledger lock
//!   for the whole duplicate check / conflict resolution / record sequence, so
//!   ledger and tracker writes are applied one at a time even when several
//!   acquisitions finish together.
//!
//! The temporary file is owned by the [`FetchedMedia`] value and removed when
//! it is dropped, so every exit path short of a successful commit cleans up.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::archive_policy::{archive_replaced, free_path, move_file, ArchivePolicy};
use super::fetcher::MediaFetcher;
use super::models::{DownloadError, DownloadErrorType, DownloadOutcome, SkipReason};
use super::responses::ResponseClassifier;
use super::retry_policy::RetryPolicy;
use super::throttle::{NoOpThrottle, RequestThrottle, ThrottleStats};
use crate::bookmarks::MediaItem;
use crate::clock::Clock;
use crate::error::ArchiverResult;
use crate::hash_ledger::{HashLedger, HashRecord};
use crate::path_template::RenderedPath;
use crate::removed_tracker::RemovedMediaTracker;

/// Run-scoped download configuration.
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub download_root: PathBuf,
    /// Where partial downloads live. Should share a filesystem with
    /// `download_root` so the final move is a rename.
    pub tmp_dir: PathBuf,
    pub policy: ArchivePolicy,
    /// Replaced files are moved here under `overwrite`; deleted when `None`.
    pub archive_dir: Option<PathBuf>,
    pub responses: ResponseClassifier,
    pub retry: RetryPolicy,
}

impl DownloadSettings {
    pub fn new(download_root: impl Into<PathBuf>) -> Self {
        let download_root = download_root.into();
        Self {
            tmp_dir: download_root.join(".tmp"),
            download_root,
            policy: ArchivePolicy::default(),
            archive_dir: None,
            responses: ResponseClassifier::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Ledger metadata describing where a media item came from.
#[derive(Debug, Clone, Default)]
pub struct RecordContext {
    pub status_id: String,
    pub status_url: Option<String>,
    pub origin_host: String,
    pub origin_group: String,
    pub account_host: String,
    pub account_group: String,
    pub instance_label: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Body fully downloaded into a temporary file.
#[derive(Debug)]
pub struct FetchedMedia {
    temp: NamedTempFile,
    pub digest: String,
    pub size: u64,
    pub media_id: String,
    pub url: String,
    pub attempts: u32,
}

impl FetchedMedia {
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }
}

/// Result of the concurrent half of a download.
#[derive(Debug)]
pub enum Acquisition {
    Fetched(FetchedMedia),
    /// Origin confirmed the media is gone; the tracker still has to learn it.
    NotFound { media_id: String },
    /// Nothing left to commit.
    Resolved(DownloadOutcome),
}

#[derive(Clone)]
pub struct DownloadManager {
    settings: Arc<DownloadSettings>,
    fetcher: Arc<dyn MediaFetcher>,
    throttle: Arc<dyn RequestThrottle>,
    ledger: Arc<RwLock<HashLedger>>,
    tracker: Arc<RwLock<RemovedMediaTracker>>,
    clock: Arc<dyn Clock>,
}

impl DownloadManager {
    pub fn new(
        settings: DownloadSettings,
        fetcher: Arc<dyn MediaFetcher>,
        ledger: Arc<RwLock<HashLedger>>,
        tracker: Arc<RwLock<RemovedMediaTracker>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            fetcher,
            throttle: Arc::new(NoOpThrottle),
            ledger,
            tracker,
            clock,
        }
    }

    /// Use `throttle` as the request gate. Clones share it.
    pub fn with_throttle(mut self, throttle: Arc<dyn RequestThrottle>) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn settings(&self) -> &DownloadSettings {
        &self.settings
    }

    pub fn ledger(&self) -> &Arc<RwLock<HashLedger>> {
        &self.ledger
    }

    pub fn tracker(&self) -> &Arc<RwLock<RemovedMediaTracker>> {
        &self.tracker
    }

    /// Counters of the request gate in use.
    pub async fn throttle_stats(&self) -> ThrottleStats {
        self.throttle.get_stats().await
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Fetch and commit in one go.
    pub async fn fetch(
        &self,
        item: &MediaItem,
        rendered: &RenderedPath,
        context: &RecordContext,
    ) -> ArchiverResult<DownloadOutcome> {
        let acquisition = self.acquire(item).await;
        self.settle(acquisition, rendered, context).await
    }

    /// Download `item` into a temporary file, honouring the tracker, the
    /// throttle and the retry policy. Never touches the ledger.
    pub async fn acquire(&self, item: &MediaItem) -> Acquisition {
        self.acquire_with_progress(item, None).await
    }

    /// Like [`acquire`](Self::acquire), feeding received bytes to `progress`.
    pub async fn acquire_with_progress(
        &self,
        item: &MediaItem,
        progress: Option<&ProgressBar>,
    ) -> Acquisition {
        if self
            .tracker
            .read()
            .await
            .is_skippable(&item.media_id, self.clock.now())
        {
            debug!("Skipping {}: recently confirmed missing", item.url);
            return Acquisition::Resolved(DownloadOutcome::Skipped(SkipReason::TrackedNotFound));
        }

        let retry = &self.settings.retry;
        let mut attempts: u32 = 0;
        loop {
            self.throttle.acquire().await;
            attempts += 1;

            match self.attempt(item, progress).await {
                Ok((temp, digest, size)) => {
                    return Acquisition::Fetched(FetchedMedia {
                        temp,
                        digest,
                        size,
                        media_id: item.media_id.clone(),
                        url: item.url.clone(),
                        attempts,
                    });
                }
                Err(e) if e.error_type == DownloadErrorType::NotFound => {
                    info!("Media not found at {}: {}", item.url, e.message);
                    return Acquisition::NotFound {
                        media_id: item.media_id.clone(),
                    };
                }
                Err(e) if retry.should_retry(&e, attempts) => {
                    let delay = retry.delay_for(attempts - 1);
                    warn!(
                        "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                        attempts, retry.max_attempts, item.url, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(
                        "Giving up on {} after {} attempt(s): {}",
                        item.url, attempts, e
                    );
                    return Acquisition::Resolved(DownloadOutcome::Failed(e));
                }
            }
        }
    }

    /// One request. The body goes to a fresh temporary file that is removed
    /// again if anything fails before it is returned.
    async fn attempt(
        &self,
        item: &MediaItem,
        progress: Option<&ProgressBar>,
    ) -> Result<(NamedTempFile, String, u64), DownloadError> {
        let mut response = self.fetcher.fetch(&item.url).await?;
        if let Some(err) = self.settings.responses.error_for(response.status) {
            return Err(err);
        }
        if let Some(bar) = progress {
            bar.set_position(0);
            if let Some(total) = response.body.size_hint() {
                bar.set_length(total);
            }
        }

        let tmp_dir = &self.settings.tmp_dir;
        tokio::fs::create_dir_all(tmp_dir)
            .await
            .map_err(|e| DownloadError::storage(tmp_dir, e))?;
        let temp = tempfile::Builder::new()
            .prefix("media-")
            .suffix(".part")
            .tempfile_in(tmp_dir)
            .map_err(|e| DownloadError::storage(tmp_dir, e))?;
        let handle = temp
            .as_file()
            .try_clone()
            .map_err(|e| DownloadError::storage(temp.path(), e))?;
        let mut file = tokio::fs::File::from_std(handle);

        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        while let Some(chunk) = response.body.next_chunk().await? {
            hasher.update(&chunk);
            size += chunk.len() as u64;
            if let Some(bar) = progress {
                bar.inc(chunk.len() as u64);
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::storage(temp.path(), e))?;
        }
        file.flush()
            .await
            .map_err(|e| DownloadError::storage(temp.path(), e))?;

        let digest = format!("{:x}", hasher.finalize());
        debug!(
            "Fetched {} ({:#}, sha256 {})",
            item.url,
            byte_unit::Byte::from(size),
            digest
        );
        Ok((temp, digest, size))
    }

    /// Commit an acquisition: ledger duplicate check, archive policy, final
    /// move, ledger record and tracker update.
    ///
    /// Per-item problems come back as outcomes; only failures to persist the
    /// ledger or tracker themselves are errors.
    pub async fn settle(
        &self,
        acquisition: Acquisition,
        rendered: &RenderedPath,
        context: &RecordContext,
    ) -> ArchiverResult<DownloadOutcome> {
        match acquisition {
            Acquisition::Resolved(outcome) => Ok(outcome),
            Acquisition::NotFound { media_id } => {
                self.tracker
                    .write()
                    .await
                    .mark_not_found(&media_id, self.clock.now())?;
                Ok(DownloadOutcome::Skipped(SkipReason::NotFound))
            }
            Acquisition::Fetched(media) => self.commit(media, rendered, context).await,
        }
    }

    async fn commit(
        &self,
        media: FetchedMedia,
        rendered: &RenderedPath,
        context: &RecordContext,
    ) -> ArchiverResult<DownloadOutcome> {
        let mut ledger = self.ledger.write().await;

        if let Some(existing) = ledger.get(&media.digest) {
            let outcome = DownloadOutcome::Duplicate {
                existing: existing.filepath.clone(),
                digest: media.digest.clone(),
            };
            drop(ledger);
            info!(
                "Duplicate content {} already stored at {:?}",
                media.url,
                outcome.path()
            );
            self.tracker.write().await.clear(&media.media_id)?;
            return Ok(outcome);
        }

        let mut target = rendered.resolve(&media.digest);
        let mut replaced = false;
        let mut overwritten = false;

        if target.exists() {
            let occupant = match digest_file(&target) {
                Ok(d) => d,
                Err(e) => {
                    return Ok(DownloadOutcome::Failed(DownloadError::storage(&target, e)));
                }
            };

            if occupant == media.digest {
                // same bytes already on disk but unknown to the ledger
                ledger.record(self.build_record(&media, &target, context))?;
                drop(ledger);
                info!("Adopted existing file {:?} into the ledger", target);
                self.tracker.write().await.clear(&media.media_id)?;
                return Ok(DownloadOutcome::Duplicate {
                    existing: target,
                    digest: media.digest,
                });
            }

            match self.settings.policy {
                ArchivePolicy::Skip => {
                    info!(
                        "Keeping existing {:?}, dropping new content from {}",
                        target, media.url
                    );
                    return Ok(DownloadOutcome::Skipped(SkipReason::Conflict {
                        path: target,
                    }));
                }
                ArchivePolicy::Error => {
                    warn!("Conflict at {:?} for {}", target, media.url);
                    return Ok(DownloadOutcome::Failed(DownloadError::new(
                        DownloadErrorType::Conflict,
                        format!("{:?} already holds different content", target),
                    )));
                }
                ArchivePolicy::Rename => {
                    let renamed = free_path(&target);
                    debug!("{:?} is taken, storing as {:?}", target, renamed);
                    target = renamed;
                }
                ArchivePolicy::Overwrite => {
                    if let Some(archive_dir) = &self.settings.archive_dir {
                        match archive_replaced(&target, &self.settings.download_root, archive_dir)
                        {
                            // the displaced content now lives in the archive
                            Ok(archived) => {
                                ledger.relocate(&target, &archived)?;
                            }
                            Err(e) => {
                                return Ok(DownloadOutcome::Failed(DownloadError::storage(
                                    &target, e,
                                )));
                            }
                        }
                    } else {
                        overwritten = true;
                    }
                    replaced = true;
                }
            }
        }

        let record = self.build_record(&media, &target, context);
        let FetchedMedia {
            temp,
            digest,
            size,
            media_id,
            ..
        } = media;
        if let Err(e) = place(temp, &target) {
            return Ok(DownloadOutcome::Failed(e));
        }

        if overwritten {
            // the previous content is gone from disk
            ledger.remove_paths(std::slice::from_ref(&target))?;
        }
        ledger.record(record)?;
        drop(ledger);

        self.tracker.write().await.clear(&media_id)?;
        info!(
            "Stored {:?} ({:#}){}",
            target,
            byte_unit::Byte::from(size),
            if replaced { ", replaced older file" } else { "" }
        );

        Ok(DownloadOutcome::Stored {
            path: target,
            digest,
            size,
            replaced,
        })
    }

    fn build_record(
        &self,
        media: &FetchedMedia,
        path: &Path,
        context: &RecordContext,
    ) -> HashRecord {
        HashRecord {
            sha256: media.digest.clone(),
            filepath: path.to_path_buf(),
            statusid: context.status_id.clone(),
            status_url: context.status_url.clone(),
            media_url: Some(media.url.clone()),
            origin_host: context.origin_host.clone(),
            origin_group: context.origin_group.clone(),
            account_host: context.account_host.clone(),
            account_group: context.account_group.clone(),
            size: media.size,
            instance_label: context.instance_label.clone(),
            created_at: context.created_at,
            stored_at: self.clock.now(),
        }
    }

    /// What `fetch` would do, without any request or write.
    pub async fn simulate(&self, item: &MediaItem, rendered: &RenderedPath) -> DownloadOutcome {
        if self
            .tracker
            .read()
            .await
            .is_skippable(&item.media_id, self.clock.now())
        {
            return DownloadOutcome::Skipped(SkipReason::TrackedNotFound);
        }

        let path = rendered.preview();
        let occupied = !rendered.needs_digest() && path.exists();
        DownloadOutcome::Simulated { path, occupied }
    }
}

/// Move the finished temporary file to `target`, replacing whatever is there.
fn place(temp: NamedTempFile, target: &Path) -> Result<(), DownloadError> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DownloadError::storage(parent, e))?;
    }
    match temp.persist(target) {
        Ok(_) => Ok(()),
        Err(e) => {
            // persist only renames; fall back to copying across filesystems
            let temp = e.file;
            move_file(temp.path(), target).map_err(|e| DownloadError::storage(target, e))?;
            Ok(())
        }
    }
}

/// sha256 of a file on disk.
pub fn digest_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
