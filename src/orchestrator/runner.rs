//! Drives bookmark sources through the download manager.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::journal::{ActivityJournal, EntrySource, JournalEntry};
use super::progress::RunProgress;
use super::stats::RunStats;
use crate::bookmarks::{
    BookmarkPage, BookmarkSource, BookmarkStatus, FilterReason, MediaItem, PageCursor,
    SelfAccount, SourceError, StatusFilter,
};
use crate::download_manager::{
    Acquisition, DownloadManager, DownloadOutcome, RecordContext, RequestThrottle, RetryPolicy,
};
use crate::error::{ArchiverError, ArchiverResult};
use crate::path_template::{HostClassifier, PathTemplate, RenderedPath, TemplateContext};

/// Run-wide settings shared by every instance.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub template: PathTemplate,
    pub classifier: HostClassifier,
    pub filter: StatusFilter,
    /// Statuses to process per instance; `None` walks the whole listing.
    pub limit: Option<usize>,
    /// Fetches in flight at once.
    pub concurrency: usize,
    pub simulate: bool,
    /// Retry policy for listing pages.
    pub page_retry: RetryPolicy,
}

/// One account to archive.
#[derive(Clone)]
pub struct InstanceJob {
    pub source: Arc<dyn BookmarkSource>,
    pub me: SelfAccount,
    pub unbookmark: bool,
    /// Replaces the run-wide request gate for this instance.
    pub throttle: Option<Arc<dyn RequestThrottle>>,
}

struct MediaJob {
    slot: usize,
    item: MediaItem,
    rendered: RenderedPath,
    template: TemplateContext,
    record: RecordContext,
    status_url: Option<String>,
}

/// Progress of one status whose media are in flight.
struct StatusSlot {
    id: String,
    url: Option<String>,
    pending: usize,
    all_settled: bool,
}

/// What the concurrent half produced for one media job.
enum Dispatch {
    Acquired(Acquisition),
    /// Repeats a media already in flight on this page; acquired after the
    /// first one is committed so the tracker and ledger see its result.
    Deferred,
    Simulated,
}

pub struct Orchestrator {
    downloads: DownloadManager,
    settings: RunSettings,
    journal: Option<ActivityJournal>,
    progress: RunProgress,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(downloads: DownloadManager, settings: RunSettings) -> Self {
        Self {
            downloads,
            settings,
            journal: None,
            progress: RunProgress::off(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: RunProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_journal(mut self, journal: ActivityJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Once `cancel` fires no further media are dispatched; fetches already in
    /// flight finish and are committed.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Process every instance in order. Only authentication failures and
    /// ledger/tracker persistence errors abort the run.
    pub async fn run(&self, instances: &[InstanceJob]) -> ArchiverResult<RunStats> {
        let mut total = RunStats::default();
        for instance in instances {
            if self.cancel.is_cancelled() {
                info!("Run cancelled, skipping remaining instances");
                break;
            }
            let label = instance.source.label();
            let stats = self.run_instance(instance).await?;
            stats.log_summary(&label);
            total.merge(&stats);
        }
        Ok(total)
    }

    pub async fn run_instance(&self, instance: &InstanceJob) -> ArchiverResult<RunStats> {
        let label = instance.source.label();
        let downloads = match &instance.throttle {
            Some(throttle) => self.downloads.clone().with_throttle(throttle.clone()),
            None => self.downloads.clone(),
        };
        if self.settings.simulate {
            info!("[{}] simulate mode: nothing will be fetched or written", label);
        }

        let mut stats = RunStats::default();
        let mut cursor = Some(PageCursor::start());
        let bar = self.progress.statuses(&label, self.settings.limit);
        let gate_before = downloads.throttle_stats().await;

        while let Some(current) = cursor.take() {
            if self.cancel.is_cancelled() {
                info!("[{}] cancelled, stopping", label);
                break;
            }
            let remaining = match self.settings.limit {
                Some(limit) if stats.statuses >= limit => {
                    info!("[{}] reached limit of {} statuses", label, limit);
                    break;
                }
                Some(limit) => limit - stats.statuses,
                None => usize::MAX,
            };

            let Some(page) = self.fetch_page(instance, &label, &current).await? else {
                break;
            };
            let BookmarkPage { mut statuses, next } = page;
            if statuses.len() > remaining {
                statuses.truncate(remaining);
            }
            stats.statuses += statuses.len();
            cursor = next;

            self.process_statuses(&downloads, instance, &label, statuses, &bar, &mut stats)
                .await?;
        }
        bar.finish();

        let gate = downloads.throttle_stats().await;
        stats.requests = gate.granted.saturating_sub(gate_before.granted);
        stats.throttle_wait = gate.total_wait.saturating_sub(gate_before.total_wait);
        Ok(stats)
    }

    async fn fetch_page(
        &self,
        instance: &InstanceJob,
        label: &str,
        cursor: &PageCursor,
    ) -> ArchiverResult<Option<BookmarkPage>> {
        let policy = &self.settings.page_retry;
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match instance.source.fetch_page(cursor).await {
                Ok(page) => return Ok(Some(page)),
                Err(SourceError::Auth { status, message }) => {
                    return Err(ArchiverError::Auth {
                        instance: label.to_string(),
                        reason: format!("HTTP {} {}", status, message),
                    });
                }
                Err(e) if e.is_retryable() && attempts < policy.max_attempts => {
                    let delay = policy.delay_for(attempts - 1);
                    warn!(
                        "[{}] bookmark listing failed ({}), retrying in {:?}",
                        label, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!("[{}] giving up on bookmark listing: {}", label, e);
                    return Ok(None);
                }
            }
        }
    }

    fn plan(
        &self,
        statuses: &[BookmarkStatus],
        me: &SelfAccount,
        label: &str,
        bar: &ProgressBar,
        stats: &mut RunStats,
    ) -> (Vec<StatusSlot>, Vec<MediaJob>) {
        let mut slots = Vec::new();
        let mut jobs = Vec::new();

        for status in statuses {
            if let Some(reason) = self.settings.filter.check(status, me) {
                debug!("[{}] skip status {}: {}", label, status.id, reason);
                stats.record_filtered(reason);
                bar.inc(1);
                continue;
            }
            let items = status.media_items();
            if items.is_empty() {
                stats.record_filtered(FilterReason::NoMedia);
                bar.inc(1);
                continue;
            }

            let slot = slots.len();
            slots.push(StatusSlot {
                id: status.id.clone(),
                url: status.url.clone(),
                pending: items.len(),
                all_settled: true,
            });
            for item in items {
                let template = self.template_context(status, &item);
                let rendered = self
                    .settings
                    .template
                    .render(&self.downloads.settings().download_root, &template);
                let record = RecordContext {
                    status_id: status.id.clone(),
                    status_url: status.url.clone(),
                    origin_host: template.origin_host.clone(),
                    origin_group: template.origin_group.clone(),
                    account_host: template.account_host.clone(),
                    account_group: template.account_group.clone(),
                    instance_label: Some(label.to_string()),
                    created_at: Some(status.created_at),
                };
                jobs.push(MediaJob {
                    slot,
                    item,
                    rendered,
                    template,
                    record,
                    status_url: status.url.clone(),
                });
            }
        }

        (slots, jobs)
    }

    fn template_context(&self, status: &BookmarkStatus, item: &MediaItem) -> TemplateContext {
        let classifier = &self.settings.classifier;
        let account_host = status.account_host();
        TemplateContext {
            origin_group: classifier.classify(&item.origin_host),
            origin_host: item.origin_host.clone(),
            account_group: classifier.classify(&account_host),
            account_host,
            screenname: status.screenname().to_string(),
            status_id: status.id.clone(),
            index: item.index,
            ext: item.extension.clone(),
            created_at: status.created_at,
        }
    }

    async fn process_statuses(
        &self,
        downloads: &DownloadManager,
        instance: &InstanceJob,
        label: &str,
        statuses: Vec<BookmarkStatus>,
        bar: &ProgressBar,
        stats: &mut RunStats,
    ) -> ArchiverResult<()> {
        let (mut slots, jobs) = self.plan(&statuses, &instance.me, label, bar, stats);
        let simulate = self.settings.simulate;
        let cancel = self.cancel.clone();

        // Only the first job per media id is fetched concurrently.
        let mut in_flight = HashSet::new();
        let jobs: Vec<(MediaJob, bool)> = jobs
            .into_iter()
            .map(|job| {
                let first = in_flight.insert(job.item.media_id.clone());
                (job, first)
            })
            .collect();

        // Acquisitions run concurrently; results come back in job order and
        // are committed one at a time below.
        let mut acquired = stream::iter(jobs)
            .take_while(move |_| futures::future::ready(!cancel.is_cancelled()))
            .map(|(job, first)| {
                let downloads = downloads.clone();
                let progress = self.progress.clone();
                async move {
                    let dispatch = if simulate {
                        Dispatch::Simulated
                    } else if !first {
                        Dispatch::Deferred
                    } else {
                        let media_bar = progress.media(label, &job.record.status_id, job.item.index);
                        let acquisition = downloads
                            .acquire_with_progress(&job.item, media_bar.as_ref())
                            .await;
                        if let Some(media_bar) = media_bar {
                            media_bar.finish_and_clear();
                        }
                        Dispatch::Acquired(acquisition)
                    };
                    (job, dispatch)
                }
            })
            .buffered(self.settings.concurrency.max(1));

        while let Some((job, dispatch)) = acquired.next().await {
            let outcome = match dispatch {
                Dispatch::Acquired(acquisition) => self.commit(downloads, acquisition, &job).await?,
                Dispatch::Deferred => {
                    if self.cancel.is_cancelled() {
                        debug!("[{}] cancelled before repeat of {}", label, job.item.url);
                        continue;
                    }
                    let acquisition = downloads.acquire(&job.item).await;
                    self.commit(downloads, acquisition, &job).await?
                }
                Dispatch::Simulated => downloads.simulate(&job.item, &job.rendered).await,
            };
            report(label, &job, &outcome);
            stats.record(&outcome);

            let slot = &mut slots[job.slot];
            slot.pending -= 1;
            slot.all_settled &= outcome.is_settled();
            if slot.pending > 0 {
                continue;
            }
            bar.set_message(slot.url.clone().unwrap_or_else(|| format!("id={}", slot.id)));
            bar.inc(1);
            if slot.all_settled && instance.unbookmark && !simulate {
                match instance.source.unbookmark(&slot.id).await {
                    Ok(()) => {
                        debug!("[{}] unbookmarked status {}", label, slot.id);
                        stats.unbookmarked += 1;
                    }
                    Err(e) => warn!("[{}] failed to unbookmark {}: {}", label, slot.id, e),
                }
            }
        }

        Ok(())
    }

    async fn commit(
        &self,
        downloads: &DownloadManager,
        acquisition: Acquisition,
        job: &MediaJob,
    ) -> ArchiverResult<DownloadOutcome> {
        let outcome = downloads
            .settle(acquisition, &job.rendered, &job.record)
            .await?;

        if let Some(journal) = &self.journal {
            let label = job.record.instance_label.as_deref().unwrap_or_default();
            let source = EntrySource {
                context: &job.template,
                status_url: job.status_url.as_deref(),
                media_url: &job.item.url,
                instance_label: label,
            };
            if let Some(entry) = JournalEntry::from_outcome(&outcome, &source, downloads.now()) {
                if let Err(e) = journal.append(&job.template, &entry) {
                    warn!("Failed to write journal entry: {}", e);
                }
            }
        }
        Ok(outcome)
    }
}

fn report(label: &str, job: &MediaJob, outcome: &DownloadOutcome) {
    let status = &job.record.status_id;
    match outcome {
        DownloadOutcome::Stored { path, .. } => {
            info!("[{}] {} #{} stored {:?}", label, status, job.item.index, path)
        }
        DownloadOutcome::Duplicate { existing, .. } => info!(
            "[{}] {} #{} duplicate of {:?}",
            label, status, job.item.index, existing
        ),
        DownloadOutcome::Skipped(reason) => info!(
            "[{}] {} #{} skip {}: {}",
            label,
            status,
            job.item.index,
            reason.as_str(),
            job.item.url
        ),
        DownloadOutcome::Failed(err) => warn!(
            "[{}] {} #{} failed: {} ({})",
            label, status, job.item.index, err, job.item.url
        ),
        DownloadOutcome::Simulated { path, occupied } => info!(
            "[{}] {} #{} would store {:?}{}",
            label,
            status,
            job.item.index,
            path,
            if *occupied { " (path occupied)" } else { "" }
        ),
    }
}
