use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tempfile::TempDir;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use bookmark_archiver::bookmarks::{
    BookmarkSource, BookmarkStatus, MediaAttachment, SelfAccount, StatusAccount, StatusFilter,
};
use bookmark_archiver::download_manager::{DownloadManager, DownloadSettings, RetryPolicy};
use bookmark_archiver::orchestrator::{
    ActivityJournal, InstanceJob, JournalFrequency, Orchestrator, RunSettings, RunStats,
};
use bookmark_archiver::path_template::{HostClassifier, PathTemplate};
use bookmark_archiver::{ArchiverResult, HashLedger, RemovedMediaTracker};

use super::fakes::{FakeFetcher, FakeSource, ManualClock};

/// Creation time of status 0; status `n` is `n` minutes later.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap()
}

pub fn status_at<S: AsRef<str>>(id: u32, created_at: DateTime<Utc>, media: &[S]) -> BookmarkStatus {
    BookmarkStatus {
        id: id.to_string(),
        url: Some(format!("https://mastodon.social/@alice/{}", id)),
        account: StatusAccount {
            id: "42".to_string(),
            username: "alice".to_string(),
            acct: "alice".to_string(),
        },
        created_at,
        sensitive: false,
        attachments: media
            .iter()
            .enumerate()
            .map(|(i, url)| MediaAttachment {
                id: format!("{}-{}", id, i),
                media_type: "image".to_string(),
                url: Some(url.as_ref().to_string()),
                remote_url: Some(url.as_ref().to_string()),
            })
            .collect(),
    }
}

/// An image-only status by `alice` with remote media URLs.
pub fn status<S: AsRef<str>>(id: u32, media: &[S]) -> BookmarkStatus {
    status_at(id, base_time() + TimeDelta::minutes(id as i64), media)
}

/// Download tree, ledger, tracker and journal in a temporary directory.
///
/// Every `run` loads the ledger and tracker from disk afresh, like a new
/// process would.
pub struct TestArchive {
    pub dir: TempDir,
    pub fetcher: Arc<FakeFetcher>,
    pub clock: Arc<ManualClock>,
    pub download: DownloadSettings,
    pub run: RunSettings,
    pub removed_window: Option<Duration>,
    pub journal: bool,
}

impl TestArchive {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("data");
        let mut download = DownloadSettings::new(&root);
        download.retry = RetryPolicy::no_retry();
        download.archive_dir = Some(dir.path().join("archive"));

        let run = RunSettings {
            template: PathTemplate::parse("{origin_group}/{status_id}-{index}.{ext}").unwrap(),
            classifier: HostClassifier::new(Vec::new()),
            filter: StatusFilter::default(),
            limit: None,
            concurrency: 3,
            simulate: false,
            page_retry: RetryPolicy::no_retry(),
        };

        Self {
            dir,
            fetcher: FakeFetcher::new(),
            clock: ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()),
            download,
            run,
            removed_window: Some(Duration::from_secs(24 * 3600)),
            journal: true,
        }
    }

    pub fn root(&self) -> PathBuf {
        self.download.download_root.clone()
    }

    pub fn hashdb_path(&self) -> PathBuf {
        self.dir.path().join("hashdb.jsonl")
    }

    pub fn removed_path(&self) -> PathBuf {
        self.dir.path().join("removed.jsonl")
    }

    pub fn logs_path(&self) -> PathBuf {
        self.dir.path().join("logs")
    }

    pub fn ledger(&self) -> HashLedger {
        HashLedger::load(self.hashdb_path()).unwrap()
    }

    pub fn tracker(&self) -> RemovedMediaTracker {
        RemovedMediaTracker::load(self.removed_path(), self.removed_window).unwrap()
    }

    pub fn job(&self, source: &Arc<FakeSource>) -> InstanceJob {
        InstanceJob {
            source: source.clone() as Arc<dyn BookmarkSource>,
            me: SelfAccount::default(),
            unbookmark: false,
            throttle: None,
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        let downloads = DownloadManager::new(
            self.download.clone(),
            self.fetcher.clone(),
            Arc::new(RwLock::new(self.ledger())),
            Arc::new(RwLock::new(self.tracker())),
            self.clock.clone(),
        );
        let orchestrator = Orchestrator::new(downloads, self.run.clone());
        if self.journal && !self.run.simulate {
            let journal =
                ActivityJournal::new(self.logs_path(), JournalFrequency::Month, None).unwrap();
            orchestrator.with_journal(journal)
        } else {
            orchestrator
        }
    }

    pub async fn run(&self, jobs: &[InstanceJob]) -> ArchiverResult<RunStats> {
        self.orchestrator().run(jobs).await
    }

    pub async fn run_cancelled(
        &self,
        jobs: &[InstanceJob],
        cancel: CancellationToken,
    ) -> ArchiverResult<RunStats> {
        self.orchestrator()
            .with_cancellation(cancel)
            .run(jobs)
            .await
    }

    /// True when no partial download is left in the staging directory.
    pub fn tmp_is_empty(&self) -> bool {
        match std::fs::read_dir(self.root().join(".tmp")) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }

    /// Every regular file under the download root, sorted, relative to it.
    pub fn stored_files(&self) -> Vec<PathBuf> {
        let root = self.root();
        let pattern = format!("{}/**/*", root.display());
        let mut files: Vec<PathBuf> = glob::glob(&pattern)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .filter(|p| !p.starts_with(root.join(".tmp")))
            .map(|p| p.strip_prefix(&root).unwrap().to_path_buf())
            .collect();
        files.sort();
        files
    }
}
