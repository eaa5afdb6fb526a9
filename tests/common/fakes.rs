use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use bookmark_archiver::bookmarks::{
    BookmarkPage, BookmarkSource, BookmarkStatus, PageCursor, SourceError,
};
use bookmark_archiver::download_manager::{
    DownloadError, FetchResponse, MediaFetcher, StaticBody,
};
use bookmark_archiver::Clock;

/// Bookmark listing served from memory, one `Vec` per page.
pub struct FakeSource {
    label: String,
    pages: Mutex<Vec<Vec<BookmarkStatus>>>,
    reject_auth: bool,
    page_requests: AtomicUsize,
    unbookmarked: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new(label: &str, pages: Vec<Vec<BookmarkStatus>>) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            pages: Mutex::new(pages),
            reject_auth: false,
            page_requests: AtomicUsize::new(0),
            unbookmarked: Mutex::new(Vec::new()),
        })
    }

    pub fn single_page(label: &str, statuses: Vec<BookmarkStatus>) -> Arc<Self> {
        Self::new(label, vec![statuses])
    }

    /// A source whose token is refused.
    pub fn unauthorized(label: &str) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            pages: Mutex::new(Vec::new()),
            reject_auth: true,
            page_requests: AtomicUsize::new(0),
            unbookmarked: Mutex::new(Vec::new()),
        })
    }

    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::SeqCst)
    }

    pub fn unbookmarked(&self) -> Vec<String> {
        self.unbookmarked.lock().unwrap().clone()
    }
}

#[async_trait]
impl BookmarkSource for FakeSource {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn fetch_page(&self, cursor: &PageCursor) -> Result<BookmarkPage, SourceError> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);
        if self.reject_auth {
            return Err(SourceError::Auth {
                status: 401,
                message: "The access token is invalid".to_string(),
            });
        }

        let index: usize = cursor
            .max_id
            .as_deref()
            .map(|id| id.parse().unwrap())
            .unwrap_or(0);
        let unbookmarked: HashSet<String> = self.unbookmarked().into_iter().collect();
        let pages = self.pages.lock().unwrap();
        let statuses = pages
            .get(index)
            .map(|page| {
                page.iter()
                    .filter(|s| !unbookmarked.contains(&s.id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let next = (index + 1 < pages.len()).then(|| PageCursor::after((index + 1).to_string()));
        Ok(BookmarkPage { statuses, next })
    }

    async fn unbookmark(&self, status_id: &str) -> Result<(), SourceError> {
        self.unbookmarked.lock().unwrap().push(status_id.to_string());
        Ok(())
    }
}

#[derive(Clone)]
enum Reply {
    Body(Vec<u8>),
    Status(u16),
}

/// Serves scripted bodies or statuses per URL and counts requests. Unknown
/// URLs answer 404.
#[derive(Default)]
pub struct FakeFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Mutex<Duration>,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, body: &[u8]) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), Reply::Body(body.to_vec()));
    }

    pub fn respond(&self, url: &str, status: u16) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), Reply::Status(status));
    }

    /// Every response is held back by `delay` after the request is counted.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, DownloadError> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let reply = self.replies.lock().unwrap().get(url).cloned();
        match reply {
            Some(Reply::Body(body)) => Ok(FetchResponse {
                status: 200,
                body: Box::new(StaticBody::new(body, 4)),
            }),
            Some(Reply::Status(status)) => Ok(FetchResponse {
                status,
                body: Box::new(StaticBody::empty()),
            }),
            None => Ok(FetchResponse {
                status: 404,
                body: Box::new(StaticBody::empty()),
            }),
        }
    }
}

/// Wall clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(start),
        })
    }

    pub fn advance(&self, by: TimeDelta) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
