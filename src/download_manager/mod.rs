//! Download Manager module
//!
//! Fetches single media items under a shared rate limit and bounded retry,
//! hashes them while streaming, and resolves them against the hash ledger,
//! the removed-media tracker and the archive policy.

mod archive_policy;
mod fetcher;
mod manager;
mod models;
mod responses;
mod retry_policy;
mod throttle;

pub use archive_policy::{archive_replaced, free_path, ArchivePolicy};
pub use fetcher::{FetchResponse, MediaBody, MediaFetcher, ReqwestFetcher, StaticBody};
pub use manager::{
    digest_file, Acquisition, DownloadManager, DownloadSettings, FetchedMedia, RecordContext,
};
pub use models::*;
pub use responses::{ResponseClass, ResponseClassifier};
pub use retry_policy::{BackoffSchedule, RetryPolicy};
pub use throttle::{
    IntervalThrottle, NoOpThrottle, RateLimit, RequestThrottle, ThrottleStats,
    TokenBucketThrottle,
};
