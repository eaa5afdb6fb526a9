use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted not-found entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovedRecord {
    pub media_id: String,
    pub first_seen: DateTime<Utc>,
    /// Number of not-found responses after the first one.
    pub retry_count: u32,
    pub skip_until: DateTime<Utc>,
}

impl RemovedRecord {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.skip_until
    }
}

/// Stable identifier for a media source URL. The fragment never reaches the
/// server, so two URLs differing only there name the same media.
pub fn media_id(url: &str) -> String {
    let trimmed = url.trim();
    match trimmed.split_once('#') {
        Some((base, _)) => base.to_string(),
        None => trimmed.to_string(),
    }
}
