//! Persisted ledger entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One archived file, keyed by the digest of its content.
///
/// Field names match the on-disk JSONL format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashRecord {
    /// Lowercase hex sha256 of the file content
    pub sha256: String,
    /// Where the content was stored
    pub filepath: PathBuf,
    /// Status that first brought this content in
    pub statusid: String,
    #[serde(default)]
    pub status_url: Option<String>,
    /// Source URL of the media
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub origin_host: String,
    #[serde(default)]
    pub origin_group: String,
    #[serde(default)]
    pub account_host: String,
    #[serde(default)]
    pub account_group: String,
    /// Content length in bytes
    #[serde(default)]
    pub size: u64,
    /// Label of the configured instance the bookmark came from
    #[serde(default)]
    pub instance_label: Option<String>,
    /// Creation time of the owning status
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// When the file was written
    #[serde(default, alias = "time")]
    pub stored_at: DateTime<Utc>,
}
