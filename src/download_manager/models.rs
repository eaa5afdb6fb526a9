//! Data models for the download manager.
//!
//! Defines error kinds, per-item outcomes and skip reasons.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Type of error encountered while downloading one media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadErrorType {
    Connection,  // Network error - retry
    Timeout,     // Request timeout - retry
    ServerError, // Transient server response (5xx, 429, ...) - retry
    NotFound,    // Media gone upstream - NO retry, tracked
    Rejected,    // Any other non-success response - NO retry
    Storage,     // File system error - NO retry
    Conflict,    // Destination occupied under the error policy - NO retry
}

impl DownloadErrorType {
    /// Returns true if this error type should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DownloadErrorType::Connection
                | DownloadErrorType::Timeout
                | DownloadErrorType::ServerError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadErrorType::Connection => "connection",
            DownloadErrorType::Timeout => "timeout",
            DownloadErrorType::ServerError => "server_error",
            DownloadErrorType::NotFound => "not_found",
            DownloadErrorType::Rejected => "rejected",
            DownloadErrorType::Storage => "storage",
            DownloadErrorType::Conflict => "conflict",
        }
    }

    /// Coarse class used in the run summary: every transport problem is
    /// reported as `network`.
    pub fn summary_kind(&self) -> &'static str {
        if self.is_retryable() {
            "network"
        } else {
            self.as_str()
        }
    }
}

/// Error for a single download attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadError {
    pub error_type: DownloadErrorType,
    pub message: String,
}

impl DownloadError {
    pub fn new(error_type: DownloadErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.error_type.is_retryable()
    }

    pub fn storage(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::new(DownloadErrorType::Storage, format!("{:?}: {}", path, err))
    }
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type.as_str(), self.message)
    }
}

impl std::error::Error for DownloadError {}

/// Why an item was skipped without storing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Recently confirmed missing; no request was made.
    TrackedNotFound,
    /// The origin answered not-found on this attempt.
    NotFound,
    /// Destination held different content and the policy keeps it.
    Conflict { path: PathBuf },
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::TrackedNotFound => "media_not_found_cached",
            SkipReason::NotFound => "media_not_found",
            SkipReason::Conflict { .. } => "conflict",
        }
    }
}

/// Result of processing one media item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Stored {
        path: PathBuf,
        digest: String,
        size: u64,
        /// Set when an older file at `path` was replaced.
        replaced: bool,
    },
    Duplicate {
        existing: PathBuf,
        digest: String,
    },
    Skipped(SkipReason),
    Failed(DownloadError),
    /// Simulation only: nothing was fetched or written.
    Simulated {
        path: PathBuf,
        occupied: bool,
    },
}

impl DownloadOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            DownloadOutcome::Stored { .. } => "stored",
            DownloadOutcome::Duplicate { .. } => "duplicate",
            DownloadOutcome::Skipped(_) => "skipped",
            DownloadOutcome::Failed(_) => "failed",
            DownloadOutcome::Simulated { .. } => "simulated",
        }
    }

    /// Stored or already archived, i.e. nothing left to do for this media.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            DownloadOutcome::Stored { .. } | DownloadOutcome::Duplicate { .. }
        )
    }

    pub fn digest(&self) -> Option<&str> {
        match self {
            DownloadOutcome::Stored { digest, .. } | DownloadOutcome::Duplicate { digest, .. } => {
                Some(digest)
            }
            _ => None,
        }
    }

    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            DownloadOutcome::Stored { path, .. } | DownloadOutcome::Simulated { path, .. } => {
                Some(path)
            }
            DownloadOutcome::Duplicate { existing, .. } => Some(existing),
            DownloadOutcome::Skipped(SkipReason::Conflict { path }) => Some(path),
            _ => None,
        }
    }
}
