use async_trait::async_trait;
use thiserror::Error;

use super::models::{BookmarkPage, PageCursor};

#[derive(Debug, Error)]
pub enum SourceError {
    /// Token missing, expired or rejected. Fatal for the run.
    #[error("authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("server returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl SourceError {
    /// Connection problems, timeouts, throttling and 5xx may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Network(_) => true,
            SourceError::Http { status, .. } => *status == 429 || *status >= 500,
            SourceError::Auth { .. } | SourceError::Decode(_) => false,
        }
    }
}

/// Paginated listing of bookmarked statuses for one account.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait BookmarkSource: Send + Sync {
    /// Name used in logs and journal entries.
    fn label(&self) -> String;

    async fn fetch_page(&self, cursor: &PageCursor) -> Result<BookmarkPage, SourceError>;

    async fn unbookmark(&self, status_id: &str) -> Result<(), SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(SourceError::Network("reset".into()).is_retryable());
        assert!(SourceError::Http {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(SourceError::Http {
            status: 429,
            message: String::new()
        }
        .is_retryable());
        assert!(!SourceError::Http {
            status: 404,
            message: String::new()
        }
        .is_retryable());
        assert!(!SourceError::Auth {
            status: 401,
            message: String::new()
        }
        .is_retryable());
        assert!(!SourceError::Decode("eof".into()).is_retryable());
    }
}
