//! Fatal error taxonomy.
//!
//! Only startup-phase problems (configuration, authentication) and persistence
//! failures of the ledger/tracker files surface as `ArchiverError`. Everything
//! that happens to a single media item is folded into a `DownloadOutcome` by the
//! download manager instead.

use std::path::PathBuf;
use thiserror::Error;

use crate::path_template::TemplateError;

#[derive(Debug, Error)]
pub enum ArchiverError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid template: {0}")]
    Template(#[from] TemplateError),

    #[error("authentication rejected by {instance}: {reason}")]
    Auth { instance: String, reason: String },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode record for {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ArchiverError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiverError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error must stop the whole process rather than one instance.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ArchiverError::Config(_) | ArchiverError::Template(_) | ArchiverError::Auth { .. }
        )
    }
}

pub type ArchiverResult<T> = Result<T, ArchiverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_is_fatal() {
        let err = ArchiverError::Auth {
            instance: "home".to_string(),
            reason: "401 Unauthorized".to_string(),
        };
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "authentication rejected by home: 401 Unauthorized"
        );
    }

    #[test]
    fn test_io_error_is_not_fatal() {
        let err = ArchiverError::io(
            "/tmp/hashdb.jsonl",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("hashdb.jsonl"));
    }
}
