//! Classification of HTTP status codes into download outcomes.

use super::models::{DownloadError, DownloadErrorType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    NotFound,
    Retryable,
    Rejected,
}

/// Configurable status table. Codes listed as not-found win over the
/// retryable list; anything unlisted outside 2xx is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseClassifier {
    pub not_found: Vec<u16>,
    pub retryable: Vec<u16>,
    pub retry_server_errors: bool,
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self {
            not_found: vec![404, 410],
            retryable: vec![408, 425, 429],
            retry_server_errors: true,
        }
    }
}

impl ResponseClassifier {
    pub fn classify(&self, status: u16) -> ResponseClass {
        if (200..300).contains(&status) {
            ResponseClass::Success
        } else if self.not_found.contains(&status) {
            ResponseClass::NotFound
        } else if self.retryable.contains(&status)
            || (self.retry_server_errors && (500..600).contains(&status))
        {
            ResponseClass::Retryable
        } else {
            ResponseClass::Rejected
        }
    }

    /// Error for a non-success status, `None` for success.
    pub fn error_for(&self, status: u16) -> Option<DownloadError> {
        let error_type = match self.classify(status) {
            ResponseClass::Success => return None,
            ResponseClass::NotFound => DownloadErrorType::NotFound,
            ResponseClass::Retryable => DownloadErrorType::ServerError,
            ResponseClass::Rejected => DownloadErrorType::Rejected,
        };
        Some(DownloadError::new(error_type, format!("HTTP {}", status)))
    }
}
