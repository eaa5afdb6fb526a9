//! HTTP seam used by the download manager.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;

use super::models::{DownloadError, DownloadErrorType};

/// Streaming response body.
#[async_trait]
pub trait MediaBody: Send {
    /// Next chunk, or `None` at end of body.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, DownloadError>;

    /// Total body length when the server announced one.
    fn size_hint(&self) -> Option<u64> {
        None
    }
}

/// Status line plus body of one media request. The body is only read for
/// success responses.
pub struct FetchResponse {
    pub status: u16,
    pub body: Box<dyn MediaBody>,
}

/// Issues a single GET for a media URL.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Transport failures come back as `Connection`/`Timeout` errors; any HTTP
    /// status, including errors, is returned as a response.
    async fn fetch(&self, url: &str) -> Result<FetchResponse, DownloadError>;
}

/// `MediaFetcher` backed by reqwest.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| DownloadError::new(DownloadErrorType::Connection, e.to_string()))?;
        Ok(Self { client })
    }
}

fn transport_error(err: reqwest::Error) -> DownloadError {
    let error_type = if err.is_timeout() {
        DownloadErrorType::Timeout
    } else {
        DownloadErrorType::Connection
    };
    DownloadError::new(error_type, err.to_string())
}

struct ReqwestBody(reqwest::Response);

#[async_trait]
impl MediaBody for ReqwestBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, DownloadError> {
        self.0.chunk().await.map_err(transport_error)
    }

    fn size_hint(&self) -> Option<u64> {
        self.0.content_length()
    }
}

#[async_trait]
impl MediaFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, DownloadError> {
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        Ok(FetchResponse {
            status: response.status().as_u16(),
            body: Box::new(ReqwestBody(response)),
        })
    }
}

/// In-memory body, handy for fakes.
pub struct StaticBody {
    chunks: std::collections::VecDeque<Bytes>,
}

impl StaticBody {
    pub fn new(content: impl Into<Bytes>, chunk_size: usize) -> Self {
        let content: Bytes = content.into();
        let chunk_size = chunk_size.max(1);
        let mut chunks = std::collections::VecDeque::new();
        let mut offset = 0;
        while offset < content.len() {
            let end = (offset + chunk_size).min(content.len());
            chunks.push_back(content.slice(offset..end));
            offset = end;
        }
        Self { chunks }
    }

    pub fn empty() -> Self {
        Self {
            chunks: std::collections::VecDeque::new(),
        }
    }
}

#[async_trait]
impl MediaBody for StaticBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, DownloadError> {
        Ok(self.chunks.pop_front())
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.chunks.iter().map(|c| c.len() as u64).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_body_chunks() {
        let mut body = StaticBody::new(&b"abcdefg"[..], 3);
        let mut collected = Vec::new();
        let mut count = 0;
        while let Some(chunk) = body.next_chunk().await.unwrap() {
            collected.extend_from_slice(&chunk);
            count += 1;
        }
        assert_eq!(collected, b"abcdefg");
        assert_eq!(count, 3);
        assert!(StaticBody::empty().next_chunk().await.unwrap().is_none());
        assert_eq!(StaticBody::new(&b"abcdefg"[..], 3).size_hint(), Some(7));
    }
}
