//! HTTP client for the Mastodon bookmarks API.

use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::{HeaderMap, LINK};
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use super::models::{BookmarkPage, BookmarkStatus, PageCursor};
use super::source::{BookmarkSource, SourceError};

/// Statuses requested per page; the API maximum.
pub const PAGE_SIZE: u32 = 40;

/// Bookmark source bound to one account on one server.
#[derive(Clone)]
pub struct MastodonClient {
    client: Client,
    label: String,
    base_url: String,
    access_token: String,
}

impl MastodonClient {
    pub fn new(
        label: impl Into<String>,
        base_url: &str,
        access_token: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self {
            client,
            label: label.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SourceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        let message = message.chars().take(200).collect::<String>();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SourceError::Auth {
                status: status.as_u16(),
                message,
            }),
            _ => Err(SourceError::Http {
                status: status.as_u16(),
                message,
            }),
        }
    }
}

fn transport_error(err: reqwest::Error) -> SourceError {
    if err.is_decode() {
        SourceError::Decode(err.to_string())
    } else {
        SourceError::Network(err.to_string())
    }
}

lazy_static! {
    static ref NEXT_LINK: Regex =
        Regex::new(r#"<([^>]+)>\s*;\s*rel="?next"?"#).expect("valid link header regex");
}

/// Cursor for the page after the current one, taken from the `Link` header.
pub fn next_cursor(headers: &HeaderMap) -> Option<PageCursor> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|part| {
            let href = NEXT_LINK.captures(part)?.get(1)?.as_str();
            let url = Url::parse(href).ok()?;
            url.query_pairs()
                .find(|(key, _)| key == "max_id")
                .map(|(_, value)| PageCursor::after(value.into_owned()))
        })
}

#[async_trait]
impl BookmarkSource for MastodonClient {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn fetch_page(&self, cursor: &PageCursor) -> Result<BookmarkPage, SourceError> {
        let url = format!("{}/api/v1/bookmarks", self.base_url);
        let mut query = vec![("limit", PAGE_SIZE.to_string())];
        if let Some(max_id) = &cursor.max_id {
            query.push(("max_id", max_id.clone()));
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&query)
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::check(response).await?;

        let next = next_cursor(response.headers());
        let statuses: Vec<BookmarkStatus> = response.json().await.map_err(transport_error)?;
        debug!(
            "[{}] fetched {} bookmarks (cursor {:?})",
            self.label,
            statuses.len(),
            cursor.max_id
        );

        // an empty page ends the listing even if the server still links onward
        let next = if statuses.is_empty() { None } else { next };
        Ok(BookmarkPage { statuses, next })
    }

    async fn unbookmark(&self, status_id: &str) -> Result<(), SourceError> {
        let url = format!("{}/api/v1/statuses/{}/unbookmark", self.base_url, status_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(transport_error)?;
        Self::check(response).await?;
        Ok(())
    }
}
