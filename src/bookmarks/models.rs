//! Bookmark listing data as consumed by the archiver.

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::path_template::{account_host, host_of};
use crate::removed_tracker::media_id;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub username: String,
    /// `user` for local accounts, `user@host` for remote ones.
    #[serde(default)]
    pub acct: String,
}

/// A media attachment as listed by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaAttachment {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub media_type: String,
    #[serde(default)]
    pub url: Option<String>,
    /// Original location on the origin server; absent for local media.
    #[serde(default)]
    pub remote_url: Option<String>,
}

impl MediaAttachment {
    pub fn source_url(&self) -> Option<&str> {
        self.remote_url
            .as_deref()
            .or(self.url.as_deref())
            .filter(|u| !u.trim().is_empty())
    }
}

/// One bookmarked post. Immutable once handed out by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkStatus {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub account: StatusAccount,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(rename = "media_attachments", default)]
    pub attachments: Vec<MediaAttachment>,
}

impl BookmarkStatus {
    pub fn screenname(&self) -> &str {
        if self.account.username.is_empty() {
            &self.account.acct
        } else {
            &self.account.username
        }
    }

    pub fn account_host(&self) -> String {
        account_host(self.url.as_deref())
    }

    /// Downloadable media in attachment order. The index is the attachment's
    /// position, so it stays stable even when an entry without URL is dropped.
    pub fn media_items(&self) -> Vec<MediaItem> {
        self.attachments
            .iter()
            .enumerate()
            .filter_map(|(index, attachment)| {
                let url = attachment.source_url()?;
                Some(MediaItem {
                    url: url.to_string(),
                    media_id: media_id(url),
                    index,
                    extension: infer_extension(url, &attachment.media_type),
                    origin_host: host_of(url),
                })
            })
            .collect()
    }
}

/// A single file to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub url: String,
    pub media_id: String,
    /// 0-based position within the status.
    pub index: usize,
    pub extension: String,
    pub origin_host: String,
}

/// Position in the bookmark listing. Only meaningful within one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageCursor {
    pub max_id: Option<String>,
}

impl PageCursor {
    pub fn start() -> Self {
        Self::default()
    }

    pub fn after(max_id: impl Into<String>) -> Self {
        Self {
            max_id: Some(max_id.into()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BookmarkPage {
    pub statuses: Vec<BookmarkStatus>,
    /// `None` once the listing is exhausted.
    pub next: Option<PageCursor>,
}

/// File extension for a media URL: the URL suffix, else the MIME subtype,
/// else the type itself unless it is the generic `image`, else `png`.
pub fn infer_extension(url: &str, media_type: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or("").to_string());
    let file_name = path.rsplit('/').next().unwrap_or("");
    if let Some((stem, suffix)) = file_name.rsplit_once('.') {
        if !stem.is_empty() && !suffix.is_empty() {
            return suffix.to_lowercase();
        }
    }

    let media_type = media_type.trim().to_lowercase();
    if let Some((_, subtype)) = media_type.rsplit_once('/') {
        if !subtype.is_empty() {
            return subtype.to_string();
        }
    }
    if !media_type.is_empty() && media_type != "image" {
        return media_type;
    }
    "png".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_extension() {
        assert_eq!(infer_extension("https://x.test/a/b/photo.JPG", "image"), "jpg");
        assert_eq!(infer_extension("https://x.test/a/photo.webp?v=2", ""), "webp");
        assert_eq!(infer_extension("https://x.test/a/blob", "image/avif"), "avif");
        assert_eq!(infer_extension("https://x.test/a/blob", "gifv"), "gifv");
        assert_eq!(infer_extension("https://x.test/a/blob", "image"), "png");
        assert_eq!(infer_extension("https://x.test/a/.hidden", ""), "png");
    }

    #[test]
    fn test_decode_mastodon_status() {
        let json = r#"{
            "id": "113",
            "url": "https://mastodon.social/@alice/113",
            "created_at": "2025-12-04T00:19:59.000Z",
            "sensitive": false,
            "account": {"id": "7", "username": "alice", "acct": "alice"},
            "media_attachments": [
                {"id": "1", "type": "image", "url": "https://files.mastodon.social/a.png", "remote_url": null},
                {"id": "2", "type": "image", "url": null, "remote_url": null},
                {"id": "3", "type": "image", "url": "https://cache.example/b", "remote_url": "https://origin.example/b.jpeg"}
            ]
        }"#;
        let status: BookmarkStatus = serde_json::from_str(json).unwrap();

        assert_eq!(status.screenname(), "alice");
        assert_eq!(status.account_host(), "mastodon.social");

        let items = status.media_items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].index, 0);
        assert_eq!(items[0].origin_host, "files.mastodon.social");
        assert_eq!(items[1].index, 2);
        assert_eq!(items[1].url, "https://origin.example/b.jpeg");
        assert_eq!(items[1].extension, "jpeg");
    }

    #[test]
    fn test_screenname_falls_back_to_acct() {
        let status = BookmarkStatus {
            id: "1".to_string(),
            url: None,
            account: StatusAccount {
                id: "9".to_string(),
                username: String::new(),
                acct: "bob@remote.example".to_string(),
            },
            created_at: Utc::now(),
            sensitive: false,
            attachments: Vec::new(),
        };
        assert_eq!(status.screenname(), "bob@remote.example");
        assert_eq!(status.account_host(), "unknown");
    }
}
