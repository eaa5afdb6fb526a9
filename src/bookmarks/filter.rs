//! Whole-status filtering applied before any media is dispatched.

use std::fmt;

use reqwest::Url;

use super::models::{BookmarkStatus, MediaAttachment};

const IMAGE_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".webp", ".heic", ".avif",
];

/// Which kinds of status are archived. Everything defaults to excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusFilter {
    pub include_self: bool,
    pub include_gifv: bool,
    pub include_audio: bool,
    pub include_video: bool,
    pub include_thumbnail_only: bool,
    pub include_nsfw: bool,
    pub try_unknown_media: bool,
}

/// Why a status was skipped without downloading anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterReason {
    SelfPost,
    NoMedia,
    GifvMedia,
    AudioMedia,
    NonImageMedia,
    NoRemoteUrl,
    NsfwFiltered,
}

impl FilterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterReason::SelfPost => "self_post",
            FilterReason::NoMedia => "no_media",
            FilterReason::GifvMedia => "gifv_media",
            FilterReason::AudioMedia => "audio_media",
            FilterReason::NonImageMedia => "non_image_media",
            FilterReason::NoRemoteUrl => "no_remote_url",
            FilterReason::NsfwFiltered => "nsfw_filtered",
        }
    }
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The archiving account, for recognising its own posts.
#[derive(Debug, Clone, Default)]
pub struct SelfAccount {
    pub account_id: Option<String>,
    /// `user` or `@user@host`.
    pub handle: Option<String>,
}

impl SelfAccount {
    fn authored(&self, status: &BookmarkStatus) -> bool {
        if let Some(id) = &self.account_id {
            if !status.account.id.is_empty() && status.account.id == *id {
                return true;
            }
        }
        if let Some(handle) = &self.handle {
            let target = handle.trim_start_matches('@').to_lowercase();
            let acct = status.account.acct.trim_start_matches('@').to_lowercase();
            let username = status.account.username.trim_start_matches('@').to_lowercase();
            if !target.is_empty() && (target == acct || target == username) {
                return true;
            }
        }
        false
    }
}

impl StatusFilter {
    /// `Some(reason)` when the status must be skipped as a whole.
    pub fn check(&self, status: &BookmarkStatus, me: &SelfAccount) -> Option<FilterReason> {
        if !self.include_self && me.authored(status) {
            return Some(FilterReason::SelfPost);
        }
        if status.attachments.is_empty() {
            return Some(FilterReason::NoMedia);
        }

        let kinds: Vec<String> = status
            .attachments
            .iter()
            .map(|attachment| self.effective_kind(attachment))
            .collect();

        if !self.include_gifv && kinds.iter().any(|k| k == "gifv") {
            return Some(FilterReason::GifvMedia);
        }
        let non_image: Vec<&String> = kinds
            .iter()
            .filter(|k| !k.is_empty() && k.as_str() != "image")
            .collect();
        if !self.include_audio && non_image.iter().any(|k| k.as_str() == "audio") {
            return Some(FilterReason::AudioMedia);
        }
        if !self.include_video && non_image.iter().any(|k| k.as_str() != "audio") {
            return Some(FilterReason::NonImageMedia);
        }
        if !self.include_thumbnail_only
            && !status.attachments.iter().all(|a| {
                a.remote_url
                    .as_deref()
                    .is_some_and(|url| !url.trim().is_empty())
            })
        {
            return Some(FilterReason::NoRemoteUrl);
        }
        if !self.include_nsfw && status.sensitive {
            return Some(FilterReason::NsfwFiltered);
        }
        None
    }

    fn effective_kind(&self, attachment: &MediaAttachment) -> String {
        let kind = attachment.media_type.trim().to_lowercase();
        let unknown = matches!(kind.as_str(), "" | "unknown" | "other");
        if self.try_unknown_media && unknown && looks_like_image(attachment) {
            return "image".to_string();
        }
        kind
    }
}

fn looks_like_image(attachment: &MediaAttachment) -> bool {
    let Some(url) = attachment.source_url() else {
        return false;
    };
    let path = Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.to_lowercase());
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}
