//! Bookmark walker boundary: listing models, the `BookmarkSource` seam and its
//! Mastodon implementation, plus the status-level filter.

mod filter;
mod mastodon;
mod models;
mod source;

pub use filter::{FilterReason, SelfAccount, StatusFilter};
pub use mastodon::{next_cursor, MastodonClient, PAGE_SIZE};
pub use models::{
    infer_extension, BookmarkPage, BookmarkStatus, MediaAttachment, MediaItem, PageCursor,
    StatusAccount,
};
#[cfg(feature = "mock")]
pub use source::MockBookmarkSource;
pub use source::{BookmarkSource, SourceError};
