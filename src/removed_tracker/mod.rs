//! Removed-media tracker.
//!
//! Remembers media that the origin reported as gone so the next runs do not
//! hammer the same dead URLs until the skip window has elapsed.

mod models;
mod tracker;

pub use models::{media_id, RemovedRecord};
pub use tracker::RemovedMediaTracker;
