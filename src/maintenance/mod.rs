//! Maintenance operations on the archive.

mod prune;

pub use prune::{prune, resolve_targets, PruneReport};
