//! Bookmark Archiver Library
//!
//! Archives media attached to bookmarked Mastodon statuses into a
//! content-addressed download tree. The modules are exposed for the binaries,
//! for testing and for reuse.

pub mod bookmarks;
pub mod clock;
pub mod config;
pub mod download_manager;
pub mod error;
pub mod hash_ledger;
pub mod jsonl;
pub mod maintenance;
pub mod orchestrator;
pub mod path_template;
pub mod removed_tracker;

// Re-export commonly used types for convenience
pub use clock::{Clock, SystemClock};
pub use config::{AppConfig, CliConfig, FileConfig};
pub use download_manager::{DownloadManager, DownloadOutcome};
pub use error::{ArchiverError, ArchiverResult};
pub use hash_ledger::{HashLedger, HashRecord};
pub use orchestrator::{InstanceJob, Orchestrator, RunStats};
pub use removed_tracker::RemovedMediaTracker;
