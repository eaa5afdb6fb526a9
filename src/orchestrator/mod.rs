//! Orchestrator
//!
//! Walks each configured bookmark source page by page, renders destination
//! paths, runs media through the download manager and keeps run statistics
//! and the activity journal. Terminal progress bars are optional.

mod journal;
mod progress;
mod runner;
mod stats;

pub use journal::{ActivityJournal, EntrySource, JournalEntry, JournalEvent, JournalFrequency};
pub use progress::{ProgressLevel, RunProgress};
pub use runner::{InstanceJob, Orchestrator, RunSettings};
pub use stats::RunStats;
