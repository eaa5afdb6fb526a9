//! Hash Ledger
//!
//! Content-addressed record of everything already archived. The ledger is the
//! only thing that prevents duplicate content on disk: a sha256 digest maps to
//! at most one stored file, regardless of which status or path it came from.

mod models;
mod store;

pub use models::HashRecord;
pub use store::{normalize_path, HashLedger};
