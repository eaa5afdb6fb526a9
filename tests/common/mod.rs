//! Common test infrastructure
//!
//! Fake bookmark sources and media fetchers that count their calls, a manual
//! clock and an on-disk archive harness. Tests should only import from this
//! module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{status, FakeSource, TestArchive};
//!
//! #[tokio::test]
//! async fn test_store_one() {
//!     let archive = TestArchive::new();
//!     archive.fetcher.serve("https://cdn.example/a.png", b"a");
//!     let source = FakeSource::single_page("home", vec![status(1, &["https://cdn.example/a.png"])]);
//!     let stats = archive.run(&[archive.job(&source)]).await.unwrap();
//!     assert_eq!(stats.stored, 1);
//! }
//! ```

#![allow(dead_code)]

mod fakes;
mod fixtures;

pub use fakes::{FakeFetcher, FakeSource, ManualClock};
pub use fixtures::{base_time, status, status_at, TestArchive};
