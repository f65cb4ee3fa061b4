//! # csvtally core
//!
//! Progress tracking for CSV imports that are split into batches and
//! processed by independent workers.
//!
//! - [`keys`]: cache key names for one import, colocated on one cluster slot
//! - [`backend`]: the storage port plus Redis and in-memory implementations
//! - [`tracker`]: lifecycle, batch progress, completion detection and
//!   snapshots
//! - [`notifier`]: delivery of the one-time completion signal
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use csvtally_core::{
//!     backend::RedisBackend,
//!     model::{BatchReport, ImportMetadata},
//!     notifier::ChannelNotifier,
//!     tracker::ImportTracker,
//! };
//!
//! async fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(RedisBackend::connect("redis://127.0.0.1/").await?);
//!     let (notifier, mut completions) = ChannelNotifier::new();
//!     let tracker = ImportTracker::new(backend, Arc::new(notifier));
//!
//!     tracker.initialize("import-1", 1000, 10).await?;
//!     tracker
//!         .store_metadata("import-1", &ImportMetadata::new("fin-1", "user-1", "imports/a.csv"))
//!         .await?;
//!
//!     for batch in 0..10 {
//!         tracker
//!             .update_batch_progress("import-1", &BatchReport::new(100, 0).for_batch(batch))
//!             .await?;
//!     }
//!
//!     let signal = completions.recv().await.expect("completion signal");
//!     println!("{} finished with {} rows", signal.import_id, signal.total_rows);
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

pub mod backend;
pub mod error;
pub mod keys;
pub mod model;
pub mod notifier;
pub mod tracker;

pub use error::{Result, TrackerError};
pub use tracker::{
    BatchOutcome, CompletionVerdict, ImportTracker, SkipReason,
    TrackerSettings, WriteOutcome,
};
