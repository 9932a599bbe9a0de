//! Indexing workflows and the pure pieces they are built from

pub mod daily; // Daily ticker snapshot + commit
pub mod depth; // Depth backfill for pairs missing from the reference exchange
pub mod manifest;
pub mod merge;
pub mod pair_selector;
mod progress;

pub use daily::{DailyIndexer, DailyRunSummary};
pub use depth::{DepthIndexer, DepthRunSummary};
pub use manifest::{DailyManifest, DailyRunManifest, DepthManifest, RunManifest};
pub use merge::{annotate, merge};
pub use pair_selector::{exclusion_table, select_pairs};
