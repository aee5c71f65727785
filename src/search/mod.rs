//! Query engine and shared search snapshots.
//!
//! This module hosts the `run_search` implementation used by the CLI
//! and the snapshot types the daemon serves queries from.

pub mod engine;
pub mod snapshot;

pub use engine::{candidates, run_search, search_snapshot, Candidates};
pub use snapshot::{SearchSnapshot, SnapshotHandle};
