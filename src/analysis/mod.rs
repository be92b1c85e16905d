//! Analysis modules.
//!
//! Aggregation of raw responses into analytics snapshots.

pub mod aggregator;

pub use aggregator::compute;
