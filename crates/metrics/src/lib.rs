//! Metric names for the vesper crates.
//!
//! Only the `metrics` facade is re-exported here; installing a recorder
//! (Prometheus, statsd, ...) is left to the embedding application. Until one
//! is installed every macro is a no-op.
//!
//! ```rust,ignore
//! use vesper_metrics::{counter, directives};
//!
//! counter!(directives::SUBMITTED_TOTAL).increment(1);
//! ```

mod definitions;

pub use definitions::*;

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
