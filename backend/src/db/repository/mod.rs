//! Repository trait definitions for the tracking store.
//!
//! The store is split into focused traits so each backend can be read one
//! concern at a time.
//!
//! # Module Organization
//!
//! - [`error`]: Error types for repository operations
//! - [`metrics`]: Daily counters and deduplication fingerprints
//! - [`ratings`]: Star ratings and their aggregates
//! - [`reports`]: Hit counters behind the Top-N reports
//!
//! # Atomicity
//!
//! Every write in these traits is a single read-modify-write that the
//! implementation must apply atomically per key. Callers never lock.

pub mod error;
pub mod metrics;
pub mod ratings;
pub mod reports;

// Re-export error types
pub use error::{ErrorContext, RepositoryError, RepositoryResult};

// Re-export all traits
pub use metrics::{MetricMutator, MetricsRepository};
pub use ratings::RatingRepository;
pub use reports::ReportRepository;

/// Composite trait bound for a complete repository implementation.
///
/// This trait is automatically implemented for any type that implements
/// all three repository traits.
pub trait FullRepository: MetricsRepository + RatingRepository + ReportRepository {}

// Blanket implementation: any type implementing all three traits automatically implements FullRepository
impl<T> FullRepository for T where T: MetricsRepository + RatingRepository + ReportRepository {}
