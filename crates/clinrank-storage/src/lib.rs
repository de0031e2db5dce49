//! Clinrank Storage crate - graph snapshots, metric sidecar, relevance scores.
//!
//! The raw vocabulary graph is read-only and arrives through [`GraphStore`].
//! Derived metrics and relevance scores are written to a sidecar, either
//! in memory or in a WAL-mode SQLite database with migrations.

pub mod db;
pub mod memory;
pub mod migrations;
pub mod repository;
pub mod snapshot;
pub mod store;

pub use db::Database;
pub use memory::{InMemoryMetricSidecar, InMemoryRelevanceStore};
pub use repository::SqliteStore;
pub use snapshot::{DomainSpec, GraphSnapshot};
pub use store::{GraphStore, MetricSidecar, RelevanceStore};
