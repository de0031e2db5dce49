//! Clinrank Graph crate - structural and authority metrics per concept.
//!
//! Eigenvector centrality over the relationship graph, hierarchy depth over
//! the ancestor graph, and vocabulary authority, combined into versioned
//! metric records and persisted by [`MetricsPipeline`].

pub mod authority;
pub mod centrality;
pub mod hierarchy;
pub mod metrics;
pub mod pipeline;

pub use authority::{AuthorityRules, AuthorityScorer};
pub use centrality::{eigenvector_centrality, CentralityScores, Convergence};
pub use hierarchy::{compute_depths, HierarchyDepths};
pub use metrics::{MetricFailure, MetricsEngine, MetricsReport};
pub use pipeline::{FailureSummary, MetricsPipeline, RunStatus, RunSummary};
