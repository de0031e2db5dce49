use thiserror::Error;

use crate::types::ConceptId;

/// A required scoring input that was absent when a relevance score was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissingFeature {
    /// No metric record in the sidecar for the concept.
    MetricRecord,
    /// No embedding available for the concept.
    Embedding,
    /// No profile registered for the domain label.
    DomainProfile,
}

impl std::fmt::Display for MissingFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MissingFeature::MetricRecord => "metric record",
            MissingFeature::Embedding => "embedding",
            MissingFeature::DomainProfile => "domain profile",
        };
        f.write_str(name)
    }
}

/// Top-level error type for the relevance engine.
///
/// The first five variants are the domain error kinds surfaced by the scoring
/// and search core; the rest cover configuration and the store collaborators.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClinrankError {
    #[error("Malformed hierarchy: ancestor cycle through concepts {}", join_ids(.cycle))]
    MalformedHierarchy { cycle: Vec<ConceptId> },

    #[error("Incomplete feature set for concept {concept_id} in domain '{domain}': missing {missing}")]
    IncompleteFeatureSet {
        concept_id: ConceptId,
        domain: String,
        missing: MissingFeature,
    },

    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Centrality did not converge after {iterations} iterations (residual {residual:e})")]
    UnconvergedCentrality { iterations: usize, residual: f64 },

    #[error("Domain '{0}' has no member embeddings to derive a centroid from")]
    EmptyDomain(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding model mismatch: expected '{expected}', got '{actual}'")]
    ModelMismatch { expected: String, actual: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Timed out during {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

fn join_ids(ids: &[ConceptId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<toml::de::Error> for ClinrankError {
    fn from(err: toml::de::Error) -> Self {
        ClinrankError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ClinrankError {
    fn from(err: toml::ser::Error) -> Self {
        ClinrankError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ClinrankError {
    fn from(err: serde_json::Error) -> Self {
        ClinrankError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for relevance engine operations.
pub type Result<T> = std::result::Result<T, ClinrankError>;
