use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version of the metric computation method.
///
/// Bump whenever centrality, depth, or authority derivation changes so that
/// consumers can detect records produced by an older method.
pub const METRIC_SCHEMA_VERSION: u32 = 1;

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier of a concept in the vocabulary graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptId(pub i64);

impl std::fmt::Display for ConceptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ConceptId {
    fn from(id: i64) -> Self {
        ConceptId(id)
    }
}

// =============================================================================
// Raw graph
// =============================================================================

/// A clinical concept as ingested from the vocabulary. Read-only to the core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptNode {
    pub id: ConceptId,
    /// Vocabulary source, e.g. "SNOMED" or "ICD10CM".
    pub vocabulary: String,
    /// Semantic type / concept class, e.g. "Clinical Finding".
    pub semantic_type: String,
    /// Domain assigned by the vocabulary, e.g. "Condition".
    #[serde(default)]
    pub domain_id: String,
    pub label: String,
}

/// A directed relationship between two concepts.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub source: ConceptId,
    pub target: ConceptId,
    /// Relation kind, e.g. "is_a" or "maps_to".
    pub kind: String,
}

/// A descendant → ancestor link in the taxonomy.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AncestorEdge {
    pub descendant: ConceptId,
    pub ancestor: ConceptId,
    /// Levels of separation, when the source provides it.
    #[serde(default)]
    pub distance_hint: Option<u32>,
}

impl AncestorEdge {
    /// Reflexive rows (a concept listed as its own ancestor) carry no hierarchy.
    pub fn is_reflexive(&self) -> bool {
        self.descendant == self.ancestor
    }

    /// Edge length used for depth: the hint, with missing or zero counted as one level.
    pub fn length(&self) -> u32 {
        self.distance_hint.filter(|d| *d > 0).unwrap_or(1)
    }
}

// =============================================================================
// Metric sidecar
// =============================================================================

/// Structural and authority metrics for one concept.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub concept_id: ConceptId,
    /// Eigenvector centrality, min-max normalized to [0, 1].
    pub centrality: f64,
    /// Distance to the nearest hierarchy root (0 = root).
    pub depth: u32,
    /// Vocabulary authority weight in [0, 1].
    pub authority: f64,
    pub schema_version: u32,
    /// Version of the authority rule table the weight was taken from.
    pub authority_version: u32,
    /// False when the power iteration hit its cap before converging.
    pub centrality_converged: bool,
}

/// A value paired with the store revision it was read at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub revision: u64,
    pub value: T,
}

// =============================================================================
// Embeddings and domains
// =============================================================================

/// A concept embedding produced by an external model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub concept_id: ConceptId,
    pub vector: Vec<f32>,
    /// Identifier of the model that produced the vector.
    pub model: String,
    pub generated_at: DateTime<Utc>,
}

/// A named domain cluster with its representative centroid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainProfile {
    pub label: String,
    pub centroid: Vec<f32>,
    pub members: Vec<ConceptId>,
    /// Incremented whenever the centroid changes.
    pub revision: u64,
}

// =============================================================================
// Relevance scores
// =============================================================================

/// The four inputs to the relevance formula, each in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub centrality: f64,
    pub density: f64,
    pub authority: f64,
    pub similarity: f64,
}

/// Versions of every input a relevance score was computed from.
///
/// Two scores with equal sources were computed from identical inputs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSources {
    pub metric_revision: u64,
    pub metric_schema_version: u32,
    pub authority_version: u32,
    pub embedding_model: String,
    pub embedding_generated_at: DateTime<Utc>,
    pub domain_revision: u64,
    /// `ScoringConfig::fingerprint` of the formula that produced the score.
    pub formula: String,
}

/// Relevance of one concept to one domain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub concept_id: ConceptId,
    pub domain: String,
    /// Final bounded score in [0, 1].
    pub score: f64,
    /// Raw cosine similarity between the concept embedding and the domain centroid.
    pub cosine: f64,
    pub features: FeatureVector,
    pub sources: ScoreSources,
    /// Incremented each time the record is recomputed from changed sources.
    pub version: u64,
    pub computed_at: DateTime<Utc>,
}

/// A single hit from `search_concepts_by_domain`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConceptHit {
    pub concept_id: ConceptId,
    pub score: f64,
    pub similarity: f64,
}
