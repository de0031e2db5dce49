//! Clinrank Vector crate - embeddings, domain profiles, relevance scoring, and search.
//!
//! Provides an in-memory embedding index with cosine nearest-neighbor queries,
//! domain centroids, the relevance formula with versioned score caching, and
//! the hybrid search engine behind `search_concepts_by_domain`.

pub mod domain;
pub mod embedding;
pub mod index;
pub mod scoring;
pub mod search;

pub use domain::{compute_centroid, DomainRegistry};
pub use embedding::{DynEmbeddingSource, EmbeddingSource, MockEmbedding};
pub use index::{cosine_similarity, EmbeddingIndex, Neighbor};
pub use scoring::{DomainScoring, RelevanceCalculator, RelevanceFormula};
pub use search::{HybridSearchEngine, SearchOptions};
