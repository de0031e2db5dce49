//! Embedding source contract and a deterministic mock.
//!
//! Embeddings are produced by an external model; the engine only reads them.
//! `MockEmbedding` hashes concept labels into unit vectors for tests, benches,
//! and snapshots that ship without precomputed vectors.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;

use chrono::{DateTime, Utc};

use clinrank_core::error::Result;
use clinrank_core::types::{ConceptId, ConceptNode, EmbeddingRecord};

/// Read access to concept embeddings.
pub trait EmbeddingSource: Send + Sync {
    /// The embedding for a concept, if one has been generated.
    fn get_embedding(
        &self,
        concept_id: ConceptId,
    ) -> impl Future<Output = Result<Option<EmbeddingRecord>>> + Send;
}

/// Object-safe version of [`EmbeddingSource`] for dynamic dispatch.
///
/// `EmbeddingSource::get_embedding` returns `impl Future`, which is not
/// object-safe; this trait boxes the future instead. Every `EmbeddingSource`
/// gets it through the blanket impl below.
pub trait DynEmbeddingSource: Send + Sync {
    fn get_embedding_boxed(
        &self,
        concept_id: ConceptId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<EmbeddingRecord>>> + Send + '_>>;
}

impl<T: EmbeddingSource> DynEmbeddingSource for T {
    fn get_embedding_boxed(
        &self,
        concept_id: ConceptId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<EmbeddingRecord>>> + Send + '_>> {
        Box::pin(self.get_embedding(concept_id))
    }
}

// ---------------------------------------------------------------------------
// MockEmbedding - deterministic hash-based vectors
// ---------------------------------------------------------------------------

/// Produces unit vectors derived from a hash of the input text.
///
/// Identical text always maps to the identical vector, so results are
/// reproducible without a model.
#[derive(Debug, Clone)]
pub struct MockEmbedding {
    dimensions: usize,
    model: String,
}

impl MockEmbedding {
    pub const MODEL: &'static str = "mock-hash";

    /// Generation time stamped on every mock record.
    ///
    /// Mock vectors depend only on the label, so their timestamp is fixed too;
    /// rebuilding them on an unchanged graph leaves score sources untouched.
    pub const GENERATED_AT: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            model: Self::MODEL.to_string(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut result = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }

        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut result {
                *val /= norm;
            }
        }
        result
    }

    /// One record per concept, embedding its label.
    pub fn records_for(&self, concepts: &[ConceptNode]) -> Vec<EmbeddingRecord> {
        concepts
            .iter()
            .map(|concept| EmbeddingRecord {
                concept_id: concept.id,
                vector: self.embed_text(&concept.label),
                model: self.model.clone(),
                generated_at: Self::GENERATED_AT,
            })
            .collect()
    }
}
