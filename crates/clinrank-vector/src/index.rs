//! In-memory embedding index with brute-force cosine similarity search.
//!
//! Every query scans all vectors, which is acceptable for vocabularies of a
//! few hundred thousand concepts. The index holds a single vector dimension,
//! fixed by configuration or by the first insert, and optionally a single
//! embedding model.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rayon::prelude::*;
use serde::Serialize;

use clinrank_core::error::{ClinrankError, Result};
use clinrank_core::types::{ConceptId, EmbeddingRecord};

use crate::embedding::EmbeddingSource;

/// A single hit returned from a nearest-neighbor query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub concept_id: ConceptId,
    /// Cosine similarity in [-1, 1].
    pub similarity: f64,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    record: Arc<EmbeddingRecord>,
    norm: f64,
}

#[derive(Debug, Default)]
struct Inner {
    dimension: Option<usize>,
    model: Option<String>,
    entries: HashMap<ConceptId, IndexEntry>,
}

/// Thread-safe embedding store keyed by concept id.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingIndex {
    inner: Arc<RwLock<Inner>>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> ClinrankError {
    ClinrankError::Storage(format!("Lock poisoned: {}", e))
}

impl EmbeddingIndex {
    /// Create an empty index whose dimension is set by the first insert.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty index accepting only `dimension`-length vectors.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                dimension: Some(dimension),
                ..Inner::default()
            })),
        }
    }

    /// Create an empty index accepting only `model` vectors of `dimension` length.
    pub fn for_model(dimension: usize, model: &str) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                dimension: Some(dimension),
                model: Some(model.to_string()),
                entries: HashMap::new(),
            })),
        }
    }

    /// Insert or replace the embedding for a concept.
    pub fn insert(&self, record: EmbeddingRecord) -> Result<()> {
        if record.vector.is_empty() {
            return Err(ClinrankError::Storage(format!(
                "Embedding for concept {} is empty",
                record.concept_id
            )));
        }
        let mut inner = self.inner.write().map_err(poisoned)?;
        if let Some(expected) = &inner.model {
            if *expected != record.model {
                return Err(ClinrankError::ModelMismatch {
                    expected: expected.clone(),
                    actual: record.model,
                });
            }
        }
        let actual = record.vector.len();
        match inner.dimension {
            Some(expected) if expected != actual => {
                return Err(ClinrankError::DimensionMismatch { expected, actual });
            }
            Some(_) => {}
            None => inner.dimension = Some(actual),
        }

        let norm = l2_norm(&record.vector);
        inner.entries.insert(
            record.concept_id,
            IndexEntry {
                record: Arc::new(record),
                norm,
            },
        );
        Ok(())
    }

    /// Insert many records, stopping at the first rejected one.
    pub fn insert_all<I>(&self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = EmbeddingRecord>,
    {
        let mut count = 0;
        for record in records {
            self.insert(record)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn get(&self, concept_id: ConceptId) -> Result<Option<Arc<EmbeddingRecord>>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .entries
            .get(&concept_id)
            .map(|entry| Arc::clone(&entry.record)))
    }

    /// The `k` most similar concepts to `query`.
    ///
    /// Ordered by similarity descending, ties by concept id ascending.
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let inner = self.inner.read().map_err(poisoned)?;
        if k == 0 || inner.entries.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(expected) = inner.dimension {
            if query.len() != expected {
                return Err(ClinrankError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }

        let query_norm = l2_norm(query);
        let mut hits: Vec<Neighbor> = inner
            .entries
            .par_iter()
            .map(|(id, entry)| Neighbor {
                concept_id: *id,
                similarity: cosine_with_norms(query, query_norm, &entry.record.vector, entry.norm),
            })
            .collect();

        hits.sort_by(compare_neighbors);
        hits.truncate(k);
        Ok(hits)
    }

    pub fn dimension(&self) -> Option<usize> {
        self.inner.read().ok().and_then(|inner| inner.dimension)
    }

    /// The only model this index accepts, when one was fixed.
    pub fn model(&self) -> Option<String> {
        self.inner.read().ok().and_then(|inner| inner.model.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EmbeddingSource for EmbeddingIndex {
    async fn get_embedding(&self, concept_id: ConceptId) -> Result<Option<EmbeddingRecord>> {
        Ok(self.get(concept_id)?.map(|record| (*record).clone()))
    }
}

fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| a.concept_id.cmp(&b.concept_id))
}

fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt()
}

fn cosine_with_norms(a: &[f32], norm_a: f64, b: &[f32], norm_b: f64) -> f64 {
    if a.len() != b.len() || norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Cosine similarity between two vectors, clamped to [-1, 1].
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    cosine_with_norms(a, l2_norm(a), b, l2_norm(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: i64, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            concept_id: ConceptId(id),
            vector,
            model: "test".to_string(),
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let index = EmbeddingIndex::new();
        index.insert(record(1, vec![1.0, 0.0])).unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.dimension(), Some(2));
        let fetched = index.get(ConceptId(1)).unwrap().unwrap();
        assert_eq!(fetched.vector, vec![1.0, 0.0]);
        assert!(index.get(ConceptId(2)).unwrap().is_none());
    }

    #[test]
    fn test_nearest_orders_by_similarity() {
        let index = EmbeddingIndex::new();
        index.insert(record(1, vec![1.0, 0.0])).unwrap();
        index.insert(record(2, vec![0.0, 1.0])).unwrap();
        index.insert(record(3, vec![0.7, 0.7])).unwrap();
        index.insert(record(4, vec![-1.0, 0.0])).unwrap();

        let hits = index.nearest(&[1.0, 0.0], 3).unwrap();
        let ids: Vec<i64> = hits.iter().map(|h| h.concept_id.0).collect();
        assert_eq!(ids, vec![1, 3, 2]);
        assert!((hits[0].similarity - 1.0).abs() < 1e-9);
        assert!(hits[2].similarity.abs() < 1e-9);
    }

    #[test]
    fn test_nearest_breaks_ties_by_id() {
        let index = EmbeddingIndex::new();
        for id in [9, 3, 7, 1] {
            index.insert(record(id, vec![0.5, 0.5])).unwrap();
        }
        let hits = index.nearest(&[1.0, 1.0], 10).unwrap();
        let ids: Vec<i64> = hits.iter().map(|h| h.concept_id.0).collect();
        assert_eq!(ids, vec![1, 3, 7, 9]);
    }

    #[test]
    fn test_nearest_on_empty_index() {
        let index = EmbeddingIndex::with_dimension(4);
        assert!(index.nearest(&[1.0, 0.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_nearest_with_zero_k() {
        let index = EmbeddingIndex::new();
        index.insert(record(1, vec![1.0])).unwrap();
        assert!(index.nearest(&[1.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let index = EmbeddingIndex::with_dimension(3);
        let err = index.insert(record(1, vec![1.0, 2.0])).unwrap_err();
        assert!(matches!(
            err,
            ClinrankError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));

        index.insert(record(1, vec![1.0, 2.0, 3.0])).unwrap();
        assert!(matches!(
            index.nearest(&[1.0], 1),
            Err(ClinrankError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_model_mismatch_rejected() {
        let index = EmbeddingIndex::for_model(2, "bge");
        let err = index.insert(record(1, vec![1.0, 0.0])).unwrap_err();
        assert!(matches!(
            err,
            ClinrankError::ModelMismatch { ref expected, ref actual }
                if expected == "bge" && actual == "test"
        ));
        assert!(index.is_empty());

        let mut accepted = record(1, vec![1.0, 0.0]);
        accepted.model = "bge".to_string();
        index.insert(accepted).unwrap();
        assert_eq!(index.model().as_deref(), Some("bge"));

        let mut short = record(2, vec![1.0]);
        short.model = "bge".to_string();
        assert!(matches!(
            index.insert(short),
            Err(ClinrankError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_insert_replaces_existing() {
        let index = EmbeddingIndex::new();
        index.insert(record(1, vec![1.0, 0.0])).unwrap();
        index.insert(record(1, vec![0.0, 1.0])).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(ConceptId(1)).unwrap().unwrap().vector, vec![0.0, 1.0]);
    }

    #[test]
    fn test_empty_vector_rejected() {
        let index = EmbeddingIndex::new();
        assert!(index.insert(record(1, Vec::new())).is_err());
        assert_eq!(index.dimension(), None);
    }

    #[test]
    fn test_cosine_similarity_edge_cases() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[-2.0, 0.0]) + 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_embedding_source_contract() {
        let index = EmbeddingIndex::new();
        index.insert(record(5, vec![0.1, 0.2])).unwrap();
        let fetched = index.get_embedding(ConceptId(5)).await.unwrap().unwrap();
        assert_eq!(fetched.concept_id, ConceptId(5));
        assert!(index.get_embedding(ConceptId(6)).await.unwrap().is_none());
    }
}
