//! Hybrid search: vector proximity to a domain centroid, ranked by relevance.
//!
//! The index supplies an oversampled candidate pool nearest to the domain
//! centroid; each candidate's relevance score is fetched or computed on
//! demand, filtered by `min_score`, sorted, and truncated. The pool is never
//! widened automatically; callers who need more recall re-query with a larger
//! oversample factor.
//!
//! Pure semantic search skips scoring: it ranks the index by cosine similarity
//! to a query vector and keeps hits at or above a threshold.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use clinrank_core::config::SearchConfig;
use clinrank_core::error::{ClinrankError, Result};
use clinrank_core::types::{ConceptHit, ConceptId};

use crate::domain::DomainRegistry;
use crate::index::{EmbeddingIndex, Neighbor};
use crate::scoring::RelevanceCalculator;

/// Per-call overrides of the configured search settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Candidate pool multiplier over `limit`.
    pub oversample_factor: Option<usize>,
}

pub struct HybridSearchEngine {
    config: SearchConfig,
    domains: Arc<DomainRegistry>,
    index: Arc<EmbeddingIndex>,
    calculator: Arc<RelevanceCalculator>,
}

impl HybridSearchEngine {
    pub fn new(
        config: SearchConfig,
        domains: Arc<DomainRegistry>,
        index: Arc<EmbeddingIndex>,
        calculator: Arc<RelevanceCalculator>,
    ) -> Self {
        Self {
            config,
            domains,
            index,
            calculator,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Concepts most relevant to `domain`, best first.
    pub async fn search_concepts_by_domain(
        &self,
        domain: &str,
        limit: usize,
        min_score: f64,
    ) -> Result<Vec<ConceptHit>> {
        self.search_with_options(domain, limit, min_score, &SearchOptions::default())
            .await
    }

    pub async fn search_with_options(
        &self,
        domain: &str,
        limit: usize,
        min_score: f64,
        options: &SearchOptions,
    ) -> Result<Vec<ConceptHit>> {
        let oversample = self.validate(limit, min_score, options)?;

        let profile = self
            .domains
            .get(domain)?
            .ok_or_else(|| ClinrankError::UnknownDomain(domain.to_string()))?;

        let k = limit
            .saturating_mul(oversample)
            .max(self.config.candidate_floor);
        let candidates = self.index.nearest(&profile.centroid, k)?;
        let pool = candidates.len();

        let mut hits = Vec::new();
        let mut skipped = 0usize;
        for candidate in candidates {
            let score = match self
                .calculator
                .ensure_score(candidate.concept_id, domain)
                .await
            {
                Ok(score) => score,
                Err(ClinrankError::IncompleteFeatureSet { missing, .. }) => {
                    debug!(
                        concept_id = %candidate.concept_id,
                        domain = %domain,
                        %missing,
                        "Skipping candidate without a complete feature set"
                    );
                    skipped += 1;
                    continue;
                }
                Err(error) => return Err(error),
            };
            if score.score >= min_score {
                hits.push(ConceptHit {
                    concept_id: candidate.concept_id,
                    score: score.score,
                    similarity: candidate.similarity,
                });
            }
        }

        hits.sort_by(compare_hits);
        hits.truncate(limit);

        info!(
            domain = %domain,
            limit,
            min_score,
            pool,
            skipped,
            results = hits.len(),
            "Domain search complete"
        );
        Ok(hits)
    }

    /// Concepts whose embeddings are closest to `query`, most similar first.
    ///
    /// Keeps at most `limit` hits with cosine similarity at or above
    /// `threshold`. Ties break by concept id ascending.
    pub fn search_by_embedding(
        &self,
        query: &[f32],
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<Neighbor>> {
        self.validate_semantic(query, limit, threshold)?;
        let mut hits = self.index.nearest(query, limit)?;
        hits.retain(|hit| hit.similarity >= threshold);
        debug!(limit, threshold, results = hits.len(), "Semantic search complete");
        Ok(hits)
    }

    /// Concepts semantically closest to `concept_id`, excluding the concept itself.
    pub fn similar_concepts(
        &self,
        concept_id: ConceptId,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<Neighbor>> {
        let record = self.index.get(concept_id)?.ok_or_else(|| {
            ClinrankError::InvalidQuery(format!("concept {} has no embedding", concept_id))
        })?;
        self.validate_semantic(&record.vector, limit, threshold)?;
        let mut hits = self.index.nearest(&record.vector, limit.saturating_add(1))?;
        hits.retain(|hit| hit.concept_id != concept_id && hit.similarity >= threshold);
        hits.truncate(limit);
        Ok(hits)
    }

    fn validate_semantic(&self, query: &[f32], limit: usize, threshold: f64) -> Result<()> {
        if limit == 0 || limit > self.config.max_limit {
            return Err(ClinrankError::InvalidQuery(format!(
                "limit must be within 1..={}, got {}",
                self.config.max_limit, limit
            )));
        }
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(ClinrankError::InvalidQuery(format!(
                "threshold must be within [-1, 1], got {}",
                threshold
            )));
        }
        if query.is_empty() {
            return Err(ClinrankError::InvalidQuery(
                "query embedding is empty".to_string(),
            ));
        }
        if let Some(expected) = self.index.dimension() {
            if query.len() != expected {
                return Err(ClinrankError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }
        Ok(())
    }

    /// Blocking wrapper for hosts without an async runtime.
    ///
    /// Runs the search on a private current-thread runtime, so it must not be
    /// called from inside another tokio runtime.
    pub fn search_blocking(
        &self,
        domain: &str,
        limit: usize,
        min_score: f64,
    ) -> Result<Vec<ConceptHit>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.search_concepts_by_domain(domain, limit, min_score))
    }

    /// Check arguments before any work; returns the effective oversample factor.
    fn validate(&self, limit: usize, min_score: f64, options: &SearchOptions) -> Result<usize> {
        if limit == 0 {
            return Err(ClinrankError::InvalidQuery(
                "limit must be at least 1".to_string(),
            ));
        }
        if limit > self.config.max_limit {
            return Err(ClinrankError::InvalidQuery(format!(
                "limit {} exceeds the maximum of {}",
                limit, self.config.max_limit
            )));
        }
        if !(0.0..=1.0).contains(&min_score) {
            return Err(ClinrankError::InvalidQuery(format!(
                "min_score must be within [0, 1], got {}",
                min_score
            )));
        }
        let oversample = options
            .oversample_factor
            .unwrap_or(self.config.oversample_factor);
        if oversample == 0 {
            return Err(ClinrankError::InvalidQuery(
                "oversample_factor must be at least 1".to_string(),
            ));
        }
        Ok(oversample)
    }
}

/// Score descending, then similarity descending, then concept id ascending.
fn compare_hits(a: &ConceptHit, b: &ConceptHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.similarity.total_cmp(&a.similarity))
        .then_with(|| a.concept_id.cmp(&b.concept_id))
}
