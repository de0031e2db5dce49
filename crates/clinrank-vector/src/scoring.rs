//! Relevance of a concept to a domain.
//!
//! Four features, each in [0, 1]:
//!
//! - centrality: from the metric sidecar
//! - density: `1 / (1 + decay * depth)`
//! - authority: from the metric sidecar
//! - similarity: `(cos + 1) / 2` between the concept embedding and the domain centroid
//!
//! The score is `saturate(gain * (sum(w_i * f_i) - midpoint))`, where
//! `saturate` is the logistic function or a rescaled tanh. Stored scores carry
//! the versions of every input they were computed from, including a
//! fingerprint of the formula parameters, and are recomputed only when one of
//! those changes.

use std::sync::Arc;

use chrono::Utc;
use rayon::prelude::*;
use tracing::{debug, info};

use clinrank_core::config::{Saturation, ScoringConfig};
use clinrank_core::error::{ClinrankError, MissingFeature, Result};
use clinrank_core::types::{
    ConceptId, DomainProfile, EmbeddingRecord, FeatureVector, MetricRecord, RelevanceScore,
    ScoreSources, Versioned,
};
use clinrank_storage::{MetricSidecar, RelevanceStore};

use crate::domain::DomainRegistry;
use crate::embedding::DynEmbeddingSource;
use crate::index::cosine_similarity;

/// The scoring formula, free of any store access.
#[derive(Debug, Clone)]
pub struct RelevanceFormula {
    config: ScoringConfig,
    fingerprint: String,
}

impl RelevanceFormula {
    pub fn new(config: ScoringConfig) -> Self {
        let fingerprint = config.fingerprint();
        Self {
            config,
            fingerprint,
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Identifies these parameters in stored score sources.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn density(&self, depth: u32) -> f64 {
        1.0 / (1.0 + self.config.depth_decay * depth as f64)
    }

    pub fn features(&self, metric: &MetricRecord, cosine: f64) -> FeatureVector {
        FeatureVector {
            centrality: metric.centrality.clamp(0.0, 1.0),
            density: self.density(metric.depth),
            authority: metric.authority.clamp(0.0, 1.0),
            similarity: ((cosine + 1.0) / 2.0).clamp(0.0, 1.0),
        }
    }

    /// Final score in [0, 1].
    pub fn score(&self, features: &FeatureVector) -> f64 {
        let w = &self.config.weights;
        let blend = w.centrality * features.centrality
            + w.density * features.density
            + w.authority * features.authority
            + w.similarity * features.similarity;
        self.saturate(self.config.gain * (blend - self.config.midpoint))
    }

    /// Score reached when every feature is 1.
    pub fn max_score(&self) -> f64 {
        self.saturate(self.config.gain * (self.config.weights.sum() - self.config.midpoint))
    }

    fn saturate(&self, x: f64) -> f64 {
        let y = match self.config.transform {
            Saturation::Logistic => 1.0 / (1.0 + (-x).exp()),
            Saturation::Tanh => (x.tanh() + 1.0) / 2.0,
        };
        y.clamp(0.0, 1.0)
    }
}

/// Everything one score is computed from.
struct ScoreInputs {
    metric: Versioned<MetricRecord>,
    embedding: EmbeddingRecord,
    profile: Arc<DomainProfile>,
}

/// Outcome of scoring a batch of concepts against one domain.
#[derive(Debug, Default)]
pub struct DomainScoring {
    /// Scores newly computed and stored.
    pub computed: usize,
    /// Stored scores whose sources were unchanged.
    pub reused: usize,
    pub failures: Vec<(ConceptId, ClinrankError)>,
}

/// Computes, caches, and refreshes relevance scores.
pub struct RelevanceCalculator {
    formula: RelevanceFormula,
    sidecar: Arc<dyn MetricSidecar>,
    embeddings: Arc<dyn DynEmbeddingSource>,
    domains: Arc<DomainRegistry>,
    store: Arc<dyn RelevanceStore>,
}

fn incomplete(concept_id: ConceptId, domain: &str, missing: MissingFeature) -> ClinrankError {
    ClinrankError::IncompleteFeatureSet {
        concept_id,
        domain: domain.to_string(),
        missing,
    }
}

impl RelevanceCalculator {
    pub fn new(
        config: ScoringConfig,
        sidecar: Arc<dyn MetricSidecar>,
        embeddings: Arc<dyn DynEmbeddingSource>,
        domains: Arc<DomainRegistry>,
        store: Arc<dyn RelevanceStore>,
    ) -> Self {
        Self {
            formula: RelevanceFormula::new(config),
            sidecar,
            embeddings,
            domains,
            store,
        }
    }

    pub fn formula(&self) -> &RelevanceFormula {
        &self.formula
    }

    async fn gather(
        &self,
        concept_id: ConceptId,
        domain: &str,
        profile: Option<Arc<DomainProfile>>,
    ) -> Result<ScoreInputs> {
        let profile =
            profile.ok_or_else(|| incomplete(concept_id, domain, MissingFeature::DomainProfile))?;
        let metric = self
            .sidecar
            .get_metric(concept_id)
            .await?
            .ok_or_else(|| incomplete(concept_id, domain, MissingFeature::MetricRecord))?;
        let embedding = self
            .embeddings
            .get_embedding_boxed(concept_id)
            .await?
            .ok_or_else(|| incomplete(concept_id, domain, MissingFeature::Embedding))?;
        Ok(ScoreInputs {
            metric,
            embedding,
            profile,
        })
    }

    fn sources(&self, inputs: &ScoreInputs) -> ScoreSources {
        ScoreSources {
            metric_revision: inputs.metric.revision,
            metric_schema_version: inputs.metric.value.schema_version,
            authority_version: inputs.metric.value.authority_version,
            embedding_model: inputs.embedding.model.clone(),
            embedding_generated_at: inputs.embedding.generated_at,
            domain_revision: inputs.profile.revision,
            formula: self.formula.fingerprint().to_string(),
        }
    }

    fn evaluate(
        &self,
        concept_id: ConceptId,
        domain: &str,
        inputs: &ScoreInputs,
        sources: ScoreSources,
        version: u64,
    ) -> RelevanceScore {
        let cosine = cosine_similarity(&inputs.embedding.vector, &inputs.profile.centroid);
        let features = self.formula.features(&inputs.metric.value, cosine);
        RelevanceScore {
            concept_id,
            domain: domain.to_string(),
            score: self.formula.score(&features),
            cosine,
            features,
            sources,
            version,
            computed_at: Utc::now(),
        }
    }

    /// Compute a fresh score without consulting or writing the store.
    ///
    /// Fails with `IncompleteFeatureSet` when a metric record, embedding, or
    /// domain profile is missing; no default is ever substituted.
    pub async fn compute_score(&self, concept_id: ConceptId, domain: &str) -> Result<RelevanceScore> {
        let profile = self.domains.get(domain)?;
        let inputs = self.gather(concept_id, domain, profile).await?;
        let sources = self.sources(&inputs);
        Ok(self.evaluate(concept_id, domain, &inputs, sources, 1))
    }

    /// The current score, recomputing and replacing it when any input changed.
    ///
    /// When another writer stores the same version first, its record wins and
    /// is returned instead of this call's result.
    pub async fn ensure_score(
        &self,
        concept_id: ConceptId,
        domain: &str,
    ) -> Result<Arc<RelevanceScore>> {
        let profile = self.domains.get(domain)?;
        let inputs = self.gather(concept_id, domain, profile).await?;
        let sources = self.sources(&inputs);

        let stored = self.store.get_score(concept_id, domain).await?;
        if let Some(existing) = &stored {
            if existing.sources == sources {
                return Ok(Arc::clone(existing));
            }
        }

        let version = stored.map(|s| s.version + 1).unwrap_or(1);
        let score = self.evaluate(concept_id, domain, &inputs, sources, version);
        let written = self
            .store
            .upsert_score(concept_id, domain, score.clone())
            .await?;
        if !written {
            if let Some(current) = self.store.get_score(concept_id, domain).await? {
                debug!(
                    %concept_id,
                    domain = %domain,
                    version = current.version,
                    "Concurrent score write won"
                );
                return Ok(current);
            }
        }
        debug!(
            %concept_id,
            domain = %domain,
            score = score.score,
            version,
            "Relevance score refreshed"
        );
        Ok(Arc::new(score))
    }

    /// Refresh scores for many concepts against one domain.
    ///
    /// Inputs are read from the stores, stale scores are evaluated in
    /// parallel, and per-concept failures are collected rather than returned.
    pub async fn score_domain(&self, domain: &str, concepts: &[ConceptId]) -> Result<DomainScoring> {
        let profile = self
            .domains
            .get(domain)?
            .ok_or_else(|| ClinrankError::UnknownDomain(domain.to_string()))?;

        let mut outcome = DomainScoring::default();
        let mut pending = Vec::new();
        for &concept_id in concepts {
            let inputs = match self
                .gather(concept_id, domain, Some(Arc::clone(&profile)))
                .await
            {
                Ok(inputs) => inputs,
                Err(error) => {
                    outcome.failures.push((concept_id, error));
                    continue;
                }
            };
            let sources = self.sources(&inputs);
            let stored = match self.store.get_score(concept_id, domain).await {
                Ok(stored) => stored,
                Err(error) => {
                    outcome.failures.push((concept_id, error));
                    continue;
                }
            };
            match stored {
                Some(existing) if existing.sources == sources => outcome.reused += 1,
                stored => {
                    let version = stored.map(|s| s.version + 1).unwrap_or(1);
                    pending.push((concept_id, inputs, sources, version));
                }
            }
        }

        let fresh: Vec<RelevanceScore> = pending
            .into_par_iter()
            .map(|(concept_id, inputs, sources, version)| {
                self.evaluate(concept_id, domain, &inputs, sources, version)
            })
            .collect();

        for score in fresh {
            let concept_id = score.concept_id;
            match self.store.upsert_score(concept_id, domain, score).await {
                Ok(true) => outcome.computed += 1,
                // A concurrent writer stored this version first.
                Ok(false) => outcome.reused += 1,
                Err(error) => outcome.failures.push((concept_id, error)),
            }
        }

        info!(
            domain = %domain,
            computed = outcome.computed,
            reused = outcome.reused,
            failures = outcome.failures.len(),
            "Domain scored"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use clinrank_core::config::FeatureWeights;
    use clinrank_core::types::METRIC_SCHEMA_VERSION;
    use clinrank_storage::{InMemoryMetricSidecar, InMemoryRelevanceStore};

    use crate::index::EmbeddingIndex;

    fn metric(id: i64, centrality: f64, depth: u32, authority: f64) -> MetricRecord {
        MetricRecord {
            concept_id: ConceptId(id),
            centrality,
            depth,
            authority,
            schema_version: METRIC_SCHEMA_VERSION,
            authority_version: 1,
            centrality_converged: true,
        }
    }

    fn embedding(id: i64, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            concept_id: ConceptId(id),
            vector,
            model: "test-model".to_string(),
            generated_at: Utc::now(),
        }
    }

    struct Fixture {
        sidecar: Arc<InMemoryMetricSidecar>,
        index: Arc<EmbeddingIndex>,
        domains: Arc<DomainRegistry>,
        store: Arc<InMemoryRelevanceStore>,
        calculator: RelevanceCalculator,
    }

    fn fixture() -> Fixture {
        let sidecar = Arc::new(InMemoryMetricSidecar::new());
        let index = Arc::new(EmbeddingIndex::new());
        let domains = Arc::new(DomainRegistry::new());
        let store = Arc::new(InMemoryRelevanceStore::new());
        let calculator = RelevanceCalculator::new(
            ScoringConfig::default(),
            sidecar.clone(),
            index.clone(),
            domains.clone(),
            store.clone(),
        );
        Fixture {
            sidecar,
            index,
            domains,
            store,
            calculator,
        }
    }

    #[test]
    fn test_density_decays_with_depth() {
        let formula = RelevanceFormula::new(ScoringConfig::default());
        assert_eq!(formula.density(0), 1.0);
        assert_eq!(formula.density(1), 0.5);
        assert!((formula.density(3) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_similarity_feature_maps_cosine() {
        let formula = RelevanceFormula::new(ScoringConfig::default());
        let m = metric(1, 0.5, 0, 0.5);
        assert_eq!(formula.features(&m, 1.0).similarity, 1.0);
        assert_eq!(formula.features(&m, 0.0).similarity, 0.5);
        assert_eq!(formula.features(&m, -1.0).similarity, 0.0);
    }

    #[test]
    fn test_maximal_features_give_maximal_score_below_one() {
        let formula = RelevanceFormula::new(ScoringConfig::default());
        let features = formula.features(&metric(1, 1.0, 0, 1.0), 1.0);
        let score = formula.score(&features);

        let expected = 1.0 / (1.0 + (-3.0f64).exp());
        assert!((score - expected).abs() < 1e-12);
        assert!((score - formula.max_score()).abs() < 1e-12);
        assert!(score < 1.0);
    }

    #[test]
    fn test_score_bounded_for_extreme_inputs() {
        let formula = RelevanceFormula::new(ScoringConfig::default());
        for centrality in [0.0, 0.3, 1.0] {
            for depth in [0, 1, 50] {
                for cosine in [-1.0, 0.0, 1.0] {
                    let f = formula.features(&metric(1, centrality, depth, 0.1), cosine);
                    let s = formula.score(&f);
                    assert!((0.0..=1.0).contains(&s));
                }
            }
        }
    }

    #[test]
    fn test_tanh_transform_is_rescaled() {
        let config = ScoringConfig {
            transform: Saturation::Tanh,
            ..ScoringConfig::default()
        };
        let formula = RelevanceFormula::new(config);
        let features = FeatureVector {
            centrality: 0.5,
            density: 0.5,
            authority: 0.5,
            similarity: 0.5,
        };
        assert!((formula.score(&features) - 0.5).abs() < 1e-12);
        assert!((formula.max_score() - (3.0f64.tanh() + 1.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_weights_shift_the_score() {
        let similarity_only = ScoringConfig {
            weights: FeatureWeights {
                centrality: 0.0,
                density: 0.0,
                authority: 0.0,
                similarity: 1.0,
            },
            ..ScoringConfig::default()
        };
        let formula = RelevanceFormula::new(similarity_only);
        let f = formula.features(&metric(1, 0.0, 10, 0.0), 1.0);
        assert!((formula.score(&f) - formula.max_score()).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_missing_inputs_are_named() {
        let fx = fixture();
        let missing = |err: ClinrankError| match err {
            ClinrankError::IncompleteFeatureSet { missing, .. } => missing,
            other => panic!("unexpected error {:?}", other),
        };

        let err = fx.calculator.ensure_score(ConceptId(1), "Condition").await.unwrap_err();
        assert_eq!(missing(err), MissingFeature::DomainProfile);

        fx.index.insert(embedding(2, vec![1.0, 0.0])).unwrap();
        fx.domains.upsert("Condition", &[ConceptId(2)], &fx.index).unwrap();
        let err = fx.calculator.ensure_score(ConceptId(1), "Condition").await.unwrap_err();
        assert_eq!(missing(err), MissingFeature::MetricRecord);

        fx.sidecar.upsert_metric(ConceptId(1), metric(1, 0.5, 1, 1.0)).await.unwrap();
        let err = fx.calculator.compute_score(ConceptId(1), "Condition").await.unwrap_err();
        assert_eq!(missing(err), MissingFeature::Embedding);
        assert!(fx.store.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_score_reuses_until_a_source_changes() {
        let fx = fixture();
        fx.index.insert(embedding(1, vec![1.0, 0.0])).unwrap();
        fx.domains.upsert("Condition", &[ConceptId(1)], &fx.index).unwrap();
        fx.sidecar.upsert_metric(ConceptId(1), metric(1, 0.5, 1, 1.0)).await.unwrap();

        let first = fx.calculator.ensure_score(ConceptId(1), "Condition").await.unwrap();
        assert_eq!(first.version, 1);
        assert!((first.cosine - 1.0).abs() < 1e-9);

        let again = fx.calculator.ensure_score(ConceptId(1), "Condition").await.unwrap();
        assert_eq!(again.version, 1);
        assert_eq!(again.computed_at, first.computed_at);

        // Same metric written again: no new revision, no recompute.
        fx.sidecar.upsert_metric(ConceptId(1), metric(1, 0.5, 1, 1.0)).await.unwrap();
        let unchanged = fx.calculator.ensure_score(ConceptId(1), "Condition").await.unwrap();
        assert_eq!(unchanged.version, 1);

        fx.sidecar.upsert_metric(ConceptId(1), metric(1, 0.9, 1, 1.0)).await.unwrap();
        let bumped = fx.calculator.ensure_score(ConceptId(1), "Condition").await.unwrap();
        assert_eq!(bumped.version, 2);
        assert_eq!(bumped.sources.metric_revision, 2);
        assert!(bumped.score > first.score);

        let stored = fx.store.get_score(ConceptId(1), "Condition").await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_score_domain_collects_failures() {
        let fx = fixture();
        for id in 1..=4 {
            fx.index.insert(embedding(id, vec![1.0, id as f32])).unwrap();
        }
        let members: Vec<ConceptId> = (1..=4).map(ConceptId).collect();
        fx.domains.upsert("Condition", &members, &fx.index).unwrap();
        for id in 1..=3 {
            fx.sidecar.upsert_metric(ConceptId(id), metric(id, 0.5, 2, 0.9)).await.unwrap();
        }

        let outcome = fx.calculator.score_domain("Condition", &members).await.unwrap();
        assert_eq!(outcome.computed, 3);
        assert_eq!(outcome.reused, 0);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, ConceptId(4));

        let rerun = fx.calculator.score_domain("Condition", &members).await.unwrap();
        assert_eq!(rerun.computed, 0);
        assert_eq!(rerun.reused, 3);
    }

    #[tokio::test]
    async fn test_score_domain_unknown_domain() {
        let fx = fixture();
        let err = fx.calculator.score_domain("Drug", &[ConceptId(1)]).await.unwrap_err();
        assert!(matches!(err, ClinrankError::UnknownDomain(_)));
    }

    #[tokio::test]
    async fn test_domain_revision_triggers_recompute() {
        let fx = fixture();
        fx.index.insert(embedding(1, vec![1.0, 0.0])).unwrap();
        fx.index.insert(embedding(2, vec![0.0, 1.0])).unwrap();
        fx.domains.upsert("Condition", &[ConceptId(1)], &fx.index).unwrap();
        fx.sidecar.upsert_metric(ConceptId(1), metric(1, 0.5, 0, 1.0)).await.unwrap();

        let first = fx.calculator.ensure_score(ConceptId(1), "Condition").await.unwrap();
        fx.domains
            .upsert("Condition", &[ConceptId(1), ConceptId(2)], &fx.index)
            .unwrap();
        let second = fx.calculator.ensure_score(ConceptId(1), "Condition").await.unwrap();

        assert_eq!(second.version, first.version + 1);
        assert_eq!(second.sources.domain_revision, 2);
        assert!(second.cosine < first.cosine);
    }

    #[tokio::test]
    async fn test_changed_weights_trigger_recompute() {
        let fx = fixture();
        fx.index.insert(embedding(1, vec![1.0, 0.0])).unwrap();
        fx.index.insert(embedding(2, vec![0.0, 1.0])).unwrap();
        fx.domains
            .upsert("Condition", &[ConceptId(1), ConceptId(2)], &fx.index)
            .unwrap();
        fx.sidecar.upsert_metric(ConceptId(1), metric(1, 0.2, 3, 0.5)).await.unwrap();

        let first = fx.calculator.ensure_score(ConceptId(1), "Condition").await.unwrap();
        assert_eq!(first.version, 1);

        let similarity_only = ScoringConfig {
            weights: FeatureWeights {
                centrality: 0.0,
                density: 0.0,
                authority: 0.0,
                similarity: 1.0,
            },
            ..ScoringConfig::default()
        };
        let reweighted = RelevanceCalculator::new(
            similarity_only,
            fx.sidecar.clone(),
            fx.index.clone(),
            fx.domains.clone(),
            fx.store.clone(),
        );

        let second = reweighted.ensure_score(ConceptId(1), "Condition").await.unwrap();
        assert_eq!(second.version, 2);
        assert_ne!(second.sources.formula, first.sources.formula);
        assert!((second.score - first.score).abs() > 1e-6);

        let expected = reweighted.formula().score(&second.features);
        assert!((second.score - expected).abs() < 1e-12);
        let stored = fx.store.get_score(ConceptId(1), "Condition").await.unwrap().unwrap();
        assert_eq!(stored.version, 2);

        // The original calculator sees the new fingerprint and takes over again.
        let third = fx.calculator.ensure_score(ConceptId(1), "Condition").await.unwrap();
        assert_eq!(third.version, 3);
        assert!((third.score - first.score).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_rebuilt_mock_index_keeps_score_versions() {
        use crate::embedding::MockEmbedding;
        use clinrank_core::types::ConceptNode;

        let concepts: Vec<ConceptNode> = (1..=3)
            .map(|i| ConceptNode {
                id: ConceptId(i),
                vocabulary: "SNOMED".to_string(),
                semantic_type: "Clinical Finding".to_string(),
                domain_id: "Condition".to_string(),
                label: format!("finding {}", i),
            })
            .collect();
        let ids: Vec<ConceptId> = concepts.iter().map(|c| c.id).collect();
        let sidecar = Arc::new(InMemoryMetricSidecar::new());
        let store = Arc::new(InMemoryRelevanceStore::new());
        for id in 1..=3 {
            sidecar.upsert_metric(ConceptId(id), metric(id, 0.5, 1, 1.0)).await.unwrap();
        }

        // Each pass rebuilds the index and registry the way a fresh process does.
        let mut versions = Vec::new();
        for _ in 0..2 {
            let index = Arc::new(EmbeddingIndex::with_dimension(8));
            index.insert_all(MockEmbedding::new(8).records_for(&concepts)).unwrap();
            let domains = Arc::new(DomainRegistry::new());
            domains.upsert("Condition", &ids, &index).unwrap();
            let calculator = RelevanceCalculator::new(
                ScoringConfig::default(),
                sidecar.clone(),
                index,
                domains,
                store.clone(),
            );
            calculator.score_domain("Condition", &ids).await.unwrap();
            let score = store.get_score(ConceptId(1), "Condition").await.unwrap().unwrap();
            versions.push(score.version);
        }
        assert_eq!(versions, vec![1, 1]);
    }

    /// Relevance store where another writer lands a score right before the
    /// next write goes through.
    struct ContendedStore {
        inner: InMemoryRelevanceStore,
        competitor: Mutex<Option<RelevanceScore>>,
    }

    #[async_trait]
    impl RelevanceStore for ContendedStore {
        async fn upsert_score(
            &self,
            concept_id: ConceptId,
            domain: &str,
            score: RelevanceScore,
        ) -> Result<bool> {
            let competitor = self.competitor.lock().unwrap().take();
            if let Some(other) = competitor {
                assert!(self.inner.upsert_score(concept_id, domain, other).await?);
            }
            self.inner.upsert_score(concept_id, domain, score).await
        }

        async fn get_score(
            &self,
            concept_id: ConceptId,
            domain: &str,
        ) -> Result<Option<Arc<RelevanceScore>>> {
            self.inner.get_score(concept_id, domain).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_writer_of_same_version_wins_once() {
        let sidecar = Arc::new(InMemoryMetricSidecar::new());
        let index = Arc::new(EmbeddingIndex::new());
        let domains = Arc::new(DomainRegistry::new());
        index.insert(embedding(1, vec![1.0, 0.0])).unwrap();
        domains.upsert("Condition", &[ConceptId(1)], &index).unwrap();
        sidecar.upsert_metric(ConceptId(1), metric(1, 0.5, 1, 1.0)).await.unwrap();

        let plain = RelevanceCalculator::new(
            ScoringConfig::default(),
            sidecar.clone(),
            index.clone(),
            domains.clone(),
            Arc::new(InMemoryRelevanceStore::new()),
        );
        let mut rival = plain.compute_score(ConceptId(1), "Condition").await.unwrap();
        rival.score = 0.123;

        let store = Arc::new(ContendedStore {
            inner: InMemoryRelevanceStore::new(),
            competitor: Mutex::new(Some(rival)),
        });
        let calculator = RelevanceCalculator::new(
            ScoringConfig::default(),
            sidecar,
            index,
            domains,
            store.clone(),
        );

        let returned = calculator.ensure_score(ConceptId(1), "Condition").await.unwrap();
        assert_eq!(returned.version, 1);
        assert_eq!(returned.score, 0.123);
        let stored = store.get_score(ConceptId(1), "Condition").await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.score, 0.123);
    }
}
