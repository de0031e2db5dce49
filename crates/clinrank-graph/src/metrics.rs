//! Per-concept metric computation over one graph snapshot.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{info, warn};

use clinrank_core::config::CentralityConfig;
use clinrank_core::error::{ClinrankError, Result};
use clinrank_core::types::{
    AncestorEdge, ConceptId, ConceptNode, MetricRecord, RelationshipEdge, METRIC_SCHEMA_VERSION,
};

use crate::authority::AuthorityScorer;
use crate::centrality::{eigenvector_centrality, Convergence};
use crate::hierarchy::compute_depths;

/// A concept whose metrics could not be produced.
#[derive(Debug)]
pub struct MetricFailure {
    pub concept_id: ConceptId,
    pub error: ClinrankError,
}

/// Outcome of one metrics computation.
#[derive(Debug)]
pub struct MetricsReport {
    /// One record per computable concept, ordered by id.
    pub records: Vec<MetricRecord>,
    /// Concepts left without a record, ordered by id.
    pub failures: Vec<MetricFailure>,
    pub convergence: Convergence,
    pub authority_version: u32,
}

/// Computes centrality, depth, and authority for every concept.
///
/// Holds no graph state; each call works on the snapshot it is given and has
/// no side effects.
#[derive(Debug, Clone)]
pub struct MetricsEngine {
    centrality: CentralityConfig,
    authority: Arc<AuthorityScorer>,
}

impl MetricsEngine {
    pub fn new(centrality: CentralityConfig, authority: Arc<AuthorityScorer>) -> Self {
        Self {
            centrality,
            authority,
        }
    }

    pub fn authority(&self) -> &Arc<AuthorityScorer> {
        &self.authority
    }

    pub fn compute(
        &self,
        concepts: &[ConceptNode],
        relationships: &[RelationshipEdge],
        ancestors: &[AncestorEdge],
    ) -> Result<MetricsReport> {
        let mut nodes: Vec<&ConceptNode> = concepts.iter().collect();
        nodes.sort_by_key(|c| c.id);
        nodes.dedup_by_key(|c| c.id);
        let ids: Vec<ConceptId> = nodes.iter().map(|c| c.id).collect();

        let rules = self.authority.rules()?;
        let centrality = eigenvector_centrality(&ids, relationships, &self.centrality);
        if let Some(warning) = centrality.convergence.as_warning() {
            warn!(%warning, "Centrality estimate is unconverged");
        }
        let depths = compute_depths(&ids, ancestors);
        let converged = centrality.convergence.is_converged();

        let results: Vec<std::result::Result<MetricRecord, MetricFailure>> = nodes
            .par_iter()
            .map(|node| {
                let depth = depths.depth(node.id).map_err(|error| MetricFailure {
                    concept_id: node.id,
                    error,
                })?;
                Ok(MetricRecord {
                    concept_id: node.id,
                    centrality: centrality.get(node.id),
                    depth,
                    authority: rules.weight_for(node),
                    schema_version: METRIC_SCHEMA_VERSION,
                    authority_version: rules.version(),
                    centrality_converged: converged,
                })
            })
            .collect();

        let mut records = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(record) => records.push(record),
                Err(failure) => failures.push(failure),
            }
        }

        info!(
            concepts = ids.len(),
            records = records.len(),
            failures = failures.len(),
            cycles = depths.cycles().len(),
            iterations = centrality.convergence.iterations(),
            "Metrics computed"
        );

        Ok(MetricsReport {
            records,
            failures,
            convergence: centrality.convergence,
            authority_version: rules.version(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinrank_core::config::AuthorityConfig;

    fn concept(id: i64, vocabulary: &str) -> ConceptNode {
        ConceptNode {
            id: ConceptId(id),
            vocabulary: vocabulary.to_string(),
            semantic_type: "Clinical Finding".to_string(),
            domain_id: "Condition".to_string(),
            label: format!("concept {}", id),
        }
    }

    fn rel(source: i64, target: i64) -> RelationshipEdge {
        RelationshipEdge {
            source: ConceptId(source),
            target: ConceptId(target),
            kind: "is_a".to_string(),
        }
    }

    fn link(descendant: i64, ancestor: i64) -> AncestorEdge {
        AncestorEdge {
            descendant: ConceptId(descendant),
            ancestor: ConceptId(ancestor),
            distance_hint: None,
        }
    }

    fn engine() -> MetricsEngine {
        let authority = Arc::new(AuthorityScorer::new(AuthorityConfig::default()).unwrap());
        MetricsEngine::new(CentralityConfig::default(), authority)
    }

    #[test]
    fn test_records_for_every_healthy_concept() {
        let concepts = vec![concept(3, "SNOMED"), concept(1, "SNOMED"), concept(2, "LOINC")];
        let report = engine()
            .compute(&concepts, &[rel(1, 2), rel(1, 3)], &[link(2, 1), link(3, 1)])
            .unwrap();

        assert!(report.failures.is_empty());
        let ids: Vec<i64> = report.records.iter().map(|r| r.concept_id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let root = &report.records[0];
        assert_eq!(root.depth, 0);
        assert_eq!(root.centrality, 1.0);
        assert_eq!(root.authority, 1.0);
        assert_eq!(root.schema_version, METRIC_SCHEMA_VERSION);
        assert_eq!(root.authority_version, 1);
        assert!(root.centrality_converged);

        assert_eq!(report.records[1].depth, 1);
        assert_eq!(report.records[1].authority, 0.8);
    }

    #[test]
    fn test_cycle_failures_are_isolated() {
        let concepts = vec![
            concept(1, "SNOMED"),
            concept(2, "SNOMED"),
            concept(7, "SNOMED"),
            concept(8, "SNOMED"),
        ];
        let ancestors = vec![link(2, 1), link(7, 8), link(8, 7)];
        let report = engine().compute(&concepts, &[rel(1, 2)], &ancestors).unwrap();

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.failures.len(), 2);
        for failure in &report.failures {
            assert!(matches!(
                failure.error,
                ClinrankError::MalformedHierarchy { .. }
            ));
        }
        let failed: Vec<i64> = report.failures.iter().map(|f| f.concept_id.0).collect();
        assert_eq!(failed, vec![7, 8]);
    }

    #[test]
    fn test_recompute_is_bit_identical() {
        let concepts: Vec<ConceptNode> = (1..=30).map(|i| concept(i, "SNOMED")).collect();
        let relationships: Vec<RelationshipEdge> =
            (1..30).map(|i| rel(i, (i * 11) % 30 + 1)).collect();
        let ancestors: Vec<AncestorEdge> = (2..=30).map(|i| link(i, i / 2)).collect();

        let engine = engine();
        let first = engine.compute(&concepts, &relationships, &ancestors).unwrap();
        let second = engine.compute(&concepts, &relationships, &ancestors).unwrap();

        assert_eq!(first.records.len(), second.records.len());
        for (a, b) in first.records.iter().zip(&second.records) {
            assert_eq!(a, b);
            assert_eq!(a.centrality.to_bits(), b.centrality.to_bits());
        }
    }

    #[test]
    fn test_records_carry_updated_authority_version() {
        let engine = engine();
        let mut config = AuthorityConfig::default();
        config.floor = 0.2;
        engine.authority().update_rules(config).unwrap();

        let report = engine.compute(&[concept(1, "Local")], &[], &[]).unwrap();
        assert_eq!(report.authority_version, 2);
        assert_eq!(report.records[0].authority_version, 2);
        assert_eq!(report.records[0].authority, 0.2);
        assert_eq!(report.records[0].centrality, 0.0);
    }
}
