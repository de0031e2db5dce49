//! In-memory implementations of the metric sidecar and relevance store.
//!
//! Thread-safe via interior `RwLock`s, mirroring the in-memory vector index.
//! Used by tests and by the CLI when no database path is configured.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use clinrank_core::error::{ClinrankError, Result};
use clinrank_core::types::{ConceptId, MetricRecord, RelevanceScore, Versioned};

use crate::store::{MetricSidecar, RelevanceStore};

fn poisoned<E: std::fmt::Display>(e: E) -> ClinrankError {
    ClinrankError::Storage(format!("Lock poisoned: {}", e))
}

fn check_concept(concept_id: ConceptId, record_id: ConceptId) -> Result<()> {
    if concept_id != record_id {
        return Err(ClinrankError::Storage(format!(
            "Record for concept {} written under key {}",
            record_id, concept_id
        )));
    }
    Ok(())
}

/// Append-only metric sidecar keeping every revision per concept.
///
/// A `None` revision is a tombstone left by `retire_metric`.
#[derive(Debug, Default)]
pub struct InMemoryMetricSidecar {
    history: RwLock<HashMap<ConceptId, Vec<Versioned<Option<MetricRecord>>>>>,
}

impl InMemoryMetricSidecar {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored revisions for a concept, oldest first.
    pub fn history(&self, concept_id: ConceptId) -> Result<Vec<Versioned<Option<MetricRecord>>>> {
        let history = self.history.read().map_err(poisoned)?;
        Ok(history.get(&concept_id).cloned().unwrap_or_default())
    }

    /// Number of concepts with at least one revision, retired ones included.
    pub fn len(&self) -> usize {
        self.history.read().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MetricSidecar for InMemoryMetricSidecar {
    async fn upsert_metric(&self, concept_id: ConceptId, record: MetricRecord) -> Result<u64> {
        check_concept(concept_id, record.concept_id)?;
        let mut history = self.history.write().map_err(poisoned)?;
        let revisions = history.entry(concept_id).or_default();

        if let Some(latest) = revisions.last() {
            if latest.value.as_ref() == Some(&record) {
                return Ok(latest.revision);
            }
        }

        let revision = revisions.last().map(|v| v.revision + 1).unwrap_or(1);
        revisions.push(Versioned {
            revision,
            value: Some(record),
        });
        Ok(revision)
    }

    async fn get_metric(&self, concept_id: ConceptId) -> Result<Option<Versioned<MetricRecord>>> {
        let history = self.history.read().map_err(poisoned)?;
        Ok(history.get(&concept_id).and_then(|r| r.last()).and_then(|latest| {
            latest.value.clone().map(|value| Versioned {
                revision: latest.revision,
                value,
            })
        }))
    }

    async fn retire_metric(&self, concept_id: ConceptId) -> Result<Option<u64>> {
        let mut history = self.history.write().map_err(poisoned)?;
        let Some(revisions) = history.get_mut(&concept_id) else {
            return Ok(None);
        };
        let revision = match revisions.last() {
            Some(latest) if latest.value.is_some() => latest.revision + 1,
            _ => return Ok(None),
        };
        revisions.push(Versioned {
            revision,
            value: None,
        });
        Ok(Some(revision))
    }
}

/// Relevance store holding one shared record per (concept, domain).
///
/// Records are swapped as whole `Arc`s, so a concurrent reader holds either
/// the old record or the new one.
#[derive(Debug, Default)]
pub struct InMemoryRelevanceStore {
    scores: RwLock<HashMap<(ConceptId, String), Arc<RelevanceScore>>>,
}

impl InMemoryRelevanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored score for a domain, in no particular order.
    pub fn scores_for_domain(&self, domain: &str) -> Result<Vec<Arc<RelevanceScore>>> {
        let scores = self.scores.read().map_err(poisoned)?;
        Ok(scores
            .iter()
            .filter(|((_, d), _)| d == domain)
            .map(|(_, s)| Arc::clone(s))
            .collect())
    }

    pub fn len(&self) -> usize {
        self.scores.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RelevanceStore for InMemoryRelevanceStore {
    async fn upsert_score(
        &self,
        concept_id: ConceptId,
        domain: &str,
        score: RelevanceScore,
    ) -> Result<bool> {
        check_concept(concept_id, score.concept_id)?;
        if score.domain != domain {
            return Err(ClinrankError::Storage(format!(
                "Score for domain '{}' written under domain '{}'",
                score.domain, domain
            )));
        }
        let mut scores = self.scores.write().map_err(poisoned)?;
        let key = (concept_id, domain.to_string());
        if let Some(stored) = scores.get(&key) {
            if stored.version >= score.version {
                return Ok(false);
            }
        }
        scores.insert(key, Arc::new(score));
        Ok(true)
    }

    async fn get_score(
        &self,
        concept_id: ConceptId,
        domain: &str,
    ) -> Result<Option<Arc<RelevanceScore>>> {
        let scores = self.scores.read().map_err(poisoned)?;
        Ok(scores.get(&(concept_id, domain.to_string())).cloned())
    }
}
