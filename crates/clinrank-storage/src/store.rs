//! Read/write contracts the relevance core requires from its store.
//!
//! The core never talks to a storage engine directly; everything goes through
//! these traits so a multi-model database, SQLite, or plain memory can back it.

use std::sync::Arc;

use async_trait::async_trait;

use clinrank_core::error::Result;
use clinrank_core::types::{
    AncestorEdge, ConceptId, ConceptNode, MetricRecord, RelationshipEdge, RelevanceScore,
    Versioned,
};

/// Read access to the raw vocabulary graph.
///
/// Implementations must return a consistent snapshot for the duration of one
/// metrics run.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn load_concepts(&self) -> Result<Vec<ConceptNode>>;

    async fn load_relationships(&self) -> Result<Vec<RelationshipEdge>>;

    async fn load_ancestors(&self) -> Result<Vec<AncestorEdge>>;
}

/// Append-only, versioned storage for per-concept metrics.
#[async_trait]
pub trait MetricSidecar: Send + Sync {
    /// Record a metric for a concept and return the revision it is stored at.
    ///
    /// Writing a record equal to the latest one must not create a new revision.
    async fn upsert_metric(&self, concept_id: ConceptId, record: MetricRecord) -> Result<u64>;

    /// Latest record for a concept together with its revision.
    ///
    /// `None` when the concept has no record or its latest revision retired it.
    async fn get_metric(&self, concept_id: ConceptId) -> Result<Option<Versioned<MetricRecord>>>;

    /// Append a tombstone revision so the concept no longer has a current record.
    ///
    /// Returns the tombstone's revision, or `None` when there was nothing to
    /// retire. A later `upsert_metric` revives the concept at the next revision.
    async fn retire_metric(&self, concept_id: ConceptId) -> Result<Option<u64>>;
}

/// Storage for derived relevance scores keyed by (concept, domain).
///
/// `upsert_score` replaces the whole record in one step; readers observe
/// either the previous record or the new one.
#[async_trait]
pub trait RelevanceStore: Send + Sync {
    /// Store `score` unless the stored record's version is already at or above it.
    ///
    /// The version check and the write happen atomically, so two writers that
    /// both computed version `n` cannot both land. Returns whether the write
    /// was applied.
    async fn upsert_score(
        &self,
        concept_id: ConceptId,
        domain: &str,
        score: RelevanceScore,
    ) -> Result<bool>;

    async fn get_score(
        &self,
        concept_id: ConceptId,
        domain: &str,
    ) -> Result<Option<Arc<RelevanceScore>>>;
}
