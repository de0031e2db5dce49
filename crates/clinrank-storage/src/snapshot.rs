//! JSON graph snapshot: a self-contained export of the vocabulary graph.
//!
//! A snapshot bundles concepts, relationships, ancestors, and optionally
//! precomputed embeddings and domain membership. It implements
//! [`GraphStore`], so a metrics run can be driven straight from a file.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use clinrank_core::error::Result;
use clinrank_core::types::{
    AncestorEdge, ConceptId, ConceptNode, EmbeddingRecord, RelationshipEdge,
};

use crate::store::GraphStore;

/// Membership of one named domain cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSpec {
    pub label: String,
    #[serde(default)]
    pub members: Vec<ConceptId>,
}

/// A consistent, immutable snapshot of the raw graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub concepts: Vec<ConceptNode>,
    #[serde(default)]
    pub relationships: Vec<RelationshipEdge>,
    #[serde(default)]
    pub ancestors: Vec<AncestorEdge>,
    #[serde(default)]
    pub embeddings: Vec<EmbeddingRecord>,
    /// Explicit domain clusters. When empty, clusters are derived from each
    /// concept's `domain_id`.
    #[serde(default)]
    pub domains: Vec<DomainSpec>,
}

impl GraphSnapshot {
    /// Read a snapshot from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot = Self::from_json(&content)?;
        info!(
            path = %path.display(),
            concepts = snapshot.concepts.len(),
            relationships = snapshot.relationships.len(),
            ancestors = snapshot.ancestors.len(),
            embeddings = snapshot.embeddings.len(),
            "Graph snapshot loaded"
        );
        Ok(snapshot)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Write the snapshot as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Domain clusters, sorted by label with members sorted by id.
    pub fn domain_specs(&self) -> Vec<DomainSpec> {
        let mut grouped: BTreeMap<String, Vec<ConceptId>> = BTreeMap::new();

        if self.domains.is_empty() {
            for concept in &self.concepts {
                if concept.domain_id.is_empty() {
                    continue;
                }
                grouped
                    .entry(concept.domain_id.clone())
                    .or_default()
                    .push(concept.id);
            }
        } else {
            for spec in &self.domains {
                grouped
                    .entry(spec.label.clone())
                    .or_default()
                    .extend(spec.members.iter().copied());
            }
        }

        grouped
            .into_iter()
            .map(|(label, mut members)| {
                members.sort();
                members.dedup();
                DomainSpec { label, members }
            })
            .collect()
    }
}

#[async_trait]
impl GraphStore for GraphSnapshot {
    async fn load_concepts(&self) -> Result<Vec<ConceptNode>> {
        Ok(self.concepts.clone())
    }

    async fn load_relationships(&self) -> Result<Vec<RelationshipEdge>> {
        Ok(self.relationships.clone())
    }

    async fn load_ancestors(&self) -> Result<Vec<AncestorEdge>> {
        Ok(self.ancestors.clone())
    }
}
