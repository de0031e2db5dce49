//! Domain clusters and their centroids.
//!
//! A centroid is the L2-normalized mean of the member embeddings. Members
//! without an embedding are left out of the mean but kept in the member set.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use clinrank_core::error::{ClinrankError, Result};
use clinrank_core::types::{ConceptId, DomainProfile};

use crate::index::EmbeddingIndex;

/// Registry of domain profiles keyed by label.
#[derive(Debug, Default)]
pub struct DomainRegistry {
    profiles: RwLock<HashMap<String, Arc<DomainProfile>>>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> ClinrankError {
    ClinrankError::Storage(format!("Lock poisoned: {}", e))
}

/// Mean of the member embeddings, L2-normalized.
pub fn compute_centroid(
    label: &str,
    members: &[ConceptId],
    index: &EmbeddingIndex,
) -> Result<Vec<f32>> {
    let mut sum: Vec<f64> = Vec::new();
    let mut counted = 0usize;

    for id in members {
        let Some(record) = index.get(*id)? else {
            debug!(domain = %label, concept_id = %id, "Member has no embedding");
            continue;
        };
        if sum.is_empty() {
            sum = vec![0.0; record.vector.len()];
        }
        for (acc, v) in sum.iter_mut().zip(&record.vector) {
            *acc += *v as f64;
        }
        counted += 1;
    }

    if counted == 0 {
        return Err(ClinrankError::EmptyDomain(label.to_string()));
    }

    let norm = sum.iter().map(|v| v * v).sum::<f64>().sqrt();
    let scale = if norm > 0.0 { norm } else { counted as f64 };
    Ok(sum.into_iter().map(|v| (v / scale) as f32).collect())
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build or rebuild the profile for `label`.
    ///
    /// The revision increments only when the centroid or member set changes.
    pub fn upsert(
        &self,
        label: &str,
        members: &[ConceptId],
        index: &EmbeddingIndex,
    ) -> Result<Arc<DomainProfile>> {
        let mut members = members.to_vec();
        members.sort();
        members.dedup();
        let centroid = compute_centroid(label, &members, index)?;

        let mut profiles = self.profiles.write().map_err(poisoned)?;
        if let Some(existing) = profiles.get(label) {
            if existing.centroid == centroid && existing.members == members {
                return Ok(Arc::clone(existing));
            }
        }

        let revision = profiles.get(label).map(|p| p.revision + 1).unwrap_or(1);
        let profile = Arc::new(DomainProfile {
            label: label.to_string(),
            centroid,
            members,
            revision,
        });
        profiles.insert(label.to_string(), Arc::clone(&profile));
        info!(
            domain = %label,
            members = profile.members.len(),
            revision,
            "Domain profile updated"
        );
        Ok(profile)
    }

    pub fn get(&self, label: &str) -> Result<Option<Arc<DomainProfile>>> {
        let profiles = self.profiles.read().map_err(poisoned)?;
        Ok(profiles.get(label).cloned())
    }

    /// Registered labels, sorted.
    pub fn labels(&self) -> Result<Vec<String>> {
        let profiles = self.profiles.read().map_err(poisoned)?;
        let mut labels: Vec<String> = profiles.keys().cloned().collect();
        labels.sort();
        Ok(labels)
    }
}
