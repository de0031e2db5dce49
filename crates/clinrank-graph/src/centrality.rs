//! Eigenvector centrality by power iteration.
//!
//! The relationship graph is treated as undirected. Each iteration computes
//! `x' = x + A·x` and rescales to unit L2 norm; the identity shift keeps the
//! iteration from oscillating on bipartite graphs without changing the
//! dominant eigenvector. Per-node updates run on the rayon pool, reductions
//! run sequentially in node order, so repeated runs are bit-identical.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use clinrank_core::config::CentralityConfig;
use clinrank_core::error::ClinrankError;
use clinrank_core::types::{ConceptId, RelationshipEdge};

/// How the power iteration terminated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Convergence {
    Converged { iterations: usize },
    /// The iteration cap was reached; scores are the last estimate.
    Unconverged { iterations: usize, residual: f64 },
}

impl Convergence {
    pub fn is_converged(&self) -> bool {
        matches!(self, Convergence::Converged { .. })
    }

    pub fn iterations(&self) -> usize {
        match self {
            Convergence::Converged { iterations } | Convergence::Unconverged { iterations, .. } => {
                *iterations
            }
        }
    }

    /// The soft warning to surface when the estimate did not converge.
    pub fn as_warning(&self) -> Option<ClinrankError> {
        match *self {
            Convergence::Converged { .. } => None,
            Convergence::Unconverged {
                iterations,
                residual,
            } => Some(ClinrankError::UnconvergedCentrality {
                iterations,
                residual,
            }),
        }
    }
}

/// Normalized centrality for every concept of one graph snapshot.
#[derive(Debug, Clone)]
pub struct CentralityScores {
    scores: HashMap<ConceptId, f64>,
    pub convergence: Convergence,
}

impl CentralityScores {
    /// Centrality in [0, 1]; concepts outside the graph score 0.
    pub fn get(&self, id: ConceptId) -> f64 {
        self.scores.get(&id).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Undirected weighted adjacency over a dense node index.
struct Adjacency {
    neighbors: Vec<Vec<(usize, f64)>>,
    edge_count: usize,
}

fn relation_weight(config: &CentralityConfig, weights: &HashMap<String, f64>, kind: &str) -> f64 {
    weights
        .get(&kind.to_lowercase())
        .copied()
        .unwrap_or(config.default_relation_weight)
}

fn build_adjacency(
    config: &CentralityConfig,
    index: &HashMap<ConceptId, usize>,
    relationships: &[RelationshipEdge],
) -> Adjacency {
    let weights: HashMap<String, f64> = config
        .relation_weights
        .iter()
        .map(|(kind, w)| (kind.to_lowercase(), *w))
        .collect();

    // Ordered by (low, high) so neighbor lists come out sorted.
    let mut pairs: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for edge in relationships {
        let (Some(&a), Some(&b)) = (index.get(&edge.source), index.get(&edge.target)) else {
            debug!(source = %edge.source, target = %edge.target, "Skipping edge to unknown concept");
            continue;
        };
        if a == b {
            continue;
        }
        let weight = relation_weight(config, &weights, &edge.kind);
        if weight <= 0.0 {
            continue;
        }
        let key = (a.min(b), a.max(b));
        let slot = pairs.entry(key).or_insert(0.0);
        *slot = slot.max(weight);
    }

    let mut neighbors = vec![Vec::new(); index.len()];
    for (&(a, b), &w) in &pairs {
        neighbors[a].push((b, w));
        neighbors[b].push((a, w));
    }

    Adjacency {
        neighbors,
        edge_count: pairs.len(),
    }
}

fn l2_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Compute min-max normalized eigenvector centrality for `concepts`.
///
/// Edges whose endpoints are not in `concepts` and self-loops are ignored.
/// Parallel edges between the same pair keep their largest weight.
pub fn eigenvector_centrality(
    concepts: &[ConceptId],
    relationships: &[RelationshipEdge],
    config: &CentralityConfig,
) -> CentralityScores {
    let mut ids: Vec<ConceptId> = concepts.to_vec();
    ids.sort();
    ids.dedup();

    let n = ids.len();
    if n == 0 {
        return CentralityScores {
            scores: HashMap::new(),
            convergence: Convergence::Converged { iterations: 0 },
        };
    }

    let index: HashMap<ConceptId, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let adjacency = build_adjacency(config, &index, relationships);

    let mut x = vec![1.0 / (n as f64).sqrt(); n];
    let mut convergence = Convergence::Unconverged {
        iterations: 0,
        residual: f64::INFINITY,
    };

    for iteration in 1..=config.max_iterations {
        let mut next: Vec<f64> = (0..n)
            .into_par_iter()
            .map(|i| {
                adjacency.neighbors[i]
                    .iter()
                    .fold(x[i], |acc, &(j, w)| acc + w * x[j])
            })
            .collect();

        let norm = l2_norm(&next);
        if norm > 0.0 {
            for v in &mut next {
                *v /= norm;
            }
        }

        let residual = next
            .iter()
            .zip(&x)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt();
        x = next;

        if residual < config.tolerance {
            convergence = Convergence::Converged {
                iterations: iteration,
            };
            break;
        }
        convergence = Convergence::Unconverged {
            iterations: iteration,
            residual,
        };
    }

    debug!(
        nodes = n,
        edges = adjacency.edge_count,
        iterations = convergence.iterations(),
        converged = convergence.is_converged(),
        "Power iteration finished"
    );

    let normalized = min_max(&x, adjacency.edge_count > 0);
    CentralityScores {
        scores: ids.into_iter().zip(normalized).collect(),
        convergence,
    }
}

/// Rescale to [0, 1]. A flat vector maps to 1.0 when the graph has edges.
fn min_max(values: &[f64], has_edges: bool) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    if range <= f64::EPSILON {
        let flat = if has_edges { 1.0 } else { 0.0 };
        return vec![flat; values.len()];
    }
    values
        .iter()
        .map(|v| ((v - min) / range).clamp(0.0, 1.0))
        .collect()
}
