//! Hierarchy depth over the ancestor graph.
//!
//! Depth is the shortest distance from a concept to any root (a concept with
//! no ancestors), counting each edge by its distance hint. Ancestor cycles are
//! found with Tarjan's strongly-connected-components algorithm; every concept
//! that can reach a cycle is left without a depth, the rest are unaffected.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use tracing::warn;

use clinrank_core::error::{ClinrankError, Result};
use clinrank_core::types::{AncestorEdge, ConceptId};

/// Depths for one snapshot of the ancestor graph.
#[derive(Debug, Clone, Default)]
pub struct HierarchyDepths {
    depths: HashMap<ConceptId, u32>,
    /// Concept → index into `cycles` of the cycle its ancestry reaches.
    malformed: HashMap<ConceptId, usize>,
    cycles: Vec<Vec<ConceptId>>,
}

impl HierarchyDepths {
    /// Depth of a concept, or `MalformedHierarchy` naming the cycle it reaches.
    ///
    /// Concepts absent from the ancestor graph have no ancestors and are roots.
    pub fn depth(&self, id: ConceptId) -> Result<u32> {
        if let Some(&cycle) = self.malformed.get(&id) {
            return Err(ClinrankError::MalformedHierarchy {
                cycle: self.cycles[cycle].clone(),
            });
        }
        Ok(self.depths.get(&id).copied().unwrap_or(0))
    }

    /// Every ancestor cycle found, each sorted by concept id.
    pub fn cycles(&self) -> &[Vec<ConceptId>] {
        &self.cycles
    }

    pub fn malformed_count(&self) -> usize {
        self.malformed.len()
    }
}

/// Compute depths for `concepts` and every concept referenced by `ancestors`.
pub fn compute_depths(concepts: &[ConceptId], ancestors: &[AncestorEdge]) -> HierarchyDepths {
    let mut ids: Vec<ConceptId> = concepts
        .iter()
        .copied()
        .chain(ancestors.iter().flat_map(|e| [e.descendant, e.ancestor]))
        .collect();
    ids.sort();
    ids.dedup();

    let index: HashMap<ConceptId, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let n = ids.len();

    // up: descendant -> ancestors, down: ancestor -> descendants.
    let mut up: Vec<Vec<(usize, u32)>> = vec![Vec::new(); n];
    let mut down: Vec<Vec<(usize, u32)>> = vec![Vec::new(); n];
    for edge in ancestors.iter().filter(|e| !e.is_reflexive()) {
        let d = index[&edge.descendant];
        let a = index[&edge.ancestor];
        up[d].push((a, edge.length()));
        down[a].push((d, edge.length()));
    }
    for list in up.iter_mut().chain(down.iter_mut()) {
        list.sort_unstable();
        list.dedup();
    }

    let successors: Vec<Vec<usize>> = up
        .iter()
        .map(|edges| edges.iter().map(|(a, _)| *a).collect())
        .collect();
    let mut cyclic: Vec<Vec<usize>> = strongly_connected(&successors)
        .into_iter()
        .filter(|component| component.len() > 1)
        .collect();
    for component in &mut cyclic {
        component.sort_unstable();
    }
    cyclic.sort();

    // Everything that can reach a cycle, found by walking down from it.
    let mut owner: Vec<Option<usize>> = vec![None; n];
    for (cycle_idx, component) in cyclic.iter().enumerate() {
        let mut queue: VecDeque<usize> = VecDeque::new();
        for &node in component {
            if owner[node].is_none() {
                owner[node] = Some(cycle_idx);
                queue.push_back(node);
            }
        }
        while let Some(node) = queue.pop_front() {
            for &(child, _) in &down[node] {
                if owner[child].is_none() {
                    owner[child] = Some(cycle_idx);
                    queue.push_back(child);
                }
            }
        }
    }

    let cycles: Vec<Vec<ConceptId>> = cyclic
        .iter()
        .map(|component| component.iter().map(|&i| ids[i]).collect())
        .collect();
    for cycle in &cycles {
        warn!(cycle = ?cycle, "Ancestor cycle detected; dependent depths skipped");
    }

    let distances = shortest_from_roots(&up, &down, &owner);

    let mut depths = HashMap::with_capacity(n);
    let mut malformed = HashMap::new();
    for (i, id) in ids.iter().enumerate() {
        match (owner[i], distances[i]) {
            (Some(cycle), _) => {
                malformed.insert(*id, cycle);
            }
            (None, Some(d)) => {
                depths.insert(*id, u32::try_from(d).unwrap_or(u32::MAX));
            }
            // Unreachable for an acyclic remainder; treat as a root.
            (None, None) => {
                depths.insert(*id, 0);
            }
        }
    }

    HierarchyDepths {
        depths,
        malformed,
        cycles,
    }
}

/// Multi-source shortest distances from every root, skipping malformed nodes.
fn shortest_from_roots(
    up: &[Vec<(usize, u32)>],
    down: &[Vec<(usize, u32)>],
    owner: &[Option<usize>],
) -> Vec<Option<u64>> {
    let n = up.len();
    let mut dist: Vec<Option<u64>> = vec![None; n];
    let roots = (0..n).filter(|&i| owner[i].is_none() && up[i].is_empty());
    let unit = down.iter().flatten().all(|(_, len)| *len == 1);

    if unit {
        let mut queue = VecDeque::new();
        for root in roots {
            dist[root] = Some(0);
            queue.push_back(root);
        }
        while let Some(node) = queue.pop_front() {
            let next = dist[node].unwrap_or(0) + 1;
            for &(child, _) in &down[node] {
                if owner[child].is_none() && dist[child].is_none() {
                    dist[child] = Some(next);
                    queue.push_back(child);
                }
            }
        }
        return dist;
    }

    let mut heap = BinaryHeap::new();
    for root in roots {
        dist[root] = Some(0);
        heap.push(Reverse((0u64, root)));
    }
    while let Some(Reverse((d, node))) = heap.pop() {
        if dist[node].is_some_and(|best| d > best) {
            continue;
        }
        for &(child, len) in &down[node] {
            if owner[child].is_some() {
                continue;
            }
            let candidate = d + u64::from(len);
            if dist[child].map_or(true, |best| candidate < best) {
                dist[child] = Some(candidate);
                heap.push(Reverse((candidate, child)));
            }
        }
    }
    dist
}

/// Tarjan's algorithm with an explicit call stack.
fn strongly_connected(successors: &[Vec<usize>]) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;

    let n = successors.len();
    let mut index = vec![UNVISITED; n];
    let mut low = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut stack = Vec::new();
    let mut call: Vec<(usize, usize)> = Vec::new();
    let mut next_index = 0;
    let mut components = Vec::new();

    for start in 0..n {
        if index[start] != UNVISITED {
            continue;
        }
        index[start] = next_index;
        low[start] = next_index;
        next_index += 1;
        stack.push(start);
        on_stack[start] = true;
        call.push((start, 0));

        while let Some(frame) = call.last_mut() {
            let v = frame.0;
            if frame.1 < successors[v].len() {
                let w = successors[v][frame.1];
                frame.1 += 1;
                if index[w] == UNVISITED {
                    index[w] = next_index;
                    low[w] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    call.push((w, 0));
                } else if on_stack[w] {
                    low[v] = low[v].min(index[w]);
                }
                continue;
            }

            call.pop();
            if low[v] == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                components.push(component);
            }
            if let Some(&(parent, _)) = call.last() {
                low[parent] = low[parent].min(low[v]);
            }
        }
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(descendant: i64, ancestor: i64, hint: Option<u32>) -> AncestorEdge {
        AncestorEdge {
            descendant: ConceptId(descendant),
            ancestor: ConceptId(ancestor),
            distance_hint: hint,
        }
    }

    #[test]
    fn test_chain_depths() {
        // 3 -> 2 -> 1 (root)
        let edges = vec![link(3, 2, None), link(2, 1, None)];
        let concepts = vec![ConceptId(1), ConceptId(2), ConceptId(3)];
        let depths = compute_depths(&concepts, &edges);

        assert_eq!(depths.depth(ConceptId(1)).unwrap(), 0);
        assert_eq!(depths.depth(ConceptId(2)).unwrap(), 1);
        assert_eq!(depths.depth(ConceptId(3)).unwrap(), 2);
        assert!(depths.cycles().is_empty());
    }

    #[test]
    fn test_depth_takes_nearest_root() {
        // 4 reaches root 1 in two steps and root 5 in one.
        let edges = vec![link(4, 3, None), link(3, 1, None), link(4, 5, None)];
        let depths = compute_depths(&[ConceptId(4)], &edges);
        assert_eq!(depths.depth(ConceptId(4)).unwrap(), 1);
    }

    #[test]
    fn test_distance_hints_weight_edges() {
        // Transitive closure rows as in concept_ancestor, including reflexive ones.
        let edges = vec![
            link(1, 1, Some(0)),
            link(2, 2, Some(0)),
            link(3, 3, Some(0)),
            link(2, 1, Some(1)),
            link(3, 2, Some(1)),
            link(3, 1, Some(2)),
        ];
        let depths = compute_depths(&[], &edges);
        assert_eq!(depths.depth(ConceptId(1)).unwrap(), 0);
        assert_eq!(depths.depth(ConceptId(2)).unwrap(), 1);
        assert_eq!(depths.depth(ConceptId(3)).unwrap(), 2);

        let weighted = compute_depths(&[], &[link(9, 8, Some(4)), link(9, 7, Some(6))]);
        assert_eq!(weighted.depth(ConceptId(9)).unwrap(), 4);
    }

    #[test]
    fn test_concept_without_ancestors_is_root() {
        let depths = compute_depths(&[ConceptId(42)], &[]);
        assert_eq!(depths.depth(ConceptId(42)).unwrap(), 0);
    }

    #[test]
    fn test_cycle_only_affects_its_subgraph() {
        // 10 <-> 11 is a cycle; 12 sits below it. 1 <- 2 is healthy.
        let edges = vec![
            link(10, 11, None),
            link(11, 10, None),
            link(12, 10, None),
            link(2, 1, None),
        ];
        let concepts: Vec<ConceptId> = [1, 2, 10, 11, 12].into_iter().map(ConceptId).collect();
        let depths = compute_depths(&concepts, &edges);

        assert_eq!(depths.cycles(), &[vec![ConceptId(10), ConceptId(11)]]);
        assert_eq!(depths.malformed_count(), 3);
        for id in [10, 11, 12] {
            match depths.depth(ConceptId(id)) {
                Err(ClinrankError::MalformedHierarchy { cycle }) => {
                    assert_eq!(cycle, vec![ConceptId(10), ConceptId(11)]);
                }
                other => panic!("expected MalformedHierarchy for {}, got {:?}", id, other),
            }
        }
        assert_eq!(depths.depth(ConceptId(1)).unwrap(), 0);
        assert_eq!(depths.depth(ConceptId(2)).unwrap(), 1);
    }

    #[test]
    fn test_ancestor_of_cycle_keeps_depth() {
        // Cycle 5 <-> 6 points up to root 1; 1 itself is fine.
        let edges = vec![link(5, 6, None), link(6, 5, None), link(6, 1, None)];
        let depths = compute_depths(&[], &edges);
        assert_eq!(depths.depth(ConceptId(1)).unwrap(), 0);
        assert!(depths.depth(ConceptId(5)).is_err());
        assert!(depths.depth(ConceptId(6)).is_err());
    }

    #[test]
    fn test_long_cycle_is_detected() {
        let mut edges: Vec<AncestorEdge> = (1..100).map(|i| link(i, i + 1, None)).collect();
        edges.push(link(100, 1, None));
        let depths = compute_depths(&[], &edges);
        assert_eq!(depths.cycles().len(), 1);
        assert_eq!(depths.cycles()[0].len(), 100);
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let edges: Vec<AncestorEdge> = (1..50_000).map(|i| link(i + 1, i, None)).collect();
        let depths = compute_depths(&[], &edges);
        assert_eq!(depths.depth(ConceptId(50_000)).unwrap(), 49_999);
    }
}
