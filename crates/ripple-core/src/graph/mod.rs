//! Variable-level dependency graph over notebook cells.
//!
//! An edge `writer → dependent` exists when some variable is in the writer's
//! `writes` and the dependent's `reads`. The forward and reverse maps are the
//! primary representation (they must compare structurally equal across
//! rebuilds); petgraph is used for whole-graph cycle detection.

use std::collections::BTreeSet;

use petgraph::graph::DiGraph;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};
use crate::notebook::{Cell, CellId};

/// Forward (`writer → dependents`) and reverse (`dependent → writers`) edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    forward: FxHashMap<CellId, BTreeSet<CellId>>,
    reverse: FxHashMap<CellId, BTreeSet<CellId>>,
}

impl DependencyGraph {
    /// Rebuild from full cells.
    pub fn rebuild(cells: &[Cell]) -> Self {
        Self::rebuild_from_parts(cells.iter().map(|c| (c.id, &c.reads, &c.writes)))
    }

    /// Rebuild from `(id, reads, writes)` projections.
    ///
    /// Multiple writers of one name all contribute edges (fan-in allowed);
    /// a cell reading a name it also writes contributes no self-edge.
    pub fn rebuild_from_parts<'a>(
        parts: impl Iterator<Item = (CellId, &'a BTreeSet<String>, &'a BTreeSet<String>)> + Clone,
    ) -> Self {
        let mut writers: FxHashMap<&str, Vec<CellId>> = FxHashMap::default();
        for (id, _, writes) in parts.clone() {
            for name in writes {
                writers.entry(name.as_str()).or_default().push(id);
            }
        }

        let mut graph = Self::default();
        for (dependent, reads, _) in parts {
            for name in reads {
                let Some(producing) = writers.get(name.as_str()) else {
                    continue;
                };
                for &writer in producing {
                    if writer == dependent {
                        continue;
                    }
                    graph.forward.entry(writer).or_default().insert(dependent);
                    graph.reverse.entry(dependent).or_default().insert(writer);
                }
            }
        }
        graph
    }

    /// Direct dependents of a cell.
    pub fn dependents(&self, id: CellId) -> impl Iterator<Item = CellId> + '_ {
        self.forward.get(&id).into_iter().flatten().copied()
    }

    /// Direct writers a cell depends on.
    pub fn dependencies(&self, id: CellId) -> impl Iterator<Item = CellId> + '_ {
        self.reverse.get(&id).into_iter().flatten().copied()
    }

    /// All edges as `(writer, dependent)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (CellId, CellId)> + '_ {
        self.forward
            .iter()
            .flat_map(|(&from, tos)| tos.iter().map(move |&to| (from, to)))
    }

    pub fn edge_count(&self) -> usize {
        self.forward.values().map(BTreeSet::len).sum()
    }

    /// Transitive forward closure of a cell, excluding the cell itself.
    pub fn dependents_closure(&self, id: CellId) -> FxHashSet<CellId> {
        let mut seen = FxHashSet::default();
        let mut queue: Vec<CellId> = self.dependents(id).collect();
        while let Some(next) = queue.pop() {
            if seen.insert(next) {
                queue.extend(self.dependents(next));
            }
        }
        seen
    }

    /// Kahn's algorithm restricted to `subset`, using only edges with both
    /// endpoints inside it. Zero-in-degree ties break by `position`
    /// (document order), which makes cascades deterministic.
    pub fn topological_sort(
        &self,
        subset: &[CellId],
        position: impl Fn(CellId) -> usize,
    ) -> Result<Vec<CellId>> {
        let members: FxHashSet<CellId> = subset.iter().copied().collect();
        let mut in_degree: FxHashMap<CellId, usize> =
            members.iter().map(|&id| (id, 0)).collect();
        for &id in &members {
            for dep in self.dependents(id) {
                if members.contains(&dep) {
                    *in_degree.entry(dep).or_insert(0) += 1;
                }
            }
        }

        let mut ready: Vec<CellId> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();
        ready.sort_by_key(|&id| position(id));

        let mut order = Vec::with_capacity(members.len());
        while !ready.is_empty() {
            // Lowest position first among currently-ready cells.
            let next = ready.remove(0);
            order.push(next);
            for dep in self.dependents(next) {
                if !members.contains(&dep) {
                    continue;
                }
                let degree = in_degree.get_mut(&dep).expect("member degree");
                *degree -= 1;
                if *degree == 0 {
                    ready.push(dep);
                }
            }
            ready.sort_by_key(|&id| position(id));
        }

        if order.len() != members.len() {
            let stuck: Vec<String> = members
                .iter()
                .filter(|id| !order.contains(id))
                .map(|id| id.to_string())
                .collect();
            return Err(Error::CyclicDependency(format!(
                "cycle within cells [{}]",
                stuck.join(", ")
            )));
        }
        Ok(order)
    }

    /// Whether the graph contains any cycle.
    pub fn has_cycle(&self) -> bool {
        !self.cycle_members().is_empty()
    }

    /// Cells participating in the first detected cycle, if any.
    pub fn cycle_members(&self) -> Vec<CellId> {
        use petgraph::algo::kosaraju_scc;

        let mut pg: DiGraph<CellId, ()> = DiGraph::new();
        let mut indices = FxHashMap::default();
        let ids: FxHashSet<CellId> = self
            .forward
            .keys()
            .chain(self.reverse.keys())
            .copied()
            .collect();
        for id in ids {
            indices.insert(id, pg.add_node(id));
        }
        for (from, to) in self.edges() {
            pg.add_edge(indices[&from], indices[&to], ());
        }

        for scc in kosaraju_scc(&pg) {
            if scc.len() > 1 {
                let mut members: Vec<CellId> = scc.into_iter().map(|idx| pg[idx]).collect();
                members.sort();
                return members;
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::CellType;

    fn make_cell(code_writes: &[&str], code_reads: &[&str], position: usize) -> Cell {
        let mut cell = Cell::new(CellType::Python, "", position);
        cell.writes = code_writes.iter().map(|s| s.to_string()).collect();
        cell.reads = code_reads.iter().map(|s| s.to_string()).collect();
        cell
    }

    #[test]
    fn test_linear_chain() {
        let a = make_cell(&["x"], &[], 0);
        let b = make_cell(&["y"], &["x"], 1);
        let c = make_cell(&["z"], &["y"], 2);
        let cells = vec![a.clone(), b.clone(), c.clone()];
        let graph = DependencyGraph::rebuild(&cells);

        assert_eq!(graph.edge_count(), 2);
        assert!(graph.dependents(a.id).any(|id| id == b.id));
        assert!(graph.dependencies(c.id).any(|id| id == b.id));
    }

    #[test]
    fn test_forward_reverse_are_inverses() {
        let a = make_cell(&["x", "w"], &[], 0);
        let b = make_cell(&["y"], &["x"], 1);
        let c = make_cell(&[], &["x", "y", "w"], 2);
        let graph = DependencyGraph::rebuild(&[a, b, c]);

        let forward: Vec<_> = graph.edges().collect();
        for (from, to) in forward {
            assert!(graph.dependencies(to).any(|id| id == from));
        }
    }

    #[test]
    fn test_multiple_shared_variables_single_edge() {
        let a = make_cell(&["x", "y"], &[], 0);
        let b = make_cell(&[], &["x", "y"], 1);
        let graph = DependencyGraph::rebuild(&[a, b]);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_fan_in_multiple_writers() {
        let a = make_cell(&["x"], &[], 0);
        let b = make_cell(&["x"], &[], 1);
        let c = make_cell(&[], &["x"], 2);
        let graph = DependencyGraph::rebuild(&[a.clone(), b.clone(), c.clone()]);
        assert_eq!(graph.edge_count(), 2);
        let writers: Vec<_> = graph.dependencies(c.id).collect();
        assert_eq!(writers.len(), 2);
    }

    #[test]
    fn test_no_self_edge() {
        let a = make_cell(&["x"], &["x"], 0);
        let graph = DependencyGraph::rebuild(&[a]);
        assert_eq!(graph.edge_count(), 0);
        assert!(!graph.has_cycle());
    }

    #[test]
    fn test_dependents_closure() {
        let a = make_cell(&["x"], &[], 0);
        let b = make_cell(&["y"], &["x"], 1);
        let c = make_cell(&["z"], &["y"], 2);
        let d = make_cell(&["q"], &[], 3);
        let cells = vec![a.clone(), b.clone(), c.clone(), d.clone()];
        let graph = DependencyGraph::rebuild(&cells);

        let closure = graph.dependents_closure(a.id);
        assert!(closure.contains(&b.id));
        assert!(closure.contains(&c.id));
        assert!(!closure.contains(&d.id));
        assert!(!closure.contains(&a.id));
    }

    #[test]
    fn test_topological_sort_position_tiebreak() {
        // b and c both depend on a and are independent of each other;
        // document order decides.
        let a = make_cell(&["x"], &[], 0);
        let b = make_cell(&["y"], &["x"], 1);
        let c = make_cell(&["z"], &["x"], 2);
        let cells = vec![a.clone(), b.clone(), c.clone()];
        let graph = DependencyGraph::rebuild(&cells);

        let positions: FxHashMap<CellId, usize> =
            cells.iter().map(|cell| (cell.id, cell.position)).collect();
        let order = graph
            .topological_sort(&[a.id, b.id, c.id], |id| positions[&id])
            .unwrap();
        assert_eq!(order, vec![a.id, b.id, c.id]);
    }

    #[test]
    fn test_topological_sort_restricted_subset() {
        let a = make_cell(&["x"], &[], 0);
        let b = make_cell(&["y"], &["x"], 1);
        let c = make_cell(&["z"], &["y"], 2);
        let cells = vec![a.clone(), b.clone(), c.clone()];
        let graph = DependencyGraph::rebuild(&cells);
        let positions: FxHashMap<CellId, usize> =
            cells.iter().map(|cell| (cell.id, cell.position)).collect();

        // Subset excludes b: the a→b→c chain edges do not apply, so only
        // edges inside {a, c} count — there are none.
        let order = graph
            .topological_sort(&[c.id, a.id], |id| positions[&id])
            .unwrap();
        assert_eq!(order, vec![a.id, c.id]);
    }

    #[test]
    fn test_cycle_detection() {
        let mut a = make_cell(&["x"], &["y"], 0);
        let mut b = make_cell(&["y"], &["x"], 1);
        a.position = 0;
        b.position = 1;
        let graph = DependencyGraph::rebuild(&[a.clone(), b.clone()]);
        assert!(graph.has_cycle());
        let members = graph.cycle_members();
        assert_eq!(members.len(), 2);

        let positions: FxHashMap<CellId, usize> = [(a.id, 0), (b.id, 1)].into_iter().collect();
        assert!(graph
            .topological_sort(&[a.id, b.id], |id| positions[&id])
            .is_err());
    }

    #[test]
    fn test_transitive_cycle_three_cells() {
        let a = make_cell(&["x"], &["z"], 0);
        let b = make_cell(&["y"], &["x"], 1);
        let c = make_cell(&["z"], &["y"], 2);
        let graph = DependencyGraph::rebuild(&[a, b, c]);
        assert!(graph.has_cycle());
        assert_eq!(graph.cycle_members().len(), 3);
    }

    #[test]
    fn test_rebuild_equality_is_deterministic() {
        let a = make_cell(&["x"], &[], 0);
        let b = make_cell(&["y"], &["x"], 1);
        let cells = vec![a, b];
        assert_eq!(
            DependencyGraph::rebuild(&cells),
            DependencyGraph::rebuild(&cells)
        );
    }

    #[test]
    fn test_diamond_order() {
        let a = make_cell(&["x"], &[], 0);
        let b = make_cell(&["y"], &["x"], 1);
        let c = make_cell(&["z"], &["x"], 2);
        let d = make_cell(&["w"], &["y", "z"], 3);
        let cells = vec![a.clone(), b.clone(), c.clone(), d.clone()];
        let graph = DependencyGraph::rebuild(&cells);
        let positions: FxHashMap<CellId, usize> =
            cells.iter().map(|cell| (cell.id, cell.position)).collect();

        let order = graph
            .topological_sort(&[d.id, c.id, b.id, a.id], |id| positions[&id])
            .unwrap();
        assert_eq!(order, vec![a.id, b.id, c.id, d.id]);
    }
}
