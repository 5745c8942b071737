//! Property tests for the analyzer and the dependency graph.

use std::collections::BTreeSet;

use proptest::prelude::*;

use ripple_core::analyze::{analyze_cell, analyze_python};
use ripple_core::graph::DependencyGraph;
use ripple_core::notebook::{Cell, CellType};

fn var_name() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "a", "b", "c", "x", "y", "z", "total", "rows", "scale",
    ])
    .prop_map(str::to_string)
}

fn var_set() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set(var_name(), 0..4)
}

fn cell_from_sets(reads: BTreeSet<String>, writes: BTreeSet<String>, position: usize) -> Cell {
    let mut cell = Cell::new(CellType::Python, "", position);
    cell.reads = reads;
    cell.writes = writes;
    cell
}

proptest! {
    /// Forward and reverse edge maps are exact inverses.
    #[test]
    fn graph_forward_reverse_are_inverses(
        sets in prop::collection::vec((var_set(), var_set()), 1..8)
    ) {
        let cells: Vec<Cell> = sets
            .into_iter()
            .enumerate()
            .map(|(i, (reads, writes))| cell_from_sets(reads, writes, i))
            .collect();
        let graph = DependencyGraph::rebuild(&cells);

        for (from, to) in graph.edges() {
            prop_assert!(graph.dependencies(to).any(|id| id == from));
            prop_assert!(from != to, "no self edges");
        }
        // Every reverse edge appears forward too.
        for cell in &cells {
            for writer in graph.dependencies(cell.id) {
                prop_assert!(graph.dependents(writer).any(|id| id == cell.id));
            }
        }
    }

    /// Rebuilding is insensitive to cell order.
    #[test]
    fn graph_rebuild_is_order_independent(
        sets in prop::collection::vec((var_set(), var_set()), 1..8),
        seed in any::<u64>(),
    ) {
        let cells: Vec<Cell> = sets
            .into_iter()
            .enumerate()
            .map(|(i, (reads, writes))| cell_from_sets(reads, writes, i))
            .collect();
        let mut shuffled = cells.clone();
        // Cheap deterministic shuffle.
        let n = shuffled.len();
        for i in 0..n {
            let j = (seed as usize).wrapping_mul(31).wrapping_add(i * 7) % n;
            shuffled.swap(i, j);
        }
        prop_assert_eq!(
            DependencyGraph::rebuild(&cells),
            DependencyGraph::rebuild(&shuffled)
        );
    }

    /// A topological order of the full set respects every edge.
    #[test]
    fn topological_sort_respects_edges(
        sets in prop::collection::vec((var_set(), var_set()), 1..8)
    ) {
        let cells: Vec<Cell> = sets
            .into_iter()
            .enumerate()
            .map(|(i, (reads, writes))| cell_from_sets(reads, writes, i))
            .collect();
        let graph = DependencyGraph::rebuild(&cells);
        let subset: Vec<_> = cells.iter().map(|c| c.id).collect();
        let positions: std::collections::HashMap<_, _> =
            cells.iter().map(|c| (c.id, c.position)).collect();

        match graph.topological_sort(&subset, |id| positions[&id]) {
            Ok(order) => {
                prop_assert_eq!(order.len(), subset.len());
                let index: std::collections::HashMap<_, _> =
                    order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
                for (from, to) in graph.edges() {
                    prop_assert!(index[&from] < index[&to]);
                }
            }
            Err(_) => {
                prop_assert!(graph.has_cycle());
            }
        }
    }

    /// Extracted reads and writes only mention identifiers present in the
    /// source text.
    #[test]
    fn analyzer_vars_subset_of_identifiers(
        names in prop::collection::vec(var_name(), 2..5),
        pick in 0usize..4,
    ) {
        let code = match pick {
            0 => format!("{} = {} + 1", names[0], names[1]),
            1 => format!("def f({}):\n    return {} + {}", names[0], names[0], names[1]),
            2 => format!("{} = [{} for {} in {}]", names[0], names[1], names[1], names[1]),
            _ => format!("for {} in {}:\n    print({})", names[0], names[1], names[0]),
        };
        let vars = analyze_python(&code);
        let mentioned: BTreeSet<&str> = names.iter().map(String::as_str)
            .chain(["print", "f"]).collect();
        for name in vars.reads.iter().chain(vars.writes.iter()) {
            prop_assert!(mentioned.contains(name.as_str()), "unknown identifier {name}");
        }
    }

    /// Unparseable source never fails and yields empty sets.
    #[test]
    fn analyzer_unparseable_is_empty(garbage in "[-+*/(){}=:@#$%^&! ]{1,40}") {
        let vars = analyze_cell(&garbage, CellType::Python);
        if ripple_core::lang::parse_module(&garbage).is_err() {
            prop_assert!(vars.reads.is_empty());
            prop_assert!(vars.writes.is_empty());
        }
    }

    /// The analyzer is deterministic.
    #[test]
    fn analyzer_is_deterministic(
        names in prop::collection::vec(var_name(), 2..4),
    ) {
        let code = format!("{} = {} * 2", names[0], names[1]);
        prop_assert_eq!(analyze_python(&code), analyze_python(&code));
    }
}
