//! The kernel's shadow copy of the notebook's dependency structure.
//!
//! Registration-time cycle detection and cascade planning both run against
//! this table so the kernel stays consistent with the Coordinator without
//! sharing memory with it.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use ripple_core::analyze::{analyze_cell, VarSets};
use ripple_core::graph::DependencyGraph;
use ripple_core::notebook::{CellId, CellType};

/// One registered cell.
pub struct ShadowCell {
    pub code: String,
    pub cell_type: CellType,
    pub vars: VarSets,
    pub position: usize,
}

/// Outcome of a registration.
pub struct RegisterOutcome {
    pub reads: BTreeSet<String>,
    pub writes: BTreeSet<String>,
    /// Cycle description when the new code closes a dependency cycle.
    pub cycle: Option<String>,
}

#[derive(Default)]
pub struct ShadowState {
    cells: FxHashMap<CellId, ShadowCell>,
    graph: DependencyGraph,
}

impl ShadowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-register) a cell and rebuild the graph.
    ///
    /// The registration commits even when it closes a cycle; the cell is
    /// simply never executable until edited (any cascade through the cycle
    /// fails its topological sort).
    pub fn register(
        &mut self,
        cell_id: CellId,
        code: &str,
        cell_type: CellType,
        position: usize,
    ) -> RegisterOutcome {
        let vars = analyze_cell(code, cell_type);
        self.cells.insert(
            cell_id,
            ShadowCell {
                code: code.to_string(),
                cell_type,
                vars: vars.clone(),
                position,
            },
        );
        self.rebuild();

        let members = self.graph.cycle_members();
        let cycle = if members.contains(&cell_id) {
            let names: Vec<String> = members.iter().map(|id| id.to_string()).collect();
            Some(format!(
                "cyclic dependency detected among cells [{}]",
                names.join(", ")
            ))
        } else {
            None
        };

        RegisterOutcome {
            reads: vars.reads,
            writes: vars.writes,
            cycle,
        }
    }

    /// Refresh a cell's code before execution (no cycle reporting; the
    /// Coordinator registered it first, this keeps late edits consistent).
    pub fn refresh_code(&mut self, cell_id: CellId, code: &str, cell_type: CellType) {
        let stale = match self.cells.get(&cell_id) {
            Some(cell) => cell.code != code || cell.cell_type != cell_type,
            None => true,
        };
        if !stale {
            return;
        }
        let position = self
            .cells
            .get(&cell_id)
            .map(|c| c.position)
            .unwrap_or(usize::MAX);
        self.register(cell_id, code, cell_type, position);
    }

    pub fn remove(&mut self, cell_id: CellId) {
        if self.cells.remove(&cell_id).is_some() {
            self.rebuild();
        }
    }

    pub fn get(&self, cell_id: CellId) -> Option<&ShadowCell> {
        self.cells.get(&cell_id)
    }

    /// Reads/writes of a registered cell; empty sets when unknown.
    pub fn vars(&self, cell_id: CellId) -> VarSets {
        self.cells
            .get(&cell_id)
            .map(|c| c.vars.clone())
            .unwrap_or_default()
    }

    /// The execution plan for running `initial`: the cell plus its
    /// transitive dependents, topologically ordered with position
    /// tie-breaks. Errors when the induced subgraph has a cycle.
    pub fn cascade_plan(&self, initial: CellId) -> Result<Vec<CellId>, String> {
        let mut subset: Vec<CellId> = vec![initial];
        subset.extend(self.graph.dependents_closure(initial));
        self.graph
            .topological_sort(&subset, |id| {
                self.cells.get(&id).map(|c| c.position).unwrap_or(usize::MAX)
            })
            .map_err(|e| e.to_string())
    }

    fn rebuild(&mut self) {
        self.graph = DependencyGraph::rebuild_from_parts(
            self.cells
                .iter()
                .map(|(&id, cell)| (id, &cell.vars.reads, &cell.vars.writes)),
        );
    }
}
