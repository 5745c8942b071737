//! Wire types for the mutation API and the subscriber event stream.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use ripple_core::notebook::preview::{preview_outputs, OutputPreview};
use ripple_core::notebook::{
    Cell, CellId, CellStatus, CellType, Notebook, NotebookId, Output,
};

/// Events broadcast to notebook subscribers.
///
/// For any single run, a cell's events arrive in the order
/// `status=running, (stdout|output)*, (cell_error)?, status terminal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotebookEvent {
    /// Cell metadata changed (code edit).
    CellUpdated {
        cell_id: CellId,
        code: String,
        reads: BTreeSet<String>,
        writes: BTreeSet<String>,
        status: CellStatus,
        revision: u64,
    },

    /// A new cell exists. (`cell_type` rather than `type`: the envelope
    /// already uses `type` as its discriminator.)
    CellCreated {
        cell_id: CellId,
        cell_type: CellType,
        position: usize,
        revision: u64,
    },

    /// A cell was removed.
    CellDeleted { cell_id: CellId, revision: u64 },

    /// Execution status transition.
    CellStatus { cell_id: CellId, status: CellStatus },

    /// A chunk of captured stdout.
    CellStdout { cell_id: CellId, chunk: String },

    /// One produced output artifact.
    CellOutput { cell_id: CellId, output: Output },

    /// Final error text for a failed run.
    CellError { cell_id: CellId, error: String },

    /// A reactive cascade finished.
    CascadeComplete {
        cell_id: CellId,
        total_cells_executed: usize,
    },

    /// The kernel died or hit an unrecoverable fault.
    KernelError { error: String },
}

/// Inbound frames on the bidirectional subscription channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    RunCell { cell_id: CellId },
}

// ---------------------------------------------------------------------------
// REST request/response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateNotebookRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotebookResponse {
    pub id: NotebookId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCellRequest {
    pub code: String,
    #[serde(default)]
    pub expected_revision: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCellRequest {
    pub cell_type: CellType,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub position: Option<usize>,
    #[serde(default)]
    pub expected_revision: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteCellRequest {
    #[serde(default)]
    pub expected_revision: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDbConfigRequest {
    pub conn_string: String,
}

/// Snapshot of one cell, with full outputs or a lightweight preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellView {
    pub cell_id: CellId,
    pub cell_type: CellType,
    pub code: String,
    pub status: CellStatus,
    pub position: usize,
    pub reads: BTreeSet<String>,
    pub writes: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<Output>>,
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<OutputPreview>,
}

impl CellView {
    /// Build a view; full payloads when `include_outputs`, previews
    /// otherwise. Errors are always carried in full.
    pub fn from_cell(cell: &Cell, include_outputs: bool) -> Self {
        Self {
            cell_id: cell.id,
            cell_type: cell.cell_type,
            code: cell.code.clone(),
            status: cell.status,
            position: cell.position,
            reads: cell.reads.clone(),
            writes: cell.writes.clone(),
            error: cell.error.clone(),
            stdout: include_outputs.then(|| cell.stdout.clone()),
            outputs: include_outputs.then(|| cell.outputs.clone()),
            preview: (!include_outputs).then(|| preview_outputs(&cell.outputs)),
        }
    }
}

/// Snapshot of a notebook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookView {
    pub id: NotebookId,
    #[serde(default)]
    pub name: Option<String>,
    pub revision: u64,
    pub cells: Vec<CellView>,
}

impl NotebookView {
    pub fn from_notebook(
        notebook: &Notebook,
        include_outputs: bool,
        cell_ids: Option<&[CellId]>,
    ) -> Self {
        let cells = notebook
            .cells
            .iter()
            .filter(|cell| cell_ids.map_or(true, |ids| ids.contains(&cell.id)))
            .map(|cell| CellView::from_cell(cell, include_outputs))
            .collect();
        Self {
            id: notebook.id.clone(),
            name: notebook.name.clone(),
            revision: notebook.revision,
            cells,
        }
    }
}
