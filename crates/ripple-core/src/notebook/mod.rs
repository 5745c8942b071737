//! Notebook data model: notebooks, cells, outputs, id newtypes.

pub mod preview;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::graph::DependencyGraph;

/// Well-known MIME types produced by the kernel.
pub mod mime {
    pub const TEXT: &str = "text/plain";
    pub const JSON: &str = "application/json";
    pub const DATAFRAME: &str = "application/vnd.ripple.dataframe+json";
    pub const PNG: &str = "image/png";
}

/// Unique identifier for a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(Uuid);

impl CellId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CellId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CellId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identifier of a notebook (user-scoped, e.g. `blank-alice`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotebookId(pub String);

impl std::fmt::Display for NotebookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NotebookId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Stable user identifier supplied by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellType {
    Python,
    Sql,
}

/// Execution status of a cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    /// Not yet executed since creation or last edit.
    #[default]
    Idle,
    /// Currently executing.
    Running,
    /// Last execution completed.
    Success,
    /// Last execution raised.
    Error,
    /// Current code would introduce a dependency cycle; never executed.
    Blocked,
}

impl CellStatus {
    /// Terminal states end a run; `blocked` cells never start one.
    pub fn is_terminal(self) -> bool {
        matches!(self, CellStatus::Success | CellStatus::Error)
    }
}

/// A MIME-tagged execution artifact, ordered within its cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub mime_type: String,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Output {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            mime_type: mime::TEXT.to_string(),
            data: serde_json::Value::String(text.into()),
            metadata: None,
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self {
            mime_type: mime::JSON.to_string(),
            data: value,
            metadata: None,
        }
    }

    pub fn dataframe(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        Self {
            mime_type: mime::DATAFRAME.to_string(),
            data: serde_json::json!({ "columns": columns, "rows": rows }),
            metadata: None,
        }
    }

    pub fn png(base64_data: impl Into<String>) -> Self {
        Self {
            mime_type: mime::PNG.to_string(),
            data: serde_json::Value::String(base64_data.into()),
            metadata: None,
        }
    }
}

/// One cell of a notebook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub cell_type: CellType,
    pub code: String,
    #[serde(default)]
    pub status: CellStatus,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub outputs: Vec<Output>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub reads: BTreeSet<String>,
    #[serde(default)]
    pub writes: BTreeSet<String>,
    pub position: usize,
}

impl Cell {
    pub fn new(cell_type: CellType, code: impl Into<String>, position: usize) -> Self {
        Self {
            id: CellId::new(),
            cell_type,
            code: code.into(),
            status: CellStatus::Idle,
            stdout: String::new(),
            outputs: Vec::new(),
            error: None,
            reads: BTreeSet::new(),
            writes: BTreeSet::new(),
            position,
        }
    }

    /// Reset transient execution state (on edit).
    pub fn clear_results(&mut self) {
        self.status = CellStatus::Idle;
        self.stdout.clear();
        self.outputs.clear();
        self.error = None;
    }
}

/// Top-level aggregate: a user's notebook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notebook {
    pub id: NotebookId,
    pub user_id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub db_conn_string: Option<String>,
    #[serde(default)]
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub revision: u64,
    /// Derived from `(reads, writes)`; never persisted.
    #[serde(skip)]
    pub graph: DependencyGraph,
}

impl Notebook {
    pub fn new(id: NotebookId, user_id: UserId, name: Option<String>) -> Self {
        Self {
            id,
            user_id,
            name,
            db_conn_string: None,
            cells: Vec::new(),
            revision: 0,
            graph: DependencyGraph::default(),
        }
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.iter().find(|c| c.id == id)
    }

    pub fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.iter_mut().find(|c| c.id == id)
    }

    pub fn position_of(&self, id: CellId) -> Option<usize> {
        self.cells.iter().position(|c| c.id == id)
    }

    /// Renumber `cell.position` to match list order.
    pub fn reindex_positions(&mut self) {
        for (i, cell) in self.cells.iter_mut().enumerate() {
            cell.position = i;
        }
    }

    /// Recompute the dependency graph from the current cells.
    pub fn rebuild_graph(&mut self) {
        self.graph = DependencyGraph::rebuild(&self.cells);
    }

    pub fn metadata(&self) -> NotebookMetadata {
        NotebookMetadata {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            name: self.name.clone(),
            db_conn_string: self.db_conn_string.clone(),
            revision: self.revision,
            cell_count: self.cells.len(),
            updated_at: Utc::now(),
        }
    }
}

/// Persisted notebook metadata, as the storage collaborator records it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookMetadata {
    pub id: NotebookId,
    pub user_id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub db_conn_string: Option<String>,
    pub revision: u64,
    pub cell_count: usize,
    pub updated_at: DateTime<Utc>,
}
