//! Persistence collaborator: a narrow per-cell storage API.
//!
//! Mutations persist one cell (plus notebook metadata) at a time rather than
//! rewriting whole notebooks. Transient fields (graph, execution state) are
//! never required for reload: the graph rebuilds from `(reads, writes)`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use ripple_core::notebook::{Cell, NotebookId, NotebookMetadata, UserId};

use crate::error::ApiError;

/// Storage failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Storage(e.to_string())
    }
}

/// The storage contract the core depends on.
#[async_trait]
pub trait NotebookStore: Send + Sync {
    async fn save_notebook_metadata(&self, meta: &NotebookMetadata) -> Result<(), StoreError>;
    async fn save_cell(
        &self,
        notebook_id: &NotebookId,
        position: usize,
        cell: &Cell,
    ) -> Result<(), StoreError>;
    async fn delete_cell(&self, notebook_id: &NotebookId, position: usize)
        -> Result<(), StoreError>;
    async fn load_notebook_metadata(
        &self,
        user_id: &UserId,
        notebook_id: &NotebookId,
    ) -> Result<Option<NotebookMetadata>, StoreError>;
    async fn load_cells(&self, notebook_id: &NotebookId) -> Result<Vec<Cell>, StoreError>;
    async fn list_notebooks(&self, user_id: &UserId) -> Result<Vec<NotebookMetadata>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Volatile store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryStore {
    notebooks: RwLock<HashMap<NotebookId, (NotebookMetadata, Vec<Cell>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotebookStore for MemoryStore {
    async fn save_notebook_metadata(&self, meta: &NotebookMetadata) -> Result<(), StoreError> {
        let mut notebooks = self.notebooks.write().await;
        match notebooks.get_mut(&meta.id) {
            Some((existing, _)) => *existing = meta.clone(),
            None => {
                notebooks.insert(meta.id.clone(), (meta.clone(), Vec::new()));
            }
        }
        Ok(())
    }

    async fn save_cell(
        &self,
        notebook_id: &NotebookId,
        position: usize,
        cell: &Cell,
    ) -> Result<(), StoreError> {
        let mut notebooks = self.notebooks.write().await;
        if let Some((_, cells)) = notebooks.get_mut(notebook_id) {
            if position < cells.len() {
                cells[position] = cell.clone();
            } else {
                cells.resize_with(position, || cell.clone());
                cells.push(cell.clone());
            }
        }
        Ok(())
    }

    async fn delete_cell(
        &self,
        notebook_id: &NotebookId,
        position: usize,
    ) -> Result<(), StoreError> {
        let mut notebooks = self.notebooks.write().await;
        if let Some((_, cells)) = notebooks.get_mut(notebook_id) {
            if position < cells.len() {
                cells.remove(position);
            }
        }
        Ok(())
    }

    async fn load_notebook_metadata(
        &self,
        user_id: &UserId,
        notebook_id: &NotebookId,
    ) -> Result<Option<NotebookMetadata>, StoreError> {
        let notebooks = self.notebooks.read().await;
        Ok(notebooks
            .get(notebook_id)
            .filter(|(meta, _)| meta.user_id == *user_id)
            .map(|(meta, _)| meta.clone()))
    }

    async fn load_cells(&self, notebook_id: &NotebookId) -> Result<Vec<Cell>, StoreError> {
        let notebooks = self.notebooks.read().await;
        Ok(notebooks
            .get(notebook_id)
            .map(|(_, cells)| cells.clone())
            .unwrap_or_default())
    }

    async fn list_notebooks(&self, user_id: &UserId) -> Result<Vec<NotebookMetadata>, StoreError> {
        let notebooks = self.notebooks.read().await;
        let mut listed: Vec<NotebookMetadata> = notebooks
            .values()
            .filter(|(meta, _)| meta.user_id == *user_id)
            .map(|(meta, _)| meta.clone())
            .collect();
        listed.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(listed)
    }
}

// ---------------------------------------------------------------------------
// Filesystem store
// ---------------------------------------------------------------------------

/// JSON-on-disk store.
///
/// Layout: `<root>/<user>/<notebook>/meta.json` plus one
/// `cells/NNNN.json` file per cell position. Deleting a cell shifts the
/// files above it down so positions stay dense.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn sanitize(part: &str) -> String {
        part.chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    fn notebook_dir(&self, notebook_id: &NotebookId) -> Option<PathBuf> {
        // Metadata records the owner; the directory is found by scanning
        // user directories for the notebook id.
        let target = Self::sanitize(&notebook_id.0);
        let users = std::fs::read_dir(&self.root).ok()?;
        for user in users.flatten() {
            let candidate = user.path().join(&target);
            if candidate.is_dir() {
                return Some(candidate);
            }
        }
        None
    }

    fn user_notebook_dir(&self, user_id: &UserId, notebook_id: &NotebookId) -> PathBuf {
        self.root
            .join(Self::sanitize(&user_id.0))
            .join(Self::sanitize(&notebook_id.0))
    }

    fn cell_path(dir: &Path, position: usize) -> PathBuf {
        dir.join("cells").join(format!("{position:04}.json"))
    }

    fn cell_count(dir: &Path) -> usize {
        std::fs::read_dir(dir.join("cells"))
            .map(|entries| entries.flatten().count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl NotebookStore for FsStore {
    async fn save_notebook_metadata(&self, meta: &NotebookMetadata) -> Result<(), StoreError> {
        let dir = self.user_notebook_dir(&meta.user_id, &meta.id);
        std::fs::create_dir_all(dir.join("cells"))?;
        let json = serde_json::to_vec_pretty(meta)?;
        std::fs::write(dir.join("meta.json"), json)?;
        Ok(())
    }

    async fn save_cell(
        &self,
        notebook_id: &NotebookId,
        position: usize,
        cell: &Cell,
    ) -> Result<(), StoreError> {
        let Some(dir) = self.notebook_dir(notebook_id) else {
            return Ok(());
        };
        std::fs::create_dir_all(dir.join("cells"))?;
        let json = serde_json::to_vec_pretty(cell)?;
        std::fs::write(Self::cell_path(&dir, position), json)?;
        Ok(())
    }

    async fn delete_cell(
        &self,
        notebook_id: &NotebookId,
        position: usize,
    ) -> Result<(), StoreError> {
        let Some(dir) = self.notebook_dir(notebook_id) else {
            return Ok(());
        };
        let path = Self::cell_path(&dir, position);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        // Shift higher positions down to keep the sequence dense.
        let count = Self::cell_count(&dir) + 1;
        for higher in (position + 1)..=count {
            let from = Self::cell_path(&dir, higher);
            if from.exists() {
                std::fs::rename(from, Self::cell_path(&dir, higher - 1))?;
            }
        }
        Ok(())
    }

    async fn load_notebook_metadata(
        &self,
        user_id: &UserId,
        notebook_id: &NotebookId,
    ) -> Result<Option<NotebookMetadata>, StoreError> {
        let path = self.user_notebook_dir(user_id, notebook_id).join("meta.json");
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        let meta: NotebookMetadata = serde_json::from_slice(&bytes)?;
        Ok(Some(meta))
    }

    async fn load_cells(&self, notebook_id: &NotebookId) -> Result<Vec<Cell>, StoreError> {
        let Some(dir) = self.notebook_dir(notebook_id) else {
            return Ok(Vec::new());
        };
        let cells_dir = dir.join("cells");
        if !cells_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&cells_dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        let mut cells = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = std::fs::read(path)?;
            cells.push(serde_json::from_slice::<Cell>(&bytes)?);
        }
        Ok(cells)
    }

    async fn list_notebooks(&self, user_id: &UserId) -> Result<Vec<NotebookMetadata>, StoreError> {
        let user_dir = self.root.join(Self::sanitize(&user_id.0));
        if !user_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut listed = Vec::new();
        for entry in std::fs::read_dir(user_dir)?.flatten() {
            let meta_path = entry.path().join("meta.json");
            if !meta_path.exists() {
                continue;
            }
            let bytes = std::fs::read(meta_path)?;
            if let Ok(meta) = serde_json::from_slice::<NotebookMetadata>(&bytes) {
                listed.push(meta);
            }
        }
        listed.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(listed)
    }
}
