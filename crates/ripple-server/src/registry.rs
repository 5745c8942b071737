//! Live-notebook registry: one Coordinator (and one kernel process) per
//! open notebook, plus first-touch provisioning of the starter notebooks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use ripple_core::ipc::KernelLink;
use ripple_core::notebook::{Cell, CellType, Notebook, NotebookId, NotebookMetadata, UserId};

use crate::coordinator::{Coordinator, CoordinatorConfig};
use crate::error::{ApiError, ApiResult};
use crate::storage::NotebookStore;

/// Produces a kernel link per coordinator. The server wires this to
/// process spawning; tests wire it to an in-process kernel.
pub type KernelFactory = Arc<dyn Fn() -> ripple_core::Result<KernelLink> + Send + Sync>;

/// Starter cells for the provisioned demo notebook.
const DEMO_CELLS: &[(&str, CellType)] = &[
    ("base = 10", CellType::Python),
    ("doubled = base * 2\ndoubled", CellType::Python),
    (
        "rows = [{'name': 'a', 'value': base}, {'name': 'b', 'value': doubled}]\nrows",
        CellType::Python,
    ),
];

pub struct Registry {
    storage: Arc<dyn NotebookStore>,
    kernel_factory: KernelFactory,
    config: CoordinatorConfig,
    coordinators: RwLock<HashMap<NotebookId, Arc<Coordinator>>>,
}

impl Registry {
    pub fn new(
        storage: Arc<dyn NotebookStore>,
        kernel_factory: KernelFactory,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            storage,
            kernel_factory,
            config,
            coordinators: RwLock::new(HashMap::new()),
        }
    }

    /// Rewrite the legacy shared ids onto the caller's scoped ids.
    pub fn rewrite_legacy_id(user: &UserId, id: &NotebookId) -> NotebookId {
        match id.0.as_str() {
            "blank" => NotebookId(format!("blank-{user}")),
            "demo" => NotebookId(format!("demo-{user}")),
            _ => id.clone(),
        }
    }

    /// Get the live coordinator for a notebook, loading it (and spawning a
    /// kernel) on demand. A dead coordinator is torn down and replaced.
    pub async fn open(&self, user: &UserId, id: &NotebookId) -> ApiResult<Arc<Coordinator>> {
        let id = Self::rewrite_legacy_id(user, id);

        if let Some(existing) = self.coordinators.read().await.get(&id).cloned() {
            if !existing.is_dead() {
                return Ok(existing);
            }
        }

        let mut coordinators = self.coordinators.write().await;
        // Re-check under the write lock.
        if let Some(existing) = coordinators.get(&id).cloned() {
            if !existing.is_dead() {
                return Ok(existing);
            }
            existing.shutdown().await;
            coordinators.remove(&id);
        }

        let meta = self
            .storage
            .load_notebook_metadata(user, &id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("notebook {id}")))?;
        let cells = self.storage.load_cells(&id).await?;

        let mut notebook = Notebook::new(meta.id, meta.user_id, meta.name);
        notebook.db_conn_string = meta.db_conn_string;
        notebook.revision = meta.revision;
        notebook.cells = cells;
        notebook.reindex_positions();

        let link = (self.kernel_factory)().map_err(|e| ApiError::KernelDied(e.to_string()))?;
        let coordinator =
            Coordinator::open(notebook, link, self.storage.clone(), self.config.clone()).await?;
        coordinators.insert(id, coordinator.clone());
        Ok(coordinator)
    }

    /// Create a fresh empty notebook owned by the caller.
    pub async fn create_notebook(
        &self,
        user: &UserId,
        name: Option<String>,
    ) -> ApiResult<NotebookId> {
        let id = NotebookId(uuid::Uuid::new_v4().to_string());
        let notebook = Notebook::new(id.clone(), user.clone(), name);
        self.storage
            .save_notebook_metadata(&notebook.metadata())
            .await?;
        Ok(id)
    }

    /// List the caller's notebooks, provisioning the starter pair
    /// (`blank-{user}`, `demo-{user}`) idempotently on first touch.
    pub async fn list_notebooks(&self, user: &UserId) -> ApiResult<Vec<NotebookMetadata>> {
        self.provision(user, &NotebookId(format!("blank-{user}")), &[])
            .await?;
        self.provision(user, &NotebookId(format!("demo-{user}")), DEMO_CELLS)
            .await?;
        Ok(self.storage.list_notebooks(user).await?)
    }

    async fn provision(
        &self,
        user: &UserId,
        id: &NotebookId,
        seed: &[(&str, CellType)],
    ) -> ApiResult<()> {
        if self
            .storage
            .load_notebook_metadata(user, id)
            .await?
            .is_some()
        {
            return Ok(());
        }

        let mut notebook = Notebook::new(id.clone(), user.clone(), Some(id.0.clone()));
        for (position, (code, cell_type)) in seed.iter().enumerate() {
            let mut cell = Cell::new(*cell_type, *code, position);
            let vars = ripple_core::analyze::analyze_cell(code, *cell_type);
            cell.reads = vars.reads;
            cell.writes = vars.writes;
            notebook.cells.push(cell);
        }

        self.storage
            .save_notebook_metadata(&notebook.metadata())
            .await?;
        for cell in &notebook.cells {
            self.storage.save_cell(id, cell.position, cell).await?;
        }
        Ok(())
    }

    /// Tear down the live coordinator for a notebook, if any.
    pub async fn shutdown_notebook(&self, user: &UserId, id: &NotebookId) -> ApiResult<()> {
        let id = Self::rewrite_legacy_id(user, id);
        let removed = self.coordinators.write().await.remove(&id);
        if let Some(coordinator) = removed {
            coordinator.shutdown().await;
        }
        Ok(())
    }

    /// Tear down every live coordinator (server shutdown).
    pub async fn shutdown_all(&self) {
        let drained: Vec<_> = self.coordinators.write().await.drain().collect();
        for (_, coordinator) in drained {
            coordinator.shutdown().await;
        }
    }
}
