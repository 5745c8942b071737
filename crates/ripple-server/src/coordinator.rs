//! Per-notebook orchestration.
//!
//! One Coordinator owns one live Notebook, its kernel link, the pending-
//! operation rendezvous table and the subscriber broadcaster. All state-
//! touching sections run under the notebook mutex; the background reader is
//! the only consumer of the kernel's event queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

use ripple_core::ipc::{KernelCommand, KernelEvent, KernelLink, ResultStatus};
use ripple_core::notebook::{Cell, CellId, CellStatus, CellType, Notebook, Output, UserId};

use crate::error::{ApiError, ApiResult};
use crate::protocol::{CellView, NotebookEvent, NotebookView};
use crate::storage::NotebookStore;

/// Timeouts and buffer sizes for one Coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Budget for synchronous registration round-trips.
    pub register_timeout: Duration,
    /// Budget for `run_cell(wait=true)`.
    pub run_timeout: Duration,
    /// Poll interval while waiting on a run.
    pub poll_interval: Duration,
    /// Broadcast buffer per notebook; a subscriber that falls this far
    /// behind is dropped.
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            register_timeout: Duration::from_secs(10),
            run_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(50),
            event_capacity: 256,
        }
    }
}

/// Rendezvous keys. The single-reader + FIFO queues make these sufficient
/// correlation for the current operation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PendingKey {
    Register(CellId),
    DbConfig,
}

impl std::fmt::Display for PendingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PendingKey::Register(cell_id) => write!(f, "register({cell_id})"),
            PendingKey::DbConfig => write!(f, "db_config"),
        }
    }
}

/// What a waiter receives through its result slot.
enum PendingOutcome {
    Event(KernelEvent),
    CellDeleted,
    ShuttingDown,
    KernelDied,
}

/// Per-notebook orchestrator.
pub struct Coordinator {
    notebook: Mutex<Notebook>,
    kernel: StdMutex<KernelLink>,
    pending: StdMutex<FxHashMap<PendingKey, oneshot::Sender<PendingOutcome>>>,
    events_tx: broadcast::Sender<NotebookEvent>,
    storage: Arc<dyn NotebookStore>,
    dead: AtomicBool,
    reader: StdMutex<Option<JoinHandle<()>>>,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Bring a notebook live: rebuild its graph, replay its cells into the
    /// kernel's shadow state, then start the background reader.
    ///
    /// The replay drains its own register results before the reader spawns,
    /// so client operations never race against replay responses.
    pub async fn open(
        mut notebook: Notebook,
        mut link: KernelLink,
        storage: Arc<dyn NotebookStore>,
        config: CoordinatorConfig,
    ) -> ApiResult<Arc<Self>> {
        notebook.rebuild_graph();

        let mut events = link
            .take_events()
            .ok_or_else(|| ApiError::KernelDied("kernel event queue unavailable".into()))?;

        for cell in &notebook.cells {
            link.send(KernelCommand::RegisterCell {
                cell_id: cell.id,
                code: cell.code.clone(),
                cell_type: cell.cell_type,
                position: cell.position,
            })
            .map_err(|e| ApiError::KernelDied(e.to_string()))?;
        }
        for _ in 0..notebook.cells.len() {
            match timeout(config.register_timeout, events.recv()).await {
                Ok(Some(KernelEvent::RegisterResult { .. })) => {}
                Ok(Some(other)) => {
                    tracing::warn!(?other, "unexpected kernel event during replay");
                }
                Ok(None) => return Err(ApiError::KernelDied("kernel exited during replay".into())),
                Err(_) => return Err(ApiError::Timeout("kernel replay".into())),
            }
        }

        let (events_tx, _) = broadcast::channel(config.event_capacity);
        let coordinator = Arc::new(Self {
            notebook: Mutex::new(notebook),
            kernel: StdMutex::new(link),
            pending: StdMutex::new(FxHashMap::default()),
            events_tx,
            storage,
            dead: AtomicBool::new(false),
            reader: StdMutex::new(None),
            config,
        });

        let handle = tokio::spawn(Self::read_loop(coordinator.clone(), events));
        *coordinator.reader.lock().expect("reader slot") = Some(handle);
        Ok(coordinator)
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    /// Subscribe to the notebook's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<NotebookEvent> {
        self.events_tx.subscribe()
    }

    fn broadcast(&self, event: NotebookEvent) {
        // Send failures just mean nobody is listening.
        let _ = self.events_tx.send(event);
    }

    fn ensure_alive(&self) -> ApiResult<()> {
        if self.is_dead() {
            return Err(ApiError::KernelDied(
                "coordinator is dead; reopen the notebook".into(),
            ));
        }
        Ok(())
    }

    fn check_owner(notebook: &Notebook, user: &UserId) -> ApiResult<()> {
        if notebook.user_id != *user {
            return Err(ApiError::Forbidden);
        }
        Ok(())
    }

    fn check_revision(notebook: &Notebook, expected: Option<u64>) -> ApiResult<()> {
        if let Some(expected) = expected {
            if notebook.revision != expected {
                return Err(ApiError::Conflict {
                    current_revision: notebook.revision,
                });
            }
        }
        Ok(())
    }

    fn send_kernel(&self, command: KernelCommand) -> ApiResult<()> {
        self.kernel
            .lock()
            .expect("kernel lock")
            .send(command)
            .map_err(|e| ApiError::KernelDied(e.to_string()))
    }

    fn register_pending(&self, key: PendingKey) -> ApiResult<oneshot::Receiver<PendingOutcome>> {
        let mut pending = self.pending.lock().expect("pending lock");
        if pending.contains_key(&key) {
            return Err(ApiError::OperationInFlight(key.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(key, tx);
        Ok(rx)
    }

    fn cancel_pending(&self, key: PendingKey) {
        self.pending.lock().expect("pending lock").remove(&key);
    }

    /// Await a rendezvous slot. On timeout the slot is removed, so a late
    /// kernel response finds no waiter and is dropped by the reader.
    async fn await_rendezvous(
        &self,
        key: PendingKey,
        rx: oneshot::Receiver<PendingOutcome>,
        budget: Duration,
        what: &str,
    ) -> ApiResult<KernelEvent> {
        match timeout(budget, rx).await {
            Err(_) => {
                self.cancel_pending(key);
                Err(ApiError::Timeout(what.to_string()))
            }
            Ok(Err(_)) => Err(ApiError::ShuttingDown),
            Ok(Ok(PendingOutcome::Event(event))) => Ok(event),
            Ok(Ok(PendingOutcome::CellDeleted)) => {
                Err(ApiError::NotFound("cell deleted during operation".into()))
            }
            Ok(Ok(PendingOutcome::ShuttingDown)) => Err(ApiError::ShuttingDown),
            Ok(Ok(PendingOutcome::KernelDied)) => {
                Err(ApiError::KernelDied("kernel died during operation".into()))
            }
        }
    }

    // ----- background reader --------------------------------------------

    async fn read_loop(self: Arc<Self>, mut events: UnboundedReceiver<KernelEvent>) {
        loop {
            match timeout(Duration::from_secs(1), events.recv()).await {
                Err(_) => {
                    // Queue idle; probe liveness.
                    let alive = self.kernel.lock().expect("kernel lock").is_alive();
                    if !alive {
                        self.on_kernel_death().await;
                        return;
                    }
                }
                Ok(None) => {
                    self.on_kernel_death().await;
                    return;
                }
                Ok(Some(event)) => self.dispatch_event(event).await,
            }
        }
    }

    async fn dispatch_event(self: &Arc<Self>, event: KernelEvent) {
        match event {
            KernelEvent::RegisterResult { cell_id, .. } => {
                self.fulfill(PendingKey::Register(cell_id), event);
            }
            KernelEvent::ConfigResult { .. } => {
                self.fulfill(PendingKey::DbConfig, event);
            }
            KernelEvent::ExecuteStarted { cell_id } => {
                let known = {
                    let mut notebook = self.notebook.lock().await;
                    match notebook.cell_mut(cell_id) {
                        Some(cell) => {
                            cell.status = CellStatus::Running;
                            cell.stdout.clear();
                            cell.outputs.clear();
                            cell.error = None;
                            true
                        }
                        None => false,
                    }
                };
                if known {
                    self.broadcast(NotebookEvent::CellStatus {
                        cell_id,
                        status: CellStatus::Running,
                    });
                }
            }
            KernelEvent::ExecuteResult {
                cell_id,
                status,
                stdout,
                outputs,
                error,
                reads,
                writes,
                ..
            } => {
                self.apply_execute_result(cell_id, status, stdout, outputs, error, reads, writes)
                    .await;
            }
            KernelEvent::ExecuteComplete {
                initial_cell_id,
                total_cells_executed,
            } => {
                self.broadcast(NotebookEvent::CascadeComplete {
                    cell_id: initial_cell_id,
                    total_cells_executed,
                });
            }
        }
    }

    fn fulfill(&self, key: PendingKey, event: KernelEvent) {
        let waiter = self.pending.lock().expect("pending lock").remove(&key);
        match waiter {
            Some(tx) => {
                let _ = tx.send(PendingOutcome::Event(event));
            }
            None => tracing::debug!(%key, "dropping kernel event with no waiter"),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_execute_result(
        self: &Arc<Self>,
        cell_id: CellId,
        status: ResultStatus,
        stdout: String,
        outputs: Vec<Output>,
        error: Option<String>,
        reads: std::collections::BTreeSet<String>,
        writes: std::collections::BTreeSet<String>,
    ) {
        let mut to_broadcast = Vec::new();
        {
            let mut notebook = self.notebook.lock().await;
            let Some(cell) = notebook.cell_mut(cell_id) else {
                tracing::debug!(%cell_id, "execute result for deleted cell, dropping");
                return;
            };

            cell.status = match status {
                ResultStatus::Success => CellStatus::Success,
                ResultStatus::Error => CellStatus::Error,
            };
            cell.stdout = stdout.clone();
            cell.outputs = outputs.clone();
            cell.error = error.clone();
            let vars_changed = cell.reads != reads || cell.writes != writes;
            if vars_changed {
                cell.reads = reads;
                cell.writes = writes;
            }
            let snapshot = cell.clone();
            if vars_changed {
                notebook.rebuild_graph();
            }
            notebook.revision += 1;

            let notebook_id = notebook.id.clone();
            let meta = notebook.metadata();
            if let Err(e) = self
                .storage
                .save_cell(&notebook_id, snapshot.position, &snapshot)
                .await
            {
                tracing::error!(%cell_id, "failed to persist cell after execution: {e}");
            }
            if let Err(e) = self.storage.save_notebook_metadata(&meta).await {
                tracing::error!("failed to persist notebook metadata: {e}");
            }

            if !stdout.is_empty() {
                to_broadcast.push(NotebookEvent::CellStdout {
                    cell_id,
                    chunk: stdout,
                });
            }
            for output in outputs {
                to_broadcast.push(NotebookEvent::CellOutput { cell_id, output });
            }
            if let Some(error) = error {
                to_broadcast.push(NotebookEvent::CellError { cell_id, error });
            }
            to_broadcast.push(NotebookEvent::CellStatus {
                cell_id,
                status: snapshot.status,
            });
        }
        for event in to_broadcast {
            self.broadcast(event);
        }
    }

    async fn on_kernel_death(self: &Arc<Self>) {
        if self.dead.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::error!("kernel process died; failing pending operations");
        let waiters: Vec<_> = {
            let mut pending = self.pending.lock().expect("pending lock");
            pending.drain().collect()
        };
        for (_, tx) in waiters {
            let _ = tx.send(PendingOutcome::KernelDied);
        }
        self.broadcast(NotebookEvent::KernelError {
            error: "kernel process died".to_string(),
        });
    }

    // ----- operations ---------------------------------------------------

    /// Replace a cell's code. Synchronous kernel round-trip for
    /// registration; on cycle the edit still commits with the cell blocked
    /// and the call reports it as a 422-style error.
    pub async fn update_cell(
        &self,
        user: &UserId,
        cell_id: CellId,
        new_code: String,
        expected_revision: Option<u64>,
    ) -> ApiResult<CellView> {
        self.ensure_alive()?;

        let (cell_type, position) = {
            let notebook = self.notebook.lock().await;
            Self::check_owner(&notebook, user)?;
            Self::check_revision(&notebook, expected_revision)?;
            let cell = notebook
                .cell(cell_id)
                .ok_or_else(|| ApiError::NotFound(format!("cell {cell_id}")))?;
            (cell.cell_type, cell.position)
        };

        let key = PendingKey::Register(cell_id);
        let rx = self.register_pending(key)?;
        if let Err(e) = self.send_kernel(KernelCommand::RegisterCell {
            cell_id,
            code: new_code.clone(),
            cell_type,
            position,
        }) {
            self.cancel_pending(key);
            return Err(e);
        }
        let event = self
            .await_rendezvous(key, rx, self.config.register_timeout, "cell registration")
            .await?;
        let KernelEvent::RegisterResult {
            status,
            reads,
            writes,
            error,
            ..
        } = event
        else {
            return Err(ApiError::KernelDied("unexpected kernel response".into()));
        };

        let (snapshot, revision, cycle) = {
            let mut notebook = self.notebook.lock().await;
            // The lock was released across the rendezvous; the optimistic
            // lock must hold at commit time.
            Self::check_revision(&notebook, expected_revision)?;
            let Some(cell) = notebook.cell_mut(cell_id) else {
                return Err(ApiError::NotFound(format!("cell {cell_id}")));
            };

            cell.code = new_code;
            let vars_changed = cell.reads != reads || cell.writes != writes;
            cell.reads = reads;
            cell.writes = writes;

            let cycle = match status {
                ResultStatus::Error => error,
                ResultStatus::Success => None,
            };
            match &cycle {
                Some(message) => {
                    cell.status = CellStatus::Blocked;
                    cell.error = Some(message.clone());
                    cell.stdout.clear();
                    cell.outputs.clear();
                }
                None => {
                    if vars_changed || cell.status == CellStatus::Blocked {
                        cell.clear_results();
                    }
                }
            }

            let snapshot = cell.clone();
            notebook.rebuild_graph();
            notebook.revision += 1;
            self.persist_cell(&notebook, &snapshot).await;
            (snapshot, notebook.revision, cycle)
        };

        match cycle {
            Some(message) => {
                self.broadcast(NotebookEvent::CellStatus {
                    cell_id,
                    status: CellStatus::Blocked,
                });
                self.broadcast(NotebookEvent::CellError {
                    cell_id,
                    error: message.clone(),
                });
                Err(ApiError::Cycle {
                    cell_id,
                    error: message,
                })
            }
            None => {
                self.broadcast(NotebookEvent::CellUpdated {
                    cell_id,
                    code: snapshot.code.clone(),
                    reads: snapshot.reads.clone(),
                    writes: snapshot.writes.clone(),
                    status: snapshot.status,
                    revision,
                });
                Ok(CellView::from_cell(&snapshot, false))
            }
        }
    }

    /// Create a cell. The new cell registers with the kernel before it is
    /// published; a cycle commits it in blocked state (documented choice).
    pub async fn create_cell(
        &self,
        user: &UserId,
        cell_type: CellType,
        code: String,
        position: Option<usize>,
        expected_revision: Option<u64>,
    ) -> ApiResult<CellView> {
        self.ensure_alive()?;

        let insert_at = {
            let notebook = self.notebook.lock().await;
            Self::check_owner(&notebook, user)?;
            Self::check_revision(&notebook, expected_revision)?;
            position
                .unwrap_or(notebook.cells.len())
                .min(notebook.cells.len())
        };

        let cell_id = CellId::new();
        let key = PendingKey::Register(cell_id);
        let rx = self.register_pending(key)?;
        if let Err(e) = self.send_kernel(KernelCommand::RegisterCell {
            cell_id,
            code: code.clone(),
            cell_type,
            position: insert_at,
        }) {
            self.cancel_pending(key);
            return Err(e);
        }
        let event = self
            .await_rendezvous(key, rx, self.config.register_timeout, "cell registration")
            .await?;
        let KernelEvent::RegisterResult {
            status,
            reads,
            writes,
            error,
            ..
        } = event
        else {
            return Err(ApiError::KernelDied("unexpected kernel response".into()));
        };

        let (snapshot, revision, blocked) = {
            let mut notebook = self.notebook.lock().await;
            Self::check_revision(&notebook, expected_revision)?;
            let insert_at = insert_at.min(notebook.cells.len());

            let mut cell = Cell::new(cell_type, code, insert_at);
            cell.id = cell_id;
            cell.reads = reads;
            cell.writes = writes;
            let blocked = matches!(status, ResultStatus::Error);
            if blocked {
                cell.status = CellStatus::Blocked;
                cell.error = error;
            }

            notebook.cells.insert(insert_at, cell);
            notebook.reindex_positions();
            notebook.rebuild_graph();
            notebook.revision += 1;

            let snapshot = notebook.cells[insert_at].clone();
            // Positions at and above the insertion point all moved.
            for moved in notebook.cells[insert_at..].to_vec() {
                self.persist_cell(&notebook, &moved).await;
            }
            (snapshot, notebook.revision, blocked)
        };

        self.broadcast(NotebookEvent::CellCreated {
            cell_id,
            cell_type,
            position: snapshot.position,
            revision,
        });
        if blocked {
            self.broadcast(NotebookEvent::CellStatus {
                cell_id,
                status: CellStatus::Blocked,
            });
            if let Some(error) = snapshot.error.clone() {
                self.broadcast(NotebookEvent::CellError { cell_id, error });
            }
        }
        Ok(CellView::from_cell(&snapshot, false))
    }

    /// Delete a cell. Dependents are not re-run; stale downstream cells
    /// fail at their next run.
    pub async fn delete_cell(
        &self,
        user: &UserId,
        cell_id: CellId,
        expected_revision: Option<u64>,
    ) -> ApiResult<()> {
        self.ensure_alive()?;

        let revision = {
            let mut notebook = self.notebook.lock().await;
            Self::check_owner(&notebook, user)?;
            let position = notebook
                .position_of(cell_id)
                .ok_or_else(|| ApiError::NotFound(format!("cell {cell_id}")))?;
            Self::check_revision(&notebook, expected_revision)?;

            // A waiter mid-registration on this cell learns it is gone.
            if let Some(tx) = self
                .pending
                .lock()
                .expect("pending lock")
                .remove(&PendingKey::Register(cell_id))
            {
                let _ = tx.send(PendingOutcome::CellDeleted);
            }

            notebook.cells.remove(position);
            notebook.reindex_positions();
            notebook.rebuild_graph();
            notebook.revision += 1;

            let _ = self.send_kernel(KernelCommand::RemoveCell { cell_id });

            let notebook_id = notebook.id.clone();
            if let Err(e) = self.storage.delete_cell(&notebook_id, position).await {
                tracing::error!(%cell_id, "failed to delete persisted cell: {e}");
            }
            for moved in notebook.cells[position..].to_vec() {
                self.persist_cell(&notebook, &moved).await;
            }
            let meta = notebook.metadata();
            if let Err(e) = self.storage.save_notebook_metadata(&meta).await {
                tracing::error!("failed to persist notebook metadata: {e}");
            }
            notebook.revision
        };

        self.broadcast(NotebookEvent::CellDeleted { cell_id, revision });
        Ok(())
    }

    /// Run a cell (and its reactive dependents). The mutex is never held
    /// while the kernel executes. With `wait`, polls until the target cell
    /// reaches a terminal state and returns its snapshot.
    pub async fn run_cell(
        &self,
        user: &UserId,
        cell_id: CellId,
        wait: bool,
    ) -> ApiResult<Option<CellView>> {
        self.ensure_alive()?;

        let (code, cell_type, db_conn_string) = {
            let mut notebook = self.notebook.lock().await;
            Self::check_owner(&notebook, user)?;
            let db_conn_string = notebook.db_conn_string.clone();
            let cell = notebook
                .cell_mut(cell_id)
                .ok_or_else(|| ApiError::NotFound(format!("cell {cell_id}")))?;
            if cell.status == CellStatus::Blocked {
                return Err(ApiError::CellBlocked(cell_id));
            }
            // Reset so the wait loop observes this run's terminal state,
            // not a previous one's.
            cell.status = CellStatus::Idle;
            (cell.code.clone(), cell.cell_type, db_conn_string)
        };

        self.send_kernel(KernelCommand::ExecuteCell {
            cell_id,
            code,
            cell_type,
            db_conn_string,
        })?;

        if !wait {
            return Ok(None);
        }

        let deadline = Instant::now() + self.config.run_timeout;
        loop {
            sleep(self.config.poll_interval).await;
            if self.is_dead() {
                return Err(ApiError::KernelDied("kernel died during run".into()));
            }
            {
                let notebook = self.notebook.lock().await;
                match notebook.cell(cell_id) {
                    None => {
                        return Err(ApiError::NotFound("cell deleted during run".into()));
                    }
                    Some(cell) if cell.status.is_terminal() => {
                        return Ok(Some(CellView::from_cell(cell, true)));
                    }
                    Some(_) => {}
                }
            }
            if Instant::now() >= deadline {
                return Err(ApiError::Timeout("run_cell wait".into()));
            }
        }
    }

    /// Snapshot notebook state.
    pub async fn get_state(
        &self,
        user: &UserId,
        include_outputs: bool,
        cell_ids: Option<Vec<CellId>>,
    ) -> ApiResult<NotebookView> {
        let notebook = self.notebook.lock().await;
        Self::check_owner(&notebook, user)?;
        Ok(NotebookView::from_notebook(
            &notebook,
            include_outputs,
            cell_ids.as_deref(),
        ))
    }

    /// Update the SQL execution target via a synchronous kernel round-trip.
    pub async fn set_db_config(&self, user: &UserId, conn_string: String) -> ApiResult<()> {
        self.ensure_alive()?;
        {
            let notebook = self.notebook.lock().await;
            Self::check_owner(&notebook, user)?;
        }

        let rx = self.register_pending(PendingKey::DbConfig)?;
        if let Err(e) = self.send_kernel(KernelCommand::SetDbConfig {
            conn_string: conn_string.clone(),
        }) {
            self.cancel_pending(PendingKey::DbConfig);
            return Err(e);
        }
        let event = self
            .await_rendezvous(
                PendingKey::DbConfig,
                rx,
                self.config.register_timeout,
                "db config",
            )
            .await?;
        let KernelEvent::ConfigResult { status, error } = event else {
            return Err(ApiError::KernelDied("unexpected kernel response".into()));
        };

        match status {
            ResultStatus::Success => {
                let mut notebook = self.notebook.lock().await;
                notebook.db_conn_string = Some(conn_string);
                notebook.revision += 1;
                let meta = notebook.metadata();
                if let Err(e) = self.storage.save_notebook_metadata(&meta).await {
                    tracing::error!("failed to persist notebook metadata: {e}");
                }
                Ok(())
            }
            ResultStatus::Error => Err(ApiError::BadRequest(
                error.unwrap_or_else(|| "invalid connection string".to_string()),
            )),
        }
    }

    /// Tear the coordinator down: cancel the reader, fail pending waiters,
    /// and ask the kernel to exit.
    pub async fn shutdown(&self) {
        self.dead.store(true, Ordering::SeqCst);
        if let Some(handle) = self.reader.lock().expect("reader slot").take() {
            handle.abort();
        }
        let waiters: Vec<_> = {
            let mut pending = self.pending.lock().expect("pending lock");
            pending.drain().collect()
        };
        for (_, tx) in waiters {
            let _ = tx.send(PendingOutcome::ShuttingDown);
        }
        self.kernel.lock().expect("kernel lock").shutdown();
    }

    async fn persist_cell(&self, notebook: &Notebook, cell: &Cell) {
        if let Err(e) = self
            .storage
            .save_cell(&notebook.id, cell.position, cell)
            .await
        {
            tracing::error!(cell_id = %cell.id, "failed to persist cell: {e}");
        }
        if let Err(e) = self.storage.save_notebook_metadata(&notebook.metadata()).await {
            tracing::error!("failed to persist notebook metadata: {e}");
        }
    }
}
