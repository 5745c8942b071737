//! Kernel worker for the ripple reactive notebook.
//!
//! One kernel process serves one Coordinator. It owns the user-visible
//! globals mapping and drains its command queue strictly in order, one
//! cascade at a time, emitting events on the output queue. The stdio framing
//! lives in `main.rs`; everything here works over plain queues so the same
//! loop can run in-process for tests.

pub mod adapter;
pub mod interp;
pub mod shadow;
pub mod sql;

use std::sync::mpsc::Receiver;

use ripple_core::ipc::{KernelCommand, KernelEvent, ResultStatus};
use ripple_core::notebook::{CellId, CellType};

use crate::interp::Interp;
use crate::shadow::ShadowState;

/// Kernel state: interpreter globals, shadow graph, SQL target.
pub struct Kernel {
    interp: Interp,
    shadow: ShadowState,
    db_conn: Option<String>,
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    pub fn new() -> Self {
        Self {
            interp: Interp::new(),
            shadow: ShadowState::new(),
            db_conn: None,
        }
    }

    /// Handle `register_cell`.
    pub fn register(
        &mut self,
        cell_id: CellId,
        code: &str,
        cell_type: CellType,
        position: usize,
    ) -> KernelEvent {
        let outcome = self.shadow.register(cell_id, code, cell_type, position);
        KernelEvent::RegisterResult {
            cell_id,
            status: if outcome.cycle.is_some() {
                ResultStatus::Error
            } else {
                ResultStatus::Success
            },
            reads: outcome.reads,
            writes: outcome.writes,
            error: outcome.cycle,
        }
    }

    /// Handle `execute_cell`: run the cell and its reactive dependents in
    /// topological order, streaming one started/result pair per cell and a
    /// final completion event. The cascade stops at the first error.
    pub fn execute(
        &mut self,
        cell_id: CellId,
        code: &str,
        cell_type: CellType,
        db_conn_string: Option<String>,
        emit: &mut dyn FnMut(KernelEvent),
    ) {
        self.shadow.refresh_code(cell_id, code, cell_type);
        if let Some(conn) = db_conn_string {
            self.db_conn = Some(conn);
        }

        let plan = match self.shadow.cascade_plan(cell_id) {
            Ok(plan) => plan,
            Err(cycle) => {
                let vars = self.shadow.vars(cell_id);
                emit(KernelEvent::ExecuteResult {
                    cell_id,
                    status: ResultStatus::Error,
                    stdout: String::new(),
                    outputs: Vec::new(),
                    error: Some(cycle),
                    reads: vars.reads,
                    writes: vars.writes,
                    cascade_index: 0,
                    cascade_total: 0,
                });
                emit(KernelEvent::ExecuteComplete {
                    initial_cell_id: cell_id,
                    total_cells_executed: 0,
                });
                return;
            }
        };

        let total = plan.len();
        let mut executed = 0;
        for (index, member) in plan.into_iter().enumerate() {
            emit(KernelEvent::ExecuteStarted { cell_id: member });
            let (stdout, outputs, error) = self.run_one(member);
            executed += 1;
            let vars = self.shadow.vars(member);
            let failed = error.is_some();
            emit(KernelEvent::ExecuteResult {
                cell_id: member,
                status: if failed {
                    ResultStatus::Error
                } else {
                    ResultStatus::Success
                },
                stdout,
                outputs,
                error,
                reads: vars.reads,
                writes: vars.writes,
                cascade_index: index,
                cascade_total: total,
            });
            if failed {
                break;
            }
        }

        emit(KernelEvent::ExecuteComplete {
            initial_cell_id: cell_id,
            total_cells_executed: executed,
        });
    }

    /// Execute one cascade member against the shared globals.
    fn run_one(
        &mut self,
        cell_id: CellId,
    ) -> (String, Vec<ripple_core::notebook::Output>, Option<String>) {
        let Some(cell) = self.shadow.get(cell_id) else {
            return (
                String::new(),
                Vec::new(),
                Some(format!("NameError: unknown cell {cell_id}")),
            );
        };
        let code = cell.code.clone();
        match cell.cell_type {
            CellType::Python => {
                let (stdout, result) = self.interp.run_cell(&code);
                match result {
                    Ok(value) => (stdout, adapter::value_to_outputs(value), None),
                    Err(e) => (stdout, Vec::new(), Some(e.to_string())),
                }
            }
            CellType::Sql => {
                let Some(conn) = self.db_conn.clone() else {
                    return (
                        String::new(),
                        Vec::new(),
                        Some("OperationalError: no database connection configured".to_string()),
                    );
                };
                let globals = self.interp.globals.clone();
                let result = sql::execute_sql(&conn, &code, |name| {
                    globals.borrow().get(name).map(|v| v.display())
                });
                match result {
                    Ok(output) => (String::new(), vec![output], None),
                    Err(e) => (String::new(), Vec::new(), Some(e.to_string())),
                }
            }
        }
    }

    /// Handle `set_db_config`.
    pub fn set_db_config(&mut self, conn_string: String) -> KernelEvent {
        match sql::validate_conn(&conn_string) {
            Ok(()) => {
                self.db_conn = Some(conn_string);
                KernelEvent::ConfigResult {
                    status: ResultStatus::Success,
                    error: None,
                }
            }
            Err(e) => KernelEvent::ConfigResult {
                status: ResultStatus::Error,
                error: Some(e.to_string()),
            },
        }
    }
}

/// The serial loop: drain commands in order until `shutdown` or the queue
/// closes. All events go through `emit`, preserving emission order.
pub fn serve(commands: Receiver<KernelCommand>, mut emit: impl FnMut(KernelEvent)) {
    let mut kernel = Kernel::new();
    while let Ok(command) = commands.recv() {
        match command {
            KernelCommand::RegisterCell {
                cell_id,
                code,
                cell_type,
                position,
            } => {
                let event = kernel.register(cell_id, &code, cell_type, position);
                emit(event);
            }
            KernelCommand::RemoveCell { cell_id } => kernel.shadow.remove(cell_id),
            KernelCommand::ExecuteCell {
                cell_id,
                code,
                cell_type,
                db_conn_string,
            } => kernel.execute(cell_id, &code, cell_type, db_conn_string, &mut emit),
            KernelCommand::SetDbConfig { conn_string } => {
                let event = kernel.set_db_config(conn_string);
                emit(event);
            }
            KernelCommand::Shutdown => {
                tracing::debug!("kernel shutting down");
                break;
            }
        }
    }
}
