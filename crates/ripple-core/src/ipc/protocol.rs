//! Kernel IPC protocol messages.
//!
//! Length-prefixed JSON frames over the worker's stdin/stdout: 4-byte length
//! (u32 LE) followed by one serde_json-encoded message. Commands flow parent
//! to kernel in FIFO order; events flow back on the single output queue. The
//! kernel never writes to its input stream nor reads from its output stream.

use std::collections::BTreeSet;
use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::notebook::{CellId, CellType, Output};

/// Reject frames larger than this (100MB).
const MAX_FRAME_LEN: usize = 100 * 1024 * 1024;

/// Command sent from Coordinator to kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelCommand {
    /// Parse and register a cell: extract reads/writes, detect cycles
    /// against the kernel's shadow graph.
    RegisterCell {
        cell_id: CellId,
        code: String,
        cell_type: CellType,
        /// Document position; feeds the cascade ordering tie-break.
        position: usize,
    },

    /// Drop a deleted cell from the shadow graph. Fire-and-forget.
    RemoveCell { cell_id: CellId },

    /// Execute a cell and its reactive dependents in topological order,
    /// streaming results.
    ExecuteCell {
        cell_id: CellId,
        code: String,
        cell_type: CellType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        db_conn_string: Option<String>,
    },

    /// Update the SQL execution target.
    SetDbConfig { conn_string: String },

    /// Exit the serial loop gracefully. Fire-and-forget.
    Shutdown,
}

/// Success/error discriminator carried by result events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Error,
}

/// Event emitted by the kernel on its output queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelEvent {
    /// Response to `register_cell`. `status=error` means the code would
    /// introduce a dependency cycle; reads/writes are still reported.
    RegisterResult {
        cell_id: CellId,
        status: ResultStatus,
        reads: BTreeSet<String>,
        writes: BTreeSet<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A cascade member is about to execute.
    ExecuteStarted { cell_id: CellId },

    /// A cascade member finished executing.
    ExecuteResult {
        cell_id: CellId,
        status: ResultStatus,
        stdout: String,
        outputs: Vec<Output>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        reads: BTreeSet<String>,
        writes: BTreeSet<String>,
        cascade_index: usize,
        cascade_total: usize,
    },

    /// The cascade ended (normally or on first error).
    ExecuteComplete {
        initial_cell_id: CellId,
        total_cells_executed: usize,
    },

    /// Response to `set_db_config`.
    ConfigResult {
        status: ResultStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Write one length-prefixed frame.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let bytes = serde_json::to_vec(message)
        .map_err(|e| Error::Serialization(format!("failed to encode IPC frame: {e}")))?;
    let len = bytes.len() as u32;
    writer
        .write_all(&len.to_le_bytes())
        .map_err(|e| Error::Ipc(format!("failed to write IPC frame length: {e}")))?;
    writer
        .write_all(&bytes)
        .map_err(|e| Error::Ipc(format!("failed to write IPC frame body: {e}")))?;
    writer
        .flush()
        .map_err(|e| Error::Ipc(format!("failed to flush IPC stream: {e}")))?;
    Ok(())
}

/// Read one length-prefixed frame. EOF surfaces as an `Ipc` error.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .map_err(|e| Error::Ipc(format!("failed to read IPC frame length: {e}")))?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_FRAME_LEN {
        return Err(Error::Ipc(format!("IPC frame too large: {len} bytes")));
    }

    let mut bytes = vec![0u8; len];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| Error::Ipc(format!("failed to read IPC frame body: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| Error::Serialization(format!("failed to decode IPC frame: {e}")))
}
