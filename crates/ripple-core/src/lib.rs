//! Core engine for the ripple reactive notebook.
//!
//! This crate holds the pieces that do not need a server or a kernel
//! process: the cell language frontend (`lang`), the reads/writes
//! dependency analyzer (`analyze`), the variable-level dependency graph
//! (`graph`), the notebook data model (`notebook`), and the kernel IPC
//! protocol and process link (`ipc`).

pub mod analyze;
pub mod error;
pub mod graph;
pub mod ipc;
pub mod lang;
pub mod notebook;

pub use error::{Error, Result};
