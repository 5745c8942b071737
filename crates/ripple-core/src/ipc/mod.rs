//! IPC between a Coordinator and its kernel worker process.

pub mod link;
pub mod protocol;

pub use link::{spawn_kernel, KernelLink, KernelProcess};
pub use protocol::{read_frame, write_frame, KernelCommand, KernelEvent, ResultStatus};
