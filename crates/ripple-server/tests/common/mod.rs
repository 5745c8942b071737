#![allow(dead_code)]
//! Shared test harness: coordinators backed by an in-process kernel.
//!
//! The kernel's serial loop runs on a plain thread over the same queue
//! types the stdio transport uses, so coordinator behavior is exercised
//! end-to-end without spawning worker processes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use ripple_core::ipc::{KernelCommand, KernelLink};
use ripple_core::notebook::UserId;

use ripple_server::coordinator::CoordinatorConfig;
use ripple_server::registry::Registry;
use ripple_server::storage::MemoryStore;

/// Spawn a kernel loop on a thread and wire it into a [`KernelLink`].
pub fn in_process_kernel() -> ripple_core::Result<KernelLink> {
    let (link, _) = in_process_kernel_with_control();
    Ok(link)
}

/// Like [`in_process_kernel`] but also returns the raw command sender so a
/// test can kill the kernel out from under the coordinator.
pub fn in_process_kernel_with_control() -> (KernelLink, mpsc::Sender<KernelCommand>) {
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();
    let alive = Arc::new(AtomicBool::new(true));

    let thread_alive = alive.clone();
    std::thread::spawn(move || {
        ripple_kernel::serve(cmd_rx, |event| {
            let _ = event_tx.send(event);
        });
        thread_alive.store(false, Ordering::SeqCst);
    });

    let control = cmd_tx.clone();
    (KernelLink::from_parts(cmd_tx, event_rx, alive), control)
}

/// Tight timeouts so failure paths resolve quickly in tests.
pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        register_timeout: Duration::from_secs(5),
        run_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
        event_capacity: 256,
    }
}

/// A registry over in-memory storage and in-process kernels. The returned
/// handle exposes the control sender of the most recently spawned kernel.
pub fn test_registry() -> (Arc<Registry>, Arc<Mutex<Option<mpsc::Sender<KernelCommand>>>>) {
    let last_control: Arc<Mutex<Option<mpsc::Sender<KernelCommand>>>> =
        Arc::new(Mutex::new(None));
    let control = last_control.clone();
    let registry = Registry::new(
        Arc::new(MemoryStore::new()),
        Arc::new(move || {
            let (link, cmd_tx) = in_process_kernel_with_control();
            *control.lock().unwrap() = Some(cmd_tx);
            Ok(link)
        }),
        test_config(),
    );
    (Arc::new(registry), last_control)
}

pub fn alice() -> UserId {
    UserId::from("alice")
}

pub fn mallory() -> UserId {
    UserId::from("mallory")
}
