//! Kernel process management.
//!
//! [`spawn_kernel`] launches the `ripple-kernel` binary with piped stdio and
//! bridges it onto the two queues the Coordinator works with: a command
//! sender (FIFO into the kernel's stdin) and an event receiver (FIFO out of
//! its stdout). Exactly one task — the Coordinator's background reader — may
//! consume the event receiver.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::error::{Error, Result};

use super::protocol::{read_frame, write_frame, KernelCommand, KernelEvent};

/// Handle to a kernel worker and its queues.
pub struct KernelLink {
    commands: mpsc::Sender<KernelCommand>,
    /// Taken by the Coordinator's background reader.
    events: Option<UnboundedReceiver<KernelEvent>>,
    alive: Arc<AtomicBool>,
    process: Option<KernelProcess>,
}

impl KernelLink {
    /// Build a link from raw queue endpoints (in-process kernels, tests).
    pub fn from_parts(
        commands: mpsc::Sender<KernelCommand>,
        events: UnboundedReceiver<KernelEvent>,
        alive: Arc<AtomicBool>,
    ) -> Self {
        Self {
            commands,
            events: Some(events),
            alive,
            process: None,
        }
    }

    /// Enqueue a command. Fails when the kernel is gone.
    pub fn send(&self, cmd: KernelCommand) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::KernelDied("kernel process is not running".into()));
        }
        self.commands
            .send(cmd)
            .map_err(|_| Error::KernelDied("kernel command queue closed".into()))
    }

    /// Whether the kernel is believed to be running.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Take the event receiver. The single-reader rule makes this a
    /// one-shot: subsequent calls return `None`.
    pub fn take_events(&mut self) -> Option<UnboundedReceiver<KernelEvent>> {
        self.events.take()
    }

    /// Ask the kernel to exit, then force-kill after a short grace.
    pub fn shutdown(&mut self) {
        let _ = self.commands.send(KernelCommand::Shutdown);
        self.alive.store(false, Ordering::SeqCst);
        if let Some(process) = &self.process {
            process.kill_after_grace();
        }
    }
}

impl Drop for KernelLink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The spawned worker process.
#[derive(Clone)]
pub struct KernelProcess {
    child: Arc<Mutex<Child>>,
    pid: u32,
}

impl KernelProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Give the worker a moment to exit on its own, then kill and reap it.
    fn kill_after_grace(&self) {
        std::thread::sleep(Duration::from_millis(10));
        if let Ok(mut child) = self.child.lock() {
            if let Err(e) = child.kill() {
                // ESRCH means the process already exited.
                if !e.to_string().contains("No such process") {
                    tracing::warn!("failed to kill kernel: {e}");
                }
            }
            let _ = child.wait();
        }
    }

    /// Force-kill the worker immediately (used by kill handles).
    pub fn kill(&self) {
        if let Ok(mut child) = self.child.lock() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Spawn a kernel worker process and wire up its queues.
pub fn spawn_kernel() -> Result<KernelLink> {
    let binary = find_kernel_binary()?;
    spawn_kernel_at(&binary)
}

/// Spawn a specific kernel binary.
pub fn spawn_kernel_at(binary: &PathBuf) -> Result<KernelLink> {
    let mut child = Command::new(binary)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| {
            Error::Ipc(format!(
                "failed to spawn kernel process '{}': {e}",
                binary.display()
            ))
        })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::Ipc("failed to get kernel stdin".into()))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Ipc("failed to get kernel stdout".into()))?;

    let pid = child.id();
    let alive = Arc::new(AtomicBool::new(true));
    let (cmd_tx, cmd_rx) = mpsc::channel::<KernelCommand>();
    let (event_tx, event_rx): (UnboundedSender<KernelEvent>, UnboundedReceiver<KernelEvent>) =
        unbounded_channel();

    // Writer: drains the command queue into the kernel's stdin, in order.
    std::thread::Builder::new()
        .name(format!("kernel-{pid}-writer"))
        .spawn(move || {
            while let Ok(cmd) = cmd_rx.recv() {
                if write_frame(&mut stdin, &cmd).is_err() {
                    break;
                }
            }
            // Dropping stdin signals EOF; the kernel loop exits.
        })
        .map_err(|e| Error::Ipc(format!("failed to spawn kernel writer thread: {e}")))?;

    // Reader: pumps stdout frames into the event queue until EOF or error.
    let reader_alive = alive.clone();
    std::thread::Builder::new()
        .name(format!("kernel-{pid}-reader"))
        .spawn(move || {
            loop {
                match read_frame::<_, KernelEvent>(&mut stdout) {
                    Ok(event) => {
                        if event_tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            reader_alive.store(false, Ordering::SeqCst);
        })
        .map_err(|e| Error::Ipc(format!("failed to spawn kernel reader thread: {e}")))?;

    Ok(KernelLink {
        commands: cmd_tx,
        events: Some(event_rx),
        alive,
        process: Some(KernelProcess {
            child: Arc::new(Mutex::new(child)),
            pid,
        }),
    })
}

/// Locate the `ripple-kernel` binary.
///
/// Search order: `RIPPLE_KERNEL_PATH`, next to the current executable, the
/// system PATH, then `target/{debug,release}` for development.
pub fn find_kernel_binary() -> Result<PathBuf> {
    let binary_name = if cfg!(windows) {
        "ripple-kernel.exe"
    } else {
        "ripple-kernel"
    };

    if let Ok(path) = std::env::var("RIPPLE_KERNEL_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let candidate = exe_dir.join(binary_name);
            if candidate.exists() {
                return Ok(candidate);
            }
            // Integration tests run from target/{profile}/deps.
            if let Some(parent) = exe_dir.parent() {
                let candidate = parent.join(binary_name);
                if candidate.exists() {
                    return Ok(candidate);
                }
            }
        }
    }

    if let Ok(path) = which::which(binary_name) {
        return Ok(path);
    }

    if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
        for profile in &["debug", "release"] {
            let path = PathBuf::from(&manifest_dir)
                .join("..")
                .join("..")
                .join("target")
                .join(profile)
                .join(binary_name);
            if path.exists() {
                return Ok(path.canonicalize().unwrap_or(path));
            }
        }
    }

    Err(Error::Ipc(
        "could not find ripple-kernel binary; set RIPPLE_KERNEL_PATH or ensure it is in PATH"
            .to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_send_and_receive() {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        let mut link = KernelLink::from_parts(cmd_tx, event_rx, alive.clone());

        link.send(KernelCommand::Shutdown).unwrap();
        assert_eq!(cmd_rx.try_recv().unwrap(), KernelCommand::Shutdown);

        event_tx
            .send(KernelEvent::ExecuteStarted {
                cell_id: crate::notebook::CellId::new(),
            })
            .unwrap();
        let mut events = link.take_events().unwrap();
        assert!(events.try_recv().is_ok());
        assert!(link.take_events().is_none());
    }

    #[test]
    fn test_send_fails_when_dead() {
        let (cmd_tx, _cmd_rx) = mpsc::channel();
        let (_event_tx, event_rx) = unbounded_channel();
        let alive = Arc::new(AtomicBool::new(false));
        let link = KernelLink::from_parts(cmd_tx, event_rx, alive);
        assert!(matches!(
            link.send(KernelCommand::Shutdown),
            Err(Error::KernelDied(_))
        ));
    }

    #[test]
    #[ignore = "requires ripple-kernel binary"]
    fn test_spawn_real_kernel() {
        let mut link = spawn_kernel().unwrap();
        assert!(link.is_alive());
        link.shutdown();
    }
}
