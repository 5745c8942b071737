//! Kernel worker binary: bridges stdin/stdout frames onto the serial loop.
//!
//! stdout carries the event queue, so all logging goes to stderr.

use std::io::{self, Read};
use std::sync::mpsc;

use tracing_subscriber::EnvFilter;

use ripple_core::ipc::{read_frame, write_frame, KernelCommand};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let (cmd_tx, cmd_rx) = mpsc::channel::<KernelCommand>();

    // Input pump: stdin frames onto the command queue, strictly in order.
    std::thread::spawn(move || {
        let stdin = io::stdin();
        let mut reader = stdin.lock();
        pump_commands(&mut reader, &cmd_tx);
    });

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    ripple_kernel::serve(cmd_rx, move |event| {
        if write_frame(&mut writer, &event).is_err() {
            // Parent went away; nothing left to serve.
            std::process::exit(0);
        }
    });

    Ok(())
}

fn pump_commands<R: Read>(reader: &mut R, cmd_tx: &mpsc::Sender<KernelCommand>) {
    loop {
        match read_frame::<_, KernelCommand>(reader) {
            Ok(command) => {
                let shutdown = matches!(command, KernelCommand::Shutdown);
                if cmd_tx.send(command).is_err() || shutdown {
                    break;
                }
            }
            // EOF: the coordinator closed our stdin; drop the queue so the
            // serial loop drains what it has and exits.
            Err(_) => break,
        }
    }
}
