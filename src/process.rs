//! Node process ownership
//!
//! Exactly one `NodeProcess` exists at a time and it is owned by the
//! lifecycle controller. A reaper task owns the actual `Child`; the handle
//! exposes a kill signal and a watch channel that flips once the process has
//! exited, so both the unexpected-exit observer and the shutdown protocol can
//! await termination independently.

use std::io;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::{oneshot, watch};

/// Handle to a spawned node process
#[derive(Debug)]
pub struct NodeProcess {
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<bool>,
}

impl NodeProcess {
    /// Spawn the node binary with the given startup flags.
    /// Stdio is detached; the node logs to its own files.
    pub fn spawn(binary: &Path, args: &[String]) -> io::Result<Self> {
        log::info!("Running client {} with commands {:?}", binary.display(), args);

        let mut child = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let pid = child.id();
        let (exit_tx, exited) = watch::channel(false);
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            tokio::select! {
                _ = child.wait() => {}
                signal = kill_rx => {
                    // A dropped sender is not a kill request
                    if signal.is_ok() {
                        log::info!("Force killing client process");
                        let _ = child.start_kill();
                    }
                    let _ = child.wait().await;
                }
            }
            let _ = exit_tx.send(true);
        });

        Ok(Self {
            pid,
            kill_tx: Some(kill_tx),
            exited,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Watch channel that flips to true once the process has exited
    pub fn exit_watch(&self) -> watch::Receiver<bool> {
        self.exited.clone()
    }

    /// Whether the process has already exited
    pub fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }

    /// Request a forced kill. Idempotent; the reaper task does the work.
    pub fn force_kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Await the exit flag on a watch receiver
pub async fn wait_for_exit(exited: &mut watch::Receiver<bool>) {
    // Err means the reaper task is gone, which also implies exit
    let _ = exited.wait_for(|done| *done).await;
}
