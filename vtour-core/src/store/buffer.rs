//! Buffering tier
//!
//! Accumulates change sets saved by the interactive tier and hands them to
//! the disk tier on request. Every send into this tier is an unbounded
//! channel push, so an interactive save never waits for disk I/O.

use super::changes::ChangeSet;
use super::disk::{DiskHealth, DiskTier};
use super::StoreError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

enum BufferCommand {
    Absorb(ChangeSet),
    Persist,
    Drain(oneshot::Sender<Result<(), StoreError>>),
    Reset(oneshot::Sender<Result<(), StoreError>>),
    Close(oneshot::Sender<Result<(), StoreError>>),
}

#[derive(Clone)]
pub(crate) struct BufferTier {
    sender: mpsc::UnboundedSender<BufferCommand>,
    disk: DiskTier,
}

impl BufferTier {
    pub fn spawn(disk: DiskTier) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run(disk.clone(), receiver));
        Self { sender, disk }
    }

    /// Take ownership of a committed change set
    pub fn absorb(&self, changes: ChangeSet) -> Result<(), StoreError> {
        self.sender
            .send(BufferCommand::Absorb(changes))
            .map_err(|_| StoreError::Closed)
    }

    /// Ask for everything accumulated so far to be written; does not wait
    pub fn persist(&self) -> Result<(), StoreError> {
        self.sender.send(BufferCommand::Persist).map_err(|_| StoreError::Closed)
    }

    /// Persist and wait until the disk tier has handled it
    pub async fn drain(&self) -> Result<(), StoreError> {
        self.request(BufferCommand::Drain).await
    }

    /// Flush, then clear every persisted row
    pub async fn reset(&self) -> Result<(), StoreError> {
        self.request(BufferCommand::Reset).await
    }

    pub async fn close(&self) -> Result<(), StoreError> {
        self.request(BufferCommand::Close).await
    }

    pub async fn disk_health(&self) -> DiskHealth {
        self.disk.health().await
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<(), StoreError>>) -> BufferCommand,
    ) -> Result<(), StoreError> {
        let (resp, result) = oneshot::channel();
        self.sender.send(command(resp)).map_err(|_| StoreError::Closed)?;
        result.await.map_err(|_| StoreError::Closed)?
    }
}

async fn run(disk: DiskTier, mut receiver: mpsc::UnboundedReceiver<BufferCommand>) {
    let mut pending = ChangeSet::default();

    while let Some(command) = receiver.recv().await {
        match command {
            BufferCommand::Absorb(changes) => pending.merge(changes),
            BufferCommand::Persist => {
                if let Err(e) = hand_off(&disk, &mut pending) {
                    warn!(error = %e, "Buffered changes could not reach the disk tier");
                }
            }
            BufferCommand::Drain(resp) => {
                let result = match hand_off(&disk, &mut pending) {
                    Ok(()) => disk.sync().await,
                    Err(e) => Err(e),
                };
                let _ = resp.send(result);
            }
            BufferCommand::Reset(resp) => {
                // Written first so a failed reset leaves the latest state on disk
                let result = match hand_off(&disk, &mut pending) {
                    Ok(()) => disk.reset().await,
                    Err(e) => Err(e),
                };
                let _ = resp.send(result);
            }
            BufferCommand::Close(resp) => {
                let result = match hand_off(&disk, &mut pending) {
                    Ok(()) => disk.close().await,
                    Err(e) => Err(e),
                };
                let _ = resp.send(result);
                debug!("Buffering tier closed");
                return;
            }
        }
    }
}

fn hand_off(disk: &DiskTier, pending: &mut ChangeSet) -> Result<(), StoreError> {
    if pending.is_empty() {
        return Ok(());
    }
    let changes = std::mem::take(pending);
    debug!(summary = ?changes.summary(), "Handing buffered changes to disk tier");
    disk.write(changes)
}
