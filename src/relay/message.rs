//! Relay control messages
//!
//! A running relay is controlled through a channel instead of shared state,
//! so the accept loop never holds a lock.

use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::common::{Result, UtilError};

/// Snapshot of relay activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Connections currently being relayed
    pub active: usize,
    /// Connections accepted since start
    pub accepted: u64,
}

/// Messages understood by the accept loop
#[derive(Debug)]
pub enum RelayMessage {
    /// Report current statistics
    Stats(oneshot::Sender<RelayStats>),
    /// Stop accepting and abort relayed connections
    Shutdown,
}

/// Handle to a relay started in the background
#[derive(Debug)]
pub struct RelayHandle {
    local_addr: SocketAddr,
    sender: mpsc::Sender<RelayMessage>,
    task: JoinHandle<Result<()>>,
}

impl RelayHandle {
    pub(crate) fn new(
        local_addr: SocketAddr,
        sender: mpsc::Sender<RelayMessage>,
        task: JoinHandle<Result<()>>,
    ) -> Self {
        Self {
            local_addr,
            sender,
            task,
        }
    }

    /// Address the relay is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send a message to the accept loop
    pub async fn send(&self, message: RelayMessage) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| UtilError::Other("Relay is no longer running".to_string()))
    }

    pub async fn stats(&self) -> Result<RelayStats> {
        let (tx, rx) = oneshot::channel();
        self.send(RelayMessage::Stats(tx)).await?;
        rx.await
            .map_err(|_| UtilError::Other("Relay dropped the stats request".to_string()))
    }

    /// Stop the relay and wait for the accept loop to exit
    pub async fn shutdown(self) -> Result<()> {
        // The loop may already be gone; its result is what matters
        let _ = self.sender.send(RelayMessage::Shutdown).await;
        self.task
            .await
            .map_err(|e| UtilError::TaskPanicked(e.to_string()))?
    }
}

/// Create a relay control channel
pub(crate) fn create_channel() -> (mpsc::Sender<RelayMessage>, mpsc::Receiver<RelayMessage>) {
    mpsc::channel(16)
}
