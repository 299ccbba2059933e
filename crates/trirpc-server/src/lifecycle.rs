//! Shared listen/close state machine for the three server variants.
//!
//! Double-listen and close-before-listen are usage errors and fail fast
//! rather than being papered over.

use std::net::SocketAddr;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use trirpc_common::protocol::{Result, RpcError};

/// State held while a server is listening.
pub(crate) struct ListenGuard {
    pub local_addr: SocketAddr,
    pub shutdown: watch::Sender<bool>,
    pub accept_task: JoinHandle<()>,
}

/// Listen-state slot shared by all server variants.
#[derive(Default)]
pub(crate) struct Lifecycle {
    state: tokio::sync::Mutex<Option<ListenGuard>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the slot for a new accept loop. Fails if already listening.
    pub async fn begin(&self) -> Result<tokio::sync::MutexGuard<'_, Option<ListenGuard>>> {
        let slot = self.state.lock().await;
        if slot.is_some() {
            return Err(RpcError::InvalidState("already listening"));
        }
        Ok(slot)
    }

    /// Signal shutdown and wait for the accept loop to wind down.
    pub async fn close(&self) -> Result<()> {
        let guard = {
            let mut slot = self.state.lock().await;
            slot.take()
                .ok_or(RpcError::InvalidState("not started"))?
        };
        // Receivers observe the change and exit their select loops.
        let _ = guard.shutdown.send(true);
        let _ = guard.accept_task.await;
        Ok(())
    }

    /// The bound address, if listening.
    pub async fn local_addr(&self) -> Result<SocketAddr> {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|guard| guard.local_addr)
            .ok_or(RpcError::InvalidState("not started"))
    }
}
