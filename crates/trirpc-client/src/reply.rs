//! Call result types
//!
//! The three call kinds produce three distinct result shapes, rather
//! than one overloaded callback: `submit` produces nothing, `query`
//! produces a single pending answer, `subscribe` produces a stream of
//! pushed answers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use trirpc_common::protocol::{Response, Result, RpcError};

use crate::correlation::Correlation;

/// What a call hands back to its caller, by kind.
pub enum Reply {
    /// `submit`: fire-and-forget, nothing comes back.
    None,
    /// `query`: exactly one answer, eventually.
    Answer(PendingAnswer),
    /// `subscribe`: zero or more answers over the connection lifetime.
    Stream(Subscription),
}

/// The single outstanding answer of a `query`.
pub struct PendingAnswer {
    rx: oneshot::Receiver<Response>,
    /// Pending-table entry to drop if the wait is abandoned. The HTTP
    /// client has no table and passes `None`.
    cleanup: Option<(Arc<Correlation>, u64)>,
}

impl PendingAnswer {
    pub(crate) fn new(
        rx: oneshot::Receiver<Response>,
        cleanup: Option<(Arc<Correlation>, u64)>,
    ) -> Self {
        PendingAnswer { rx, cleanup }
    }

    /// Wait for the answer without bound.
    pub async fn wait(self) -> Result<Response> {
        self.rx
            .await
            .map_err(|_| RpcError::Connection("answer channel closed".into()))
    }

    /// Wait for the answer with a ceiling. On timeout the pending-table
    /// entry is cleaned up so a late answer is discarded as stale rather
    /// than leaking the entry.
    pub async fn wait_timeout(self, ceiling: Duration) -> Result<Response> {
        let PendingAnswer { rx, cleanup } = self;
        match tokio::time::timeout(ceiling, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(RpcError::Connection("answer channel closed".into())),
            Err(_) => {
                if let Some((correlation, seq)) = cleanup {
                    correlation.forget(seq);
                }
                Err(RpcError::Timeout(ceiling.as_millis() as u64))
            }
        }
    }
}

/// The answer stream of a `subscribe` call.
///
/// Every push the server emits on the original seq arrives here, in
/// order. Dropping the subscription retires its pending-table entry on
/// the next push; closing the connection ends the stream.
pub struct Subscription {
    seq: u64,
    rx: mpsc::UnboundedReceiver<Response>,
}

impl Subscription {
    pub(crate) fn new(seq: u64, rx: mpsc::UnboundedReceiver<Response>) -> Self {
        Subscription { seq, rx }
    }

    /// The sequence number the server pushes on.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Next pushed answer; `None` once the connection is gone.
    pub async fn next(&mut self) -> Option<Response> {
        self.rx.recv().await
    }
}
