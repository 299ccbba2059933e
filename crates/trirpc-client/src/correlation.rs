//! Correlation layer
//!
//! Used identically by the TCP and WebSocket clients: every outbound
//! call takes a fresh sequence number, and answers arriving on the
//! shared connection are routed back to the waiting caller through the
//! pending-answer table.
//!
//! One-shot entries (`query`) are removed on first delivery; stream
//! entries (`subscribe`) are retained so every further push on the same
//! seq reaches the same subscription. Answers for unknown seqs are
//! discarded silently, as expected after a timeout or a reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use trirpc_common::protocol::{Call, CallEnvelope, CallKind, Response, ResponseEnvelope, Result, RpcError};

use crate::reply::{PendingAnswer, Reply, Subscription};

enum Pending {
    Once(oneshot::Sender<Response>),
    Stream(mpsc::UnboundedSender<Response>),
}

/// Per-connection sequence generator and pending-answer table.
///
/// The send path inserts and the receive path removes, and the two race
/// across tasks, hence the mutex.
#[derive(Default)]
pub(crate) struct Correlation {
    last_seq: AtomicU64,
    pending: Mutex<HashMap<u64, Pending>>,
}

impl Correlation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence number; starts at 1, never reused within the
    /// connection's lifetime.
    pub fn next_seq(&self) -> u64 {
        self.last_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Register a one-shot continuation for a `query`.
    pub fn register_once(&self, seq: u64) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(seq, Pending::Once(tx));
        rx
    }

    /// Register a persistent continuation for a `subscribe`.
    pub fn register_stream(&self, seq: u64) -> mpsc::UnboundedReceiver<Response> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock_pending().insert(seq, Pending::Stream(tx));
        rx
    }

    /// Remove an entry without delivering anything. Used when a call
    /// times out or fails to send, so the table does not leak.
    pub fn forget(&self, seq: u64) {
        self.lock_pending().remove(&seq);
    }

    /// Route an inbound answer to its pending continuation.
    pub fn on_answer(&self, envelope: ResponseEnvelope) {
        let mut pending = self.lock_pending();
        match pending.get(&envelope.seq) {
            Some(Pending::Once(_)) => {
                if let Some(Pending::Once(tx)) = pending.remove(&envelope.seq) {
                    let _ = tx.send(envelope.response);
                }
            }
            Some(Pending::Stream(tx)) => {
                // Subscriber gone: retire the entry.
                if tx.send(envelope.response).is_err() {
                    pending.remove(&envelope.seq);
                }
            }
            None => trace!(seq = envelope.seq, "discarding answer for unknown seq"),
        }
    }

    /// Drop every pending entry. Called when the connection closes; the
    /// corresponding waiters observe their channel closing.
    pub fn clear(&self) {
        self.lock_pending().clear();
    }

    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.lock_pending().len()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Pending>> {
        self.pending.lock().expect("pending table lock poisoned")
    }
}

/// The shared send path of the two socket clients.
///
/// Stamps each call with a fresh seq, registers the continuation its
/// kind requires and hands the envelope to the transport's writer task.
/// The TCP and WebSocket clients differ only in how that writer frames
/// the envelope.
pub(crate) struct CorrelatedSender {
    pub correlation: std::sync::Arc<Correlation>,
    pub out_tx: mpsc::UnboundedSender<CallEnvelope>,
}

impl CorrelatedSender {
    pub fn emit(&self, call: Call) -> Result<Reply> {
        let seq = self.correlation.next_seq();
        let reply = match call.kind {
            CallKind::Query => Reply::Answer(PendingAnswer::new(
                self.correlation.register_once(seq),
                Some((self.correlation.clone(), seq)),
            )),
            CallKind::Subscribe => {
                Reply::Stream(Subscription::new(seq, self.correlation.register_stream(seq)))
            }
            CallKind::Submit => Reply::None,
        };

        if self.out_tx.send(CallEnvelope { seq, call }).is_err() {
            self.correlation.forget(seq);
            return Err(RpcError::Connection("connection closed".into()));
        }
        Ok(reply)
    }

    pub async fn call_with_timeout(
        &self,
        call: Call,
        ceiling: std::time::Duration,
    ) -> Result<Response> {
        match self.emit(call)? {
            Reply::Answer(answer) => answer.wait_timeout(ceiling).await,
            _ => Err(RpcError::InvalidState(
                "only query calls carry a single answer",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn answer(seq: u64, data: serde_json::Value) -> ResponseEnvelope {
        ResponseEnvelope {
            seq,
            response: Response::success(data),
        }
    }

    #[test]
    fn seq_starts_at_one_and_increases() {
        let correlation = Correlation::new();
        assert_eq!(correlation.next_seq(), 1);
        assert_eq!(correlation.next_seq(), 2);
        assert_eq!(correlation.next_seq(), 3);
    }

    #[tokio::test]
    async fn once_entry_is_removed_on_first_delivery() {
        let correlation = Correlation::new();
        let seq = correlation.next_seq();
        let rx = correlation.register_once(seq);

        correlation.on_answer(answer(seq, json!("a")));
        assert_eq!(rx.await.unwrap(), Response::success(json!("a")));
        assert_eq!(correlation.pending_len(), 0);

        // A late duplicate on the same seq is discarded silently.
        correlation.on_answer(answer(seq, json!("b")));
    }

    #[tokio::test]
    async fn stream_entry_survives_multiple_answers() {
        let correlation = Correlation::new();
        let seq = correlation.next_seq();
        let mut rx = correlation.register_stream(seq);

        correlation.on_answer(answer(seq, json!(1)));
        correlation.on_answer(answer(seq, json!(2)));

        assert_eq!(rx.recv().await.unwrap(), Response::success(json!(1)));
        assert_eq!(rx.recv().await.unwrap(), Response::success(json!(2)));
        assert_eq!(correlation.pending_len(), 1);
    }

    #[test]
    fn dropped_subscription_retires_its_entry() {
        let correlation = Correlation::new();
        let seq = correlation.next_seq();
        let rx = correlation.register_stream(seq);
        drop(rx);

        correlation.on_answer(answer(seq, json!(1)));
        assert_eq!(correlation.pending_len(), 0);
    }

    #[test]
    fn unknown_seq_is_discarded() {
        let correlation = Correlation::new();
        correlation.on_answer(answer(99, json!("stale")));
        assert_eq!(correlation.pending_len(), 0);
    }

    #[test]
    fn forget_cleans_up_without_delivery() {
        let correlation = Correlation::new();
        let seq = correlation.next_seq();
        let _rx = correlation.register_once(seq);
        assert_eq!(correlation.pending_len(), 1);

        correlation.forget(seq);
        assert_eq!(correlation.pending_len(), 0);
    }

    #[tokio::test]
    async fn clear_closes_waiters() {
        let correlation = Correlation::new();
        let rx = correlation.register_once(correlation.next_seq());
        correlation.clear();
        assert!(rx.await.is_err());
    }
}
