//! WebSocket client transport
//!
//! Identical to the TCP client in correlation behavior; differs only in
//! framing: one WebSocket text message per JSON envelope.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use trirpc_common::protocol::{Call, CallEnvelope, Response, ResponseEnvelope, Result, RpcError};

use crate::correlation::{CorrelatedSender, Correlation};
use crate::reply::Reply;
use crate::DEFAULT_CALL_TIMEOUT;

/// RPC client over WebSocket, one JSON envelope per text message.
pub struct WsClient {
    sender: CorrelatedSender,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl WsClient {
    /// Connects to `url` (e.g. `"ws://127.0.0.1:11080"`) and spawns the
    /// connection's reader and writer tasks.
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| RpcError::Connection(format!("failed to connect to {url}: {e}")))?;
        let (mut ws_write, mut ws_read) = ws.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<CallEnvelope>();
        let writer_task = tokio::spawn(async move {
            while let Some(envelope) = out_rx.recv().await {
                let text = match serde_json::to_string(&envelope) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "failed to encode call envelope");
                        continue;
                    }
                };
                if let Err(e) = ws_write.send(Message::text(text)).await {
                    warn!(error = %e, "connection write failed");
                    break;
                }
            }
            let _ = ws_write.close().await;
        });

        let correlation = Arc::new(Correlation::new());
        let reader_correlation = correlation.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(message) = ws_read.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ResponseEnvelope>(text.as_str()) {
                            Ok(envelope) => reader_correlation.on_answer(envelope),
                            Err(e) => warn!(error = %e, "failed to decode inbound envelope"),
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("connection closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "connection read failed");
                        break;
                    }
                }
            }
            reader_correlation.clear();
        });

        Ok(WsClient {
            sender: CorrelatedSender {
                correlation,
                out_tx,
            },
            reader_task,
            writer_task,
        })
    }

    /// Sends `call` with a fresh seq; the returned [`Reply`] matches the
    /// call kind. Fails fast once the connection is closed.
    pub fn emit(&self, call: Call) -> Result<Reply> {
        self.sender.emit(call)
    }

    /// Emits a `query` and waits for its single answer, bounded by the
    /// default one-minute ceiling.
    pub async fn call_and_wait(&self, call: Call) -> Result<Response> {
        self.call_with_timeout(call, DEFAULT_CALL_TIMEOUT).await
    }

    /// Like [`call_and_wait`](Self::call_and_wait) with a custom ceiling.
    pub async fn call_with_timeout(&self, call: Call, ceiling: Duration) -> Result<Response> {
        self.sender.call_with_timeout(call, ceiling).await
    }

    /// Closes the connection and clears every pending entry.
    pub async fn close(self) -> Result<()> {
        self.sender.correlation.clear();
        drop(self.sender);
        self.reader_task.abort();
        let _ = self.writer_task.await;
        Ok(())
    }
}
