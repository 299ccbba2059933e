//! TCP client transport
//!
//! Persistent newline-framed connection. Outbound calls flow through a
//! writer task; a reader task splits inbound bytes on newlines and
//! routes each `{Seq, Response}` envelope through the correlation layer
//! back to the waiting caller.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use trirpc_common::codec::{frame, JsonCodec};
use trirpc_common::protocol::{Call, CallEnvelope, Response, Result, RpcError};

use crate::correlation::{CorrelatedSender, Correlation};
use crate::reply::Reply;
use crate::DEFAULT_CALL_TIMEOUT;

/// RPC client over plain TCP with newline framing.
pub struct TcpClient {
    sender: CorrelatedSender,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl TcpClient {
    /// Connects to `addr` (e.g. `"127.0.0.1:10080"`) and spawns the
    /// connection's reader and writer tasks.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| RpcError::Connection(format!("failed to connect to {addr}: {e}")))?;
        let (read_half, mut write_half) = stream.into_split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<CallEnvelope>();
        let writer_task = tokio::spawn(async move {
            while let Some(envelope) = out_rx.recv().await {
                let payload = match JsonCodec::encode_call(&envelope) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "failed to encode call envelope");
                        continue;
                    }
                };
                if let Err(e) = write_half.write_all(&frame(&payload)).await {
                    warn!(error = %e, "connection write failed");
                    break;
                }
            }
            let _ = write_half.shutdown().await;
        });

        let correlation = Arc::new(Correlation::new());
        let reader_correlation = correlation.clone();
        let reader_task = tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.is_empty() {
                            continue;
                        }
                        match JsonCodec::decode_response(line.as_bytes()) {
                            Ok(envelope) => reader_correlation.on_answer(envelope),
                            Err(e) => warn!(error = %e, "failed to decode inbound frame"),
                        }
                    }
                    Ok(None) => {
                        debug!("connection closed by server");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "connection read failed");
                        break;
                    }
                }
            }
            // Waiters observe their channels closing.
            reader_correlation.clear();
        });

        Ok(TcpClient {
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
        drop(self.sender); // ends the writer task's channel
        self.reader_task.abort();
        let _ = self.writer_task.await;
        Ok(())
    }
}
