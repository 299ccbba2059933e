//! TCP server transport
//!
//! Persistent byte-stream connections with newline-delimited JSON
//! envelopes: each inbound line is one `{Seq, Call}` frame, each outbound
//! write is `\n` + `{Seq, Response}` + `\n`.
//!
//! All answers for a connection funnel through a single writer task via
//! an unbounded channel, so concurrently answering handlers never
//! interleave partial frames.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use trirpc_common::codec::{frame, JsonCodec};
use trirpc_common::dispatch::{Answerer, Dispatcher};
use trirpc_common::protocol::{Call, CallKind, Result, ResponseEnvelope, RpcError};
use trirpc_common::DEFAULT_TCP_PORT;

use crate::lifecycle::{Lifecycle, ListenGuard};

/// RPC server over plain TCP with newline framing.
pub struct TcpServer {
    port: u16,
    dispatcher: Arc<Dispatcher>,
    lifecycle: Lifecycle,
}

impl TcpServer {
    pub fn new() -> Self {
        TcpServer {
            port: DEFAULT_TCP_PORT,
            dispatcher: Arc::new(Dispatcher::new()),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Override the listening port. Port 0 binds an ephemeral port;
    /// [`listen`](Self::listen) returns the actual address.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Registers a handler for `action` on this server's dispatcher.
    pub fn register_handler(
        &self,
        action: impl Into<String>,
        handler: impl Fn(&Call, Option<&Answerer>) + Send + Sync + 'static,
    ) {
        self.dispatcher.register_handler(action, handler);
    }

    /// This server's dispatcher, for callers that emit locally.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Binds the listener and spawns the accept loop.
    ///
    /// Fails fast if the server is already listening.
    pub async fn listen(&self) -> Result<std::net::SocketAddr> {
        let mut slot = self.lifecycle.begin().await?;

        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .map_err(|e| RpcError::Connection(format!("failed to bind tcp port {}: {e}", self.port)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| RpcError::Connection(format!("failed to get local addr: {e}")))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = self.dispatcher.clone();
        let accept_task = tokio::spawn(accept_loop(listener, dispatcher, shutdown_rx));

        *slot = Some(ListenGuard {
            local_addr,
            shutdown: shutdown_tx,
            accept_task,
        });
        debug!(%local_addr, "tcp server listening");
        Ok(local_addr)
    }

    /// Stops accepting connections and winds existing ones down.
    pub async fn close(&self) -> Result<()> {
        self.lifecycle.close().await
    }

    /// The bound address while listening.
    pub async fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.lifecycle.local_addr().await
    }
}

impl Default for TcpServer {
    fn default() -> Self {
        Self::new()
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "connection established");
                        let dispatcher = dispatcher.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(handle_connection(stream, dispatcher, shutdown));
                    }
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                }
            }
        }
    }
}

/// Serve one connection: read frames until the peer closes or the server
/// shuts down.
async fn handle_connection(
    stream: TcpStream,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (read_half, write_half) = stream.into_split();

    let (out_tx, out_rx) = mpsc::unbounded_channel::<ResponseEnvelope>();
    tokio::spawn(write_loop(write_half, out_rx));

    let mut lines = BufReader::new(read_half).lines();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        // The leading delimiter of every frame produces an
                        // empty line between messages.
                        if line.is_empty() {
                            continue;
                        }
                        dispatch_frame(&line, &dispatcher, &out_tx);
                    }
                    Ok(None) => {
                        debug!("connection closed by peer");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "connection read failed");
                        break;
                    }
                }
            }
        }
    }
}

/// Drain the outbound channel into the socket. Ends when every answerer
/// for this connection is gone or a write fails.
async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut out_rx: mpsc::UnboundedReceiver<ResponseEnvelope>,
) {
    while let Some(envelope) = out_rx.recv().await {
        let payload = match JsonCodec::encode_response(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode response envelope");
                continue;
            }
        };
        if let Err(e) = write_half.write_all(&frame(&payload)).await {
            debug!(error = %e, "connection write failed, dropping outbound path");
            break;
        }
    }
}

/// Decode one inbound frame and hand it to the dispatcher with the
/// answer path its kind requires.
fn dispatch_frame(
    line: &str,
    dispatcher: &Dispatcher,
    out_tx: &mpsc::UnboundedSender<ResponseEnvelope>,
) {
    let envelope = match JsonCodec::decode_call(line.as_bytes()) {
        Ok(envelope) => envelope,
        Err(e) => {
            // No usable Seq, so there is no answer path to report on.
            warn!(error = %e, "failed to decode inbound frame");
            return;
        }
    };

    let seq = envelope.seq;
    match envelope.call.kind {
        CallKind::Query => {
            let out_tx = out_tx.clone();
            let answerer = Answerer::once(move |response| {
                let _ = out_tx.send(ResponseEnvelope { seq, response });
            });
            dispatcher.emit(&envelope.call, Some(&answerer));
        }
        CallKind::Subscribe => {
            // Every push reuses the subscribing call's seq.
            let out_tx = out_tx.clone();
            let answerer = Answerer::many(move |response| {
                let _ = out_tx.send(ResponseEnvelope { seq, response });
            });
            dispatcher.emit(&envelope.call, Some(&answerer));
        }
        CallKind::Submit => dispatcher.emit(&envelope.call, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listen_rejects_double_listen() {
        let server = TcpServer::new().with_port(0);
        server.listen().await.unwrap();
        assert!(matches!(
            server.listen().await,
            Err(RpcError::InvalidState("already listening"))
        ));
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_before_listen_fails_fast() {
        let server = TcpServer::new().with_port(0);
        assert!(matches!(
            server.close().await,
            Err(RpcError::InvalidState("not started"))
        ));
    }

    #[tokio::test]
    async fn listen_again_after_close() {
        let server = TcpServer::new().with_port(0);
        server.listen().await.unwrap();
        server.close().await.unwrap();
        server.listen().await.unwrap();
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn local_addr_reports_bound_port() {
        let server = TcpServer::new().with_port(0);
        let addr = server.listen().await.unwrap();
        assert_eq!(server.local_addr().await.unwrap(), addr);
        assert_ne!(addr.port(), 0);
        server.close().await.unwrap();
    }
}
