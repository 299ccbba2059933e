//! WebSocket server transport
//!
//! Persistent message-based connections: one WebSocket text message is
//! one JSON envelope, no further delimiting needed. The correlation and
//! dispatch behavior is identical to the TCP transport; only the framing
//! differs.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use trirpc_common::dispatch::{Answerer, Dispatcher};
use trirpc_common::protocol::{Call, CallEnvelope, CallKind, Result, ResponseEnvelope, RpcError};
use trirpc_common::DEFAULT_WS_PORT;

use crate::lifecycle::{Lifecycle, ListenGuard};

/// RPC server over WebSocket, one JSON envelope per text message.
pub struct WsServer {
    port: u16,
    dispatcher: Arc<Dispatcher>,
    lifecycle: Lifecycle,
}

impl WsServer {
    pub fn new() -> Self {
        WsServer {
            port: DEFAULT_WS_PORT,
            dispatcher: Arc::new(Dispatcher::new()),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Override the listening port. Port 0 binds an ephemeral port.
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
    pub async fn listen(&self) -> Result<std::net::SocketAddr> {
        let mut slot = self.lifecycle.begin().await?;

        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .map_err(|e| RpcError::Connection(format!("failed to bind ws port {}: {e}", self.port)))?;
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
        debug!(%local_addr, "ws server listening");
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

impl Default for WsServer {
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

async fn handle_connection(
    stream: TcpStream,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(error = %e, "websocket handshake failed");
            return;
        }
    };
    let (mut ws_write, mut ws_read) = ws.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ResponseEnvelope>();
    tokio::spawn(async move {
        while let Some(envelope) = out_rx.recv().await {
            let text = match serde_json::to_string(&envelope) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "failed to encode response envelope");
                    continue;
                }
            };
            if let Err(e) = ws_write.send(Message::text(text)).await {
                debug!(error = %e, "websocket write failed, dropping outbound path");
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        dispatch_message(text.as_str(), &dispatcher, &out_tx);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("connection closed by peer");
                        break;
                    }
                    // Ping/pong are handled by the protocol layer; binary
                    // frames are not part of the contract.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "connection read failed");
                        break;
                    }
                }
            }
        }
    }
}

fn dispatch_message(
    text: &str,
    dispatcher: &Dispatcher,
    out_tx: &mpsc::UnboundedSender<ResponseEnvelope>,
) {
    let envelope: CallEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "failed to decode inbound envelope");
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
            let out_tx = out_tx.clone();
            let answerer = Answerer::many(move |response| {
                let _ = out_tx.send(ResponseEnvelope { seq, response });
            });
            dispatcher.emit(&envelope.call, Some(&answerer));
        }
        CallKind::Submit => dispatcher.emit(&envelope.call, None),
    }
}
