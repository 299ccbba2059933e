//! HTTP server transport
//!
//! One POST request body is exactly one serialized `Call`; the response
//! body is the matching `Response`. HTTP pairs requests with responses
//! on its own, so no correlation envelope is used.
//!
//! Kind handling:
//! - `query` → 200 with the answer as JSON; if no answer arrives within
//!   the configured answer timeout the request resolves to 504 with a
//!   `Fail("timeout")` body rather than hanging forever
//! - `submit` → immediate 201 plain-text ack, independent of handler
//!   completion
//! - `subscribe` → 501, explicitly rejected rather than silently dropped
//!
//! Bodies above the configured ceiling abort the connection before
//! parsing; a body at exactly the ceiling is accepted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

use trirpc_common::dispatch::{Answerer, Dispatcher};
use trirpc_common::protocol::{Call, CallKind, Response, Result, RpcError};
use trirpc_common::{DEFAULT_HTTP_PORT, MAX_REQUEST_SIZE};

use crate::lifecycle::{Lifecycle, ListenGuard};

/// Hyper response type used by this transport.
type HyperResponse = hyper::Response<Full<Bytes>>;

/// Default bound on how long a `query` may wait for its answer.
const DEFAULT_ANSWER_TIMEOUT: Duration = Duration::from_secs(30);

/// RPC server over request/response HTTP.
pub struct HttpServer {
    port: u16,
    max_request_size: usize,
    answer_timeout: Duration,
    dispatcher: Arc<Dispatcher>,
    lifecycle: Lifecycle,
}

impl HttpServer {
    pub fn new() -> Self {
        HttpServer {
            port: DEFAULT_HTTP_PORT,
            max_request_size: MAX_REQUEST_SIZE,
            answer_timeout: DEFAULT_ANSWER_TIMEOUT,
            dispatcher: Arc::new(Dispatcher::new()),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Override the listening port. Port 0 binds an ephemeral port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the request body ceiling (default 8 MiB). A request body
    /// one byte above the ceiling terminates the connection.
    pub fn with_max_request_size(mut self, max_request_size: usize) -> Self {
        self.max_request_size = max_request_size;
        self
    }

    /// Override how long a `query` may wait for a handler to answer
    /// before resolving to 504 (default 30 s).
    pub fn with_answer_timeout(mut self, answer_timeout: Duration) -> Self {
        self.answer_timeout = answer_timeout;
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
    pub async fn listen(&self) -> Result<SocketAddr> {
        let mut slot = self.lifecycle.begin().await?;

        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .map_err(|e| RpcError::Connection(format!("failed to bind http port {}: {e}", self.port)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| RpcError::Connection(format!("failed to get local addr: {e}")))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = self.dispatcher.clone();
        let max_request_size = self.max_request_size;
        let answer_timeout = self.answer_timeout;
        let accept_task = tokio::spawn(accept_loop(
            listener,
            dispatcher,
            max_request_size,
            answer_timeout,
            shutdown_rx,
        ));

        *slot = Some(ListenGuard {
            local_addr,
            shutdown: shutdown_tx,
            accept_task,
        });
        debug!(%local_addr, "http server listening");
        Ok(local_addr)
    }

    /// Stops accepting connections.
    pub async fn close(&self) -> Result<()> {
        self.lifecycle.close().await
    }

    /// The bound address while listening.
    pub async fn local_addr(&self) -> Result<SocketAddr> {
        self.lifecycle.local_addr().await
    }
}

impl Default for HttpServer {
    fn default() -> Self {
        Self::new()
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    max_request_size: usize,
    answer_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };
                debug!(%peer, "connection established");

                let io = TokioIo::new(stream);
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let dispatcher = dispatcher.clone();
                        async move {
                            handle_request(dispatcher, max_request_size, answer_timeout, req).await
                        }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        // Oversized bodies land here too: the service aborts
                        // the exchange instead of producing a response.
                        debug!(error = %e, "connection ended with error");
                    }
                });
            }
        }
    }
}

async fn handle_request(
    dispatcher: Arc<Dispatcher>,
    max_request_size: usize,
    answer_timeout: Duration,
    req: Request<Incoming>,
) -> std::result::Result<HyperResponse, RpcError> {
    if req.method() != Method::POST {
        return Ok(text_response(StatusCode::METHOD_NOT_ALLOWED, "POST only"));
    }

    // Coarse defense against unbounded buffering: a body above the
    // ceiling fails the collect, which aborts the connection mid-read.
    let body = Limited::new(req.into_body(), max_request_size)
        .collect()
        .await
        .map_err(|e| RpcError::Transport(format!("request body rejected: {e}")))?
        .to_bytes();

    let call: Call = match serde_json::from_slice(&body) {
        Ok(call) => call,
        Err(e) => {
            warn!(error = %e, "failed to decode call body");
            return Ok(json_response(
                StatusCode::BAD_REQUEST,
                &Response::fail("parse_error"),
            ));
        }
    };

    match call.kind {
        CallKind::Query => {
            let (tx, rx) = oneshot::channel();
            let answerer = Answerer::once(move |response| {
                let _ = tx.send(response);
            });
            dispatcher.emit(&call, Some(&answerer));
            drop(answerer);

            // The sender side is gone either when an answer was delivered
            // or when no handler kept the answer path alive; the timeout
            // bounds handlers that kept it but never answer.
            match tokio::time::timeout(answer_timeout, rx).await {
                Ok(Ok(response)) => Ok(json_response(StatusCode::OK, &response)),
                Ok(Err(_)) | Err(_) => {
                    warn!(action = %call.action, "query produced no answer");
                    Ok(json_response(
                        StatusCode::GATEWAY_TIMEOUT,
                        &Response::fail("timeout"),
                    ))
                }
            }
        }
        CallKind::Submit => {
            // Fire-and-forget: acknowledge before handlers necessarily
            // finish any deferred work.
            dispatcher.emit(&call, None);
            Ok(text_response(StatusCode::CREATED, "Received"))
        }
        CallKind::Subscribe => Ok(text_response(
            StatusCode::NOT_IMPLEMENTED,
            "subscribe is not supported over http",
        )),
    }
}

fn json_response(status: StatusCode, response: &Response) -> HyperResponse {
    let body = serde_json::to_vec(response).unwrap_or_default();
    let mut res = hyper::Response::new(Full::new(Bytes::from(body)));
    *res.status_mut() = status;
    res.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    res
}

fn text_response(status: StatusCode, text: &'static str) -> HyperResponse {
    let mut res = hyper::Response::new(Full::new(Bytes::from_static(text.as_bytes())));
    *res.status_mut() = status;
    res.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/plain"),
    );
    res
}
