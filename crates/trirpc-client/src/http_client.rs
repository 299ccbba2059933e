//! HTTP client transport
//!
//! Stateless: every call is a fresh POST carrying the `Call` as its
//! body, and HTTP's own request/response pairing stands in for the
//! correlation layer. `subscribe` is rejected up front since the
//! transport cannot push.
//!
//! Transport and decode failures are folded into the `Fail` variant of
//! the answer (with a short reason code) instead of tearing the pending
//! answer down, so callers see one uniform answer path.

use std::time::Duration;

use tokio::sync::oneshot;
use tracing::warn;

use trirpc_common::protocol::{Call, CallKind, Response, Result, RpcError};

use crate::reply::{PendingAnswer, Reply};
use crate::DEFAULT_CALL_TIMEOUT;

/// RPC client over request/response HTTP.
pub struct HttpClient {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpClient {
    /// Creates a client for `endpoint` (e.g. `"http://127.0.0.1:9080"`).
    /// No connection is opened until the first call.
    pub fn new(endpoint: impl Into<String>) -> Self {
        HttpClient {
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Issues `call` as a fresh outbound request.
    ///
    /// `submit` is acknowledged by the server with 201 independently of
    /// handler completion; the ack is not surfaced here. `subscribe`
    /// fails immediately with [`RpcError::Unsupported`].
    pub fn emit(&self, call: Call) -> Result<Reply> {
        match call.kind {
            CallKind::Query => {
                let (tx, rx) = oneshot::channel();
                let http = self.http.clone();
                let endpoint = self.endpoint.clone();
                tokio::spawn(async move {
                    let _ = tx.send(round_trip(http, endpoint, call).await);
                });
                Ok(Reply::Answer(PendingAnswer::new(rx, None)))
            }
            CallKind::Submit => {
                let http = self.http.clone();
                let endpoint = self.endpoint.clone();
                tokio::spawn(async move {
                    if let Err(e) = http.post(&endpoint).json(&call).send().await {
                        warn!(error = %e, "http submit failed");
                    }
                });
                Ok(Reply::None)
            }
            CallKind::Subscribe => Err(RpcError::Unsupported(
                "subscribe is not supported over http".into(),
            )),
        }
    }

    /// Emits a `query` and waits for its single answer, bounded by the
    /// default one-minute ceiling.
    pub async fn call_and_wait(&self, call: Call) -> Result<Response> {
        self.call_with_timeout(call, DEFAULT_CALL_TIMEOUT).await
    }

    /// Like [`call_and_wait`](Self::call_and_wait) with a custom ceiling.
    pub async fn call_with_timeout(&self, call: Call, ceiling: Duration) -> Result<Response> {
        match self.emit(call)? {
            Reply::Answer(answer) => answer.wait_timeout(ceiling).await,
            _ => Err(RpcError::InvalidState(
                "only query calls carry a single answer",
            )),
        }
    }

    /// Nothing to tear down: the client holds no persistent connection.
    pub async fn close(self) -> Result<()> {
        Ok(())
    }
}

/// One request/response exchange, with failures folded into `Fail`.
async fn round_trip(http: reqwest::Client, endpoint: String, call: Call) -> Response {
    let response = match http.post(&endpoint).json(&call).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "http request failed");
            return Response::fail("connection_error");
        }
    };
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "http response read failed");
            return Response::fail("connection_error");
        }
    };
    serde_json::from_slice(&body).unwrap_or_else(|e| {
        warn!(error = %e, "failed to decode response body");
        Response::fail("parse_error")
    })
}
