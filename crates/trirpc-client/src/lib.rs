//! triRPC Client Transports
//!
//! Three client variants speaking the same `Call`/`Response` contract
//! as the matching servers in `trirpc-server`:
//!
//! - **[`HttpClient`]**: stateless, one POST per call, no correlation
//! - **[`TcpClient`]**: persistent connection, newline-framed envelopes
//! - **[`WsClient`]**: persistent connection, one envelope per message
//!
//! The socket clients share the correlation layer: each call gets a
//! fresh per-connection sequence number, and inbound answers are routed
//! through a pending-answer table back to the caller. The three call
//! kinds produce distinct result types (see [`Reply`]).
//!
//! [`connect`] resolves an [`Addr`] into the matching variant of the
//! [`RpcClient`] enum.
//!
//! # Example
//!
//! ```no_run
//! use trirpc_client::{connect, Addr};
//! use trirpc_common::protocol::Call;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = connect(&Addr::tcp("127.0.0.1", 10080)).await?;
//! let answer = client
//!     .call_and_wait(Call::query("get", vec![json!("Life")]))
//!     .await?;
//! println!("{answer:?}");
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use trirpc_common::protocol::{Call, Response, RpcError};

pub use trirpc_common::protocol::Result;

mod correlation;
mod reply;

pub mod http_client;
pub mod tcp_client;
pub mod ws_client;

pub use http_client::HttpClient;
pub use reply::{PendingAnswer, Reply, Subscription};
pub use tcp_client::TcpClient;
pub use ws_client::WsClient;

/// Ceiling on [`call_and_wait`](RpcClient::call_and_wait): one minute.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// A peer address: one host plus the port of whichever transport the
/// peer speaks.
#[derive(Debug, Clone, Default)]
pub struct Addr {
    pub host: String,
    pub tcp: Option<u16>,
    pub ws: Option<u16>,
    pub http: Option<u16>,
}

impl Addr {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Addr {
            host: host.into(),
            tcp: Some(port),
            ..Addr::default()
        }
    }

    pub fn ws(host: impl Into<String>, port: u16) -> Self {
        Addr {
            host: host.into(),
            ws: Some(port),
            ..Addr::default()
        }
    }

    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Addr {
            host: host.into(),
            http: Some(port),
            ..Addr::default()
        }
    }
}

/// A connected client over whichever transport the address selected.
pub enum RpcClient {
    Http(HttpClient),
    Tcp(TcpClient),
    Ws(WsClient),
}

/// Selects and initializes the client variant matching `addr`.
///
/// Preference order when several ports are present: tcp, ws, http.
/// An address naming none of the three is an error.
pub async fn connect(addr: &Addr) -> Result<RpcClient> {
    if let Some(port) = addr.tcp {
        let client = TcpClient::connect(&format!("{}:{}", addr.host, port)).await?;
        return Ok(RpcClient::Tcp(client));
    }
    if let Some(port) = addr.ws {
        let client = WsClient::connect(&format!("ws://{}:{}", addr.host, port)).await?;
        return Ok(RpcClient::Ws(client));
    }
    if let Some(port) = addr.http {
        return Ok(RpcClient::Http(HttpClient::new(format!(
            "http://{}:{}",
            addr.host, port
        ))));
    }
    Err(RpcError::Unsupported(format!(
        "no known transport port for host {}",
        addr.host
    )))
}

impl RpcClient {
    /// The transport this client speaks.
    pub fn transport(&self) -> &'static str {
        match self {
            RpcClient::Http(_) => "http",
            RpcClient::Tcp(_) => "tcp",
            RpcClient::Ws(_) => "ws",
        }
    }

    /// Sends `call`; the returned [`Reply`] matches the call kind.
    pub fn emit(&self, call: Call) -> Result<Reply> {
        match self {
            RpcClient::Http(client) => client.emit(call),
            RpcClient::Tcp(client) => client.emit(call),
            RpcClient::Ws(client) => client.emit(call),
        }
    }

    /// Emits a `query` and waits for its single answer, bounded by
    /// [`DEFAULT_CALL_TIMEOUT`].
    pub async fn call_and_wait(&self, call: Call) -> Result<Response> {
        self.call_with_timeout(call, DEFAULT_CALL_TIMEOUT).await
    }

    /// Like [`call_and_wait`](Self::call_and_wait) with a custom ceiling.
    pub async fn call_with_timeout(&self, call: Call, ceiling: Duration) -> Result<Response> {
        match self {
            RpcClient::Http(client) => client.call_with_timeout(call, ceiling).await,
            RpcClient::Tcp(client) => client.call_with_timeout(call, ceiling).await,
            RpcClient::Ws(client) => client.call_with_timeout(call, ceiling).await,
        }
    }

    /// Closes the connection (if any) and clears pending state.
    pub async fn close(self) -> Result<()> {
        match self {
            RpcClient::Http(client) => client.close().await,
            RpcClient::Tcp(client) => client.close().await,
            RpcClient::Ws(client) => client.close().await,
        }
    }
}
