//! triRPC Server Transports
//!
//! Three server variants carrying the same `Call`/`Response` contract:
//!
//! - **[`HttpServer`]**: one POST body = one call; no correlation
//!   envelope and no `subscribe` support (rejected with 501)
//! - **[`TcpServer`]**: persistent connections, newline-delimited JSON
//!   envelopes
//! - **[`WsServer`]**: persistent connections, one WebSocket text
//!   message per JSON envelope
//!
//! Each server owns a [`Dispatcher`](trirpc_common::dispatch::Dispatcher)
//! and a listening socket. Register handlers first, then `listen()`;
//! `close()` shuts the accept loop and connection tasks down.
//!
//! # Example
//!
//! ```no_run
//! use trirpc_server::TcpServer;
//! use trirpc_common::protocol::Response;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let server = TcpServer::new().with_port(0);
//! server.register_handler("echo", |call, answerer| {
//!     if let Some(answerer) = answerer {
//!         answerer.answer(Response::success(json!(call.params.clone())));
//!     }
//! });
//! let addr = server.listen().await?;
//! println!("listening on {addr}");
//! # Ok(())
//! # }
//! ```

pub mod http_server;
pub mod tcp_server;
pub mod ws_server;

mod lifecycle;

pub use http_server::HttpServer;
pub use tcp_server::TcpServer;
pub use ws_server::WsServer;
