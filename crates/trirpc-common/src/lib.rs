//! triRPC Common
//!
//! Shared building blocks for the triRPC transport layer:
//!
//! - **[`protocol`]**: the `Call`/`Response` contract, the correlation
//!   envelopes used by connection-oriented transports, and the error type
//! - **[`codec`]**: JSON encoding/decoding of envelopes plus the
//!   newline framing used by the TCP transport
//! - **[`dispatch`]**: the per-server handler registry and answer path
//!
//! The transports themselves live in `trirpc-server` and `trirpc-client`;
//! everything here is transport-independent.

pub mod codec;
pub mod dispatch;
pub mod protocol;

/// Default listening port for the HTTP transport.
pub const DEFAULT_HTTP_PORT: u16 = 9080;
/// Default listening port for the TCP transport.
pub const DEFAULT_TCP_PORT: u16 = 10080;
/// Default listening port for the WebSocket transport.
pub const DEFAULT_WS_PORT: u16 = 11080;

/// Default ceiling on HTTP request bodies (8 MiB). Requests above this
/// size are rejected by terminating the connection before parsing.
pub const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;
