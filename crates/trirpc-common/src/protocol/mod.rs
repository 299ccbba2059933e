//! triRPC Protocol Types
//!
//! This module defines the logical contract shared by every transport:
//! the [`Call`] sent from a client to a server, the [`Response`] a handler
//! produces, and the [`CallEnvelope`]/[`ResponseEnvelope`] wrappers that
//! connection-oriented transports use to correlate asynchronous answers
//! with the calls that produced them.
//!
//! HTTP carries a bare `Call` as the request body and a bare `Response`
//! as the response body; the TCP and WebSocket transports always wrap
//! both directions in an envelope.

pub mod call;
pub mod envelope;
pub mod error;

pub use call::{Call, CallKind, Response};
pub use envelope::{CallEnvelope, ResponseEnvelope};
pub use error::{Result, RpcError};
