use serde::{Deserialize, Serialize};

use super::call::{Call, Response};

/// Sequence number correlating an answer with the call that produced it.
///
/// Unique per client connection, monotonically increasing from 1, never
/// reused within the connection's lifetime.
pub type Seq = u64;

/// Client-to-server frame on connection-oriented transports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    #[serde(rename = "Seq")]
    pub seq: Seq,
    #[serde(rename = "Call")]
    pub call: Call,
}

/// Server-to-client frame on connection-oriented transports.
///
/// A `subscribe` call produces any number of these, all reusing the
/// original call's `seq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "Seq")]
    pub seq: Seq,
    #[serde(rename = "Response")]
    pub response: Response,
}
