use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// The three call kinds supported by the protocol.
///
/// - `Query` expects exactly one answer; the call completes when it arrives.
/// - `Submit` is fire-and-forget; no answer is ever produced.
/// - `Subscribe` expects zero or more answers over the lifetime of the
///   connection, and is only valid on connection-oriented transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Query,
    Submit,
    Subscribe,
}

/// The unit of request sent from a client to a server.
///
/// `action` selects the registered handler(s); `params` is positional and
/// untyped at this layer; typing belongs to the calling convention built
/// on top, not to the transport.
///
/// # Example
///
/// ```
/// use trirpc_common::protocol::Call;
/// use serde_json::json;
///
/// let call = Call::query("get", vec![json!("Life")]);
/// assert_eq!(call.action, "get");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// What answer shape the caller expects
    #[serde(rename = "Kind")]
    pub kind: CallKind,
    /// Handler selector
    #[serde(rename = "Action")]
    pub action: String,
    /// Positional arguments
    #[serde(rename = "Params")]
    pub params: Vec<Value>,
}

impl Call {
    /// Creates a `query` call: one request, exactly one answer.
    pub fn query(action: impl Into<String>, params: Vec<Value>) -> Self {
        Call {
            kind: CallKind::Query,
            action: action.into(),
            params,
        }
    }

    /// Creates a `submit` call: fire-and-forget, no answer expected.
    pub fn submit(action: impl Into<String>, params: Vec<Value>) -> Self {
        Call {
            kind: CallKind::Submit,
            action: action.into(),
            params,
        }
    }

    /// Creates a `subscribe` call: zero or more answers pushed over the
    /// lifetime of the connection.
    pub fn subscribe(action: impl Into<String>, params: Vec<Value>) -> Self {
        Call {
            kind: CallKind::Subscribe,
            action: action.into(),
            params,
        }
    }
}

/// The unit of reply: a success/failure tagged value.
///
/// Exactly one variant holds. On the wire this is encoded as
/// `{"Success": true, "Data": ...}` or `{"Success": false, "Reason": ...}`.
/// The `reason` is a short machine-readable code, not a full error payload.
///
/// # Example
///
/// ```
/// use trirpc_common::protocol::Response;
/// use serde_json::json;
///
/// let ok = Response::success(json!(["Life", 42]));
/// assert!(ok.is_success());
///
/// let err = Response::fail("not_found");
/// assert_eq!(err.reason(), Some("not_found"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Success { data: Value },
    Fail { reason: String },
}

impl Response {
    /// Creates a successful response carrying `data`.
    pub fn success(data: impl Into<Value>) -> Self {
        Response::Success { data: data.into() }
    }

    /// Creates a failed response carrying a short machine-readable reason.
    pub fn fail(reason: impl Into<String>) -> Self {
        Response::Fail {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }

    /// The payload, if this is a success.
    pub fn data(&self) -> Option<&Value> {
        match self {
            Response::Success { data } => Some(data),
            Response::Fail { .. } => None,
        }
    }

    /// The failure code, if this is a failure.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Response::Success { .. } => None,
            Response::Fail { reason } => Some(reason),
        }
    }
}

// Wire shape of a Response. Kept separate from the enum so that the
// `Success` discriminant is an actual boolean field on the wire rather
// than a serde tag string.
#[derive(Serialize, Deserialize)]
struct ResponseWire {
    #[serde(rename = "Success")]
    success: bool,
    #[serde(rename = "Data", skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(rename = "Reason", skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let wire = match self {
            Response::Success { data } => ResponseWire {
                success: true,
                data: Some(data.clone()),
                reason: None,
            },
            Response::Fail { reason } => ResponseWire {
                success: false,
                data: None,
                reason: Some(reason.clone()),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Response {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wire = ResponseWire::deserialize(deserializer)?;
        if wire.success {
            Ok(Response::Success {
                data: wire.data.unwrap_or(Value::Null),
            })
        } else {
            let reason = wire
                .reason
                .ok_or_else(|| D::Error::missing_field("Reason"))?;
            Ok(Response::Fail { reason })
        }
    }
}
