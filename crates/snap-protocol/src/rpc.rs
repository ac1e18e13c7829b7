//! JSON-RPC 2.0 envelope types carried on the `command` channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-RPC id. Requests that expect a response always carry one;
/// out-of-band notifications from the worker never do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    /// A string id, as minted by [`RpcId::fresh`].
    String(String),
    /// A numeric id (accepted on the wire for compatibility, never minted
    /// by this implementation).
    Number(i64),
}

impl RpcId {
    /// Mint a fresh, collision-resistant id for an outbound request.
    pub fn fresh() -> Self {
        RpcId::String(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for RpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcId::String(s) => f.write_str(s),
            RpcId::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A JSON-RPC 2.0 request, as sent on the `command` channel in either
/// direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Present for requests that expect a response. Absent for
    /// out-of-band notifications (e.g. unhandled worker errors).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RpcId>,
    /// The method name. See [`crate::command::Command`] for the
    /// recognized set.
    pub method: String,
    /// Method parameters, method-shape dependent.
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    /// Build a request expecting a response, with a freshly minted id.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(RpcId::fresh()),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response. Exactly one of `result`/`error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Echoes the request id this responds to. `None` only for
    /// out-of-band error pushes with no call to attribute to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RpcId>,
    /// Present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// A successful response to `id`.
    pub fn ok(id: RpcId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// An error response to `id`.
    pub fn err(id: Option<RpcId>, error: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcError {
                message: error.into(),
            }),
        }
    }

    /// Whether this response reports success.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A JSON-RPC error object. The wire format only specifies `message`,
/// which defines a call failure purely in terms of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// Human-readable error message. Propagated verbatim into the
    /// caller-facing error.
    pub message: String,
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_unique() {
        let a = RpcId::fresh();
        let b = RpcId::fresh();
        assert_ne!(a, b);
    }

    #[test]
    fn response_round_trips_through_json() {
        let resp = RpcResponse::ok(RpcId::fresh(), serde_json::json!("OK"));
        let text = serde_json::to_string(&resp).unwrap();
        let back: RpcResponse = serde_json::from_str(&text).unwrap();
        assert!(back.is_ok());
        assert_eq!(back.id, resp.id);
    }

    #[test]
    fn error_response_has_no_result() {
        let resp = RpcResponse::err(Some(RpcId::fresh()), "boom");
        assert!(!resp.is_ok());
        assert_eq!(resp.error.unwrap().message, "boom");
    }

    #[test]
    fn out_of_band_error_has_no_id() {
        let resp = RpcResponse {
            jsonrpc: "2.0".to_string(),
            id: None,
            result: None,
            error: Some(RpcError {
                message: "x".to_string(),
            }),
        };
        let text = serde_json::to_string(&resp).unwrap();
        assert!(!text.contains("\"id\""));
    }
}
