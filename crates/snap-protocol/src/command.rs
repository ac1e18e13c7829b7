//! The closed set of commands the worker controller recognizes.
//!
//! Modeled as a tagged variant over the recognized method set rather
//! than open-ended string dispatch — an unknown method is a distinct
//! variant, not a fallthrough string match sprinkled through the
//! dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rpc::RpcRequest;

/// Parameters for the `executeSnap` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteSnapParams {
    /// The snap's stable identifier.
    pub snap_id: String,
    /// The snap's UTF-8 source, evaluated once in a fresh compartment.
    pub source_code: String,
}

/// Parameters for the `snapRpc` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapRpcParams {
    /// The caller's origin, passed through to the snap's handler.
    pub origin: String,
    /// The request payload, passed through to the snap's handler.
    pub request: Value,
    /// Which snap's registered handler to invoke. With one snap per
    /// worker this is always that worker's own snap id, but the field is
    /// carried over the wire so the dispatcher doesn't need an implicit
    /// assumption baked in.
    pub target: String,
}

/// A fully parsed, recognized command.
#[derive(Debug, Clone)]
pub enum Command {
    /// `ping` — liveness probe, ignores params.
    Ping,
    /// `executeSnap` — evaluate source in a fresh compartment.
    ExecuteSnap(ExecuteSnapParams),
    /// `snapRpc` — invoke a registered snap handler.
    SnapRpc(SnapRpcParams),
}

/// `method` named something the dispatcher doesn't recognize.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CommandParseError {
    /// The method name isn't one of the recognized commands.
    #[error("Unrecognized command")]
    Unrecognized,
    /// The method was recognized but `params` didn't match its shape.
    #[error("invalid params for {method}: {source}")]
    InvalidParams {
        /// The method whose params failed to parse.
        method: String,
        /// The underlying deserialization error.
        source: serde_json::Error,
    },
}

impl TryFrom<&RpcRequest> for Command {
    type Error = CommandParseError;

    fn try_from(req: &RpcRequest) -> Result<Self, Self::Error> {
        match req.method.as_str() {
            "ping" => Ok(Command::Ping),
            "executeSnap" => serde_json::from_value(req.params.clone())
                .map(Command::ExecuteSnap)
                .map_err(|source| CommandParseError::InvalidParams {
                    method: req.method.clone(),
                    source,
                }),
            "snapRpc" => serde_json::from_value(req.params.clone())
                .map(Command::SnapRpc)
                .map_err(|source| CommandParseError::InvalidParams {
                    method: req.method.clone(),
                    source,
                }),
            _ => Err(CommandParseError::Unrecognized),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_ping() {
        let req = RpcRequest::new("ping", Value::Null);
        assert!(matches!(Command::try_from(&req).unwrap(), Command::Ping));
    }

    #[test]
    fn parses_execute_snap() {
        let req = RpcRequest::new(
            "executeSnap",
            json!({"snapId": "A", "sourceCode": "1+1"}),
        );
        let Command::ExecuteSnap(params) = Command::try_from(&req).unwrap() else {
            panic!("expected ExecuteSnap");
        };
        assert_eq!(params.snap_id, "A");
        assert_eq!(params.source_code, "1+1");
    }

    #[test]
    fn parses_snap_rpc() {
        let req = RpcRequest::new(
            "snapRpc",
            json!({"origin": "o", "request": {"method": "hello"}, "target": "A"}),
        );
        let Command::SnapRpc(params) = Command::try_from(&req).unwrap() else {
            panic!("expected SnapRpc");
        };
        assert_eq!(params.origin, "o");
        assert_eq!(params.target, "A");
    }

    #[test]
    fn rejects_unknown_method() {
        let req = RpcRequest::new("frobnicate", Value::Null);
        assert!(matches!(
            Command::try_from(&req).unwrap_err(),
            CommandParseError::Unrecognized
        ));
    }

    #[test]
    fn rejects_bad_params() {
        let req = RpcRequest::new("executeSnap", json!({"snapId": "A"}));
        assert!(matches!(
            Command::try_from(&req).unwrap_err(),
            CommandParseError::InvalidParams { .. }
        ));
    }
}
