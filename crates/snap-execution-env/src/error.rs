//! The execution environment service's error type: one flat `thiserror`
//! enum at the crate boundary, so callers match on a variant rather than
//! a string.

use thiserror::Error;

/// Everything that can go wrong driving a snap's isolate.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// `execute_snap` was called for a `snapId` that already has a live
    /// job.
    #[error("snap {0:?} is already executing")]
    AlreadyExecuting(String),

    /// `terminate_snap`/`get_rpc_message_handler` referenced a `snapId`
    /// with no live job.
    #[error("no snap {0:?} is currently executing")]
    UnknownSnap(String),

    /// The isolate never answered the post-spawn handshake `ping`
    /// before its `create_window_timeout` elapsed.
    #[error("isolate did not complete its startup handshake in time")]
    HandshakeTimeout,

    /// `executeSnap` over the command channel came back with a JSON-RPC
    /// error — almost always a throw during the snap's own evaluation.
    #[error("snap evaluation failed: {0}")]
    EvaluationFailed(String),

    /// Any other JSON-RPC call over the `command` channel failed.
    #[error("RPC call failed: {0}")]
    Rpc(String),

    /// The job was terminated while this call was still pending —
    /// resolved here by rejecting rather than hanging forever; see
    /// DESIGN.md.
    #[error("the snap's job was terminated")]
    Terminated,

    /// The underlying transport (child process stdio, or in-process
    /// duplex) failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}
