//! Shared wire types for the snap isolation protocol.
//!
//! Both halves of the protocol — the host-side execution environment
//! service and the worker-side controller — depend on this crate instead
//! of hand-rolling JSON shapes on each side, so the two ends cannot
//! silently drift apart.

pub mod channel;
pub mod command;
pub mod multiplex;
pub mod rpc;

pub use channel::Channel;
pub use command::{Command, ExecuteSnapParams, SnapRpcParams};
pub use multiplex::{Multiplexer, Substream};
pub use rpc::{RpcError, RpcId, RpcRequest, RpcResponse};
