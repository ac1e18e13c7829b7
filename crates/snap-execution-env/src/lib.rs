//! The host-side execution environment service: spawns one isolated
//! worker per snap, wires bidirectional JSON-RPC over multiplexed
//! message streams, drives each worker through spawn/execute/poll/
//! terminate, and routes origin-to-snap RPC calls.

mod builder;
mod error;
mod isolate;
mod job;
mod messenger;
mod metrics;
mod rpc_engine;
mod service;

pub use builder::{ServiceBuilder, ServiceConfig};
pub use error::ServiceError;
pub use messenger::{ServiceEvent, ServiceMessenger};
pub use service::{ExecutionEnvironmentService, SnapProviderSetup, SnapRpcHook};
