//! Multiplex channel names shared between the host and the worker build.
//!
//! These must match exactly on both ends.

/// The control-plane channel: `ping` / `executeSnap` / `snapRpc` commands
/// and their JSON-RPC responses.
pub const COMMAND: &str = "command";

/// The channel piped straight through to the snap provider. Opaque to the
/// core — whatever the host's wallet-provider middleware speaks.
pub const JSON_RPC: &str = "jsonRpc";

/// The two sub-streams a job's transport is multiplexed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// The `command` channel.
    Command,
    /// The `jsonRpc` channel.
    JsonRpc,
}

impl Channel {
    /// The wire name for this channel.
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Command => COMMAND,
            Channel::JsonRpc => JSON_RPC,
        }
    }

    /// Parse a wire channel name, if recognized.
    pub fn from_str(name: &str) -> Option<Self> {
        match name {
            COMMAND => Some(Channel::Command),
            JSON_RPC => Some(Channel::JsonRpc),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
