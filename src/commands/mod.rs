//! Command Registry & Dispatcher (C3, spec.md §4.3).
//!
//! Converts an intent to act on a node into a durable outstanding entry plus
//! a delivery attempt, and routes asynchronous acknowledgments back to the
//! issuing subsystem. Grounded on the teacher's `AssetManager` registry
//! pattern (`assets/core/management.rs`: `Arc<DashMap<Id, Arc<T>>>` with
//! `info!`-logged mutation), adapted with per-node ack ordering.

mod registry;
mod transport;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use registry::{AckHandler, CommandRegistry};
pub use transport::{CommandTransport, DeliveryResult, InMemoryCommandTransport};

/// The kind of command dispatched to a node agent. Spec.md §4.3 notes the
/// registry is generic over command type ("e.g., C4 for `ConfigureGpu`");
/// this crate implements the one type the GPU-setup controller needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    /// Configure GPU passthrough or container-toolkit sharing on a node.
    ConfigureGpu,
}

/// A command issued to a node agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCommand {
    /// Unique command identifier, correlated with its eventual acknowledgment.
    pub command_id: String,
    /// The kind of command.
    pub command_type: CommandType,
    /// Opaque, command-type-specific payload.
    pub payload: serde_json::Value,
    /// Whether the issuer requires an acknowledgment to consider this retired.
    pub requires_ack: bool,
    /// The VM or node id this command targets (allows the same infrastructure
    /// to carry both VM-scoped and node-scoped commands).
    pub target_resource_id: String,
}

/// A node agent's reply to a previously delivered command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandAcknowledgment {
    /// The command this acknowledges.
    pub command_id: String,
    /// Whether the node agent completed the command successfully.
    pub success: bool,
    /// Failure detail, present when `success` is false.
    pub error_message: Option<String>,
    /// Command-type-specific structured result data.
    pub data: Option<serde_json::Value>,
}

/// A registered, not-yet-retired command (C3-owned bookkeeping).
#[derive(Debug, Clone)]
pub struct OutstandingCommand {
    /// The node this command was sent to.
    pub node_id: String,
    /// The resource (node or VM) the command targets.
    pub target_resource_id: String,
    /// The command's type.
    pub command_type: CommandType,
    /// When this command was registered.
    pub issued_at: DateTime<Utc>,
}
