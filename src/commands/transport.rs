//! Delivery collaborator contract. The actual node-agent transport (a
//! per-node outbound channel drained by a long-poll or push connection) is
//! out of scope per spec.md §1; this module only defines the boundary and an
//! in-memory double used for tests.

use async_trait::async_trait;
use dashmap::DashMap;

use super::NodeCommand;

/// Result of a single delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    /// Whether the command reached the node agent's inbound queue.
    pub success: bool,
    /// Human-readable detail (failure reason, or an accepted/queued note).
    pub message: String,
}

/// Delivery collaborator for [`super::CommandRegistry`].
#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Attempt to hand `command` to the node agent addressed by `node_id`.
    async fn deliver(&self, node_id: &str, command: &NodeCommand) -> DeliveryResult;
}

/// An in-memory transport that records delivered commands per node and can
/// be configured to fail delivery for specific nodes, for exercising the
/// retry-to-`Pending` path (spec.md §4.4, scenario S6).
#[derive(Default)]
pub struct InMemoryCommandTransport {
    delivered: DashMap<String, Vec<NodeCommand>>,
    fail_for_nodes: DashMap<String, String>,
}

impl InMemoryCommandTransport {
    /// Construct a transport that delivers everything successfully.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure subsequent deliveries to `node_id` to fail with `reason`.
    pub fn fail_delivery_for(&self, node_id: impl Into<String>, reason: impl Into<String>) {
        self.fail_for_nodes.insert(node_id.into(), reason.into());
    }

    /// Commands successfully delivered to `node_id`, in delivery order.
    pub fn delivered_to(&self, node_id: &str) -> Vec<NodeCommand> {
        self.delivered.get(node_id).map(|entry| entry.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CommandTransport for InMemoryCommandTransport {
    async fn deliver(&self, node_id: &str, command: &NodeCommand) -> DeliveryResult {
        if let Some(reason) = self.fail_for_nodes.get(node_id) {
            return DeliveryResult {
                success: false,
                message: reason.clone(),
            };
        }
        self.delivered.entry(node_id.to_string()).or_default().push(command.clone());
        DeliveryResult {
            success: true,
            message: "queued for delivery".to_string(),
        }
    }
}
