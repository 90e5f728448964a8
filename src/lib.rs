//! BlockMatrix compute orchestrator core.
//!
//! Three collaborating components form the orchestrator's correctness core:
//! the scheduling-configuration store ([`config::ConfigStore`]), the capacity
//! calculator ([`capacity`]), and the command registry & dispatcher
//! ([`commands::CommandRegistry`]) driving the GPU-setup controller
//! ([`gpu_setup::GpuSetupController`]). A misread configuration silently
//! mis-sizes every node; a lost acknowledgment leaves a node wedged in
//! `InProgress`; a racing configuration reload corrupts capacity math.
//! Everything else — admin-user bootstrap, CPU benchmarking, marketplace
//! review eligibility, the event log — is an external collaborator, modeled
//! here only through the interfaces the core consumes or exposes.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod admin;
pub mod arch;
pub mod benchmark;
pub mod cancel;
pub mod capacity;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod gpu_setup;
pub mod node;
pub mod review;

use std::sync::Arc;

use tracing::info;

use commands::{CommandRegistry, CommandTransport, CommandType};
use config::ConfigStore;
use events::{EventCompatibilityMode, EventSink};
use gpu_setup::GpuSetupController;
use node::NodeRegistry;

/// Wires C1-C5 together into a single handle, the way a node-agent-facing
/// supervisor process would hold them. Everything is behind `Arc`, so
/// `Orchestrator` is cheap to clone and share across tasks.
#[derive(Clone)]
pub struct Orchestrator {
    /// Scheduling-configuration store (C1).
    pub config: Arc<ConfigStore>,
    /// Node table, shared by the capacity calculator and GPU-setup controller.
    pub nodes: NodeRegistry,
    /// Command registry & dispatcher (C3).
    pub commands: Arc<CommandRegistry>,
    /// GPU-setup controller (C4).
    pub gpu_setup: Arc<GpuSetupController>,
    /// Append-only event sink (C5).
    pub events: Arc<EventSink>,
}

impl Orchestrator {
    /// Construct an orchestrator over the given config store and command
    /// transport, with an in-memory event sink and empty node table. The
    /// GPU-setup controller is registered as the `ConfigureGpu` ack handler.
    pub fn new(config: Arc<ConfigStore>, transport: Arc<dyn CommandTransport>, compatibility_mode: EventCompatibilityMode) -> Self {
        let nodes = NodeRegistry::new();
        let commands = Arc::new(CommandRegistry::new(transport));
        let events = Arc::new(EventSink::default());
        let gpu_setup = Arc::new(GpuSetupController::new(nodes.clone(), Arc::clone(&commands), Arc::clone(&events), compatibility_mode));
        commands.register_handler(CommandType::ConfigureGpu, Arc::clone(&gpu_setup) as Arc<dyn commands::AckHandler>);

        info!("orchestrator core initialized");
        Self {
            config,
            nodes,
            commands,
            gpu_setup,
            events,
        }
    }

    /// Register a node and evaluate it for GPU setup if it has GPUs
    /// (spec.md §2's registration control flow).
    pub async fn register_node(&self, node: node::Node) -> Result<(), error::GpuSetupError> {
        let node_id = node.id.clone();
        self.nodes.register(node);
        self.gpu_setup.evaluate_and_queue_setup(&node_id).await
    }

    /// Compute a node's total capacity envelope against the current
    /// scheduling configuration (spec.md §2's capacity-query control flow).
    pub async fn node_total_capacity(&self, node_id: &str) -> Result<capacity::NodeTotalCapacity, error::ConfigError> {
        let config = self.config.get_config().await?;
        let snapshot = self.nodes.snapshot(node_id).await;
        Ok(match snapshot {
            Some(node) => capacity::compute_total_capacity(&node, &config),
            None => capacity::NodeTotalCapacity {
                total_compute_points: 0,
                total_memory_bytes: 0,
                total_storage_bytes: 0,
                is_acceptable: false,
                rejection_reason: Some(format!("unknown node {node_id}")),
            },
        })
    }

    /// Reap any commands that have outlived their type's timeout, synthesizing
    /// failure acknowledgments so stuck state machines advance (spec.md §4.3).
    /// Intended to be called periodically from a background task.
    pub async fn reap_stale_commands(&self) {
        self.commands.reap_timeouts().await;
    }

    /// Register a batch of nodes concurrently, evaluating each for GPU setup.
    /// Matches the fleet-bootstrap case in spec.md §2 where many nodes
    /// register around the same time; registrations are independent so there
    /// is no need to serialize them.
    pub async fn register_nodes(&self, nodes: Vec<node::Node>) -> Vec<Result<(), error::GpuSetupError>> {
        futures::future::join_all(nodes.into_iter().map(|node| self.register_node(node))).await
    }
}
