//! GPU-Setup Controller (C4, spec.md §4.4): a state machine over per-node
//! GPU readiness, driving a node agent via [`crate::commands::CommandRegistry`].
//!
//! Grounded on the teacher's `assets/allocation.rs` status/timestamp
//! bookkeeping pattern and `other_examples`' `GpuDevice` builder-style config
//! (`clawbernetes` container config). "Persist" in this crate means
//! committing the mutation back through the node's lock in
//! [`crate::node::NodeRegistry`] — a real deployment would additionally flush
//! to durable storage, which is out of scope (spec.md §1: "no persistence
//! engine internals").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::commands::{AckHandler, CommandAcknowledgment, CommandRegistry, CommandType, NodeCommand};
use crate::error::GpuSetupError;
use crate::events::{EventCompatibilityMode, EventSink, EventType, OrchestratorEvent};
use crate::node::{GpuSetupStatus, NodeRegistry};

/// The GPU-setup delivery mode (spec.md §4.4 "Mode selection").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuSetupMode {
    /// Container-toolkit path; immediate, no reboot required.
    Auto,
    /// Dedicated VFIO device assignment; requires IOMMU, no reboot needed.
    VfioPassthrough,
}

impl GpuSetupMode {
    fn as_wire_str(self) -> &'static str {
        match self {
            GpuSetupMode::Auto => "Auto",
            GpuSetupMode::VfioPassthrough => "VfioPassthrough",
        }
    }
}

/// Choose a setup mode from inventory: VFIO passthrough if any GPU already
/// has IOMMU enabled, otherwise the immediate container-toolkit path.
pub fn determine_setup_mode(gpus: &[crate::node::Gpu]) -> GpuSetupMode {
    if gpus.iter().any(|g| g.is_iommu_enabled) {
        GpuSetupMode::VfioPassthrough
    } else {
        GpuSetupMode::Auto
    }
}

/// Whether a node already has a usable GPU and setup can be skipped entirely.
pub fn already_usable(hardware: &crate::node::HardwareInventory) -> bool {
    (hardware.supports_gpu && hardware.gpus.iter().any(|g| g.is_available_for_passthrough))
        || (hardware.supports_gpu_containers && hardware.gpus.iter().any(|g| g.is_available_for_container_sharing))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GpuPayload {
    vendor: String,
    model: String,
    pci_address: String,
    memory_bytes: u64,
    is_iommu_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigureGpuPayload {
    mode: String,
    gpus: Vec<GpuPayload>,
    container_runtimes: Vec<String>,
}

fn build_payload(hardware: &crate::node::HardwareInventory, mode: GpuSetupMode) -> serde_json::Value {
    let payload = ConfigureGpuPayload {
        mode: mode.as_wire_str().to_string(),
        gpus: hardware
            .gpus
            .iter()
            .map(|gpu| GpuPayload {
                vendor: gpu.vendor.clone(),
                model: gpu.model.clone(),
                pci_address: gpu.pci_address.clone(),
                memory_bytes: gpu.memory_bytes,
                is_iommu_enabled: gpu.is_iommu_enabled,
            })
            .collect(),
        container_runtimes: hardware.container_runtimes.iter().cloned().collect(),
    };
    serde_json::to_value(payload).expect("ConfigureGpuPayload is always serializable")
}

/// Structured acknowledgment data for a `ConfigureGpu` command
/// (spec.md §6 `GpuSetupAckData`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct GpuSetupAckData {
    container_sharing_ready: bool,
    vfio_passthrough_ready: bool,
    iommu_enabled: bool,
    reboot_required: bool,
    driver_version: Option<String>,
    #[allow(dead_code)]
    error_message: Option<String>,
}

/// Outcome of [`GpuSetupController::trigger_setup`] when it declines to act.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupNotTriggered {
    /// Human-readable reason setup was not (re-)triggered.
    pub reason: String,
}

/// Drives node agents through GPU setup (spec.md §4.4's state machine).
pub struct GpuSetupController {
    nodes: NodeRegistry,
    commands: Arc<CommandRegistry>,
    events: Arc<EventSink>,
    compatibility_mode: EventCompatibilityMode,
}

impl GpuSetupController {
    /// Construct a controller over the given node table, command registry,
    /// and event sink.
    pub fn new(nodes: NodeRegistry, commands: Arc<CommandRegistry>, events: Arc<EventSink>, compatibility_mode: EventCompatibilityMode) -> Self {
        Self {
            nodes,
            commands,
            events,
            compatibility_mode,
        }
    }

    fn completion_event_type(&self) -> EventType {
        match self.compatibility_mode {
            EventCompatibilityMode::Legacy => EventType::NodeRegistered,
            EventCompatibilityMode::Native => EventType::NodeCapabilityChanged,
        }
    }

    fn failure_event_type(&self) -> EventType {
        match self.compatibility_mode {
            EventCompatibilityMode::Legacy => EventType::VmError,
            EventCompatibilityMode::Native => EventType::NodeError,
        }
    }

    /// Auto-triggered evaluation: inspects the node's current GPU readiness
    /// and queues a `ConfigureGpu` command if needed. No-op if the node has
    /// no GPUs, is already usable, or setup is already `InProgress`
    /// (spec.md §4.4 "Idempotency").
    pub async fn evaluate_and_queue_setup(&self, node_id: &str) -> Result<(), GpuSetupError> {
        let handle = self.nodes.get(node_id).ok_or_else(|| GpuSetupError::UnknownNode { node_id: node_id.to_string() })?;
        // Held for the entire evaluate-then-act sequence: this is the single
        // critical section spec.md §5 requires the InProgress check-and-set
        // to share with command registration.
        let mut node = handle.lock().await;

        if node.hardware.gpus.is_empty() {
            node.gpu_setup_status = GpuSetupStatus::NotNeeded;
            return Ok(());
        }

        if already_usable(&node.hardware) {
            node.gpu_setup_status = GpuSetupStatus::Completed;
            for gpu in &mut node.hardware.gpus {
                gpu.setup_status = GpuSetupStatus::Completed;
            }
            info!(node_id, "GPU already usable; setup skipped");
            return Ok(());
        }

        match node.gpu_setup_status {
            GpuSetupStatus::InProgress => {
                info!(node_id, "GPU setup already in progress; re-evaluation is a no-op");
                return Ok(());
            }
            GpuSetupStatus::Failed => {
                info!(node_id, "GPU setup previously failed; a manual trigger_setup is required to retry");
                return Ok(());
            }
            GpuSetupStatus::Completed => {
                info!(node_id, "GPU setup already completed; re-evaluation is a no-op");
                return Ok(());
            }
            GpuSetupStatus::NotNeeded | GpuSetupStatus::Pending | GpuSetupStatus::RebootRequired => {}
        }

        let mode = determine_setup_mode(&node.hardware.gpus);
        self.queue_setup(&mut node, mode).await;
        Ok(())
    }

    /// Manually trigger setup in a specific mode. Declines when the node is
    /// unknown, has no GPUs, or is already `InProgress` (spec.md §4.4
    /// "Manual trigger").
    pub async fn trigger_setup(&self, node_id: &str, mode: GpuSetupMode) -> Result<(), SetupNotTriggered> {
        let Some(handle) = self.nodes.get(node_id) else {
            return Err(SetupNotTriggered {
                reason: format!("unknown node {node_id}"),
            });
        };
        let mut node = handle.lock().await;

        if node.hardware.gpus.is_empty() {
            return Err(SetupNotTriggered {
                reason: format!("node {node_id} has no GPUs"),
            });
        }
        if node.gpu_setup_status == GpuSetupStatus::InProgress {
            return Err(SetupNotTriggered {
                reason: format!("GPU setup already in progress for node {node_id}"),
            });
        }

        self.queue_setup(&mut node, mode).await;
        Ok(())
    }

    /// Register, mark `InProgress`, and attempt delivery. On delivery
    /// failure, roll back to `Pending` so the next registration/heartbeat
    /// re-queues (spec.md §4.4, §7).
    async fn queue_setup(&self, node: &mut crate::node::Node, mode: GpuSetupMode) {
        let command_id = Uuid::new_v4().to_string();
        self.commands.register_command(command_id.clone(), node.id.clone(), node.id.clone(), CommandType::ConfigureGpu);

        node.gpu_setup_status = GpuSetupStatus::InProgress;
        for gpu in &mut node.hardware.gpus {
            gpu.setup_status = GpuSetupStatus::InProgress;
        }

        let command = NodeCommand {
            command_id,
            command_type: CommandType::ConfigureGpu,
            payload: build_payload(&node.hardware, mode),
            requires_ack: true,
            target_resource_id: node.id.clone(),
        };

        let result = self.commands.deliver_command(&node.id, &command).await;
        if !result.success {
            warn!(node_id = %node.id, message = %result.message, "GPU setup command delivery failed; resetting to Pending");
            node.gpu_setup_status = GpuSetupStatus::Pending;
            for gpu in &mut node.hardware.gpus {
                gpu.setup_status = GpuSetupStatus::Pending;
            }
        } else {
            info!(node_id = %node.id, ?mode, "GPU setup command delivered");
        }
    }

    async fn apply_failure(&self, node_id: &str, message: Option<String>) {
        let Some(handle) = self.nodes.get(node_id) else {
            warn!(node_id, "ack for unknown node; dropping");
            return;
        };
        let mut node = handle.lock().await;
        node.gpu_setup_status = GpuSetupStatus::Failed;
        for gpu in &mut node.hardware.gpus {
            gpu.setup_status = GpuSetupStatus::Failed;
        }
        let error_message = message.unwrap_or_else(|| "unknown error".to_string());

        let event = OrchestratorEvent::new(self.failure_event_type(), "node", node_id)
            .with_node_id(node_id)
            .with_payload("event", "gpu_setup_failed")
            .with_payload("error", error_message.clone());
        drop(node);
        if let Err(err) = self.events.append(event).await {
            warn!(node_id, error = %err, "failed to persist GPU setup failure event");
        }
    }

    async fn apply_success(&self, node_id: &str, ack_data: Option<serde_json::Value>) {
        let Some(handle) = self.nodes.get(node_id) else {
            warn!(node_id, "ack for unknown node; dropping");
            return;
        };
        let mut node = handle.lock().await;

        let (parsed, data_present) = match ack_data.and_then(|value| serde_json::from_value(value).ok()) {
            Some(parsed) => (parsed, true),
            None => (
                GpuSetupAckData {
                    container_sharing_ready: true,
                    ..Default::default()
                },
                false,
            ),
        };

        if parsed.reboot_required {
            node.gpu_setup_status = GpuSetupStatus::RebootRequired;
            for gpu in &mut node.hardware.gpus {
                gpu.setup_status = GpuSetupStatus::RebootRequired;
            }
        } else {
            node.gpu_setup_status = GpuSetupStatus::Completed;
            for gpu in &mut node.hardware.gpus {
                gpu.setup_status = GpuSetupStatus::Completed;
                gpu.is_available_for_container_sharing = parsed.container_sharing_ready;
                // Absent/unparseable ack data defaults only container-sharing
                // readiness; passthrough/IOMMU flags are left as-is rather
                // than reset to false (spec.md §4.4).
                if data_present {
                    gpu.is_available_for_passthrough = parsed.vfio_passthrough_ready;
                    gpu.is_iommu_enabled = parsed.iommu_enabled;
                }
                if let Some(driver_version) = &parsed.driver_version {
                    if !driver_version.is_empty() {
                        gpu.driver_version = Some(driver_version.clone());
                    }
                }
            }
            node.hardware.supports_gpu_containers = node.hardware.gpus.iter().any(|g| g.is_available_for_container_sharing);
        }

        let event = OrchestratorEvent::new(self.completion_event_type(), "node", node_id)
            .with_node_id(node_id)
            .with_payload("event", "gpu_setup_completed")
            .with_payload("containerSharing", node.hardware.gpus.iter().any(|g| g.is_available_for_container_sharing))
            .with_payload("passthrough", node.hardware.gpus.iter().any(|g| g.is_available_for_passthrough))
            .with_payload("rebootRequired", parsed.reboot_required);
        drop(node);
        if let Err(err) = self.events.append(event).await {
            warn!(node_id, error = %err, "failed to persist GPU setup completion event");
        }
    }
}

#[async_trait]
impl AckHandler for GpuSetupController {
    async fn handle_acknowledgment(&self, node_id: &str, _target_resource_id: &str, ack: CommandAcknowledgment) {
        if ack.success {
            self.apply_success(node_id, ack.data).await;
        } else {
            self.apply_failure(node_id, ack.error_message).await;
        }
    }
}

/// Metadata helper for structured JSON payload building, re-exported so
/// callers outside this module can inspect the map entries without pulling
/// in `serde_json` directly for simple cases.
pub type AckPayload = HashMap<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use super::*;
    use crate::commands::InMemoryCommandTransport;
    use crate::node::{CpuInventory, Gpu, HardwareInventory, MemoryInventory, Node, NodeRegistry, StorageDevice};

    fn node_with_gpu(id: &str, iommu: bool) -> Node {
        let hardware = HardwareInventory {
            cpu: CpuInventory { physical_cores: 8 },
            memory: MemoryInventory { allocatable_bytes: 1 << 34 },
            storage: vec![StorageDevice {
                device_id: "/dev/nvme0n1".to_string(),
                total_bytes: 1 << 40,
            }],
            gpus: vec![Gpu::detected("nvidia", "A100", "0000:3b:00.0").with_memory_bytes(80 * (1 << 30)).with_iommu_enabled(iommu)],
            container_runtimes: BTreeSet::from(["containerd".to_string()]),
            architecture: "x86_64".to_string(),
            supports_gpu: true,
            supports_gpu_containers: false,
        };
        Node::new(id, hardware)
    }

    fn controller(transport: Arc<InMemoryCommandTransport>) -> (GpuSetupController, NodeRegistry, Arc<CommandRegistry>, Arc<EventSink>) {
        let nodes = NodeRegistry::new();
        let commands = Arc::new(CommandRegistry::new(transport));
        let events = Arc::new(EventSink::default());
        (GpuSetupController::new(nodes.clone(), Arc::clone(&commands), Arc::clone(&events), EventCompatibilityMode::Legacy), nodes, commands, events)
    }

    #[tokio::test]
    async fn s3_gpu_already_usable_is_a_no_op() {
        let transport = Arc::new(InMemoryCommandTransport::new());
        let (controller, nodes, _commands, _events) = controller(Arc::clone(&transport));

        let mut node = node_with_gpu("node-1", false);
        node.hardware.supports_gpu_containers = true;
        node.hardware.gpus[0].is_available_for_container_sharing = true;
        nodes.register(node);

        controller.evaluate_and_queue_setup("node-1").await.unwrap();

        let snapshot = nodes.snapshot("node-1").await.unwrap();
        assert_eq!(snapshot.gpu_setup_status, GpuSetupStatus::Completed);
        assert!(transport.delivered_to("node-1").is_empty());
    }

    #[tokio::test]
    async fn s4_setup_needed_iommu_off_chooses_auto_mode() {
        let transport = Arc::new(InMemoryCommandTransport::new());
        let nodes = NodeRegistry::new();
        let commands = Arc::new(CommandRegistry::new(Arc::clone(&transport) as Arc<dyn crate::commands::CommandTransport>));
        let events = Arc::new(EventSink::default());
        let controller = Arc::new(GpuSetupController::new(nodes.clone(), Arc::clone(&commands), events, EventCompatibilityMode::Legacy));
        commands.register_handler(CommandType::ConfigureGpu, Arc::clone(&controller) as Arc<dyn AckHandler>);

        nodes.register(node_with_gpu("node-1", false));
        controller.evaluate_and_queue_setup("node-1").await.unwrap();

        let snapshot = nodes.snapshot("node-1").await.unwrap();
        assert_eq!(snapshot.gpu_setup_status, GpuSetupStatus::InProgress);

        let delivered = transport.delivered_to("node-1");
        assert_eq!(delivered.len(), 1);
        let payload: ConfigureGpuPayload = serde_json::from_value(delivered[0].payload.clone()).unwrap();
        assert_eq!(payload.mode, "Auto");
    }

    #[tokio::test]
    async fn failed_node_is_not_requeued_on_re_evaluation() {
        let transport = Arc::new(InMemoryCommandTransport::new());
        let (controller, nodes, _commands, _events) = controller(Arc::clone(&transport));

        let mut node = node_with_gpu("node-1", false);
        node.gpu_setup_status = GpuSetupStatus::Failed;
        nodes.register(node);

        controller.evaluate_and_queue_setup("node-1").await.unwrap();

        let snapshot = nodes.snapshot("node-1").await.unwrap();
        assert_eq!(snapshot.gpu_setup_status, GpuSetupStatus::Failed);
        assert!(transport.delivered_to("node-1").is_empty());
    }

    #[tokio::test]
    async fn completed_node_is_a_no_op_even_if_not_currently_usable() {
        let transport = Arc::new(InMemoryCommandTransport::new());
        let (controller, nodes, _commands, _events) = controller(Arc::clone(&transport));

        // Acked success once, but with container sharing declined; the node
        // is Completed yet `already_usable` would read false today.
        let mut node = node_with_gpu("node-1", false);
        node.gpu_setup_status = GpuSetupStatus::Completed;
        node.hardware.gpus[0].is_available_for_container_sharing = false;
        node.hardware.supports_gpu_containers = false;
        nodes.register(node);

        controller.evaluate_and_queue_setup("node-1").await.unwrap();

        let snapshot = nodes.snapshot("node-1").await.unwrap();
        assert_eq!(snapshot.gpu_setup_status, GpuSetupStatus::Completed);
        assert!(transport.delivered_to("node-1").is_empty());
    }

    #[tokio::test]
    async fn apply_success_without_ack_data_preserves_iommu_and_passthrough_flags() {
        let transport = Arc::new(InMemoryCommandTransport::new());
        let (controller, nodes, _commands, _events) = controller(Arc::clone(&transport));

        // IOMMU is why VfioPassthrough mode was chosen; a bare success ack
        // with no payload must not silently clear these two flags.
        let mut node = node_with_gpu("node-1", true);
        node.gpu_setup_status = GpuSetupStatus::InProgress;
        node.hardware.gpus[0].is_iommu_enabled = true;
        node.hardware.gpus[0].is_available_for_passthrough = true;
        nodes.register(node);

        controller.apply_success("node-1", None).await;

        let snapshot = nodes.snapshot("node-1").await.unwrap();
        assert_eq!(snapshot.gpu_setup_status, GpuSetupStatus::Completed);
        assert!(snapshot.hardware.gpus[0].is_iommu_enabled);
        assert!(snapshot.hardware.gpus[0].is_available_for_passthrough);
        assert!(snapshot.hardware.gpus[0].is_available_for_container_sharing);
    }

    #[tokio::test]
    async fn apply_success_with_ack_data_applies_reported_flags() {
        let transport = Arc::new(InMemoryCommandTransport::new());
        let (controller, nodes, _commands, _events) = controller(Arc::clone(&transport));

        let mut node = node_with_gpu("node-1", true);
        node.gpu_setup_status = GpuSetupStatus::InProgress;
        node.hardware.gpus[0].is_iommu_enabled = true;
        node.hardware.gpus[0].is_available_for_passthrough = true;
        nodes.register(node);

        let ack_data = serde_json::to_value(GpuSetupAckData {
            container_sharing_ready: false,
            vfio_passthrough_ready: false,
            iommu_enabled: false,
            reboot_required: false,
            driver_version: None,
            error_message: None,
        })
        .unwrap();
        controller.apply_success("node-1", Some(ack_data)).await;

        let snapshot = nodes.snapshot("node-1").await.unwrap();
        assert_eq!(snapshot.gpu_setup_status, GpuSetupStatus::Completed);
        assert!(!snapshot.hardware.gpus[0].is_iommu_enabled);
        assert!(!snapshot.hardware.gpus[0].is_available_for_passthrough);
        assert!(!snapshot.hardware.gpus[0].is_available_for_container_sharing);
    }
}
