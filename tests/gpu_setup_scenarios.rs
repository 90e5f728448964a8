//! End-to-end GPU-setup scenarios (spec.md §8, S3-S6), driven through the
//! public `Orchestrator` facade rather than individual component internals.

use std::collections::BTreeSet;
use std::sync::Arc;

use blockmatrix_orchestrator::commands::{CommandAcknowledgment, InMemoryCommandTransport};
use blockmatrix_orchestrator::config::backend::InMemoryConfigBackend;
use blockmatrix_orchestrator::config::ConfigStore;
use blockmatrix_orchestrator::events::EventCompatibilityMode;
use blockmatrix_orchestrator::node::{CpuInventory, Gpu, GpuSetupStatus, HardwareInventory, MemoryInventory, Node, StorageDevice};
use blockmatrix_orchestrator::Orchestrator;

fn gpu_node(id: &str, iommu_enabled: bool) -> Node {
    let hardware = HardwareInventory {
        cpu: CpuInventory { physical_cores: 8 },
        memory: MemoryInventory {
            allocatable_bytes: 32 * (1u64 << 30),
        },
        storage: vec![StorageDevice {
            device_id: "/dev/nvme0n1".to_string(),
            total_bytes: 1u64 << 40,
        }],
        gpus: vec![Gpu::detected("nvidia", "A100-80GB", "0000:3b:00.0").with_memory_bytes(80 * (1u64 << 30)).with_iommu_enabled(iommu_enabled)],
        container_runtimes: BTreeSet::from(["containerd".to_string()]),
        architecture: "x86_64".to_string(),
        supports_gpu: true,
        supports_gpu_containers: false,
    };
    Node::new(id, hardware)
}

async fn orchestrator_with_transport(transport: Arc<InMemoryCommandTransport>) -> Orchestrator {
    let config = Arc::new(ConfigStore::new(InMemoryConfigBackend::new()));
    Orchestrator::new(config, transport, EventCompatibilityMode::Legacy)
}

#[tokio::test]
async fn s3_gpu_already_usable_skips_setup_entirely() {
    let transport = Arc::new(InMemoryCommandTransport::new());
    let orchestrator = orchestrator_with_transport(Arc::clone(&transport)).await;

    let mut node = gpu_node("node-1", false);
    node.hardware.supports_gpu_containers = true;
    node.hardware.gpus[0].is_available_for_container_sharing = true;
    orchestrator.register_node(node).await.unwrap();

    let snapshot = orchestrator.nodes.snapshot("node-1").await.unwrap();
    assert_eq!(snapshot.gpu_setup_status, GpuSetupStatus::Completed);
    assert!(transport.delivered_to("node-1").is_empty());
}

#[tokio::test]
async fn s4_setup_completes_on_success_ack() {
    let transport = Arc::new(InMemoryCommandTransport::new());
    let orchestrator = orchestrator_with_transport(Arc::clone(&transport)).await;

    orchestrator.register_node(gpu_node("node-1", false)).await.unwrap();
    let in_progress = orchestrator.nodes.snapshot("node-1").await.unwrap();
    assert_eq!(in_progress.gpu_setup_status, GpuSetupStatus::InProgress);

    let delivered = transport.delivered_to("node-1");
    assert_eq!(delivered.len(), 1);

    orchestrator
        .commands
        .process_acknowledgment(CommandAcknowledgment {
            command_id: delivered[0].command_id.clone(),
            success: true,
            error_message: None,
            data: Some(serde_json::json!({
                "ContainerSharingReady": true,
                "VfioPassthroughReady": false,
                "IommuEnabled": false,
                "RebootRequired": false,
                "DriverVersion": "535.129.03",
            })),
        })
        .await
        .unwrap();

    let completed = orchestrator.nodes.snapshot("node-1").await.unwrap();
    assert_eq!(completed.gpu_setup_status, GpuSetupStatus::Completed);
    assert!(completed.hardware.gpus[0].is_available_for_container_sharing);
    assert!(!completed.hardware.gpus[0].is_available_for_passthrough);

    let events = orchestrator.events.query(10, None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload.get("event").and_then(|v| v.as_str()), Some("gpu_setup_completed"));
    assert_eq!(events[0].payload.get("containerSharing").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(events[0].payload.get("passthrough").and_then(|v| v.as_bool()), Some(false));
}

#[tokio::test]
async fn s5_setup_requires_reboot() {
    let transport = Arc::new(InMemoryCommandTransport::new());
    let orchestrator = orchestrator_with_transport(Arc::clone(&transport)).await;

    orchestrator.register_node(gpu_node("node-1", false)).await.unwrap();
    let delivered = transport.delivered_to("node-1");

    orchestrator
        .commands
        .process_acknowledgment(CommandAcknowledgment {
            command_id: delivered[0].command_id.clone(),
            success: true,
            error_message: None,
            data: Some(serde_json::json!({
                "ContainerSharingReady": true,
                "VfioPassthroughReady": false,
                "IommuEnabled": false,
                "RebootRequired": true,
            })),
        })
        .await
        .unwrap();

    let node = orchestrator.nodes.snapshot("node-1").await.unwrap();
    assert_eq!(node.gpu_setup_status, GpuSetupStatus::RebootRequired);

    let events = orchestrator.events.query(10, None).await.unwrap();
    assert_eq!(events[0].payload.get("rebootRequired").and_then(|v| v.as_bool()), Some(true));
}

#[tokio::test]
async fn s6_delivery_failure_resets_to_pending_with_no_event() {
    let transport = Arc::new(InMemoryCommandTransport::new());
    transport.fail_delivery_for("node-1", "agent unreachable");
    let orchestrator = orchestrator_with_transport(Arc::clone(&transport)).await;

    orchestrator.register_node(gpu_node("node-1", false)).await.unwrap();

    let node = orchestrator.nodes.snapshot("node-1").await.unwrap();
    assert_eq!(node.gpu_setup_status, GpuSetupStatus::Pending);
    assert!(orchestrator.events.query(10, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn s6_outstanding_entry_survives_until_timeout_reaping() {
    use std::time::Duration;

    let transport = Arc::new(InMemoryCommandTransport::new());
    let orchestrator = orchestrator_with_transport(Arc::clone(&transport)).await;
    orchestrator.commands.set_timeout(blockmatrix_orchestrator::commands::CommandType::ConfigureGpu, Duration::from_millis(1));

    orchestrator.register_node(gpu_node("node-1", false)).await.unwrap();
    let delivered = transport.delivered_to("node-1");
    assert!(orchestrator.commands.is_outstanding(&delivered[0].command_id));

    tokio::time::sleep(Duration::from_millis(20)).await;
    orchestrator.reap_stale_commands().await;

    assert!(!orchestrator.commands.is_outstanding(&delivered[0].command_id));
    let node = orchestrator.nodes.snapshot("node-1").await.unwrap();
    assert_eq!(node.gpu_setup_status, GpuSetupStatus::Failed);
}

#[tokio::test]
async fn property_6_reevaluating_an_in_progress_node_issues_no_second_command() {
    let transport = Arc::new(InMemoryCommandTransport::new());
    let orchestrator = orchestrator_with_transport(Arc::clone(&transport)).await;

    orchestrator.register_node(gpu_node("node-1", false)).await.unwrap();
    orchestrator.gpu_setup.evaluate_and_queue_setup("node-1").await.unwrap();
    orchestrator.gpu_setup.evaluate_and_queue_setup("node-1").await.unwrap();

    assert_eq!(transport.delivered_to("node-1").len(), 1);
}
