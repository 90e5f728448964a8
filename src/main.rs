//! BlockMatrix orchestrator core — demo CLI.
//!
//! Wires the five components together against in-memory backends and walks
//! through the registration and capacity-query control flows from spec.md
//! §2. No HTTP/RPC listener is opened; that surface remains out of scope.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use blockmatrix_orchestrator::commands::InMemoryCommandTransport;
use blockmatrix_orchestrator::config::backend::InMemoryConfigBackend;
use blockmatrix_orchestrator::config::ConfigStore;
use blockmatrix_orchestrator::events::EventCompatibilityMode;
use blockmatrix_orchestrator::gpu_setup::GpuSetupMode;
use blockmatrix_orchestrator::node::{CpuInventory, Gpu, HardwareInventory, MemoryInventory, Node, PerformanceEvaluation, QualityTier, StorageDevice};
use blockmatrix_orchestrator::Orchestrator;

/// BlockMatrix orchestrator core demo.
#[derive(Parser)]
#[command(name = "blockmatrix-orchestrator")]
#[command(about = "BlockMatrix compute orchestrator core: node capacity, scheduling configuration, and GPU-setup command dispatch")]
#[command(version = "1.0.0")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a synthetic node and print its capacity + GPU-setup status.
    Demo {
        /// Node id to register.
        #[arg(long, default_value = "demo-node-1")]
        node_id: String,
        /// Attach a synthetic GPU to the node.
        #[arg(long)]
        with_gpu: bool,
        /// Whether the attached GPU's IOMMU group is already enabled.
        #[arg(long)]
        iommu_enabled: bool,
    },
    /// Print the current scheduling configuration as JSON.
    ShowConfig,
}

fn demo_node(node_id: &str, with_gpu: bool, iommu_enabled: bool) -> Node {
    let gpus = if with_gpu {
        vec![Gpu::detected("nvidia", "A100-80GB", "0000:3b:00.0").with_memory_bytes(80 * (1u64 << 30)).with_iommu_enabled(iommu_enabled)]
    } else {
        Vec::new()
    };
    let hardware = HardwareInventory {
        cpu: CpuInventory { physical_cores: 16 },
        memory: MemoryInventory {
            allocatable_bytes: 64 * (1u64 << 30),
        },
        storage: vec![StorageDevice {
            device_id: "/dev/nvme0n1".to_string(),
            total_bytes: 2 * (1u64 << 40),
        }],
        gpus,
        container_runtimes: BTreeSet::from(["containerd".to_string()]),
        architecture: "x86_64".to_string(),
        supports_gpu: with_gpu,
        supports_gpu_containers: false,
    };
    let mut node = Node::new(node_id, hardware);
    node.performance_evaluation = Some(PerformanceEvaluation::accepted(1500.0, 1.5, BTreeSet::from([QualityTier::Burstable, QualityTier::Balanced])));
    node
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();

    let config = Arc::new(ConfigStore::new(InMemoryConfigBackend::new()));
    let transport = Arc::new(InMemoryCommandTransport::new());
    let orchestrator = Orchestrator::new(config, transport, EventCompatibilityMode::Legacy);

    match cli.command {
        Command::Demo {
            node_id,
            with_gpu,
            iommu_enabled,
        } => {
            info!(node_id = %node_id, with_gpu, "registering demo node");
            orchestrator.register_node(demo_node(&node_id, with_gpu, iommu_enabled)).await?;

            let snapshot = orchestrator.nodes.snapshot(&node_id).await.expect("just registered");
            println!("GPU setup status: {:?}", snapshot.gpu_setup_status);
            if with_gpu {
                let mode = if iommu_enabled { GpuSetupMode::VfioPassthrough } else { GpuSetupMode::Auto };
                println!("expected setup mode: {mode:?}");
            }

            let capacity = orchestrator.node_total_capacity(&node_id).await?;
            println!("total capacity: {capacity:#?}");
        }
        Command::ShowConfig => {
            let config = orchestrator.config.get_config().await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
