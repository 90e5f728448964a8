//! Node data model: hardware inventory, GPU inventory, and performance
//! evaluation (spec.md §3).
//!
//! Field names mirror the teacher's `hardware.rs` (`physical_cores`,
//! `total_bytes`, …) and `assets/vm/types.rs` (`VmType::Gpu`) conventions.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// A quality tier, strictly ordered by increasing performance guarantee:
/// `Burstable < Balanced < Standard < Guaranteed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Best-effort, maximum overcommit.
    Burstable,
    /// Moderate overcommit, general purpose.
    Balanced,
    /// Light overcommit, predictable performance.
    Standard,
    /// No CPU/storage overcommit beyond 1.0.
    Guaranteed,
}

impl QualityTier {
    /// All tiers, in ascending order.
    pub const ALL: [QualityTier; 4] = [
        QualityTier::Burstable,
        QualityTier::Balanced,
        QualityTier::Standard,
        QualityTier::Guaranteed,
    ];
}

/// Node-level GPU setup state machine (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuSetupStatus {
    /// No GPU present, or GPU capability not applicable.
    NotNeeded,
    /// Queued, awaiting registration/delivery.
    Pending,
    /// A `ConfigureGpu` command has been delivered and is awaiting acknowledgment.
    InProgress,
    /// Setup succeeded but a reboot is required before the GPU is usable.
    RebootRequired,
    /// Setup succeeded and the GPU is usable.
    Completed,
    /// The node agent reported a terminal failure; requires manual retrigger.
    Failed,
}

/// A single GPU device in a node's inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gpu {
    /// GPU vendor (e.g. "nvidia", "amd").
    pub vendor: String,
    /// Model string (e.g. "A100-80GB").
    pub model: String,
    /// PCI bus address (e.g. "0000:3b:00.0").
    pub pci_address: String,
    /// Onboard memory in bytes.
    pub memory_bytes: u64,
    /// Driver version currently reported by the node agent, if known.
    pub driver_version: Option<String>,
    /// Whether IOMMU is enabled for this device's group.
    pub is_iommu_enabled: bool,
    /// Whether the device is currently available for VFIO passthrough to a VM.
    pub is_available_for_passthrough: bool,
    /// Whether the device is currently available for container-toolkit sharing.
    pub is_available_for_container_sharing: bool,
    /// Per-GPU mirror of the node-level setup status.
    pub setup_status: GpuSetupStatus,
}

impl Gpu {
    /// Construct a freshly-detected GPU with no readiness flags set yet.
    #[must_use]
    pub fn detected(vendor: impl Into<String>, model: impl Into<String>, pci_address: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            model: model.into(),
            pci_address: pci_address.into(),
            memory_bytes: 0,
            driver_version: None,
            is_iommu_enabled: false,
            is_available_for_passthrough: false,
            is_available_for_container_sharing: false,
            setup_status: GpuSetupStatus::Pending,
        }
    }

    /// Set onboard memory in bytes.
    #[must_use]
    pub fn with_memory_bytes(mut self, bytes: u64) -> Self {
        self.memory_bytes = bytes;
        self
    }

    /// Mark IOMMU as enabled for this device.
    #[must_use]
    pub fn with_iommu_enabled(mut self, enabled: bool) -> Self {
        self.is_iommu_enabled = enabled;
        self
    }
}

/// A storage device in a node's inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageDevice {
    /// Device identifier (e.g. "/dev/nvme0n1").
    pub device_id: String,
    /// Total capacity in bytes.
    pub total_bytes: u64,
}

/// Physical CPU inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuInventory {
    /// Physical core count (not hyperthreads).
    pub physical_cores: u32,
}

/// Physical memory inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInventory {
    /// Allocatable memory in bytes.
    pub allocatable_bytes: u64,
}

/// Raw hardware inventory reported by a node agent at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareInventory {
    /// CPU inventory.
    pub cpu: CpuInventory,
    /// Memory inventory.
    pub memory: MemoryInventory,
    /// Storage devices.
    pub storage: Vec<StorageDevice>,
    /// GPU devices, in detection order.
    pub gpus: Vec<Gpu>,
    /// Container runtimes available on the node (e.g. "containerd", "docker").
    pub container_runtimes: BTreeSet<String>,
    /// Raw architecture string as reported; normalize via [`crate::arch::normalize`].
    pub architecture: String,
    /// Whether the node agent reports GPU-passthrough capability at all.
    /// Distinct from `gpus.is_empty()`: a node can detect GPU hardware before
    /// any individual device is flagged usable for passthrough.
    pub supports_gpu: bool,
    /// Whether the node agent reports container-toolkit GPU sharing
    /// capability. Recomputed by the GPU-setup controller as "any GPU has
    /// container sharing" after a successful setup (spec.md §4.4).
    pub supports_gpu_containers: bool,
}

impl HardwareInventory {
    /// Sum of all storage devices' total bytes.
    pub fn total_storage_bytes(&self) -> u64 {
        self.storage.iter().map(|d| d.total_bytes).sum()
    }
}

/// Per-tier capabilities recorded by the performance evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierCapabilities {
    /// Reason the node was not eligible for this tier, if applicable.
    pub ineligibility_reason: Option<String>,
}

/// Outcome of running the node's benchmark through the scoring pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEvaluation {
    /// Whether the node passed the minimum acceptability bar.
    pub is_acceptable: bool,
    /// Reason the node was rejected, if `is_acceptable` is false.
    pub rejection_reason: Option<String>,
    /// Normalized compute points per physical core.
    pub points_per_core: f64,
    /// Multiplier applied relative to the baseline benchmark.
    pub performance_multiplier: f64,
    /// Tiers this node is eligible to serve.
    pub eligible_tiers: BTreeSet<QualityTier>,
    /// Per-tier capability detail, including ineligibility reasons.
    pub tier_capabilities: HashMap<QualityTier, TierCapabilities>,
}

impl PerformanceEvaluation {
    /// Points per core for an accepted evaluation; `None` (well, zero capacity
    /// downstream) is represented by `is_acceptable = false` instead of an
    /// `Option`, matching spec.md's invariant that accepted nodes always have
    /// `PointsPerCore > 0`.
    pub fn accepted(points_per_core: f64, performance_multiplier: f64, eligible_tiers: BTreeSet<QualityTier>) -> Self {
        debug_assert!(points_per_core > 0.0);
        Self {
            is_acceptable: true,
            rejection_reason: None,
            points_per_core,
            performance_multiplier,
            eligible_tiers,
            tier_capabilities: HashMap::new(),
        }
    }

    /// A rejected evaluation, carrying the reason surfaced to capacity queries.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            is_acceptable: false,
            rejection_reason: Some(reason.into()),
            points_per_core: 0.0,
            performance_multiplier: 0.0,
            eligible_tiers: BTreeSet::new(),
            tier_capabilities: HashMap::new(),
        }
    }
}

/// A registered compute node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable node identity.
    pub id: String,
    /// Raw hardware inventory.
    pub hardware: HardwareInventory,
    /// Performance evaluation, absent until a benchmark run completes.
    pub performance_evaluation: Option<PerformanceEvaluation>,
    /// Node-level GPU setup status.
    pub gpu_setup_status: GpuSetupStatus,
}

impl Node {
    /// Construct a node with no evaluation yet and GPU status derived from
    /// whether it has any GPUs at all.
    pub fn new(id: impl Into<String>, hardware: HardwareInventory) -> Self {
        let gpu_setup_status = if hardware.gpus.is_empty() {
            GpuSetupStatus::NotNeeded
        } else {
            GpuSetupStatus::Pending
        };
        Self {
            id: id.into(),
            hardware,
            performance_evaluation: None,
            gpu_setup_status,
        }
    }
}

/// Shared node table: one [`tokio::sync::Mutex`]-guarded [`Node`] per id,
/// behind a concurrent map. Holding a node's lock for the duration of an
/// operation is how C4 satisfies spec.md §5's requirement that the node it
/// mutates is not concurrently mutated by another controller, and that the
/// `InProgress` check-and-set is atomic with command registration.
#[derive(Default, Clone)]
pub struct NodeRegistry {
    nodes: std::sync::Arc<dashmap::DashMap<String, std::sync::Arc<tokio::sync::Mutex<Node>>>>,
}

impl NodeRegistry {
    /// Construct an empty node table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a node.
    pub fn register(&self, node: Node) {
        self.nodes.insert(node.id.clone(), std::sync::Arc::new(tokio::sync::Mutex::new(node)));
    }

    /// Get the lock-guarded handle for a node, if registered.
    pub fn get(&self, node_id: &str) -> Option<std::sync::Arc<tokio::sync::Mutex<Node>>> {
        self.nodes.get(node_id).map(|entry| std::sync::Arc::clone(entry.value()))
    }

    /// A cloned snapshot of a node's current state.
    pub async fn snapshot(&self, node_id: &str) -> Option<Node> {
        let handle = self.get(node_id)?;
        Some(handle.lock().await.clone())
    }
}
