//! Capacity Calculator (C2, spec.md §4.2): a pure function from
//! (node inventory + evaluation + config) to total and per-tier capacity.
//!
//! No caching, no I/O — callers read the config through the [`crate::config::ConfigStore`]
//! on each call, since that store already owns caching (spec.md §4.2: "operations
//! must not cache config across calls because C1 already does").

use crate::config::{SchedulingConfig, TierConfiguration};
use crate::node::{Node, QualityTier};

/// Result of [`compute_total_capacity`].
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTotalCapacity {
    /// Normalized CPU compute points available, using the Burstable envelope.
    pub total_compute_points: u64,
    /// Memory bytes available; never overcommitted.
    pub total_memory_bytes: u64,
    /// Storage bytes available, overcommitted per the Burstable tier's ratio.
    pub total_storage_bytes: u64,
    /// Whether this node is acceptable for scheduling at all.
    pub is_acceptable: bool,
    /// Reason capacity is zero, if `is_acceptable` is false.
    pub rejection_reason: Option<String>,
}

impl NodeTotalCapacity {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            total_compute_points: 0,
            total_memory_bytes: 0,
            total_storage_bytes: 0,
            is_acceptable: false,
            rejection_reason: Some(reason.into()),
        }
    }
}

/// Result of [`compute_tier_capacity`].
#[derive(Debug, Clone, PartialEq)]
pub struct TierSpecificCapacity {
    /// The tier this result is for.
    pub tier: QualityTier,
    /// Normalized CPU compute points available under this tier's ratio.
    pub tier_compute_points: u64,
    /// Memory bytes available; identical across tiers, never overcommitted.
    pub tier_memory_bytes: u64,
    /// Storage bytes available under this tier's overcommit ratio.
    pub tier_storage_bytes: u64,
    /// Whether the node is eligible to serve this tier at all.
    pub is_eligible: bool,
    /// Reason the node is not eligible, if `is_eligible` is false.
    pub ineligibility_reason: Option<String>,
}

impl TierSpecificCapacity {
    fn ineligible(tier: QualityTier, reason: impl Into<String>) -> Self {
        Self {
            tier,
            tier_compute_points: 0,
            tier_memory_bytes: 0,
            tier_storage_bytes: 0,
            is_eligible: false,
            ineligibility_reason: Some(reason.into()),
        }
    }
}

fn compute_points(physical_cores: u32, points_per_core: f64, cpu_overcommit_ratio: f64) -> u64 {
    ((physical_cores as f64) * points_per_core * cpu_overcommit_ratio).floor() as u64
}

fn storage_bytes(physical_storage: u64, storage_overcommit_ratio: f64) -> u64 {
    ((physical_storage as f64) * storage_overcommit_ratio).floor() as u64
}

/// Total capacity envelope for a node, computed against the Burstable tier
/// (the maximum-overcommit tier) regardless of the node's own eligible tiers.
pub fn compute_total_capacity(node: &Node, config: &SchedulingConfig) -> NodeTotalCapacity {
    let evaluation = match &node.performance_evaluation {
        Some(evaluation) => evaluation,
        None => return NodeTotalCapacity::rejected("No performance evaluation"),
    };

    if !evaluation.is_acceptable {
        let reason = evaluation
            .rejection_reason
            .clone()
            .unwrap_or_else(|| "No performance evaluation".to_string());
        return NodeTotalCapacity::rejected(reason);
    }

    let burstable = match config.tiers.get(&QualityTier::Burstable) {
        Some(tier) => tier,
        None => return NodeTotalCapacity::rejected("Burstable tier not configured"),
    };

    let physical_cores = node.hardware.cpu.physical_cores;
    let physical_storage = node.hardware.total_storage_bytes();

    NodeTotalCapacity {
        total_compute_points: compute_points(physical_cores, evaluation.points_per_core, burstable.cpu_overcommit_ratio),
        total_memory_bytes: node.hardware.memory.allocatable_bytes,
        total_storage_bytes: storage_bytes(physical_storage, burstable.storage_overcommit_ratio),
        is_acceptable: true,
        rejection_reason: None,
    }
}

/// Tier-specific capacity, gated by the node's `EligibleTiers`.
pub fn compute_tier_capacity(node: &Node, tier: QualityTier, config: &SchedulingConfig) -> TierSpecificCapacity {
    let evaluation = match &node.performance_evaluation {
        Some(evaluation) => evaluation,
        None => return TierSpecificCapacity::ineligible(tier, "Node not evaluated"),
    };

    if !evaluation.eligible_tiers.contains(&tier) {
        let reason = evaluation
            .tier_capabilities
            .get(&tier)
            .and_then(|caps| caps.ineligibility_reason.clone())
            .unwrap_or_else(|| "Node not evaluated".to_string());
        return TierSpecificCapacity::ineligible(tier, reason);
    }

    let tier_config: &TierConfiguration = match config.tiers.get(&tier) {
        Some(tier_config) => tier_config,
        None => return TierSpecificCapacity::ineligible(tier, "Tier not configured"),
    };

    let physical_cores = node.hardware.cpu.physical_cores;
    let physical_storage = node.hardware.total_storage_bytes();

    TierSpecificCapacity {
        tier,
        tier_compute_points: compute_points(physical_cores, evaluation.points_per_core, tier_config.cpu_overcommit_ratio),
        tier_memory_bytes: node.hardware.memory.allocatable_bytes,
        tier_storage_bytes: storage_bytes(physical_storage, tier_config.storage_overcommit_ratio),
        is_eligible: true,
        ineligibility_reason: None,
    }
}
