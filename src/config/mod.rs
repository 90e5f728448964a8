//! Configuration Store (C1, spec.md §4.1): a cached, versioned, validated,
//! globally-shared `SchedulingConfig`.
//!
//! Grounded on the teacher's `config.rs` (a master config struct composed of
//! sub-configs, validated with `anyhow`) and `assets/core/management.rs`'s
//! `Arc<DashMap<..>>`-backed registry pattern, adapted here to a single-slot
//! `ArcSwapOption` cache plus a history store.

pub mod backend;
pub mod defaults;
mod store;
mod validation;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::node::QualityTier;

pub use backend::{ConfigBackend, InMemoryConfigBackend};
pub use store::ConfigStore;
pub use validation::validate;

/// Per-tier overcommit and pricing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfiguration {
    /// Minimum benchmark score a node must clear to be eligible for this tier.
    pub minimum_benchmark: f64,
    /// CPU overcommit ratio applied to this tier's compute-point formula.
    pub cpu_overcommit_ratio: f64,
    /// Storage overcommit ratio applied to this tier's storage formula.
    pub storage_overcommit_ratio: f64,
    /// Price multiplier relative to baseline pricing.
    pub price_multiplier: f64,
    /// Human-readable description shown in operator tooling.
    pub description: String,
    /// Human-readable target use case.
    pub target_use_case: String,
}

/// Global scheduling limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum utilization percent a node may be scheduled to, in `(0, 100]`.
    pub max_utilization_percent: f64,
    /// Minimum free memory, in MB, a node must retain headroom for.
    pub min_free_memory_mb: i64,
    /// Maximum 1-minute load average before a node is excluded from placement.
    pub max_load_average: f64,
    /// Whether placement should prefer nodes in the requester's region.
    pub prefer_local_region: bool,
}

/// Scoring weights for the placement algorithm; must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    /// Weight given to available capacity.
    pub capacity: f64,
    /// Weight given to current load.
    pub load: f64,
    /// Weight given to node reputation.
    pub reputation: f64,
    /// Weight given to locality preference.
    pub locality: f64,
}

/// The live scheduling configuration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Monotonically increasing version; bumped by exactly 1 per successful update.
    pub version: u64,
    /// Baseline benchmark score a node with `PerformanceMultiplier == 1.0` would score.
    pub baseline_benchmark: f64,
    /// Maximum performance multiplier any node may be assigned.
    pub max_performance_multiplier: f64,
    /// Per-tier configuration; must contain at least `Burstable`.
    pub tiers: HashMap<QualityTier, TierConfiguration>,
    /// Global scheduling limits.
    pub limits: Limits,
    /// Placement scoring weights.
    pub weights: Weights,
    /// When this row was first created (preserved across updates to the live row's history).
    pub created_at: DateTime<Utc>,
    /// When this row was last updated.
    pub updated_at: DateTime<Utc>,
    /// Principal that performed the last update.
    pub updated_by: String,
}
