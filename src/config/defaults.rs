//! Canonical default `SchedulingConfig` (spec.md §6). Used on first-ever
//! bootstrap when no persisted row exists.

use std::collections::HashMap;

use chrono::Utc;

use crate::node::QualityTier;

use super::{Limits, SchedulingConfig, TierConfiguration, Weights};

/// Build the canonical default configuration, version 1, `updated_by = "system"`.
pub fn default_scheduling_config() -> SchedulingConfig {
    let mut tiers = HashMap::new();
    tiers.insert(
        QualityTier::Burstable,
        TierConfiguration {
            minimum_benchmark: 1000.0,
            cpu_overcommit_ratio: 4.0,
            storage_overcommit_ratio: 2.5,
            price_multiplier: 0.5,
            description: "Best-effort, maximum overcommit".to_string(),
            target_use_case: "Batch and dev/test workloads".to_string(),
        },
    );
    tiers.insert(
        QualityTier::Balanced,
        TierConfiguration {
            minimum_benchmark: 1500.0,
            cpu_overcommit_ratio: 2.7,
            storage_overcommit_ratio: 2.0,
            price_multiplier: 0.7,
            description: "Moderate overcommit, general purpose".to_string(),
            target_use_case: "General web and application workloads".to_string(),
        },
    );
    tiers.insert(
        QualityTier::Standard,
        TierConfiguration {
            minimum_benchmark: 2500.0,
            cpu_overcommit_ratio: 1.6,
            storage_overcommit_ratio: 1.5,
            price_multiplier: 1.0,
            description: "Light overcommit, predictable performance".to_string(),
            target_use_case: "Production services".to_string(),
        },
    );
    tiers.insert(
        QualityTier::Guaranteed,
        TierConfiguration {
            minimum_benchmark: 4000.0,
            cpu_overcommit_ratio: 1.0,
            storage_overcommit_ratio: 1.0,
            price_multiplier: 1.8,
            description: "No overcommit beyond 1.0".to_string(),
            target_use_case: "Latency-sensitive and compliance-bound workloads".to_string(),
        },
    );

    let now = Utc::now();
    SchedulingConfig {
        version: 1,
        baseline_benchmark: 1000.0,
        max_performance_multiplier: 20.0,
        tiers,
        limits: Limits {
            max_utilization_percent: 90.0,
            min_free_memory_mb: 512,
            max_load_average: 8.0,
            prefer_local_region: true,
        },
        weights: Weights {
            capacity: 0.40,
            load: 0.25,
            reputation: 0.20,
            locality: 0.15,
        },
        created_at: now,
        updated_at: now,
        updated_by: "system".to_string(),
    }
}
