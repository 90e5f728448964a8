//! Property-based tests for spec.md §8 invariants 1, 2, 3, and 7. Invariants
//! 4, 5, and 6 are exercised as deterministic scenario tests (concurrency and
//! idempotence are awkward to phrase as generators) in
//! `src/config/store.rs`, `src/commands/registry.rs`, and
//! `tests/gpu_setup_scenarios.rs` respectively.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;

use blockmatrix_orchestrator::capacity::{compute_tier_capacity, compute_total_capacity};
use blockmatrix_orchestrator::config::backend::InMemoryConfigBackend;
use blockmatrix_orchestrator::config::defaults::default_scheduling_config;
use blockmatrix_orchestrator::config::ConfigStore;
use blockmatrix_orchestrator::node::{CpuInventory, HardwareInventory, MemoryInventory, Node, PerformanceEvaluation, QualityTier, StorageDevice};

fn node_with(physical_cores: u32, allocatable_bytes: u64, total_storage_bytes: u64, points_per_core: f64) -> Node {
    let hardware = HardwareInventory {
        cpu: CpuInventory { physical_cores },
        memory: MemoryInventory { allocatable_bytes },
        storage: vec![StorageDevice {
            device_id: "/dev/nvme0n1".to_string(),
            total_bytes: total_storage_bytes,
        }],
        gpus: Vec::new(),
        container_runtimes: Default::default(),
        architecture: "x86_64".to_string(),
        supports_gpu: false,
        supports_gpu_containers: false,
    };
    let mut node = Node::new("prop-node", hardware);
    node.performance_evaluation = Some(PerformanceEvaluation::accepted(
        points_per_core,
        points_per_core / 1000.0,
        BTreeSet::from([QualityTier::Burstable, QualityTier::Balanced, QualityTier::Standard, QualityTier::Guaranteed]),
    ));
    node
}

proptest! {
    // Invariant 1: eligible tier capacity never overcommits memory.
    #[test]
    fn invariant_1_tier_memory_matches_allocatable_when_eligible(
        physical_cores in 1u32..128,
        allocatable_bytes in 1u64..(1u64 << 40),
        storage_bytes in 1u64..(1u64 << 45),
        points_per_core in 1.0f64..5000.0,
    ) {
        let node = node_with(physical_cores, allocatable_bytes, storage_bytes, points_per_core);
        let config = default_scheduling_config();
        for tier in QualityTier::ALL {
            let capacity = compute_tier_capacity(&node, tier, &config);
            if capacity.is_eligible {
                prop_assert_eq!(capacity.tier_memory_bytes, allocatable_bytes);
            }
        }
    }

    // Invariant 2: tier compute points follow the floor formula exactly.
    #[test]
    fn invariant_2_tier_compute_points_is_the_floor_formula(
        physical_cores in 1u32..128,
        points_per_core in 1.0f64..5000.0,
    ) {
        let node = node_with(physical_cores, 1 << 30, 1 << 40, points_per_core);
        let config = default_scheduling_config();
        for tier in QualityTier::ALL {
            let capacity = compute_tier_capacity(&node, tier, &config);
            let tier_config = &config.tiers[&tier];
            let expected = ((physical_cores as f64) * points_per_core * tier_config.cpu_overcommit_ratio).floor() as u64;
            prop_assert_eq!(capacity.tier_compute_points, expected);
        }
    }

    // Invariant 1 (total-capacity variant): total memory never overcommitted either.
    #[test]
    fn total_capacity_memory_is_never_overcommitted(
        physical_cores in 1u32..128,
        allocatable_bytes in 1u64..(1u64 << 40),
    ) {
        let node = node_with(physical_cores, allocatable_bytes, 1 << 40, 1000.0);
        let config = default_scheduling_config();
        let capacity = compute_total_capacity(&node, &config);
        prop_assert_eq!(capacity.total_memory_bytes, allocatable_bytes);
    }
}

#[tokio::test]
async fn invariant_3_update_bumps_version_and_archives_old_row() {
    let store = ConfigStore::new(InMemoryConfigBackend::new());
    let v1 = store.get_config().await.unwrap();

    let mut candidate = v1.clone();
    candidate.baseline_benchmark = 1234.0;
    let v2 = store.update_config(candidate, "prop-tester").await.unwrap();

    assert_eq!(v2.version, v1.version + 1);
    let history = store.get_config_history(10).await.unwrap();
    assert!(history.iter().any(|row| row.version == v1.version));
}

#[tokio::test]
async fn invariant_7_default_config_round_trips_through_history() {
    let store = ConfigStore::new(InMemoryConfigBackend::new());
    let original = store.get_config().await.unwrap();

    let serialized = serde_json::to_string(&original).unwrap();
    let deserialized: blockmatrix_orchestrator::config::SchedulingConfig = serde_json::from_str(&serialized).unwrap();
    assert_eq!(original, deserialized);

    let mut candidate = original.clone();
    candidate.baseline_benchmark += 1.0;
    store.update_config(candidate, "round-trip-tester").await.unwrap();

    let history = store.get_config_history(1).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0], original);
}

#[test]
fn invariant_4_and_5_are_exercised_in_component_test_modules() {
    // Property 4 (cold-cache single-load collapse) is covered by
    // `config::store::tests::cold_cache_collapses_concurrent_reads_to_one_load`.
    // Property 5 (unknown ack leaves state unchanged) is covered by
    // `commands::registry::tests::unknown_ack_leaves_state_unchanged`.
    // This test exists only so the invariant numbering in this file stays
    // contiguous and documented in one place.
    let _ = Arc::new(());
}
