//! `SchedulingConfig` validation (spec.md §4.1).
//!
//! A single fatal [`ConfigError`] is returned per attempt — the first rule
//! violated wins, mirroring the teacher's `anyhow`-based fail-fast validation
//! in `config.rs`.

use crate::error::ConfigError;
use crate::node::QualityTier;

use super::SchedulingConfig;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Validate a candidate configuration. Returns `Ok(())` if every rule passes.
pub fn validate(config: &SchedulingConfig) -> Result<(), ConfigError> {
    if config.baseline_benchmark <= 0.0 || config.max_performance_multiplier <= 0.0 {
        return Err(ConfigError::NonPositiveBaseline);
    }

    if config.tiers.is_empty() || !config.tiers.contains_key(&QualityTier::Burstable) {
        return Err(ConfigError::MissingBurstableTier);
    }

    for (tier, cfg) in &config.tiers {
        if cfg.minimum_benchmark <= 0.0 {
            return Err(ConfigError::InvalidTier {
                tier: *tier,
                reason: "MinimumBenchmark must be positive".to_string(),
            });
        }
        if cfg.cpu_overcommit_ratio <= 0.0 {
            return Err(ConfigError::InvalidTier {
                tier: *tier,
                reason: "CpuOvercommitRatio must be positive".to_string(),
            });
        }
        if cfg.storage_overcommit_ratio <= 0.0 {
            return Err(ConfigError::InvalidTier {
                tier: *tier,
                reason: "StorageOvercommitRatio must be positive".to_string(),
            });
        }
        if cfg.price_multiplier < 0.0 {
            return Err(ConfigError::InvalidTier {
                tier: *tier,
                reason: "PriceMultiplier must not be negative".to_string(),
            });
        }
    }

    let limits = &config.limits;
    if limits.max_utilization_percent <= 0.0 || limits.max_utilization_percent > 100.0 {
        return Err(ConfigError::InvalidLimits {
            reason: "MaxUtilizationPercent must be in (0, 100]".to_string(),
        });
    }
    if limits.min_free_memory_mb < 0 {
        return Err(ConfigError::InvalidLimits {
            reason: "MinFreeMemoryMb must not be negative".to_string(),
        });
    }
    if limits.max_load_average <= 0.0 {
        return Err(ConfigError::InvalidLimits {
            reason: "MaxLoadAverage must be positive".to_string(),
        });
    }

    let w = &config.weights;
    if w.capacity < 0.0 || w.load < 0.0 || w.reputation < 0.0 || w.locality < 0.0 {
        return Err(ConfigError::InvalidWeights {
            sum: w.capacity + w.load + w.reputation + w.locality,
        });
    }
    let sum = w.capacity + w.load + w.reputation + w.locality;
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(ConfigError::InvalidWeights { sum });
    }

    Ok(())
}
