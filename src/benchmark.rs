//! Benchmark execution collaborator (spec.md §9): "run a blocking measurement
//! and return a `{score, method, raw, duration}` record." No real sysbench
//! invocation is implemented here — out of scope — only the trait boundary
//! C2's evaluation pipeline composes against, plus a deterministic test
//! double. Grounded on the teacher's collaborator-trait shape in
//! `extensions/mod.rs`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of running a node's benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Normalized compute-points score.
    pub score: f64,
    /// Name of the measurement method used (e.g. "sysbench-cpu", "synthetic").
    pub method: String,
    /// Raw, method-specific measurement value.
    pub raw: f64,
    /// Wall-clock time the measurement took.
    pub duration: Duration,
}

/// Runs a performance benchmark against a node.
#[async_trait]
pub trait BenchmarkRunner: Send + Sync {
    /// Execute the benchmark for `node_id`, returning a score plus provenance.
    async fn run(&self, node_id: &str) -> BenchmarkResult;
}

/// A deterministic benchmark double for tests and the demo CLI: returns a
/// fixed score regardless of node id, with `method = "synthetic"`.
pub struct SyntheticBenchmarkRunner {
    score: f64,
}

impl SyntheticBenchmarkRunner {
    /// Construct a runner that always reports `score`.
    pub fn fixed(score: f64) -> Self {
        Self { score }
    }
}

impl Default for SyntheticBenchmarkRunner {
    fn default() -> Self {
        Self::fixed(1000.0)
    }
}

#[async_trait]
impl BenchmarkRunner for SyntheticBenchmarkRunner {
    async fn run(&self, _node_id: &str) -> BenchmarkResult {
        BenchmarkResult {
            score: self.score,
            method: "synthetic".to_string(),
            raw: self.score,
            duration: Duration::from_millis(1),
        }
    }
}
