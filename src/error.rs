//! Typed errors for the orchestrator core.
//!
//! Each component gets its own error enum in the style of
//! `extensions::ExtensionError` from the teacher tree: named-field
//! `#[error("...")]` variants, no catch-all `String` blob.

use thiserror::Error;

/// Errors raised by the scheduling-configuration store (C1).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `BaselineBenchmark` or `MaxPerformanceMultiplier` was not positive.
    #[error("baseline benchmark and max performance multiplier must be positive")]
    NonPositiveBaseline,

    /// The tier map was empty or missing the mandatory `Burstable` entry.
    #[error("tier map must be non-empty and contain a Burstable tier")]
    MissingBurstableTier,

    /// A tier's numeric fields failed validation.
    #[error("tier {tier:?} has an invalid field: {reason}")]
    InvalidTier {
        /// The offending tier.
        tier: crate::node::QualityTier,
        /// Human-readable reason.
        reason: String,
    },

    /// `Limits` failed validation.
    #[error("invalid limits: {reason}")]
    InvalidLimits {
        /// Human-readable reason.
        reason: String,
    },

    /// `Weights` did not sum to 1.0 within tolerance, or a weight was negative.
    #[error("weights must be non-negative and sum to 1.0 (got sum {sum})")]
    InvalidWeights {
        /// The sum that was computed.
        sum: f64,
    },

    /// The persistence backend failed on a write or read.
    #[error("config backend error: {0}")]
    Backend(String),

    /// The caller's cancellation signal fired before the operation completed.
    #[error("operation cancelled")]
    Cancelled,
}

/// Errors raised by the command registry & dispatcher (C3).
///
/// An acknowledgment for an unrecognized command id is not an error here —
/// it is dropped idempotently (spec.md's repeated-ack tolerance) — and
/// transport delivery failure is reported via [`crate::commands::DeliveryResult`],
/// not this type, since the caller needs the result alongside the rollback
/// state rather than a bare `Err`.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No handler is registered for a command type.
    #[error("no acknowledgment handler registered for command type {0:?}")]
    NoHandler(crate::commands::CommandType),

    /// The caller's cancellation signal fired before delivery completed.
    #[error("operation cancelled")]
    Cancelled,
}

/// Errors raised by the GPU-setup controller (C4).
#[derive(Debug, Error)]
pub enum GpuSetupError {
    /// The referenced node does not exist in the node table.
    #[error("unknown node {node_id}")]
    UnknownNode {
        /// The unrecognized node id.
        node_id: String,
    },

    /// The node has no GPUs in inventory.
    #[error("node {node_id} has no GPUs")]
    NoGpus {
        /// The node id.
        node_id: String,
    },

    /// A setup was already in progress for this node.
    #[error("GPU setup already in progress for node {node_id}")]
    AlreadyInProgress {
        /// The node id.
        node_id: String,
    },

    /// Dispatch through the command registry failed.
    #[error("command dispatch failed: {0}")]
    Dispatch(#[from] CommandError),
}

/// Errors raised by the event sink (C5).
#[derive(Debug, Error)]
pub enum EventError {
    /// The persistence backend failed on append or query.
    #[error("event backend error: {0}")]
    Backend(String),
}
