//! Event Sink (C5, spec.md §4.5): an append-only log of structured events.
//!
//! Knows nothing about the semantics of the callers that append to it — it
//! assigns an id and timestamp to anything missing one, persists, and serves
//! most-recent-first queries. Grounded on the teacher's `monitoring.rs`
//! (`Arc<DashMap<String, PerformanceAlert>>` plus `Arc<RwLock<...Metrics>>`)
//! concurrent-store shape.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::EventError;

/// The event's semantic kind. Per spec.md §9's open design note, the GPU-setup
/// controller historically reused `NodeRegistered`/`VmError` for lack of
/// dedicated node-event kinds; `NodeError`/`NodeCapabilityChanged` are the
/// clean kinds a rewrite should introduce. Both sets are modeled so consumers
/// can migrate (see [`EventCompatibilityMode`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Legacy: reused both for actual node registration and, historically,
    /// for GPU-setup completion (a capability change).
    NodeRegistered,
    /// Legacy: reused for GPU-setup failures; no dedicated node-error kind.
    VmError,
    /// Native: a node-level error (introduced per §9's redesign note).
    NodeError,
    /// Native: a node's capability set changed (introduced per §9's redesign note).
    NodeCapabilityChanged,
}

/// Which event-kind vocabulary the GPU-setup controller emits under.
/// Resolves the §9 open question explicitly: `Legacy` reproduces the
/// documented current behavior so existing consumers keyed on
/// `NodeRegistered`/`VmError` keep working; `Native` emits the recommended
/// kinds. Default is `Legacy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventCompatibilityMode {
    /// Emit `NodeRegistered` for completions and `VmError` for failures.
    #[default]
    Legacy,
    /// Emit `NodeCapabilityChanged` for completions and `NodeError` for failures.
    Native,
}

/// A structured, append-only orchestrator event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorEvent {
    /// Event id, assigned by the sink if absent.
    pub id: String,
    /// Event timestamp, assigned by the sink if absent.
    pub timestamp: DateTime<Utc>,
    /// The event's semantic kind.
    pub event_type: EventType,
    /// The kind of resource this event describes (e.g. "node", "vm").
    pub resource_type: String,
    /// The resource's id.
    pub resource_id: String,
    /// The node this event is associated with, if any.
    pub node_id: Option<String>,
    /// String-keyed heterogeneous payload.
    pub payload: Map<String, Value>,
}

impl OrchestratorEvent {
    /// Construct an event without an id/timestamp; [`EventSink::append`] fills
    /// them in.
    pub fn new(event_type: EventType, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            timestamp: Utc::now(),
            event_type,
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            node_id: None,
            payload: Map::new(),
        }
    }

    /// Attach the originating node id.
    #[must_use]
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Attach a payload key.
    #[must_use]
    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

/// Persistence collaborator for [`EventSink`].
#[async_trait]
pub trait EventBackend: Send + Sync {
    /// Append an already-stamped event.
    async fn append(&self, event: OrchestratorEvent) -> Result<(), EventError>;

    /// Return up to `limit` events, most-recent-first, optionally filtered by type.
    async fn query(&self, limit: usize, event_type: Option<EventType>) -> Result<Vec<OrchestratorEvent>, EventError>;
}

#[derive(Default)]
struct InMemoryEventBackend {
    events: RwLock<Vec<OrchestratorEvent>>,
}

#[async_trait]
impl EventBackend for InMemoryEventBackend {
    async fn append(&self, event: OrchestratorEvent) -> Result<(), EventError> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn query(&self, limit: usize, event_type: Option<EventType>) -> Result<Vec<OrchestratorEvent>, EventError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .rev()
            .filter(|event| event_type.map(|t| t == event.event_type).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Append-only event log, consumed by auditing/UI (spec.md §4.5).
pub struct EventSink {
    backend: Arc<dyn EventBackend>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self {
            backend: Arc::new(InMemoryEventBackend::default()),
        }
    }
}

impl EventSink {
    /// Construct a sink over a custom persistence backend.
    pub fn with_backend(backend: Arc<dyn EventBackend>) -> Self {
        Self { backend }
    }

    /// Assign an id/timestamp to `event` if missing, then persist it.
    pub async fn append(&self, mut event: OrchestratorEvent) -> Result<(), EventError> {
        if event.id.is_empty() {
            event.id = Uuid::new_v4().to_string();
        }
        self.backend.append(event).await
    }

    /// Return the `limit` most recent events, most-recent-first, optionally
    /// filtered by type.
    pub async fn query(&self, limit: usize, event_type: Option<EventType>) -> Result<Vec<OrchestratorEvent>, EventError> {
        self.backend.query(limit, event_type).await
    }
}
