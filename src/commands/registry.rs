//! [`CommandRegistry`]: outstanding-command bookkeeping, delivery, and
//! per-node-ordered acknowledgment routing (spec.md §4.3, §5).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::cancel::Cancel;
use crate::error::CommandError;

use super::transport::CommandTransport;
use super::{CommandAcknowledgment, CommandType, DeliveryResult, NodeCommand, OutstandingCommand};

/// Handles a retired command's acknowledgment for one [`CommandType`] (e.g.
/// the GPU-setup controller handles `ConfigureGpu`).
#[async_trait]
pub trait AckHandler: Send + Sync {
    /// Apply `ack` for `node_id`/`target_resource_id`.
    async fn handle_acknowledgment(&self, node_id: &str, target_resource_id: &str, ack: CommandAcknowledgment);
}

/// Outstanding-command registry and node-agent dispatcher.
pub struct CommandRegistry {
    outstanding: DashMap<String, OutstandingCommand>,
    handlers: DashMap<CommandType, Arc<dyn AckHandler>>,
    /// Per-node serialization for ack processing (spec.md §5: "acknowledgments
    /// for a given node must be processed in arrival order").
    node_locks: DashMap<String, Arc<AsyncMutex<()>>>,
    transport: Arc<dyn CommandTransport>,
    /// Per-command-type reap timeout (spec.md §4.3 recommends 30 minutes for
    /// `ConfigureGpu`, shorter for lighter commands).
    timeouts: DashMap<CommandType, Duration>,
}

impl CommandRegistry {
    /// Construct a registry over the given delivery transport, with
    /// `ConfigureGpu`'s recommended 30-minute reap timeout preconfigured.
    pub fn new(transport: Arc<dyn CommandTransport>) -> Self {
        let timeouts = DashMap::new();
        timeouts.insert(CommandType::ConfigureGpu, Duration::from_secs(30 * 60));
        Self {
            outstanding: DashMap::new(),
            handlers: DashMap::new(),
            node_locks: DashMap::new(),
            transport,
            timeouts,
        }
    }

    /// Register the ack handler for a command type.
    pub fn register_handler(&self, command_type: CommandType, handler: Arc<dyn AckHandler>) {
        self.handlers.insert(command_type, handler);
    }

    /// Override the reap timeout for a command type.
    pub fn set_timeout(&self, command_type: CommandType, timeout: Duration) {
        self.timeouts.insert(command_type, timeout);
    }

    /// Record an outstanding entry. Must be called before [`Self::deliver_command`]
    /// so an ack can never arrive with no registration (spec.md §4.3).
    pub fn register_command(&self, command_id: impl Into<String>, node_id: impl Into<String>, target_resource_id: impl Into<String>, command_type: CommandType) {
        let command_id = command_id.into();
        let entry = OutstandingCommand {
            node_id: node_id.into(),
            target_resource_id: target_resource_id.into(),
            command_type,
            issued_at: Utc::now(),
        };
        info!(command_id = %command_id, node_id = %entry.node_id, ?command_type, "registered outstanding command");
        self.outstanding.insert(command_id, entry);
    }

    /// Attempt to hand `command` to the addressed node agent.
    pub async fn deliver_command(&self, node_id: &str, command: &NodeCommand) -> DeliveryResult {
        let result = self.transport.deliver(node_id, command).await;
        if !result.success {
            warn!(node_id, command_id = %command.command_id, message = %result.message, "command delivery failed");
        }
        result
    }

    /// Like [`Self::deliver_command`], but races delivery against `cancel`.
    /// Per spec.md §5: cancellation between registration and delivery must
    /// not orphan the outstanding entry — it is reaped by [`Self::reap_timeouts`]
    /// like any other undelivered/unacknowledged command.
    pub async fn deliver_command_cancellable(&self, node_id: &str, command: &NodeCommand, cancel: &Cancel) -> Result<DeliveryResult, CommandError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled_fut() => Err(CommandError::Cancelled),
            result = self.deliver_command(node_id, command) => Ok(result),
        }
    }

    /// Whether a command id is currently outstanding.
    pub fn is_outstanding(&self, command_id: &str) -> bool {
        self.outstanding.contains_key(command_id)
    }

    fn node_lock(&self, node_id: &str) -> Arc<AsyncMutex<()>> {
        Arc::clone(self.node_locks.entry(node_id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).value())
    }

    /// Look up the outstanding entry for `ack.command_id`; if present,
    /// dispatch to the handler registered for its type and retire the entry.
    /// If absent, log and drop — idempotent to double-delivery (spec.md §4.3,
    /// §7, property 5).
    pub async fn process_acknowledgment(&self, ack: CommandAcknowledgment) -> Result<(), CommandError> {
        let Some((_, entry)) = self.outstanding.remove(&ack.command_id) else {
            warn!(command_id = %ack.command_id, "acknowledgment for unknown or already-retired command; dropping");
            return Ok(());
        };

        let lock = self.node_lock(&entry.node_id);
        let _guard = lock.lock().await;

        let handler = self
            .handlers
            .get(&entry.command_type)
            .map(|h| Arc::clone(h.value()))
            .ok_or(CommandError::NoHandler(entry.command_type))?;

        handler.handle_acknowledgment(&entry.node_id, &entry.target_resource_id, ack).await;
        Ok(())
    }

    /// Reap outstanding entries older than their command type's timeout,
    /// synthesizing a `Success=false, ErrorMessage="timeout"` acknowledgment
    /// for each so the owning state machine advances (spec.md §4.3, §5).
    pub async fn reap_timeouts(&self) {
        let now = Utc::now();
        let stale: Vec<String> = self
            .outstanding
            .iter()
            .filter(|entry| {
                let timeout = self.timeouts.get(&entry.command_type).map(|t| *t.value()).unwrap_or(Duration::from_secs(30 * 60));
                let age = now.signed_duration_since(entry.issued_at);
                age.to_std().map(|age| age >= timeout).unwrap_or(false)
            })
            .map(|entry| entry.key().clone())
            .collect();

        for command_id in stale {
            warn!(command_id = %command_id, "reaping timed-out outstanding command");
            let _ = self
                .process_acknowledgment(CommandAcknowledgment {
                    command_id,
                    success: false,
                    error_message: Some("timeout".to_string()),
                    data: None,
                })
                .await;
        }
    }
}
