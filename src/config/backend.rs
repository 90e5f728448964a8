//! Persistence collaborator contract for the config store, plus an
//! in-memory implementation used by tests and by [`super::ConfigStore`]'s
//! degraded mode.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::ConfigError;

use super::SchedulingConfig;

/// Persistence collaborator for [`super::ConfigStore`]. A real implementation
/// would back this with a single-row table plus an append-only history table;
/// this crate ships only the in-memory implementation below, matching spec.md
/// §1's "no persistence engine internals" non-goal.
#[async_trait]
pub trait ConfigBackend: Send + Sync {
    /// Load the current live row, if one has ever been written.
    async fn load_current(&self) -> Result<Option<SchedulingConfig>, ConfigError>;

    /// Atomically replace the live row and archive the previous one as history.
    async fn save_current(&self, previous: Option<SchedulingConfig>, next: SchedulingConfig) -> Result<(), ConfigError>;

    /// Return up to `limit` history rows, most-recent-first.
    async fn list_history(&self, limit: usize) -> Result<Vec<SchedulingConfig>, ConfigError>;
}

/// In-memory [`ConfigBackend`]. Also used to assert single-load-per-cold-cache
/// behavior in tests via [`InMemoryConfigBackend::load_count`].
#[derive(Default)]
pub struct InMemoryConfigBackend {
    current: Mutex<Option<SchedulingConfig>>,
    history: Mutex<Vec<SchedulingConfig>>,
    loads: AtomicUsize,
}

impl InMemoryConfigBackend {
    /// Construct an empty backend (no live row yet — bootstrap will run).
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of times [`ConfigBackend::load_current`] has been called.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigBackend for InMemoryConfigBackend {
    async fn load_current(&self) -> Result<Option<SchedulingConfig>, ConfigError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.current.lock().clone())
    }

    async fn save_current(&self, previous: Option<SchedulingConfig>, next: SchedulingConfig) -> Result<(), ConfigError> {
        if let Some(prev) = previous {
            self.history.lock().push(prev);
        }
        *self.current.lock() = Some(next);
        Ok(())
    }

    async fn list_history(&self, limit: usize) -> Result<Vec<SchedulingConfig>, ConfigError> {
        let history = self.history.lock();
        Ok(history.iter().rev().take(limit).cloned().collect())
    }
}
