//! [`ConfigStore`]: cache, single-holder reload critical section, and the
//! validate-archive-bump-persist update flow (spec.md §4.1, §5).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::cancel::Cancel;
use crate::error::ConfigError;

use super::backend::ConfigBackend;
use super::defaults::default_scheduling_config;
use super::{validate, SchedulingConfig};

/// Cache entries expire after this long (spec.md §4.1, §5).
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

struct CachedConfig {
    config: SchedulingConfig,
    loaded_at: Instant,
}

/// The scheduling-configuration store. Cheap to clone (everything behind `Arc`).
pub struct ConfigStore {
    backend: Option<Arc<dyn ConfigBackend>>,
    cache: ArcSwapOption<CachedConfig>,
    /// Single-holder critical section: one loader/writer at a time. Guards
    /// both cache refresh on miss and the validate→archive→persist sequence
    /// of `update_config`, so a writer's own subsequent read always observes
    /// its own write (read-your-writes, spec.md §5).
    critical_section: AsyncMutex<()>,
    /// Bumped on every successful update when running without a backend
    /// (degraded mode), since there is no persisted version to read back.
    degraded_version: AtomicU64,
}

impl ConfigStore {
    /// Construct a store backed by the given persistence collaborator.
    pub fn new(backend: Arc<dyn ConfigBackend>) -> Self {
        Self {
            backend: Some(backend),
            cache: ArcSwapOption::empty(),
            critical_section: AsyncMutex::new(()),
            degraded_version: AtomicU64::new(0),
        }
    }

    /// Construct a store with no persistence backend at all. `UpdateConfig`
    /// still validates and bumps a local version counter, but history queries
    /// always return empty and every update logs a warning (spec.md §4.1
    /// "Degraded mode").
    pub fn degraded() -> Self {
        Self {
            backend: None,
            cache: ArcSwapOption::empty(),
            critical_section: AsyncMutex::new(()),
            degraded_version: AtomicU64::new(0),
        }
    }

    fn is_fresh(cached: &CachedConfig) -> bool {
        cached.loaded_at.elapsed() < CACHE_TTL
    }

    /// Return the current configuration. Lock-free on a cache hit.
    pub async fn get_config(&self) -> Result<SchedulingConfig, ConfigError> {
        if let Some(cached) = self.cache.load_full() {
            if Self::is_fresh(&cached) {
                return Ok(cached.config.clone());
            }
        }
        self.reload_locked().await
    }

    /// Like [`Self::get_config`], but races the backend load against `cancel`
    /// at the suspension point where a cache miss would otherwise block on
    /// the critical section (spec.md §5: "every externally-invoked operation
    /// accepts a cancellation signal, honored at suspension points").
    pub async fn get_config_cancellable(&self, cancel: &Cancel) -> Result<SchedulingConfig, ConfigError> {
        if let Some(cached) = self.cache.load_full() {
            if Self::is_fresh(&cached) {
                return Ok(cached.config.clone());
            }
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled_fut() => Err(ConfigError::Cancelled),
            result = self.reload_locked() => result,
        }
    }

    /// Invalidate the cache; the next `get_config` forces a fresh load.
    pub fn reload_config(&self) {
        self.cache.store(None);
    }

    /// Return up to `limit` history rows, most-recent-first. Always empty in
    /// degraded mode.
    pub async fn get_config_history(&self, limit: usize) -> Result<Vec<SchedulingConfig>, ConfigError> {
        match &self.backend {
            Some(backend) => backend.list_history(limit).await,
            None => Ok(Vec::new()),
        }
    }

    /// Validate `candidate`, archive the current row as history, bump the
    /// version by exactly 1, persist atomically, and refresh the cache
    /// synchronously so the caller's next `get_config` observes this write.
    pub async fn update_config(&self, mut candidate: SchedulingConfig, updated_by: impl Into<String>) -> Result<SchedulingConfig, ConfigError> {
        let updated_by = updated_by.into();
        validate(&candidate)?;

        let _guard = self.critical_section.lock().await;

        let current = self.load_current_within_section().await?;
        let next_version = current.version + 1;
        let now = Utc::now();
        candidate.version = next_version;
        candidate.created_at = current.created_at;
        candidate.updated_at = now;
        candidate.updated_by = updated_by.clone();

        match &self.backend {
            Some(backend) => {
                backend.save_current(Some(current), candidate.clone()).await?;
            }
            None => {
                warn!(
                    version = next_version,
                    "updating scheduling config with no persistence backend; history will not be retained"
                );
                self.degraded_version.store(next_version, Ordering::SeqCst);
            }
        }

        self.cache.store(Some(Arc::new(CachedConfig {
            config: candidate.clone(),
            loaded_at: Instant::now(),
        })));

        info!(version = next_version, updated_by = %updated_by, "scheduling config updated");
        Ok(candidate)
    }

    /// Double-checked reload: acquire the single-holder section, re-check the
    /// cache (another caller may have already refreshed it), and only then
    /// hit the backend.
    async fn reload_locked(&self) -> Result<SchedulingConfig, ConfigError> {
        let _guard = self.critical_section.lock().await;

        if let Some(cached) = self.cache.load_full() {
            if Self::is_fresh(&cached) {
                debug!("config cache refreshed by a concurrent loader; skipping backend read");
                return Ok(cached.config.clone());
            }
        }

        let config = self.load_current_within_section().await?;
        self.cache.store(Some(Arc::new(CachedConfig {
            config: config.clone(),
            loaded_at: Instant::now(),
        })));
        Ok(config)
    }

    /// Load (or bootstrap) the current row. Must only be called while holding
    /// `critical_section`.
    async fn load_current_within_section(&self) -> Result<SchedulingConfig, ConfigError> {
        match &self.backend {
            Some(backend) => match backend.load_current().await? {
                Some(config) => Ok(config),
                None => {
                    let default = default_scheduling_config();
                    info!("no persisted scheduling config found; bootstrapping canonical default");
                    backend.save_current(None, default.clone()).await?;
                    Ok(default)
                }
            },
            None => {
                let mut default = default_scheduling_config();
                let version = self.degraded_version.load(Ordering::SeqCst);
                if version > 0 {
                    default.version = version;
                }
                Ok(default)
            }
        }
    }
}
