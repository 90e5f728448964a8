//! Boot-time admin-principal bootstrap (spec.md §9): "ensure a single admin
//! principal exists." Failures here are logged, never propagated — a missing
//! admin principal must not block the orchestrator from starting (spec.md §7).
//! No user/auth model is introduced; this is deliberately one function.

use tracing::{info, warn};

/// Collaborator contract for the admin-principal store.
#[async_trait::async_trait]
pub trait AdminPrincipalStore: Send + Sync {
    /// Whether an admin principal is already provisioned.
    async fn has_admin_principal(&self) -> bool;

    /// Provision the default admin principal.
    async fn create_default_admin_principal(&self) -> Result<(), String>;
}

/// Ensure a single admin principal exists, provisioning one if absent.
/// Boot-time failures are logged and swallowed, matching the "never block
/// startup" rule for this collaborator.
pub async fn ensure_admin_principal(store: &dyn AdminPrincipalStore) {
    if store.has_admin_principal().await {
        return;
    }
    match store.create_default_admin_principal().await {
        Ok(()) => info!("default admin principal provisioned"),
        Err(err) => warn!(error = %err, "failed to provision default admin principal; continuing startup"),
    }
}
