//! Cooperative cancellation (spec.md §5: "every externally-invoked operation
//! accepts a cancellation signal, honored at suspension points"). Built on
//! `tokio::sync::Notify` rather than a dedicated cancellation-token crate,
//! since the teacher stack already depends on `tokio` and nothing else in
//! the corpus pulls in `tokio-util`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// A cooperative cancellation signal. Cloning shares the same underlying
/// state; any clone can cancel, and every clone observes the cancellation.
#[derive(Clone, Default)]
pub struct Cancel {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Cancel {
    /// Construct a fresh, not-yet-cancelled signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; wakes any task currently suspended in
    /// [`Self::cancelled_fut`].
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether cancellation has already been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation is requested; suitable as the second branch
    /// of a `tokio::select!` at a suspension point.
    pub async fn cancelled_fut(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}
