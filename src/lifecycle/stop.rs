//! Module stop coordination.
//!
//! # Responsibilities
//! - Hand every module a guard that marks its stop as finished
//! - Wait for all guards, bounded by the shutdown deadline
//!
//! # Design Decisions
//! - A guard is released exactly once: dropping it is the only way to finish,
//!   so every exit path of a module's `stop` (errors, early returns, panics,
//!   spawned cleanup tasks) counts once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::kernel::module::Module;
use crate::lifecycle::shutdown::ShutdownSignal;

#[derive(Debug, Default)]
struct GroupInner {
    pending: AtomicUsize,
    notify: Notify,
}

/// Counts outstanding module stops.
#[derive(Debug, Clone, Default)]
pub struct StopGroup {
    inner: Arc<GroupInner>,
}

impl StopGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one more pending stop.
    pub fn guard(&self) -> StopGuard {
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        StopGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Stops registered but not yet finished.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Wait until every guard has been released.
    pub async fn wait(&self) {
        loop {
            // Register interest before checking to avoid missing a wakeup.
            let notified = self.inner.notify.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Proof that a module's stop is still in progress.
///
/// Released on drop.
#[derive(Debug)]
#[must_use = "dropping the guard marks the stop as finished"]
pub struct StopGuard {
    inner: Arc<GroupInner>,
}

impl StopGuard {
    /// Mark the stop as finished.
    pub fn done(self) {}
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        if self.inner.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.notify.notify_waiters();
        }
    }
}

/// Deadline-bound cancellation handed to every module's stop.
#[derive(Debug, Clone)]
pub struct StopContext {
    deadline: Instant,
    root: ShutdownSignal,
}

impl StopContext {
    pub fn new(deadline: Instant, root: ShutdownSignal) -> Self {
        Self { deadline, root }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// True once the deadline passed or the root context was cancelled.
    pub fn is_done(&self) -> bool {
        Instant::now() >= self.deadline || self.root.is_triggered()
    }

    /// Resolves at the deadline or on root cancellation, whichever comes first.
    pub async fn done(&mut self) {
        tokio::select! {
            _ = tokio::time::sleep_until(self.deadline) => {}
            _ = self.root.recv() => {}
        }
    }
}

/// Run every module's stop and wait for all of them until the deadline.
///
/// Returns false if some module had not finished when the deadline hit.
pub async fn stop_modules(modules: &mut [Box<dyn Module>], ctx: StopContext) -> bool {
    let group = StopGroup::new();

    for module in modules.iter_mut() {
        let guard = group.guard();
        if let Err(e) = module.stop(guard, ctx.clone()) {
            tracing::warn!(module = module.name(), error = %e, "Module stop failed");
        }
    }

    match tokio::time::timeout_at(ctx.deadline(), group.wait()).await {
        Ok(()) => true,
        Err(_) => {
            tracing::warn!(
                pending = group.pending(),
                "Modules did not finish stopping before the deadline"
            );
            false
        }
    }
}
