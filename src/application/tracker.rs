use std::sync::Arc;

use metrics::gauge;
use tokio::sync::watch;

/// Process-wide counter of outstanding background work.
///
/// Every unit (a spawned task or a queued mail) calls [`register`] before it
/// starts and holds the returned [`WorkGuard`] for as long as it runs. The
/// guard releases the unit on drop, so early returns, errors and panics all
/// deregister exactly once.
///
/// The count lives in a `watch` channel: updates are serialized by the
/// channel and waiters are woken on every change.
///
/// [`register`]: CompletionTracker::register
#[derive(Clone, Debug)]
pub struct CompletionTracker {
    count: Arc<watch::Sender<usize>>,
}

impl Default for CompletionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            count: Arc::new(tx),
        }
    }

    /// Record one unit of work. Must be called before the unit starts.
    #[must_use = "dropping the guard immediately deregisters the unit"]
    pub fn register(&self) -> WorkGuard {
        self.count.send_modify(|count| {
            *count += 1;
            report_outstanding(*count);
        });
        WorkGuard {
            count: Arc::clone(&self.count),
        }
    }

    /// Number of units currently registered.
    pub fn outstanding(&self) -> usize {
        *self.count.borrow()
    }

    /// Resolve once the counter reaches zero. Returns immediately when
    /// nothing is outstanding.
    pub async fn wait_idle(&self) {
        let mut rx = self.count.subscribe();
        // The sender is owned by `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

/// Scoped registration with a [`CompletionTracker`].
#[derive(Debug)]
pub struct WorkGuard {
    count: Arc<watch::Sender<usize>>,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        // Gauge is written under the channel lock so it cannot lag the count.
        self.count.send_modify(|count| {
            *count = count.saturating_sub(1);
            report_outstanding(*count);
        });
    }
}

fn report_outstanding(count: usize) {
    gauge!("plandesk_pipeline_outstanding").set(count as f64);
}
