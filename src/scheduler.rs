//! Check scheduling boundary
//!
//! Monitors never run their diff pass inside an annotation-change
//! notification; they hand a check callback to a scheduler supplied by the
//! host at composition time. The inline scheduler runs checks immediately for
//! hosts that serialize lifecycle events on one thread; the deferred
//! scheduler debounces bursts of annotation churn on a Tokio runtime.

use std::time::Duration;

use tracing::{debug, error};

use crate::config::ManagerConfig;

/// A check callback handed off by a monitor.
pub type Check = Box<dyn FnOnce() + Send>;

/// Host service that runs monitor checks safely outside the notification
/// stack.
pub trait CheckScheduler: Send + Sync {
    fn schedule(&self, check: Check);
}

/// Runs checks immediately on the calling thread.
#[derive(Debug, Default)]
pub struct InlineScheduler;

impl CheckScheduler for InlineScheduler {
    fn schedule(&self, check: Check) {
        check();
    }
}

/// Runs checks on a Tokio runtime after a debounce delay.
///
/// The runtime handle is captured at construction, so the scheduler can be
/// called from threads that are not themselves inside the runtime.
#[derive(Debug, Clone)]
pub struct DeferredScheduler {
    handle: tokio::runtime::Handle,
    delay: Duration,
}

impl DeferredScheduler {
    /// Captures the current runtime handle. Must be called within a Tokio
    /// runtime context.
    pub fn new(delay: Duration) -> anyhow::Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| anyhow::anyhow!("DeferredScheduler requires a Tokio runtime: {}", e))?;
        debug!("Deferred check scheduler created (delay={:?})", delay);
        Ok(DeferredScheduler { handle, delay })
    }

    pub fn from_config(config: &ManagerConfig) -> anyhow::Result<Self> {
        Self::new(config.check_delay())
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl CheckScheduler for DeferredScheduler {
    fn schedule(&self, check: Check) {
        let delay = self.delay;
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            // Contain a panicking check so it cannot poison the runtime task
            // it shares with later checks.
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(check)).is_err() {
                error!("Scheduled monitor check panicked");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_inline_scheduler_runs_immediately() {
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_in_check = Arc::clone(&ran);

        InlineScheduler.schedule(Box::new(move || {
            ran_in_check.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deferred_scheduler_requires_runtime() {
        let result = DeferredScheduler::new(Duration::from_millis(10));
        assert!(result.is_err(), "No runtime on plain test threads");
    }

    #[tokio::test]
    async fn test_deferred_scheduler_runs_after_delay() {
        let scheduler = DeferredScheduler::new(Duration::from_millis(5)).unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();

        scheduler.schedule(Box::new(move || {
            let _ = tx.send(());
        }));

        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("Check should run within the timeout")
            .expect("Check should send");
    }

    #[tokio::test]
    async fn test_deferred_scheduler_contains_panicking_check() {
        let scheduler = DeferredScheduler::new(Duration::from_millis(1)).unwrap();
        scheduler.schedule(Box::new(|| panic!("misbehaving check")));

        // A panicking check must not take the runtime down with it.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (tx, rx) = tokio::sync::oneshot::channel();
        scheduler.schedule(Box::new(move || {
            let _ = tx.send(());
        }));
        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("Later checks still run")
            .expect("Check should send");
    }
}
