//! The background poll loop.
//!
//! The scheduler goes from idle to running at most once. While running it
//! wakes on a fixed interval and asks the sync context for a refresh; a
//! failed cycle is logged and the loop carries on with the cache untouched.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::sync::context::SyncContext;

pub struct PollScheduler {
    interval: Duration,
    started: AtomicBool,
    cycles: AtomicU64,
}

impl PollScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            started: AtomicBool::new(false),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Number of poll cycles run so far, failed ones included.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    /// Spawn the poll loop for `context` unless it has already been started.
    ///
    /// The loop runs until the context is dropped. Returns `true` only for
    /// the call that spawned it.
    pub fn start(&self, context: &Arc<SyncContext>) -> bool {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        info!(interval = ?self.interval, "starting poll scheduler");
        let weak = Arc::downgrade(context);
        let period = self.interval;
        tokio::spawn(run_loop(weak, period));
        true
    }
}

async fn run_loop(context: Weak<SyncContext>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let Some(context) = context.upgrade() else {
            debug!("sync context dropped, stopping poll scheduler");
            break;
        };

        let cycle = context.poller().cycles.fetch_add(1, Ordering::AcqRel) + 1;
        match context.refresh().await {
            Ok(Some(snapshot)) => {
                debug!(cycle, entries = snapshot.fingerprints.len(), "poll found changes")
            }
            Ok(None) => {}
            Err(e) => warn!(cycle, error = %e, "poll cycle failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ContentBackend, MemoryBackend};

    const PERIOD: Duration = Duration::from_secs(10);

    fn context(backend: &Arc<MemoryBackend>) -> Arc<SyncContext> {
        SyncContext::new(Arc::clone(backend) as Arc<dyn ContentBackend>, PERIOD)
    }

    /// Let spawned tasks run without moving the paused clock.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let backend = Arc::new(MemoryBackend::builder().file("a.txt", "a").build());
        let ctx = context(&backend);
        assert!(!ctx.poller().is_running());

        assert!(ctx.start_polling());
        assert!(!ctx.start_polling());
        assert!(!ctx.poller().start(&ctx));
        assert!(ctx.poller().is_running());

        // The first tick fires immediately, then one per period
        settle().await;
        for _ in 0..2 {
            tokio::time::sleep(PERIOD).await;
            settle().await;
        }
        let cycles = ctx.poller().cycles();
        assert!((3..=4).contains(&cycles), "unexpected cycle count {}", cycles);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_broadcasts_changes() {
        let backend = Arc::new(MemoryBackend::builder().file("a.txt", "a").build());
        let ctx = context(&backend);
        let mut subscription = ctx.subscribe().unwrap();

        ctx.start_polling();
        let first = subscription.recv().await.unwrap();
        assert!(first.contains("a.txt"));

        backend.put_file("b.txt", "b");
        let second = subscription.recv().await.unwrap();
        assert!(second.contains("b.txt"));
        assert_eq!(&*second, ctx.cached().unwrap().to_payload().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_broadcasts_external_deletion() {
        let backend = Arc::new(
            MemoryBackend::builder()
                .file("a.txt", "a")
                .file("docs/b.txt", "b")
                .build(),
        );
        let ctx = context(&backend);
        let mut subscription = ctx.subscribe().unwrap();

        ctx.start_polling();
        let first = subscription.recv().await.unwrap();
        assert!(first.contains("docs/b.txt"));

        backend.remove_file("docs/b.txt");
        let second = subscription.recv().await.unwrap();
        assert!(!second.contains("docs/b.txt"));
        assert!(second.contains("a.txt"));
        assert!(!ctx.cached().unwrap().fingerprints.contains_key("docs/b.txt"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_keeps_running() {
        let backend = Arc::new(MemoryBackend::builder().file("a.txt", "a").build());
        let ctx = context(&backend);
        let mut subscription = ctx.subscribe().unwrap();

        ctx.start_polling();
        subscription.recv().await.unwrap();
        let cached = ctx.cached().unwrap();

        backend.set_listing_fails("", true);
        backend.put_file("b.txt", "b");
        let before = ctx.poller().cycles();
        tokio::time::sleep(PERIOD).await;
        settle().await;
        assert!(ctx.poller().cycles() > before);
        assert!(Arc::ptr_eq(&cached, &ctx.cached().unwrap()));
        assert!(subscription.try_recv().is_none());

        backend.set_listing_fails("", false);
        let recovered = subscription.recv().await.unwrap();
        assert!(recovered.contains("b.txt"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_when_context_dropped() {
        let backend = Arc::new(MemoryBackend::builder().file("a.txt", "a").build());
        let ctx = context(&backend);
        ctx.start_polling();
        settle().await;

        let weak = Arc::downgrade(&ctx);
        drop(ctx);
        tokio::time::sleep(PERIOD).await;
        settle().await;
        assert!(weak.upgrade().is_none());
    }
}
