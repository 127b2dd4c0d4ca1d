use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, info};

use crate::backend::ContentBackend;
use crate::sync::assembler::SnapshotAssembler;
use crate::sync::broadcaster::{BroadcastOutcome, Broadcaster, Subscription};
use crate::sync::error::Result;
use crate::sync::fingerprint::changed;
use crate::sync::node::Snapshot;
use crate::sync::poller::PollScheduler;

/// The process-wide synchronization state: the cached snapshot, the
/// subscriber set and the poller's started flag.
///
/// Everything that reads or replaces the cache goes through this type. The
/// poller and the mutation coordinator both hold it by `Arc`.
pub struct SyncContext {
    assembler: SnapshotAssembler,
    cache: RwLock<Option<Arc<Snapshot>>>,
    broadcaster: Broadcaster,
    poller: PollScheduler,
}

impl SyncContext {
    pub fn new(backend: Arc<dyn ContentBackend>, poll_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            assembler: SnapshotAssembler::new(backend),
            cache: RwLock::new(None),
            broadcaster: Broadcaster::new(),
            poller: PollScheduler::new(poll_interval),
        })
    }

    pub fn assembler(&self) -> &SnapshotAssembler {
        &self.assembler
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn poller(&self) -> &PollScheduler {
        &self.poller
    }

    /// The last snapshot that was cached, if any.
    pub fn cached(&self) -> Option<Arc<Snapshot>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Register a new subscriber. It receives the cached snapshot, if there is
    /// one, before anything else.
    pub fn subscribe(&self) -> Result<Subscription> {
        // Hold the cache while registering so a concurrent replacement cannot
        // slip between reading the cache and joining the subscriber set.
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        self.broadcaster.subscribe(cache.as_deref())
    }

    /// Start the poll scheduler if it is not already running.
    ///
    /// Returns `true` only for the call that actually started it.
    pub fn start_polling(self: &Arc<Self>) -> bool {
        self.poller.start(self)
    }

    /// Offer a freshly assembled snapshot to change detection.
    ///
    /// If its fingerprints differ from the cached snapshot's, it replaces the
    /// cache and is broadcast. Returns whether it did.
    ///
    /// Only fingerprints are compared. A file whose content fetch failed keeps
    /// `content: null` in the cache, and is handed to new subscribers that way,
    /// until its version token changes or a mutation forces a republish.
    pub fn observe(&self, snapshot: Arc<Snapshot>) -> Result<bool> {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let previous = cache.as_ref().map(|cached| &cached.fingerprints);
        if !changed(previous, &snapshot.fingerprints) {
            return Ok(false);
        }

        debug!(entries = snapshot.fingerprints.len(), "snapshot changed");
        *cache = Some(Arc::clone(&snapshot));
        self.broadcaster.broadcast(&snapshot)?;
        Ok(true)
    }

    /// Replace the cache and broadcast without consulting the differ.
    pub fn publish(&self, snapshot: Arc<Snapshot>) -> Result<BroadcastOutcome> {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        *cache = Some(Arc::clone(&snapshot));
        self.broadcaster.broadcast(&snapshot)
    }

    /// One poll cycle: assemble, and cache and broadcast only if changed.
    ///
    /// Returns the new snapshot when it was a change.
    pub async fn refresh(&self) -> Result<Option<Arc<Snapshot>>> {
        let snapshot = Arc::new(self.assembler.assemble().await?);
        if self.observe(Arc::clone(&snapshot))? {
            Ok(Some(snapshot))
        } else {
            Ok(None)
        }
    }

    /// Assemble, cache and broadcast unconditionally. Used after mutations,
    /// which are known to have changed the remote tree.
    pub async fn force_refresh(&self) -> Result<Arc<Snapshot>> {
        let snapshot = Arc::new(self.assembler.assemble().await?);
        let outcome = self.publish(Arc::clone(&snapshot))?;
        info!(entries = snapshot.fingerprints.len(), ?outcome, "published snapshot");
        Ok(snapshot)
    }

    /// Assemble a fresh snapshot for a direct read.
    ///
    /// The result is also passed through change detection, so the cache never
    /// lags behind what a reader has already been shown.
    pub async fn read_snapshot(&self) -> Result<Arc<Snapshot>> {
        let snapshot = Arc::new(self.assembler.assemble().await?);
        self.observe(Arc::clone(&snapshot))?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::sync::node::Node;

    fn context(backend: &Arc<MemoryBackend>) -> Arc<SyncContext> {
        SyncContext::new(
            Arc::clone(backend) as Arc<dyn ContentBackend>,
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_refresh_reports_changes_only() {
        let backend = Arc::new(MemoryBackend::builder().file("a.txt", "a").build());
        let ctx = context(&backend);
        assert!(ctx.cached().is_none());

        let first = ctx.refresh().await.unwrap();
        assert!(first.is_some());
        assert!(ctx.cached().is_some());

        assert!(ctx.refresh().await.unwrap().is_none());

        backend.put_file("a.txt", "b");
        let changed = ctx.refresh().await.unwrap().unwrap();
        assert_eq!(ctx.cached().unwrap().fingerprints, changed.fingerprints);
    }

    #[tokio::test]
    async fn test_subscriber_gets_cached_then_changes() {
        let backend = Arc::new(MemoryBackend::builder().file("a.txt", "a").build());
        let ctx = context(&backend);

        let mut early = ctx.subscribe().unwrap();
        assert!(early.try_recv().is_none());

        ctx.refresh().await.unwrap();
        assert!(early.try_recv().is_some());

        let mut late = ctx.subscribe().unwrap();
        let initial = late.try_recv().unwrap();
        assert_eq!(&*initial, ctx.cached().unwrap().to_payload().unwrap());

        // Unchanged refresh pushes nothing
        ctx.refresh().await.unwrap();
        assert!(early.try_recv().is_none());
        assert!(late.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_read_snapshot_updates_cache() {
        let backend = Arc::new(MemoryBackend::builder().file("a.txt", "a").build());
        let ctx = context(&backend);
        let mut subscription = ctx.subscribe().unwrap();

        let snapshot = ctx.read_snapshot().await.unwrap();
        assert_eq!(ctx.cached().unwrap().fingerprints, snapshot.fingerprints);
        assert!(subscription.try_recv().is_some());

        // A poll after the read sees nothing new
        assert!(ctx.refresh().await.unwrap().is_none());
        assert!(subscription.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_cache() {
        let backend = Arc::new(MemoryBackend::builder().file("a.txt", "a").build());
        let ctx = context(&backend);
        ctx.refresh().await.unwrap();
        let before = ctx.cached().unwrap();

        backend.set_listing_fails("", true);
        assert!(ctx.refresh().await.is_err());
        assert!(Arc::ptr_eq(&before, &ctx.cached().unwrap()));
    }

    #[tokio::test]
    async fn test_recovered_content_alone_is_not_a_change() {
        let backend = Arc::new(MemoryBackend::builder().file("a.txt", "a").build());
        let ctx = context(&backend);

        backend.set_content_fails("a.txt", true);
        ctx.refresh().await.unwrap();
        let cached = ctx.cached().unwrap();
        let Some(Node::File(file)) = cached.tree.find("a.txt") else {
            panic!("expected a.txt");
        };
        assert!(file.content.is_none());

        // Same token, so the fetched content does not replace the cache
        backend.set_content_fails("a.txt", false);
        assert!(ctx.refresh().await.unwrap().is_none());
        assert!(Arc::ptr_eq(&cached, &ctx.cached().unwrap()));

        let forced = ctx.force_refresh().await.unwrap();
        let Some(Node::File(file)) = forced.tree.find("a.txt") else {
            panic!("expected a.txt");
        };
        assert_eq!(file.content, Some(serde_json::Value::String("a".to_string())));
    }

    #[tokio::test]
    async fn test_force_refresh_replaces_cache() {
        let backend = Arc::new(MemoryBackend::builder().file("a.txt", "a").build());
        let ctx = context(&backend);
        ctx.refresh().await.unwrap();
        let before = ctx.cached().unwrap();

        let forced = ctx.force_refresh().await.unwrap();
        assert!(Arc::ptr_eq(&forced, &ctx.cached().unwrap()));
        assert!(!Arc::ptr_eq(&before, &forced));
        assert_eq!(before.fingerprints, forced.fingerprints);
    }
}
