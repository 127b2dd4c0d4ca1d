//! Fan-out of snapshots to live subscribers.
//!
//! The broadcaster remembers the last payload it sent and skips a broadcast
//! whose serialized form is identical. A subscriber whose channel refuses a
//! write is dropped during that same broadcast; there is no separate liveness
//! check. Channels are bounded, so a subscriber that stops reading and lets
//! its buffer fill counts as a refused write.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::debug;

use crate::sync::error::Result;
use crate::sync::node::Snapshot;

/// A serialized snapshot as delivered to subscribers.
pub type Payload = Arc<str>;

/// Identifies a registered subscriber.
pub type SubscriberId = u64;

/// Payloads a subscriber may have queued before it is treated as failed.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// What a call to [`Broadcaster::broadcast`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// The payload matched the last one sent; nothing was written.
    Duplicate,
    /// The payload was written to `delivered` subscribers and `pruned` failed
    /// subscribers were removed.
    Sent { delivered: usize, pruned: usize },
}

struct State {
    subscribers: BTreeMap<SubscriberId, Sender<Payload>>,
    next_id: SubscriberId,
    last_payload: Option<Payload>,
}

/// Holds the set of subscribers and the last payload broadcast to them.
#[derive(Clone)]
pub struct Broadcaster {
    state: Arc<Mutex<State>>,
    buffer: usize,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_SUBSCRIBER_BUFFER)
    }

    /// Create a broadcaster whose subscriber channels hold `buffer` payloads.
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                subscribers: BTreeMap::new(),
                next_id: 0,
                last_payload: None,
            })),
            buffer: buffer.max(1),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a subscriber channel.
    ///
    /// If `current` is given it is written to the new subscriber straight away,
    /// so it does not have to wait for the next change.
    pub fn register(
        &self,
        sender: Sender<Payload>,
        current: Option<&Snapshot>,
    ) -> Result<SubscriberId> {
        let initial: Option<Payload> = match current {
            Some(snapshot) => Some(snapshot.to_payload()?.into()),
            None => None,
        };

        let mut state = self.lock_state();
        let id = state.next_id;
        state.next_id += 1;

        if let Some(payload) = initial {
            if sender.try_send(payload).is_err() {
                debug!(subscriber = id, "subscriber closed before registration");
                return Ok(id);
            }
        }

        state.subscribers.insert(id, sender);
        debug!(
            subscriber = id,
            subscribers = state.subscribers.len(),
            "subscriber registered"
        );
        Ok(id)
    }

    /// Create a channel, register it, and hand back the receiving end.
    pub fn subscribe(&self, current: Option<&Snapshot>) -> Result<Subscription> {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = self.register(sender, current)?;
        Ok(Subscription {
            id,
            receiver,
            broadcaster: self.clone(),
        })
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let removed = self.lock_state().subscribers.remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "subscriber unregistered");
        }
        removed
    }

    /// Send a snapshot to every subscriber unless it is the same as the last
    /// one sent.
    pub fn broadcast(&self, snapshot: &Snapshot) -> Result<BroadcastOutcome> {
        let payload: Payload = snapshot.to_payload()?.into();

        let mut state = self.lock_state();
        if state.last_payload.as_deref() == Some(&*payload) {
            return Ok(BroadcastOutcome::Duplicate);
        }

        let mut failed = Vec::new();
        for (id, sender) in &state.subscribers {
            if let Err(e) = sender.try_send(Arc::clone(&payload)) {
                let reason = match e {
                    TrySendError::Full(_) => "full",
                    TrySendError::Closed(_) => "closed",
                };
                failed.push((*id, reason));
            }
        }
        for (id, reason) in &failed {
            state.subscribers.remove(id);
            debug!(subscriber = id, reason, "pruned subscriber");
        }
        state.last_payload = Some(payload);

        Ok(BroadcastOutcome::Sent {
            delivered: state.subscribers.len(),
            pruned: failed.len(),
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_state().subscribers.len()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// The receiving end of a registered subscriber.
///
/// Dropping it unregisters the subscriber.
pub struct Subscription {
    id: SubscriberId,
    receiver: Receiver<Payload>,
    broadcaster: Broadcaster,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next payload. Returns `None` once the subscriber has been
    /// removed and everything already sent has been received.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.receiver.recv().await
    }

    /// Take the next payload if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Payload> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::node::tests::{dir, file};

    fn snapshot(content: &str) -> Snapshot {
        Snapshot::new(dir("", None, vec![file("a.txt", content, content)]))
    }

    fn drain(subscription: &mut Subscription) -> Vec<Payload> {
        std::iter::from_fn(|| subscription.try_recv()).collect()
    }

    #[test]
    fn test_broadcast_reaches_all_subscribers() {
        let broadcaster = Broadcaster::new();
        let mut first = broadcaster.subscribe(None).unwrap();
        let mut second = broadcaster.subscribe(None).unwrap();

        let outcome = broadcaster.broadcast(&snapshot("v1")).unwrap();
        assert_eq!(outcome, BroadcastOutcome::Sent { delivered: 2, pruned: 0 });

        let expected = snapshot("v1").to_payload().unwrap();
        assert_eq!(drain(&mut first), vec![Payload::from(expected.as_str())]);
        assert_eq!(drain(&mut second), vec![Payload::from(expected.as_str())]);
    }

    #[test]
    fn test_duplicate_broadcast_is_suppressed() {
        let broadcaster = Broadcaster::new();
        let mut subscription = broadcaster.subscribe(None).unwrap();

        broadcaster.broadcast(&snapshot("v1")).unwrap();
        // A distinct but equal snapshot is still a duplicate
        let outcome = broadcaster.broadcast(&snapshot("v1")).unwrap();
        assert_eq!(outcome, BroadcastOutcome::Duplicate);
        assert_eq!(drain(&mut subscription).len(), 1);

        broadcaster.broadcast(&snapshot("v2")).unwrap();
        assert_eq!(drain(&mut subscription).len(), 1);
    }

    #[test]
    fn test_failed_subscriber_is_pruned() {
        let broadcaster = Broadcaster::new();
        let mut live = broadcaster.subscribe(None).unwrap();

        let (sender, receiver) = mpsc::channel(1);
        broadcaster.register(sender, None).unwrap();
        drop(receiver);
        assert_eq!(broadcaster.subscriber_count(), 2);

        let outcome = broadcaster.broadcast(&snapshot("v1")).unwrap();
        assert_eq!(outcome, BroadcastOutcome::Sent { delivered: 1, pruned: 1 });
        assert_eq!(broadcaster.subscriber_count(), 1);
        assert_eq!(drain(&mut live).len(), 1);
    }

    #[test]
    fn test_register_delivers_current_snapshot() {
        let broadcaster = Broadcaster::new();
        let current = snapshot("v1");

        let mut subscription = broadcaster.subscribe(Some(&current)).unwrap();
        let received = drain(&mut subscription);
        assert_eq!(received.len(), 1);
        assert_eq!(&*received[0], current.to_payload().unwrap());

        let mut empty = broadcaster.subscribe(None).unwrap();
        assert!(drain(&mut empty).is_empty());
    }

    #[test]
    fn test_dropping_subscription_unregisters() {
        let broadcaster = Broadcaster::new();
        let subscription = broadcaster.subscribe(None).unwrap();
        let id = subscription.id();
        assert_eq!(broadcaster.subscriber_count(), 1);

        drop(subscription);
        assert_eq!(broadcaster.subscriber_count(), 0);
        assert!(!broadcaster.unregister(id));
    }

    #[test]
    fn test_stalled_subscriber_is_pruned() {
        let broadcaster = Broadcaster::with_buffer(2);
        let mut reading = broadcaster.subscribe(None).unwrap();
        let mut stalled = broadcaster.subscribe(None).unwrap();

        for version in ["v1", "v2"] {
            let outcome = broadcaster.broadcast(&snapshot(version)).unwrap();
            assert_eq!(outcome, BroadcastOutcome::Sent { delivered: 2, pruned: 0 });
            assert_eq!(drain(&mut reading).len(), 1);
        }

        // The stalled subscriber's buffer is full, so the third write fails
        let outcome = broadcaster.broadcast(&snapshot("v3")).unwrap();
        assert_eq!(outcome, BroadcastOutcome::Sent { delivered: 1, pruned: 1 });
        assert_eq!(broadcaster.subscriber_count(), 1);
        assert_eq!(drain(&mut reading).len(), 1);

        // What was already queued is still readable, then the channel ends
        assert_eq!(drain(&mut stalled).len(), 2);
        assert!(matches!(
            stalled.receiver.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_recv_waits_for_broadcast() {
        let broadcaster = Broadcaster::new();
        let mut subscription = broadcaster.subscribe(None).unwrap();

        let sender = broadcaster.clone();
        let handle = tokio::spawn(async move { sender.broadcast(&snapshot("v1")).unwrap() });

        let payload = subscription.recv().await.unwrap();
        assert!(payload.contains("a.txt"));
        handle.await.unwrap();
    }
}
