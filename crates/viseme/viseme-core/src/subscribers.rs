// SubscriberRegistry: fan-out of drained phonemes to whoever renders them
//
// The drain loop owns the segment and runs on its own thread. Everything
// downstream of it (a face renderer, a logger, a test) registers a callback
// here and gets every valid phoneme in slot order.
//
// Callbacks run on the drain thread. `publish` clones the current list of
// callbacks out of the lock before calling them, so a callback may subscribe
// or unsubscribe (itself included) without deadlocking, and a slow callback
// never blocks `subscribe` from another thread. The change takes effect from
// the next event.

use phonos_events::PhonemeEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use tracing::debug;

/// Handle returned by `subscribe`; ids start at 1 and are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

type Callback = Arc<dyn Fn(&PhonemeEvent) + Send + Sync>;

pub struct SubscriberRegistry {
    subscribers: Mutex<Vec<(SubscriptionId, Callback)>>,
    next_id: AtomicU64,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&PhonemeEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(callback)));
        debug!(id = id.0, "phoneme subscriber added");
        id
    }

    /// Subscribes a channel. Events are dropped silently once the receiver
    /// is gone; unsubscribe with the returned id to stop sending.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::Receiver<PhonemeEvent>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let id = self.subscribe(move |ev| {
            if let Ok(tx) = tx.lock() {
                let _ = tx.send(*ev);
            }
        });
        (id, rx)
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.lock();
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        let removed = subs.len() != before;
        if removed {
            debug!(id = id.0, "phoneme subscriber removed");
        }
        removed
    }

    /// Invokes every current subscriber with `event`, in subscription order.
    pub fn publish(&self, event: &PhonemeEvent) {
        let snapshot: Vec<Callback> = self.lock().iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for cb in snapshot {
            cb(event);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Callback)>> {
        // A panicking subscriber cannot leave the list half-updated: every
        // mutation is a single push or retain.
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
