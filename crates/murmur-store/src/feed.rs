//! In-process realtime change feed.
//!
//! Each subscription is scoped to one conversation pair. Inserts are routed
//! to the subscriptions whose pair matches the row; deletes carry only the
//! id and go to every subscription.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use murmur_shared::constants::FEED_QUEUE_CAPACITY;
use murmur_shared::protocol::ChangeEvent;
use murmur_shared::provider::{Subscription, SubscriptionHandle};
use murmur_shared::ConversationKey;

struct Subscriber {
    scope: ConversationKey,
    tx: mpsc::Sender<ChangeEvent>,
}

#[derive(Default)]
pub struct ChangeBus {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, scope: ConversationKey) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::channel(FEED_QUEUE_CAPACITY);

        let mut subscribers = self.lock();
        subscribers.insert(id, Subscriber { scope, tx });
        debug!(handle = id, scope = %scope, active = subscribers.len(), "Feed subscription opened");

        Subscription {
            handle: SubscriptionHandle(id),
            events: rx,
        }
    }

    /// Returns whether the handle was still registered.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let removed = self.lock().remove(&handle.0).is_some();
        debug!(handle = handle.0, removed, "Feed subscription closed");
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver an event to every subscription that can see it. Returns the
    /// number of queues it was pushed to.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let mut subscribers = self.lock();
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, subscriber) in subscribers.iter() {
            if !event.is_visible_to(&subscriber.scope) {
                continue;
            }
            match subscriber.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(handle = *id, msg_id = %event.message_id(), "Feed queue full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            subscribers.remove(&id);
            debug!(handle = id, "Pruned closed feed subscription");
        }
        delivered
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Subscriber>> {
        // The map holds no invariants a panicking holder could break.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
