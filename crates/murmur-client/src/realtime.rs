//! Bridge between the provider's change feed and the conversation store.
//!
//! At most one subscription is open at a time, scoped to the active pair.
//! The handle is moved out of the bridge on teardown, so every successful
//! `subscribe` is paired with exactly one `unsubscribe`.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use murmur_shared::protocol::ChangeEvent;
use murmur_shared::provider::{Backend, Subscription, SubscriptionHandle};
use murmur_shared::{ConversationKey, Message, MessagePatch, Result};

use crate::conversation::{Appended, ConversationStore};

struct ActiveFeed {
    key: ConversationKey,
    handle: SubscriptionHandle,
    pump: JoinHandle<()>,
}

pub struct RealtimeBridge {
    store: ConversationStore,
    backend: Arc<dyn Backend>,
    active: Option<ActiveFeed>,
}

impl RealtimeBridge {
    pub fn new(store: ConversationStore, backend: Arc<dyn Backend>) -> Self {
        Self {
            store,
            backend,
            active: None,
        }
    }

    pub fn active_key(&self) -> Option<ConversationKey> {
        self.active.as_ref().map(|feed| feed.key)
    }

    /// Subscribe to `key`, tearing down the previous subscription first.
    /// Attaching to the pair that is already active does nothing.
    pub async fn attach(&mut self, key: ConversationKey) -> Result<()> {
        if self.active_key() == Some(key) {
            debug!(scope = %key, "Realtime feed already attached");
            return Ok(());
        }
        self.detach().await;

        let Subscription { handle, mut events } = self.backend.subscribe(&key).await.map_err(|e| {
            warn!(scope = %key, error = %e, "Failed to subscribe to change feed");
            e
        })?;

        let store = self.store.clone();
        let backend = self.backend.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                apply_event(&store, &backend, event);
            }
            debug!(scope = %key, "Change feed closed");
        });

        info!(scope = %key, handle = handle.0, "Realtime feed attached");
        self.active = Some(ActiveFeed { key, handle, pump });
        Ok(())
    }

    /// Stop the pump and release the subscription. A second call is a
    /// no-op.
    pub async fn detach(&mut self) {
        let Some(feed) = self.active.take() else {
            return;
        };
        feed.pump.abort();
        match self.backend.unsubscribe(feed.handle).await {
            Ok(()) => info!(scope = %feed.key, handle = feed.handle.0, "Realtime feed detached"),
            Err(e) => warn!(scope = %feed.key, error = %e, "Failed to unsubscribe"),
        }
    }
}

impl Drop for RealtimeBridge {
    fn drop(&mut self) {
        let Some(feed) = self.active.take() else {
            return;
        };
        feed.pump.abort();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let backend = self.backend.clone();
                runtime.spawn(async move {
                    if let Err(e) = backend.unsubscribe(feed.handle).await {
                        warn!(scope = %feed.key, error = %e, "Failed to unsubscribe on drop");
                    }
                });
            }
            Err(_) => warn!(scope = %feed.key, "No runtime to release the feed subscription"),
        }
    }
}

/// Apply one change-feed event to the store.
pub(crate) fn apply_event(store: &ConversationStore, backend: &Arc<dyn Backend>, event: ChangeEvent) {
    match event {
        ChangeEvent::Insert(message) => {
            let incoming = message.receiver_id == store.local().id;
            let id = message.id;
            if matches!(store.append(message.clone()), Appended::Inserted(_)) && incoming {
                debug!(msg_id = %id, "Realtime message received");
                spawn_mark_read(store.clone(), backend.clone(), message);
            }
        }
        ChangeEvent::Delete { id } => {
            if store.remove_local(&id) {
                debug!(msg_id = %id, "Realtime delete applied");
            }
        }
    }
}

/// Fire-and-forget read receipt. Failures are logged, never retried.
fn spawn_mark_read(store: ConversationStore, backend: Arc<dyn Backend>, message: Message) {
    tokio::spawn(async move {
        match backend.update_message(&message.id, MessagePatch::mark_read()).await {
            Ok(()) => {
                store.mark_read_local(&message.id);
            }
            Err(e) => warn!(msg_id = %message.id, error = %e, "Failed to mark message read"),
        }
    });
}
