//! The message list of the active conversation.
//!
//! [`ConversationLog`] is the synchronous core: ordering, id dedup and
//! read flags for exactly one pair. [`ConversationStore`] shares a log
//! between the view, the realtime pump and the attachment pipeline, and
//! performs the provider calls around it.
//!
//! Local sends and realtime pushes may land in either order; both go
//! through [`ConversationLog::append`], which ignores an id it has already
//! seen, so the merge converges to the same list either way.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use murmur_shared::provider::Backend;
use murmur_shared::{
    Attachment, ConversationKey, Identity, Message, MessageDraft, MessageId, MurmurError, Result,
    UserId,
};

use crate::events::{EventBus, ViewEvent};

/// Identifies one `open` of a conversation. A response carrying an older
/// ticket belongs to a view the user has already left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub key: ConversationKey,
    pub generation: u64,
}

/// Result of merging one message into the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appended {
    Inserted(usize),
    /// The id is already present; nothing changed.
    Duplicate,
    /// The message does not belong to the active pair.
    OutOfScope,
}

#[derive(Debug)]
pub struct ConversationLog {
    local: UserId,
    key: Option<ConversationKey>,
    generation: u64,
    messages: Vec<Message>,
}

impl ConversationLog {
    pub fn new(local: UserId) -> Self {
        Self {
            local,
            key: None,
            generation: 0,
            messages: Vec::new(),
        }
    }

    /// Switch to the conversation with `peer`, discarding the current list.
    pub fn open(&mut self, peer: UserId) -> Result<Ticket> {
        let key = ConversationKey::new(self.local, peer)?;
        self.generation += 1;
        self.key = Some(key);
        self.messages.clear();
        Ok(Ticket {
            key,
            generation: self.generation,
        })
    }

    pub fn close(&mut self) {
        self.generation += 1;
        self.key = None;
        self.messages.clear();
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.generation == ticket.generation && self.key == Some(ticket.key)
    }

    pub fn ticket(&self) -> Option<Ticket> {
        self.key.map(|key| Ticket {
            key,
            generation: self.generation,
        })
    }

    pub fn active_key(&self) -> Option<ConversationKey> {
        self.key
    }

    pub fn local(&self) -> UserId {
        self.local
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == *id)
    }

    /// Insert keeping `created_at` ascending. Equal timestamps keep arrival
    /// order.
    pub fn append(&mut self, message: Message) -> Appended {
        match self.key {
            Some(key) if key.contains(&message) => {}
            _ => return Appended::OutOfScope,
        }
        if self.get(&message.id).is_some() {
            return Appended::Duplicate;
        }

        let at = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(at, message);
        Appended::Inserted(at)
    }

    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let at = self.messages.iter().position(|m| m.id == *id)?;
        Some(self.messages.remove(at))
    }

    /// Returns true only when the flag actually flipped. Read never goes
    /// back to unread.
    pub fn mark_read(&mut self, id: &MessageId) -> bool {
        match self.messages.iter_mut().find(|m| m.id == *id) {
            Some(m) if !m.read => {
                m.read = true;
                true
            }
            _ => false,
        }
    }

    /// Flag everything `from` sent to the local user as read. Returns the
    /// ids that changed.
    pub fn mark_incoming_read(&mut self, from: &UserId) -> Vec<MessageId> {
        let local = self.local;
        self.messages
            .iter_mut()
            .filter(|m| m.sender_id == *from && m.receiver_id == local && !m.read)
            .map(|m| {
                m.read = true;
                m.id
            })
            .collect()
    }

    pub fn unread_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.receiver_id == self.local && !m.read)
            .count()
    }
}

/// Shared handle to the active conversation. Cheap to clone.
#[derive(Clone)]
pub struct ConversationStore {
    log: Arc<Mutex<ConversationLog>>,
    backend: Arc<dyn Backend>,
    local: Identity,
    events: EventBus,
}

impl ConversationStore {
    pub fn new(backend: Arc<dyn Backend>, local: Identity, events: EventBus) -> Self {
        Self {
            log: Arc::new(Mutex::new(ConversationLog::new(local.id))),
            backend,
            local,
            events,
        }
    }

    pub fn local(&self) -> &Identity {
        &self.local
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn open(&self, peer: UserId) -> Result<Ticket> {
        let ticket = self.lock().open(peer)?;
        debug!(scope = %ticket.key, generation = ticket.generation, "Conversation opened");
        Ok(ticket)
    }

    pub fn close(&self) {
        self.lock().close();
    }

    pub fn ticket(&self) -> Option<Ticket> {
        self.lock().ticket()
    }

    pub fn active_key(&self) -> Option<ConversationKey> {
        self.lock().active_key()
    }

    pub fn active_peer(&self) -> Option<UserId> {
        self.active_key().and_then(|k| k.peer_of(&self.local.id))
    }

    /// Copy of the current list.
    pub fn snapshot(&self) -> Vec<Message> {
        self.lock().messages().to_vec()
    }

    pub fn get(&self, id: &MessageId) -> Option<Message> {
        self.lock().get(id).cloned()
    }

    pub fn unread_count(&self) -> usize {
        self.lock().unread_count()
    }

    /// Fetch the history for `ticket`, merge it and mark the peer's
    /// messages read. Returns the number of messages now displayed.
    pub async fn load(&self, ticket: &Ticket) -> Result<usize> {
        let peer = ticket.key.peer_of(&self.local.id).ok_or_else(|| {
            MurmurError::Validation("local user is not part of this conversation".into())
        })?;

        let fetched = self.backend.query_messages(&ticket.key).await.map_err(|e| {
            warn!(scope = %ticket.key, error = %e, "Failed to load history");
            e
        })?;

        let count = {
            let mut log = self.lock();
            self.ensure_current(&log, ticket)?;
            for message in fetched {
                log.append(message);
            }
            log.len()
        };
        info!(scope = %ticket.key, count, "History loaded");
        self.events.emit(ViewEvent::HistoryLoaded { peer, count });

        match self.backend.mark_conversation_read(&self.local.id, &peer).await {
            Ok(changed) => {
                let flipped = {
                    let mut log = self.lock();
                    if log.is_current(ticket) {
                        log.mark_incoming_read(&peer)
                    } else {
                        Vec::new()
                    }
                };
                debug!(changed, local = flipped.len(), "Conversation marked read");
                for id in flipped {
                    self.events.emit(ViewEvent::MessageRead { id });
                }
            }
            Err(e) => warn!(peer = %peer, error = %e, "Failed to mark conversation read"),
        }

        Ok(count)
    }

    /// Load the conversation with `peer`, opening it first unless it is
    /// already the active one. Reloading merges into the current list.
    pub async fn load_peer(&self, peer: UserId) -> Result<usize> {
        let ticket = match self.ticket() {
            Some(ticket) if ticket.key.peer_of(&self.local.id) == Some(peer) => ticket,
            _ => self.open(peer)?,
        };
        self.load(&ticket).await
    }

    /// Merge one message into the active conversation.
    pub fn append(&self, message: Message) -> Appended {
        let outcome = self.lock().append(message.clone());
        match outcome {
            Appended::Inserted(_) => {
                self.events.emit(ViewEvent::MessageAppended { message });
            }
            Appended::Duplicate => debug!(msg_id = %message.id, "Duplicate message ignored"),
            Appended::OutOfScope => {
                debug!(msg_id = %message.id, "Message outside the active conversation ignored")
            }
        }
        outcome
    }

    /// Local-only removal; absent ids are fine.
    pub fn remove_local(&self, id: &MessageId) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            self.events.emit(ViewEvent::MessageRemoved { id: *id });
        }
        removed
    }

    pub fn mark_read_local(&self, id: &MessageId) -> bool {
        let changed = self.lock().mark_read(id);
        if changed {
            self.events.emit(ViewEvent::MessageRead { id: *id });
        }
        changed
    }

    /// Delete a message the local user sent.
    ///
    /// The provider only deletes rows whose sender is the caller; the local
    /// check merely avoids a pointless round trip.
    pub async fn remove(&self, id: &MessageId) -> Result<bool> {
        if let Some(existing) = self.get(id) {
            if existing.sender_id != self.local.id {
                return Err(MurmurError::Forbidden(
                    "only the sender can delete a message".into(),
                ));
            }
        }

        let removed = self
            .backend
            .delete_message(id, &self.local.id)
            .await
            .map_err(|e| {
                warn!(msg_id = %id, error = %e, "Failed to delete message");
                e
            })?;
        if !removed {
            debug!(msg_id = %id, "Provider deleted nothing");
        }
        self.remove_local(id);
        Ok(removed)
    }

    /// Persist a message to the active peer and merge the stored record.
    pub async fn send(&self, text: &str, attachment: Option<Attachment>) -> Result<Message> {
        let ticket = self
            .ticket()
            .ok_or_else(|| MurmurError::Validation("no conversation selected".into()))?;
        self.send_to(&ticket, text, attachment).await
    }

    /// Persist a message to the peer of `ticket`, even if the view has
    /// moved on since. The stored record is only merged while that pair is
    /// still displayed.
    pub async fn send_to(
        &self,
        ticket: &Ticket,
        text: &str,
        attachment: Option<Attachment>,
    ) -> Result<Message> {
        let peer = ticket.key.peer_of(&self.local.id).ok_or_else(|| {
            MurmurError::Validation("local user is not part of this conversation".into())
        })?;

        let draft = MessageDraft {
            sender_id: self.local.id,
            receiver_id: peer,
            content: text.trim().to_string(),
            attachment,
        };
        if draft.is_blank() {
            return Err(MurmurError::Validation("message is empty".into()));
        }

        let message = self.backend.insert_message(draft).await.map_err(|e| {
            warn!(peer = %peer, error = %e, "Failed to send message");
            e
        })?;
        info!(msg_id = %message.id, peer = %peer, "Message sent");
        self.append(message.clone());
        Ok(message)
    }

    fn ensure_current(&self, log: &ConversationLog, ticket: &Ticket) -> Result<()> {
        if log.is_current(ticket) {
            return Ok(());
        }
        debug!(scope = %ticket.key, "Discarding stale history response");
        Err(MurmurError::StaleResponse {
            expected: ticket.key.to_string(),
            active: log
                .active_key()
                .map(|k| k.to_string())
                .unwrap_or_else(|| "none".into()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ConversationLog> {
        // Every mutation completes before the guard drops.
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
