use serde::{Deserialize, Serialize};

use crate::types::{ConversationKey, Message, MessageId};

/// Row-level change pushed by the provider's realtime feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A new message row, as persisted.
    Insert(Message),

    /// A deleted message. Only the id is replayed, so deletes cannot be
    /// filtered by conversation.
    Delete { id: MessageId },
}

impl ChangeEvent {
    /// Whether a subscription scoped to `key` should receive this event.
    pub fn is_visible_to(&self, key: &ConversationKey) -> bool {
        match self {
            ChangeEvent::Insert(message) => key.contains(message),
            ChangeEvent::Delete { .. } => true,
        }
    }

    pub fn message_id(&self) -> MessageId {
        match self {
            ChangeEvent::Insert(message) => message.id,
            ChangeEvent::Delete { id } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::UserId;

    #[test]
    fn test_visibility() {
        let a = UserId::new();
        let b = UserId::new();
        let c = UserId::new();
        let key = ConversationKey::new(a, b).unwrap();

        let outside = ChangeEvent::Insert(Message {
            id: MessageId::new(),
            sender_id: a,
            receiver_id: c,
            content: "elsewhere".into(),
            created_at: Utc::now(),
            read: false,
            attachment: None,
        });
        assert!(!outside.is_visible_to(&key));

        let delete = ChangeEvent::Delete { id: MessageId::new() };
        assert!(delete.is_visible_to(&key));
    }
}
