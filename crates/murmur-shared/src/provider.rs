//! The surface the client core consumes from the identity, persistence and
//! realtime provider.
//!
//! Every trait is object safe so that a provider can be injected once at
//! start-up as an `Arc<dyn Backend>` and shared by every component.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::protocol::ChangeEvent;
use crate::types::{ConversationKey, Identity, Message, MessageDraft, MessageId, MessagePatch, UserId};

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The signed-in user, if any.
    async fn current_user(&self) -> Result<Option<Identity>>;
}

#[async_trait]
pub trait DirectoryProvider: Send + Sync {
    /// Every profile except `exclude`, ordered by username.
    async fn list_profiles(&self, exclude: &UserId) -> Result<Vec<Identity>>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// All messages exchanged within the pair, ascending by creation time.
    async fn query_messages(&self, key: &ConversationKey) -> Result<Vec<Message>>;

    /// Persist a draft. The provider assigns id, timestamp and `read = false`.
    async fn insert_message(&self, draft: MessageDraft) -> Result<Message>;

    async fn update_message(&self, id: &MessageId, patch: MessagePatch) -> Result<()>;

    /// Flag every unread message from `sender` to `receiver` as read.
    /// Returns the number of rows changed.
    async fn mark_conversation_read(&self, receiver: &UserId, sender: &UserId) -> Result<u64>;

    /// Delete `id` only if it was sent by `sender`. Returns whether a row
    /// was removed.
    async fn delete_message(&self, id: &MessageId, sender: &UserId) -> Result<bool>;
}

/// Opaque handle identifying one change-feed subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// An open subscription: the handle to tear it down and the event queue.
#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub events: mpsc::Receiver<ChangeEvent>,
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, scope: &ConversationKey) -> Result<Subscription>;

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()>;
}

/// Content-addressed object storage for attachments.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stage `bytes` at `offset` of the blob addressed by `key`. Chunks must
    /// arrive in order; a chunk at offset 0 restarts the upload.
    async fn put_chunk(&self, key: &str, offset: u64, bytes: &[u8]) -> Result<()>;

    /// Verify and persist a fully staged blob. Returns its reference URL.
    async fn commit(&self, key: &str, total_len: u64, mime: &str) -> Result<String>;

    /// Drop whatever the caller has staged for `key`. Absent uploads are
    /// fine.
    async fn discard(&self, key: &str) -> Result<()>;

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// Everything the messaging core needs from its provider.
pub trait Backend:
    AuthProvider + DirectoryProvider + MessageRepository + ChangeFeed + BlobStore
{
}

impl<T> Backend for T where
    T: AuthProvider + DirectoryProvider + MessageRepository + ChangeFeed + BlobStore
{
}
