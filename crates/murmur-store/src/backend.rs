//! The local provider.
//!
//! [`LocalBackend`] is the shared "server" side: one database, one change
//! bus and the blob staging area. Each client connects through its own
//! [`LocalSession`], which carries the signed-in user and enforces the row
//! policies a hosted provider would: users read and subscribe only to their
//! own conversations, send only as themselves, mark read only what they
//! received and delete only what they sent.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use murmur_shared::payload::blob_url;
use murmur_shared::protocol::ChangeEvent;
use murmur_shared::provider::{
    AuthProvider, BlobStore, ChangeFeed, DirectoryProvider, MessageRepository, Subscription,
    SubscriptionHandle,
};
use murmur_shared::{
    ConversationKey, Identity, Message, MessageDraft, MessageId, MessagePatch, MurmurError, Result,
    UserId,
};

use crate::database::Database;
use crate::error::StoreError;
use crate::feed::ChangeBus;
use crate::profiles::NewProfile;

pub struct LocalBackend {
    db: Mutex<Database>,
    bus: ChangeBus,
    /// Staged blob bytes per uploading user and content key.
    uploads: Mutex<HashMap<(UserId, String), Vec<u8>>>,
}

impl LocalBackend {
    pub fn new(db: Database) -> Arc<Self> {
        Arc::new(Self {
            db: Mutex::new(db),
            bus: ChangeBus::new(),
            uploads: Mutex::new(HashMap::new()),
        })
    }

    pub fn open_at(path: &Path) -> std::result::Result<Arc<Self>, StoreError> {
        Ok(Self::new(Database::open_at(path)?))
    }

    pub fn in_memory() -> std::result::Result<Arc<Self>, StoreError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// A fresh, signed-out client session.
    pub fn connect(self: &Arc<Self>) -> LocalSession {
        LocalSession {
            backend: self.clone(),
            user: RwLock::new(None),
        }
    }

    pub fn register_profile(&self, profile: &NewProfile) -> Result<Identity> {
        let identity = self.with_db(|db| db.insert_profile(profile))?;
        info!(user = %identity.id, username = %identity.username, "Profile registered");
        Ok(identity)
    }

    pub fn feed(&self) -> &ChangeBus {
        &self.bus
    }

    /// Run `f` with the connection locked. The lock is never held across an
    /// await point.
    fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> std::result::Result<T, StoreError>,
    ) -> Result<T> {
        let guard = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&guard)?)
    }

    fn uploads(&self) -> Result<std::sync::MutexGuard<'_, HashMap<(UserId, String), Vec<u8>>>> {
        self.uploads
            .lock()
            .map_err(|_| MurmurError::from(StoreError::Poisoned))
    }
}

/// One client's authenticated view of a [`LocalBackend`].
pub struct LocalSession {
    backend: Arc<LocalBackend>,
    user: RwLock<Option<UserId>>,
}

impl LocalSession {
    pub fn backend(&self) -> &Arc<LocalBackend> {
        &self.backend
    }

    pub fn sign_in(&self, username: &str) -> Result<Identity> {
        let identity = self
            .backend
            .with_db(|db| db.get_profile_by_username(username))?
            .ok_or_else(|| MurmurError::NotFound(format!("user '{}'", username.trim())))?;

        *self.user.write().map_err(|_| StoreError::Poisoned)? = Some(identity.id);
        info!(user = %identity.id, username = %identity.username, "Signed in");
        Ok(identity)
    }

    pub fn sign_out(&self) {
        if let Ok(mut user) = self.user.write() {
            if let Some(id) = user.take() {
                info!(user = %id, "Signed out");
            }
        }
    }

    fn require_user(&self) -> Result<UserId> {
        self.user
            .read()
            .map_err(|_| MurmurError::from(StoreError::Poisoned))?
            .ok_or(MurmurError::Unauthenticated)
    }
}

#[async_trait]
impl AuthProvider for LocalSession {
    async fn current_user(&self) -> Result<Option<Identity>> {
        let Some(id) = *self.user.read().map_err(|_| StoreError::Poisoned)? else {
            return Ok(None);
        };
        match self.backend.with_db(|db| db.get_profile(&id)) {
            Ok(identity) => Ok(Some(identity)),
            Err(MurmurError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl DirectoryProvider for LocalSession {
    async fn list_profiles(&self, exclude: &UserId) -> Result<Vec<Identity>> {
        self.require_user()?;
        self.backend.with_db(|db| db.list_profiles_except(exclude))
    }
}

#[async_trait]
impl MessageRepository for LocalSession {
    async fn query_messages(&self, key: &ConversationKey) -> Result<Vec<Message>> {
        let user = self.require_user()?;
        if !key.includes(&user) {
            return Err(MurmurError::Forbidden("not a participant".into()));
        }
        self.backend.with_db(|db| db.get_conversation(key))
    }

    async fn insert_message(&self, draft: MessageDraft) -> Result<Message> {
        let user = self.require_user()?;
        if draft.sender_id != user {
            return Err(MurmurError::Forbidden("cannot send as another user".into()));
        }

        let message = self.backend.with_db(|db| db.insert_message(&draft))?;
        let delivered = self.backend.bus.publish(ChangeEvent::Insert(message.clone()));
        debug!(msg_id = %message.id, delivered, "Message inserted");
        Ok(message)
    }

    async fn update_message(&self, id: &MessageId, patch: MessagePatch) -> Result<()> {
        let user = self.require_user()?;
        let Some(read) = patch.read else {
            return Ok(());
        };

        let message = self.backend.with_db(|db| db.get_message_by_id(id))?;
        if message.receiver_id != user {
            return Err(MurmurError::Forbidden(
                "only the receiver may change the read flag".into(),
            ));
        }
        self.backend.with_db(|db| db.set_message_read(id, read))
    }

    async fn mark_conversation_read(&self, receiver: &UserId, sender: &UserId) -> Result<u64> {
        let user = self.require_user()?;
        if *receiver != user {
            return Err(MurmurError::Forbidden("cannot mark another user's messages".into()));
        }
        let changed = self.backend.with_db(|db| db.mark_read_from(receiver, sender))?;
        Ok(changed as u64)
    }

    async fn delete_message(&self, id: &MessageId, sender: &UserId) -> Result<bool> {
        let user = self.require_user()?;
        if *sender != user {
            warn!(msg_id = %id, "Delete attempted on behalf of another user");
            return Ok(false);
        }

        let removed = self.backend.with_db(|db| db.delete_message_from(id, sender))?;
        if removed {
            self.backend.bus.publish(ChangeEvent::Delete { id: *id });
        }
        Ok(removed)
    }
}

#[async_trait]
impl ChangeFeed for LocalSession {
    async fn subscribe(&self, scope: &ConversationKey) -> Result<Subscription> {
        let user = self.require_user()?;
        if !scope.includes(&user) {
            return Err(MurmurError::Forbidden("not a participant".into()));
        }
        Ok(self.backend.bus.subscribe(*scope))
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        if !self.backend.bus.unsubscribe(handle) {
            debug!(handle = handle.0, "Unsubscribe for unknown handle");
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalSession {
    async fn put_chunk(&self, key: &str, offset: u64, bytes: &[u8]) -> Result<()> {
        let user = self.require_user()?;
        let mut uploads = self.backend.uploads()?;
        let staged = uploads.entry((user, key.to_string())).or_default();
        if offset == 0 && !staged.is_empty() {
            debug!(key, stale = staged.len(), "Restarting staged upload");
            staged.clear();
        }
        if staged.len() as u64 != offset {
            return Err(MurmurError::Validation(format!(
                "chunk offset {offset} does not follow {} staged bytes",
                staged.len()
            )));
        }
        staged.extend_from_slice(bytes);
        Ok(())
    }

    async fn commit(&self, key: &str, total_len: u64, mime: &str) -> Result<String> {
        let user = self.require_user()?;
        let data = self
            .backend
            .uploads()?
            .remove(&(user, key.to_string()))
            .ok_or_else(|| MurmurError::NotFound(format!("upload {key}")))?;
        if data.len() as u64 != total_len {
            return Err(MurmurError::Validation(format!(
                "upload {key} has {} bytes, expected {total_len}",
                data.len()
            )));
        }

        self.backend.with_db(|db| db.insert_blob(key, mime, &data))?;
        debug!(key, size = total_len, "Blob committed");
        Ok(blob_url(key))
    }

    async fn discard(&self, key: &str) -> Result<()> {
        let user = self.require_user()?;
        if let Some(staged) = self.backend.uploads()?.remove(&(user, key.to_string())) {
            debug!(key, size = staged.len(), "Staged upload discarded");
        }
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.require_user()?;
        Ok(self
            .backend
            .with_db(|db| db.get_blob(key))?
            .map(|blob| blob.data))
    }
}
