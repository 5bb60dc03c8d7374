//! The messaging view for one signed-in user.
//!
//! [`Messenger`] wires the conversation store, the realtime bridge, the
//! attachment pipeline and the voice recorder to one provider context and
//! exposes the actions a chat screen offers.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use murmur_media::AudioSource;
use murmur_shared::{
    AttachmentKind, ConversationKey, Identity, Message, MessageId, MurmurError, Result, UserId,
};

use crate::attachment::{AttachmentPipeline, PendingAttachment};
use crate::context::ClientContext;
use crate::conversation::ConversationStore;
use crate::directory::DirectoryLoader;
use crate::events::{EventBus, ViewEvent};
use crate::realtime::RealtimeBridge;
use crate::recorder::{RecorderSnapshot, VoiceRecorder};
use crate::session::SessionGuard;

pub struct Messenger {
    me: Identity,
    directory: DirectoryLoader,
    store: ConversationStore,
    bridge: tokio::sync::Mutex<RealtimeBridge>,
    pipeline: AttachmentPipeline,
    recorder: VoiceRecorder,
    events: EventBus,
    draft: Mutex<String>,
}

impl Messenger {
    /// Mount the view. Fails with [`MurmurError::Unauthenticated`] when no
    /// user is signed in.
    pub async fn open(ctx: &ClientContext, audio: Arc<dyn AudioSource>) -> Result<Self> {
        let backend = ctx.backend().clone();
        let me = SessionGuard::require(backend.as_ref()).await?;
        let directory = DirectoryLoader::load(backend.as_ref(), &me.id).await?;

        let events = EventBus::new();
        let store = ConversationStore::new(backend.clone(), me.clone(), events.clone());
        let bridge = RealtimeBridge::new(store.clone(), backend.clone());
        let pipeline = AttachmentPipeline::new(store.clone(), backend, ctx.config());
        let recorder = VoiceRecorder::new(
            audio,
            pipeline.clone(),
            events.clone(),
            ctx.config().error_display,
        );

        info!(user = %me.id, contacts = directory.contacts().len(), "Messenger opened");
        Ok(Self {
            me,
            directory,
            store,
            bridge: tokio::sync::Mutex::new(bridge),
            pipeline,
            recorder,
            events,
            draft: Mutex::new(String::new()),
        })
    }

    pub fn me(&self) -> &Identity {
        &self.me
    }

    pub fn directory(&self) -> &DirectoryLoader {
        &self.directory
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn messages(&self) -> Vec<Message> {
        self.store.snapshot()
    }

    pub fn events(&self) -> broadcast::Receiver<ViewEvent> {
        self.events.subscribe()
    }

    pub fn upload_progress(&self) -> watch::Receiver<u8> {
        self.pipeline.progress()
    }

    pub fn recorder(&self) -> watch::Receiver<RecorderSnapshot> {
        self.recorder.subscribe()
    }

    pub async fn active_subscription(&self) -> Option<ConversationKey> {
        self.bridge.lock().await.active_key()
    }

    /// Switch to `peer`: subscribe to the pair's feed, then load its
    /// history. A load overtaken by a later switch is dropped quietly.
    pub async fn select_peer(&self, peer: UserId) -> Result<()> {
        if self.directory.find(&peer).is_none() {
            return Err(MurmurError::NotFound(format!("contact {peer}")));
        }

        let ticket = {
            let mut bridge = self.bridge.lock().await;
            let ticket = self.store.open(peer)?;
            bridge.attach(ticket.key).await?;
            ticket
        };

        match self.store.load(&ticket).await {
            Ok(count) => {
                debug!(peer = %peer, count, "Peer selected");
                Ok(())
            }
            Err(e) if e.is_stale() => {
                debug!(peer = %peer, "History for a previous peer discarded");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        *self.lock_draft() = text.into();
    }

    pub fn draft(&self) -> String {
        self.lock_draft().clone()
    }

    /// Send the composer text. The draft is kept when the send fails.
    pub async fn send_draft(&self) -> Result<Message> {
        let text = self.draft();
        if text.trim().is_empty() {
            return Err(MurmurError::Validation("message is empty".into()));
        }

        let message = self.store.send(&text, None).await?;
        self.lock_draft().clear();
        Ok(message)
    }

    pub async fn send_file(&self, path: &Path, kind: AttachmentKind) -> Result<Message> {
        let pending = PendingAttachment::from_path(path, kind).await?;
        self.pipeline.send(pending).await
    }

    pub async fn delete(&self, id: &MessageId) -> Result<bool> {
        self.store.remove(id).await
    }

    pub async fn press_record(&self) -> Result<()> {
        self.recorder.press().await
    }

    pub async fn release_record(&self) -> Result<Option<Message>> {
        self.recorder.release().await
    }

    /// Unmount: cancel any recording and release the feed subscription.
    pub async fn close(&self) {
        self.recorder.cancel().await;
        self.bridge.lock().await.detach().await;
        self.store.close();
        info!(user = %self.me.id, "Messenger closed");
    }

    fn lock_draft(&self) -> MutexGuard<'_, String> {
        self.draft
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
