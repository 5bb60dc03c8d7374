//! File and voice attachments.
//!
//! The pipeline turns a [`PendingAttachment`] into a transferable reference,
//! then sends it through the [`ConversationStore`]. Upload progress is
//! published as a percentage on a `watch` channel and on the view bus.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use murmur_media::EncodedClip;
use murmur_shared::constants::{
    BLOB_CHUNK_SIZE, DOCUMENT_PREFIX, PROGRESS_CAP, PROGRESS_STEP, VOICE_PREFIX,
};
use murmur_shared::payload::{blob_key, mime_for_extension, to_data_uri};
use murmur_shared::provider::Backend;
use murmur_shared::{Attachment, AttachmentKind, Message, MurmurError, Result};

use crate::config::{AttachmentMode, ClientConfig};
use crate::conversation::{ConversationStore, Ticket};
use crate::events::{EventBus, ViewEvent};

/// A file picked for sending, already read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAttachment {
    pub name: String,
    pub kind: AttachmentKind,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl PendingAttachment {
    /// Read `path` and check that its type fits `kind`.
    pub async fn from_path(path: &Path, kind: AttachmentKind) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MurmurError::Validation(format!("invalid file name: {}", path.display())))?
            .to_string();
        let extension = path.extension().and_then(|e| e.to_str());
        let mime = extension.map(mime_for_extension).unwrap_or("application/octet-stream");

        if !kind.accepts(mime, extension) {
            return Err(MurmurError::Validation(format!(
                "{name} cannot be sent as {kind}"
            )));
        }

        let bytes = tokio::fs::read(path).await?;
        debug!(name = %name, size = bytes.len(), mime, "Attachment read");
        Ok(Self {
            name,
            kind,
            mime: mime.to_string(),
            bytes,
        })
    }

    /// Wrap a recorded clip as an audio attachment.
    pub fn from_clip(clip: EncodedClip, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AttachmentKind::Audio,
            mime: clip.mime.to_string(),
            bytes: clip.bytes,
        }
    }

    /// Message text sent alongside the attachment.
    pub fn display_text(&self) -> String {
        match self.kind {
            AttachmentKind::Document => format!("{DOCUMENT_PREFIX} {}", self.name),
            _ => String::new(),
        }
    }
}

/// Text of a voice message of `secs` seconds.
pub fn voice_text(secs: u64) -> String {
    format!("{VOICE_PREFIX} Voice message ({secs}s)")
}

#[derive(Clone)]
struct Progress {
    tx: Arc<watch::Sender<u8>>,
    events: EventBus,
}

impl Progress {
    fn set(&self, percent: u8) {
        let percent = percent.min(100);
        if self.tx.send_replace(percent) != percent {
            self.events.emit(ViewEvent::UploadProgress { percent });
        }
    }

    fn get(&self) -> u8 {
        *self.tx.borrow()
    }
}

#[derive(Clone)]
pub struct AttachmentPipeline {
    store: ConversationStore,
    backend: Arc<dyn Backend>,
    mode: AttachmentMode,
    max_bytes: usize,
    tick: Duration,
    progress: Progress,
}

impl AttachmentPipeline {
    pub fn new(store: ConversationStore, backend: Arc<dyn Backend>, config: &ClientConfig) -> Self {
        let (tx, _) = watch::channel(0);
        let progress = Progress {
            tx: Arc::new(tx),
            events: store.events().clone(),
        };
        Self {
            store,
            backend,
            mode: config.attachment_mode,
            max_bytes: config.max_attachment_bytes,
            tick: config.progress_tick,
            progress,
        }
    }

    pub fn mode(&self) -> AttachmentMode {
        self.mode
    }

    /// The conversation an attachment picked now would be sent to.
    pub fn active_ticket(&self) -> Option<Ticket> {
        self.store.ticket()
    }

    pub fn progress(&self) -> watch::Receiver<u8> {
        self.progress.tx.subscribe()
    }

    /// Send with the attachment's default text.
    pub async fn send(&self, pending: PendingAttachment) -> Result<Message> {
        let text = pending.display_text();
        self.send_with_text(pending, text).await
    }

    /// Encode or upload `pending`, then send it with `text` to the peer
    /// that is active now. Progress is back at 0 when this returns,
    /// whatever the outcome.
    pub async fn send_with_text(&self, pending: PendingAttachment, text: String) -> Result<Message> {
        let ticket = self
            .store
            .ticket()
            .ok_or_else(|| MurmurError::Validation("no conversation selected".into()))?;
        self.send_with_text_to(&ticket, pending, text).await
    }

    /// Like [`AttachmentPipeline::send_with_text`], addressed to the peer of
    /// `ticket` regardless of which conversation is displayed when the
    /// upload completes.
    pub async fn send_with_text_to(
        &self,
        ticket: &Ticket,
        pending: PendingAttachment,
        text: String,
    ) -> Result<Message> {
        if pending.bytes.is_empty() {
            return Err(MurmurError::Validation(format!("{} is empty", pending.name)));
        }
        if pending.bytes.len() > self.max_bytes {
            return Err(MurmurError::Validation(format!(
                "{} is {} bytes, the limit is {}",
                pending.name,
                pending.bytes.len(),
                self.max_bytes
            )));
        }

        let name = pending.name.clone();
        self.progress.set(0);
        let result = self.upload_and_send(ticket, pending, text).await;
        self.progress.set(0);

        match &result {
            Ok(message) => info!(msg_id = %message.id, name = %name, mode = ?self.mode, "Attachment sent"),
            Err(e) => warn!(name = %name, error = %e, "Attachment upload failed"),
        }
        result
    }

    async fn upload_and_send(
        &self,
        ticket: &Ticket,
        pending: PendingAttachment,
        text: String,
    ) -> Result<Message> {
        let PendingAttachment {
            name,
            kind,
            mime,
            bytes,
        } = pending;

        let url = match self.mode {
            AttachmentMode::DataUri => self.encode_data_uri(mime, bytes).await?,
            AttachmentMode::BlobStore => self.upload_blob(mime, bytes).await?,
        };

        self.store
            .send_to(ticket, &text, Some(Attachment { url, kind, name }))
            .await
    }

    /// Base64 on the blocking pool while a ticker advances the cosmetic
    /// progress by [`PROGRESS_STEP`] up to [`PROGRESS_CAP`].
    async fn encode_data_uri(&self, mime: String, bytes: Vec<u8>) -> Result<String> {
        let progress = self.progress.clone();
        let tick = self.tick;
        let ticker = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + tick, tick);
            loop {
                interval.tick().await;
                let next = progress
                    .get()
                    .saturating_add(PROGRESS_STEP)
                    .min(PROGRESS_CAP);
                progress.set(next);
            }
        });

        let encoded = tokio::task::spawn_blocking(move || to_data_uri(&mime, &bytes)).await;
        ticker.abort();
        // Wait out a tick that may be mid-flight so it cannot land after 100.
        let _ = ticker.await;

        let uri = encoded.map_err(|e| MurmurError::Backend(format!("encoding task failed: {e}")))?;
        self.progress.set(100);
        Ok(uri)
    }

    /// Chunked upload under the content digest. Progress is bytes
    /// acknowledged over total.
    async fn upload_blob(&self, mime: String, bytes: Vec<u8>) -> Result<String> {
        let (key, bytes) = tokio::task::spawn_blocking(move || (blob_key(&bytes), bytes))
            .await
            .map_err(|e| MurmurError::Backend(format!("hashing task failed: {e}")))?;

        let total = bytes.len();
        let mut sent = 0usize;
        for chunk in bytes.chunks(BLOB_CHUNK_SIZE) {
            if let Err(e) = self.backend.put_chunk(&key, sent as u64, chunk).await {
                self.discard_staged(&key).await;
                return Err(e);
            }
            sent += chunk.len();
            self.progress.set(((sent * 100) / total) as u8);
        }

        let url = match self.backend.commit(&key, total as u64, &mime).await {
            Ok(url) => url,
            Err(e) => {
                self.discard_staged(&key).await;
                return Err(e);
            }
        };
        debug!(key = %key, size = total, "Blob uploaded");
        Ok(url)
    }

    async fn discard_staged(&self, key: &str) {
        if let Err(e) = self.backend.discard(key).await {
            warn!(key, error = %e, "Failed to discard staged upload");
        }
    }
}
