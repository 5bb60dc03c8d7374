//! Notifications a messaging view publishes for its renderer.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use murmur_media::RecorderStatus;
use murmur_shared::{Message, MessageId, UserId};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ViewEvent {
    MessageAppended { message: Message },
    MessageRemoved { id: MessageId },
    MessageRead { id: MessageId },
    HistoryLoaded { peer: UserId, count: usize },
    UploadProgress { percent: u8 },
    RecorderStatus {
        status: RecorderStatus,
        elapsed_secs: u32,
        error: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ViewEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ViewEvent) {
        if self.tx.send(event).is_err() {
            trace!("No view listeners");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
