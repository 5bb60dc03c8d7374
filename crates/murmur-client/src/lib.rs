//! # murmur-client
//!
//! The direct-messaging core: a conversation store that reconciles local
//! sends with realtime pushes, the bridge that owns the change-feed
//! subscription, the attachment pipeline, the voice recorder driver, and
//! the [`Messenger`] view that ties them together for one signed-in user.
//!
//! Every component talks to the provider through an explicitly constructed
//! [`ClientContext`].

pub mod attachment;
pub mod config;
pub mod context;
pub mod conversation;
pub mod directory;
pub mod events;
pub mod messenger;
pub mod realtime;
pub mod recorder;
pub mod session;

use tracing_subscriber::{fmt, EnvFilter};

pub use attachment::{AttachmentPipeline, PendingAttachment};
pub use config::{AttachmentMode, ClientConfig};
pub use context::ClientContext;
pub use conversation::{Appended, ConversationLog, ConversationStore, Ticket};
pub use events::ViewEvent;
pub use messenger::Messenger;
pub use recorder::{RecorderSnapshot, VoiceRecorder};

/// Install the global tracing subscriber. Honours `RUST_LOG`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("murmur_client=debug,murmur_store=info,murmur_media=info,warn")
    });

    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .try_init();
}
