//! Push-to-talk voice messages.
//!
//! [`VoiceRecorder`] drives the [`RecordingSession`] machine: it opens the
//! microphone on press, runs the one-second ticker that enforces the
//! recording ceiling, encodes the clip on release and hands it to the
//! attachment pipeline. Errors are shown for a fixed delay, then the
//! recorder returns to idle by itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use murmur_media::{
    encode_wav, AudioSource, AudioStream, CaptureConstraints, CaptureError, RecorderStatus,
    RecordingSession, Tick,
};
use murmur_shared::constants::RECORDING_TICK_MS;
use murmur_shared::{Message, MurmurError, Result};

use crate::attachment::{voice_text, AttachmentPipeline, PendingAttachment};
use crate::conversation::Ticket;
use crate::events::{EventBus, ViewEvent};

const DENIED_TEXT: &str = "Microphone access denied";
const DEVICE_TEXT: &str = "Microphone error";
const PROCESSING_TEXT: &str = "Processing error";
const SEND_TEXT: &str = "Failed to send";

/// What the recorder control displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecorderSnapshot {
    pub status: RecorderStatus,
    pub elapsed_secs: u32,
    pub error: Option<String>,
}

impl RecorderSnapshot {
    fn of(session: &RecordingSession) -> Self {
        Self {
            status: session.status(),
            elapsed_secs: session.elapsed_secs(),
            error: session.error().map(str::to_string),
        }
    }
}

/// State shared between the recorder handle and its background tasks.
struct Shared {
    session: Mutex<RecordingSession>,
    status_tx: watch::Sender<RecorderSnapshot>,
    events: EventBus,
    error_display: Duration,
    error_epoch: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RecordingSession> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self) {
        let snapshot = RecorderSnapshot::of(&self.lock());
        self.events.emit(ViewEvent::RecorderStatus {
            status: snapshot.status,
            elapsed_secs: snapshot.elapsed_secs,
            error: snapshot.error.clone(),
        });
        self.status_tx.send_replace(snapshot);
    }

    /// Enter `error` and schedule the return to idle.
    fn fail(self: &Arc<Self>, reason: &str) {
        if self.lock().fail(reason).is_err() {
            // Abandoned meanwhile.
            return;
        }
        let epoch = self.error_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(error = reason, "Recorder error");
        self.publish();

        let shared = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(shared.error_display).await;
            if shared.error_epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            let cleared = shared.lock().clear_error();
            if cleared {
                debug!("Recorder error cleared");
                shared.publish();
            }
        });
    }
}

struct Control {
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<Option<Message>>>,
}

pub struct VoiceRecorder {
    source: Arc<dyn AudioSource>,
    pipeline: AttachmentPipeline,
    constraints: CaptureConstraints,
    shared: Arc<Shared>,
    control: tokio::sync::Mutex<Option<Control>>,
}

impl VoiceRecorder {
    pub fn new(
        source: Arc<dyn AudioSource>,
        pipeline: AttachmentPipeline,
        events: EventBus,
        error_display: Duration,
    ) -> Self {
        let session = RecordingSession::new();
        let (status_tx, _) = watch::channel(RecorderSnapshot::of(&session));
        Self {
            source,
            pipeline,
            constraints: CaptureConstraints::default(),
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                status_tx,
                events,
                error_display,
                error_epoch: AtomicU64::new(0),
            }),
            control: tokio::sync::Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> RecorderSnapshot {
        self.shared.status_tx.borrow().clone()
    }

    pub fn status(&self) -> RecorderStatus {
        self.shared.lock().status()
    }

    pub fn subscribe(&self) -> watch::Receiver<RecorderSnapshot> {
        self.shared.status_tx.subscribe()
    }

    /// Press gesture: open the microphone and start recording for the
    /// active conversation. Ignored while a session is active.
    pub async fn press(&self) -> Result<()> {
        let mut control = self.control.lock().await;
        // The clip goes to the conversation it was recorded in.
        let ticket = self
            .pipeline
            .active_ticket()
            .ok_or_else(|| MurmurError::Validation("no conversation selected".into()))?;
        {
            let mut session = self.shared.lock();
            if session.status().is_busy() {
                debug!(status = ?session.status(), "Press ignored, recorder busy");
                return Ok(());
            }
            if let Err(e) = session.begin() {
                debug!(error = %e, "Press ignored");
                return Ok(());
            }
        }

        let stream = match self.source.request_stream(&self.constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                let reason = match &e {
                    CaptureError::PermissionDenied => DENIED_TEXT,
                    _ => DEVICE_TEXT,
                };
                self.shared.fail(reason);
                return Err(e.into());
            }
        };

        info!(format = ?stream.format(), "Recording started");
        self.shared.publish();

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run_capture(
            self.shared.clone(),
            self.pipeline.clone(),
            ticket,
            stream,
            stop_rx,
        ));
        *control = Some(Control {
            stop: stop_tx,
            task,
        });
        Ok(())
    }

    /// Release gesture: stop, encode and send. Returns the sent message,
    /// or `None` when nothing was being recorded.
    pub async fn release(&self) -> Result<Option<Message>> {
        let Some(control) = self.control.lock().await.take() else {
            debug!("Release with no active recording");
            return Ok(None);
        };
        // The task may already have stopped at the ceiling.
        let _ = control.stop.send(());
        control
            .task
            .await
            .map_err(|e| MurmurError::Capture(format!("recording task failed: {e}")))?
    }

    /// Drop whatever is in progress without sending it.
    pub async fn cancel(&self) {
        if let Some(control) = self.control.lock().await.take() {
            control.task.abort();
        }
        let from = self.shared.lock().abandon();
        if from.is_busy() {
            info!(from = ?from, "Recording cancelled");
            self.shared.publish();
        }
    }
}

async fn run_capture(
    shared: Arc<Shared>,
    pipeline: AttachmentPipeline,
    ticket: Ticket,
    mut stream: AudioStream,
    mut stop_rx: oneshot::Receiver<()>,
) -> Result<Option<Message>> {
    let period = Duration::from_millis(RECORDING_TICK_MS);
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                debug!("Recording released");
                break;
            }
            _ = ticker.tick() => {
                let tick = shared.lock().tick();
                match tick {
                    Tick::Continue(_) => shared.publish(),
                    Tick::CeilingReached => {
                        info!("Recording ceiling reached");
                        break;
                    }
                    Tick::Idle => return Ok(None),
                }
            }
            chunk = stream.next_chunk() => match chunk {
                Some(chunk) => shared.lock().push_chunk(chunk),
                None => {
                    warn!("Capture stream ended");
                    break;
                }
            },
        }
    }

    let format = stream.format();
    let rest = stream.stop();
    let (chunks, elapsed) = {
        let mut session = shared.lock();
        for chunk in rest {
            session.push_chunk(chunk);
        }
        let elapsed = session.elapsed_secs();
        match session.stop() {
            Ok(chunks) => (chunks, elapsed),
            Err(_) => return Ok(None),
        }
    };
    shared.publish();

    let encoded = tokio::task::spawn_blocking(move || encode_wav(&chunks, format)).await;
    let clip = match encoded {
        Ok(Ok(clip)) => clip,
        Ok(Err(e)) => {
            shared.fail(PROCESSING_TEXT);
            return Err(MurmurError::Capture(e.to_string()));
        }
        Err(e) => {
            shared.fail(PROCESSING_TEXT);
            return Err(MurmurError::Capture(format!("encoding task failed: {e}")));
        }
    };
    debug!(bytes = clip.bytes.len(), duration_ms = clip.duration_ms, "Clip encoded");

    if shared.lock().begin_sending().is_err() {
        return Ok(None);
    }
    shared.publish();

    let name = format!("voice-{}.wav", Utc::now().timestamp_millis());
    let pending = PendingAttachment::from_clip(clip, name);
    match pipeline
        .send_with_text_to(&ticket, pending, voice_text(u64::from(elapsed)))
        .await
    {
        Ok(message) => {
            if shared.lock().finish().is_ok() {
                shared.publish();
            }
            info!(msg_id = %message.id, elapsed, "Voice message sent");
            Ok(Some(message))
        }
        Err(e) => {
            shared.fail(SEND_TEXT);
            Err(e)
        }
    }
}
