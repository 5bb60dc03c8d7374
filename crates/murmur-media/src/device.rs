//! Microphone capture through `cpal`.
//!
//! `cpal::Stream` is not `Send`, so each capture owns a dedicated thread
//! that builds the stream, keeps it alive while the stream's active flag is
//! set, and drops it afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use murmur_shared::constants::CAPTURE_CHUNK_MS;

use crate::capture::{AudioChunk, AudioSource, AudioStream, CaptureConstraints, CaptureError};
use crate::clip::AudioFormat;

/// The host's default input device.
#[derive(Debug, Clone, Default)]
pub struct CpalSource;

impl CpalSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AudioSource for CpalSource {
    async fn request_stream(&self, constraints: &CaptureConstraints) -> Result<AudioStream, CaptureError> {
        if constraints.echo_cancellation || constraints.noise_suppression {
            debug!("Echo cancellation / noise suppression are not available through cpal");
        }

        let format = constraints.format();
        let (chunk_tx, chunk_rx) = mpsc::channel::<AudioChunk>(64);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), CaptureError>>();
        let active = Arc::new(AtomicBool::new(true));
        let running = active.clone();

        std::thread::Builder::new()
            .name("murmur-capture".into())
            .spawn(move || run_capture(format, chunk_tx, ready_tx, running))
            .map_err(|e| CaptureError::DeviceError(e.to_string()))?;

        ready_rx
            .await
            .map_err(|_| CaptureError::StreamError("capture thread exited".into()))??;

        Ok(AudioStream::new(format, chunk_rx, active))
    }
}

fn run_capture(
    format: AudioFormat,
    chunk_tx: mpsc::Sender<AudioChunk>,
    ready_tx: oneshot::Sender<Result<(), CaptureError>>,
    active: Arc<AtomicBool>,
) {
    let stream = match build_stream(format, chunk_tx, active.clone()) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(CaptureError::StreamError(e.to_string())));
        return;
    }
    let _ = ready_tx.send(Ok(()));
    debug!("Audio capture started");

    while active.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(20));
    }
    drop(stream);
    debug!("Audio capture thread finished");
}

fn build_stream(
    format: AudioFormat,
    chunk_tx: mpsc::Sender<AudioChunk>,
    active: Arc<AtomicBool>,
) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(CaptureError::NoInputDevice)?;

    info!(device = ?device.name(), "Using input device");

    let config = cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let chunk_len =
        (format.sample_rate as usize * CAPTURE_CHUNK_MS as usize / 1000) * format.channels as usize;
    let mut buffer = Vec::with_capacity(chunk_len);

    device
        .build_input_stream(
            &config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                if !active.load(Ordering::Relaxed) {
                    return;
                }
                buffer.extend_from_slice(data);
                while buffer.len() >= chunk_len {
                    let samples: Vec<f32> = buffer.drain(..chunk_len).collect();
                    if chunk_tx.try_send(AudioChunk { samples }).is_err() {
                        warn!("Audio chunk channel full, dropping chunk");
                    }
                }
            },
            move |err| {
                error!("Audio input error: {err}");
            },
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => CaptureError::NoInputDevice,
            other => CaptureError::StreamError(other.to_string()),
        })
}
