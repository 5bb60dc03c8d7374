use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use murmur_shared::constants::{CAPTURE_CHUNK_MS, CAPTURE_SAMPLE_RATE};
use murmur_shared::MurmurError;

use crate::clip::AudioFormat;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Microphone access denied")]
    PermissionDenied,

    #[error("No input device available")]
    NoInputDevice,

    #[error("Audio device error: {0}")]
    DeviceError(String),

    #[error("Audio stream error: {0}")]
    StreamError(String),
}

impl From<CaptureError> for MurmurError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::PermissionDenied => MurmurError::PermissionDenied(e.to_string()),
            other => MurmurError::Capture(other.to_string()),
        }
    }
}

/// What the recorder asks of the microphone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            sample_rate: CAPTURE_SAMPLE_RATE,
            channels: 1,
        }
    }
}

impl CaptureConstraints {
    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

/// A slice of interleaved samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
}

impl AudioChunk {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A live capture. Chunks arrive on a bounded queue; the device stops when
/// [`AudioStream::stop`] is called or the stream is dropped.
#[derive(Debug)]
pub struct AudioStream {
    format: AudioFormat,
    chunks: mpsc::Receiver<AudioChunk>,
    active: Arc<AtomicBool>,
}

impl AudioStream {
    pub fn new(format: AudioFormat, chunks: mpsc::Receiver<AudioChunk>, active: Arc<AtomicBool>) -> Self {
        Self {
            format,
            chunks,
            active,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Next captured chunk, or `None` once the producer has gone away.
    pub async fn next_chunk(&mut self) -> Option<AudioChunk> {
        self.chunks.recv().await
    }

    /// Stop the device and return whatever was still queued.
    pub fn stop(&mut self) -> Vec<AudioChunk> {
        self.active.store(false, Ordering::SeqCst);
        self.chunks.close();
        let mut rest = Vec::new();
        while let Ok(chunk) = self.chunks.try_recv() {
            rest.push(chunk);
        }
        debug!(remaining = rest.len(), "Audio stream stopped");
        rest
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn request_stream(&self, constraints: &CaptureConstraints) -> Result<AudioStream, CaptureError>;
}

/// Generates a sine tone paced on the tokio clock, one chunk every
/// [`CAPTURE_CHUNK_MS`]. Stands in for a microphone where no device
/// backend is compiled in.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    frequency_hz: f32,
    deny: bool,
}

impl SyntheticSource {
    pub fn tone(frequency_hz: f32) -> Self {
        Self {
            frequency_hz,
            deny: false,
        }
    }

    /// A source whose every request is refused.
    pub fn denied() -> Self {
        Self {
            frequency_hz: 0.0,
            deny: true,
        }
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::tone(440.0)
    }
}

#[async_trait]
impl AudioSource for SyntheticSource {
    async fn request_stream(&self, constraints: &CaptureConstraints) -> Result<AudioStream, CaptureError> {
        if self.deny {
            return Err(CaptureError::PermissionDenied);
        }
        if constraints.sample_rate == 0 || constraints.channels == 0 {
            return Err(CaptureError::DeviceError("unsupported capture format".into()));
        }

        let format = constraints.format();
        let frames_per_chunk = (format.sample_rate as usize * CAPTURE_CHUNK_MS as usize) / 1000;
        let channels = format.channels as usize;
        let step = 2.0 * std::f32::consts::PI * self.frequency_hz / format.sample_rate as f32;

        let (tx, rx) = mpsc::channel(64);
        let active = Arc::new(AtomicBool::new(true));
        let running = active.clone();

        tokio::spawn(async move {
            let period = Duration::from_millis(CAPTURE_CHUNK_MS as u64);
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            let mut phase = 0.0f32;

            loop {
                ticker.tick().await;
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                let mut samples = Vec::with_capacity(frames_per_chunk * channels);
                for _ in 0..frames_per_chunk {
                    let value = 0.5 * phase.sin();
                    samples.extend(std::iter::repeat(value).take(channels));
                    phase = (phase + step) % (2.0 * std::f32::consts::PI);
                }
                if tx.send(AudioChunk { samples }).await.is_err() {
                    break;
                }
            }
        });

        info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            "Synthetic capture started"
        );
        Ok(AudioStream::new(format, rx, active))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_denied_source() {
        let err = SyntheticSource::denied()
            .request_stream(&CaptureConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::PermissionDenied));
        assert!(matches!(MurmurError::from(err), MurmurError::PermissionDenied(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthetic_chunks_are_100ms() {
        let mut stream = SyntheticSource::default()
            .request_stream(&CaptureConstraints::default())
            .await
            .unwrap();

        let chunk = stream.next_chunk().await.unwrap();
        assert_eq!(chunk.samples.len(), 4_410);
        assert!(chunk.samples.iter().all(|s| (-1.0..=1.0).contains(s)));

        stream.stop();
        assert!(!stream.is_active());
    }
}
