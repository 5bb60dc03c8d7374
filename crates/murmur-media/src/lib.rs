//! # murmur-media
//!
//! Voice-message plumbing: microphone capture behind the [`AudioSource`]
//! trait, clip finalisation to WAV, and the recorder state machine that
//! bounds a recording to thirty seconds.

pub mod capture;
pub mod clip;
pub mod recorder;

#[cfg(feature = "cpal")]
pub mod device;

pub use capture::{AudioChunk, AudioSource, AudioStream, CaptureConstraints, CaptureError, SyntheticSource};
pub use clip::{encode_wav, AudioFormat, ClipError, EncodedClip};
pub use recorder::{RecorderError, RecorderStatus, RecordingSession, Tick};

#[cfg(feature = "cpal")]
pub use device::CpalSource;
