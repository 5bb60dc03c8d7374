//! Finalises captured chunks into a single 16-bit PCM WAV clip.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::AudioChunk;

pub const WAV_MIME: &str = "audio/wav";

const BITS_PER_SAMPLE: u16 = 16;
const HEADER_LEN: usize = 44;

#[derive(Error, Debug)]
pub enum ClipError {
    #[error("Recording contains no audio")]
    Empty,

    #[error("Recording too long to encode: {0} samples")]
    TooLong(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone)]
pub struct EncodedClip {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub duration_ms: u64,
}

impl EncodedClip {
    /// Whole seconds, rounded to nearest.
    pub fn duration_secs(&self) -> u64 {
        (self.duration_ms + 500) / 1000
    }
}

pub fn encode_wav(chunks: &[AudioChunk], format: AudioFormat) -> Result<EncodedClip, ClipError> {
    let sample_count: usize = chunks.iter().map(|c| c.samples.len()).sum();
    if sample_count == 0 || format.channels == 0 || format.sample_rate == 0 {
        return Err(ClipError::Empty);
    }

    let data_len = sample_count * 2;
    if data_len > (u32::MAX as usize - HEADER_LEN) {
        return Err(ClipError::TooLong(sample_count));
    }

    let block_align = format.channels * (BITS_PER_SAMPLE / 8);
    let byte_rate = format.sample_rate * block_align as u32;

    let mut bytes = Vec::with_capacity(HEADER_LEN + data_len);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&((HEADER_LEN - 8 + data_len) as u32).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&format.channels.to_le_bytes());
    bytes.extend_from_slice(&format.sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&(data_len as u32).to_le_bytes());

    for sample in chunks.iter().flat_map(|c| c.samples.iter()) {
        let pcm = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        bytes.extend_from_slice(&pcm.to_le_bytes());
    }

    let frames = sample_count as u64 / format.channels as u64;
    let duration_ms = frames * 1000 / format.sample_rate as u64;

    Ok(EncodedClip {
        bytes,
        mime: WAV_MIME,
        duration_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MONO_8K: AudioFormat = AudioFormat {
        sample_rate: 8_000,
        channels: 1,
    };

    #[test]
    fn test_empty_recording_is_rejected() {
        assert!(matches!(encode_wav(&[], MONO_8K), Err(ClipError::Empty)));
        let silent = AudioChunk { samples: vec![] };
        assert!(matches!(encode_wav(&[silent], MONO_8K), Err(ClipError::Empty)));
    }

    #[test]
    fn test_header_and_duration() {
        let chunks = vec![
            AudioChunk {
                samples: vec![0.0; 4_000],
            },
            AudioChunk {
                samples: vec![1.0; 4_000],
            },
        ];
        let clip = encode_wav(&chunks, MONO_8K).unwrap();

        assert_eq!(&clip.bytes[0..4], b"RIFF");
        assert_eq!(&clip.bytes[8..12], b"WAVE");
        assert_eq!(&clip.bytes[36..40], b"data");
        assert_eq!(clip.bytes.len(), 44 + 16_000);
        assert_eq!(clip.duration_ms, 1_000);
        assert_eq!(clip.duration_secs(), 1);
        assert_eq!(clip.mime, "audio/wav");

        let last = i16::from_le_bytes([clip.bytes[clip.bytes.len() - 2], clip.bytes[clip.bytes.len() - 1]]);
        assert_eq!(last, i16::MAX);
    }

    #[test]
    fn test_stereo_duration_counts_frames() {
        let stereo = AudioFormat {
            sample_rate: 8_000,
            channels: 2,
        };
        let chunk = AudioChunk {
            samples: vec![0.25; 16_000],
        };
        let clip = encode_wav(&[chunk], stereo).unwrap();
        assert_eq!(clip.duration_ms, 1_000);
    }
}
