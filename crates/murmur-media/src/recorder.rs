//! Recorder state machine.
//!
//! ```text
//! idle -> recording -> processing -> sending -> idle
//!            |             |            |
//!            +-----------> error <------+      (error -> idle after a delay)
//! ```
//!
//! The machine is synchronous and owns no timers; the async driver feeds it
//! one [`RecordingSession::tick`] per second and acts on the result.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use murmur_shared::constants::MAX_RECORDING_SECS;

use crate::capture::AudioChunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderStatus {
    Idle,
    Recording,
    Processing,
    Sending,
    Error,
}

impl RecorderStatus {
    pub fn is_busy(&self) -> bool {
        !matches!(self, RecorderStatus::Idle)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RecorderError {
    #[error("Cannot {action} while {from:?}")]
    InvalidTransition {
        from: RecorderStatus,
        action: &'static str,
    },
}

/// Outcome of one timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Still recording; elapsed seconds so far.
    Continue(u32),
    /// The hard ceiling was reached and the caller must stop now.
    CeilingReached,
    /// Not recording; the tick was ignored.
    Idle,
}

#[derive(Debug)]
pub struct RecordingSession {
    status: RecorderStatus,
    elapsed_secs: u32,
    chunks: Vec<AudioChunk>,
    error: Option<String>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            status: RecorderStatus::Idle,
            elapsed_secs: 0,
            chunks: Vec::new(),
            error: None,
        }
    }

    pub fn status(&self) -> RecorderStatus {
        self.status
    }

    pub fn elapsed_secs(&self) -> u32 {
        self.elapsed_secs
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// `idle -> recording`. Rejected from every other state.
    pub fn begin(&mut self) -> Result<(), RecorderError> {
        self.expect(RecorderStatus::Idle, "start recording")?;
        self.status = RecorderStatus::Recording;
        self.elapsed_secs = 0;
        self.chunks.clear();
        self.error = None;
        debug!("Recorder: idle -> recording");
        Ok(())
    }

    /// Accumulate a captured chunk. Ignored unless recording.
    pub fn push_chunk(&mut self, chunk: AudioChunk) {
        if self.status == RecorderStatus::Recording && !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    pub fn tick(&mut self) -> Tick {
        if self.status != RecorderStatus::Recording {
            return Tick::Idle;
        }
        self.elapsed_secs = (self.elapsed_secs + 1).min(MAX_RECORDING_SECS);
        if self.elapsed_secs >= MAX_RECORDING_SECS {
            Tick::CeilingReached
        } else {
            Tick::Continue(self.elapsed_secs)
        }
    }

    /// `recording -> processing`. Hands back the accumulated chunks.
    pub fn stop(&mut self) -> Result<Vec<AudioChunk>, RecorderError> {
        self.expect(RecorderStatus::Recording, "stop")?;
        self.status = RecorderStatus::Processing;
        debug!(elapsed = self.elapsed_secs, chunks = self.chunks.len(), "Recorder: recording -> processing");
        Ok(std::mem::take(&mut self.chunks))
    }

    /// `processing -> sending`.
    pub fn begin_sending(&mut self) -> Result<(), RecorderError> {
        self.expect(RecorderStatus::Processing, "send")?;
        self.status = RecorderStatus::Sending;
        Ok(())
    }

    /// `sending -> idle`.
    pub fn finish(&mut self) -> Result<(), RecorderError> {
        self.expect(RecorderStatus::Sending, "finish")?;
        self.reset();
        Ok(())
    }

    /// `recording | processing | sending -> error`.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), RecorderError> {
        match self.status {
            RecorderStatus::Recording | RecorderStatus::Processing | RecorderStatus::Sending => {
                self.status = RecorderStatus::Error;
                self.chunks.clear();
                self.error = Some(reason.into());
                debug!(error = ?self.error, "Recorder: -> error");
                Ok(())
            }
            from => Err(RecorderError::InvalidTransition { from, action: "fail" }),
        }
    }

    /// `error -> idle`. A no-op (returning false) if the status has already
    /// moved on.
    pub fn clear_error(&mut self) -> bool {
        if self.status == RecorderStatus::Error {
            self.reset();
            true
        } else {
            false
        }
    }

    /// Drop the session from any state, e.g. when the view closes mid-capture.
    pub fn abandon(&mut self) -> RecorderStatus {
        let from = self.status;
        if from != RecorderStatus::Idle {
            debug!(from = ?from, "Recorder: abandoned");
        }
        self.reset();
        from
    }

    fn reset(&mut self) {
        self.status = RecorderStatus::Idle;
        self.elapsed_secs = 0;
        self.chunks.clear();
        self.error = None;
    }

    fn expect(&self, wanted: RecorderStatus, action: &'static str) -> Result<(), RecorderError> {
        if self.status == wanted {
            Ok(())
        } else {
            Err(RecorderError::InvalidTransition {
                from: self.status,
                action,
            })
        }
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}
