//! Live response recording and resumption.
//!
//! While an agent streams a response, chunks are mirrored to a
//! replayable store keyed by conversation id. A disconnected client
//! replays from offset 0 of the current active recording; partial resume
//! is not supported. Chunks are forwarded one at a time; the full
//! response is never buffered ahead of the consumer.

mod framing;
mod memory;
mod noop;
#[cfg(feature = "redis")]
mod redis;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
pub use framing::line_buffered;
use futures_util::Stream;
pub use memory::MemoryRecorder;
pub use noop::NoopRecorder;
#[cfg(feature = "redis")]
pub use redis::RedisRecorder;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RecorderError {
    /// The recording was cancelled; the producer must stop writing.
    #[error("recording cancelled")]
    Cancelled,

    /// The recording is already in a terminal state.
    #[error("recording is not active")]
    NotActive,

    #[error("recorder backend error: {0}")]
    Backend(String),
}

pub type RecorderResult<T> = Result<T, RecorderError>;

/// Terminal and live states of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingStatus {
    Active,
    Completed,
    Cancelled,
    Failed,
}

impl RecordingStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecordingStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingStatus::Active => "active",
            RecordingStatus::Completed => "completed",
            RecordingStatus::Cancelled => "cancelled",
            RecordingStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for RecordingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RecordingStatus::Active),
            "completed" => Ok(RecordingStatus::Completed),
            "cancelled" => Ok(RecordingStatus::Cancelled),
            "failed" => Ok(RecordingStatus::Failed),
            _ => Err(format!("Invalid recording status: {}", s)),
        }
    }
}

/// Ordered chunk stream produced by replay.
pub type ChunkStream = Pin<Box<dyn Stream<Item = RecorderResult<Bytes>> + Send>>;

#[async_trait]
pub trait ResponseRecorder: Send + Sync {
    /// Begin a new recording for the conversation, superseding any prior
    /// recording (the new one is the current epoch).
    async fn start(&self, conversation_id: Uuid) -> RecorderResult<()>;

    /// Append one chunk. Returns [`RecorderError::Cancelled`] once the
    /// recording was cancelled so the producer stops on its next yield.
    async fn append(&self, conversation_id: Uuid, chunk: Bytes) -> RecorderResult<()>;

    /// Mark the recording completed.
    async fn complete(&self, conversation_id: Uuid) -> RecorderResult<()>;

    /// Mark the recording failed. Fails only the recording; the producer
    /// keeps streaming to its own client.
    async fn fail(&self, conversation_id: Uuid) -> RecorderResult<()>;

    /// Cancel the active recording. Idempotent: canceling a finished or
    /// missing recording succeeds.
    async fn cancel(&self, conversation_id: Uuid) -> RecorderResult<()>;

    /// Stream the current recording from offset 0, following live until
    /// the recording reaches a terminal state. `None` when the
    /// conversation has no recording.
    async fn replay(&self, conversation_id: Uuid) -> RecorderResult<Option<ChunkStream>>;

    /// Which of the given conversations currently have an ACTIVE
    /// recording.
    async fn check_recordings(&self, conversation_ids: &[Uuid]) -> RecorderResult<Vec<Uuid>>;
}
