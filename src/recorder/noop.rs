use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use super::{ChunkStream, RecorderResult, ResponseRecorder};

/// Recording disabled: appends are discarded, cancel succeeds, replay
/// finds nothing.
#[derive(Default)]
pub struct NoopRecorder;

impl NoopRecorder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResponseRecorder for NoopRecorder {
    async fn start(&self, _conversation_id: Uuid) -> RecorderResult<()> {
        Ok(())
    }

    async fn append(&self, _conversation_id: Uuid, _chunk: Bytes) -> RecorderResult<()> {
        Ok(())
    }

    async fn complete(&self, _conversation_id: Uuid) -> RecorderResult<()> {
        Ok(())
    }

    async fn fail(&self, _conversation_id: Uuid) -> RecorderResult<()> {
        Ok(())
    }

    async fn cancel(&self, _conversation_id: Uuid) -> RecorderResult<()> {
        Ok(())
    }

    async fn replay(&self, _conversation_id: Uuid) -> RecorderResult<Option<ChunkStream>> {
        Ok(None)
    }

    async fn check_recordings(&self, _conversation_ids: &[Uuid]) -> RecorderResult<Vec<Uuid>> {
        Ok(Vec::new())
    }
}
