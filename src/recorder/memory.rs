use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use uuid::Uuid;

use super::{
    ChunkStream, RecorderError, RecorderResult, RecordingStatus, ResponseRecorder,
};

struct RecordingState {
    chunks: Vec<Bytes>,
    status: RecordingStatus,
}

struct Recording {
    state: Arc<Mutex<RecordingState>>,
    /// Version bump wakes replayers following the live recording.
    notify: watch::Sender<u64>,
}

/// In-process recorder: a mutex-guarded map of live recordings, with a
/// watch channel per recording to wake replayers. Single-node only.
#[derive(Default)]
pub struct MemoryRecorder {
    recordings: DashMap<Uuid, Arc<Recording>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(recording: &Recording) {
        recording.notify.send_modify(|v| *v += 1);
    }
}

#[async_trait]
impl ResponseRecorder for MemoryRecorder {
    async fn start(&self, conversation_id: Uuid) -> RecorderResult<()> {
        let (notify, _) = watch::channel(0u64);
        let recording = Arc::new(Recording {
            state: Arc::new(Mutex::new(RecordingState {
                chunks: Vec::new(),
                status: RecordingStatus::Active,
            })),
            notify,
        });
        // A new recording supersedes the previous epoch for this
        // conversation; late replayers of the old one drain and end.
        self.recordings.insert(conversation_id, recording);
        Ok(())
    }

    async fn append(&self, conversation_id: Uuid, chunk: Bytes) -> RecorderResult<()> {
        let recording = self
            .recordings
            .get(&conversation_id)
            .ok_or(RecorderError::NotActive)?;
        {
            let mut state = recording.state.lock();
            match state.status {
                RecordingStatus::Active => state.chunks.push(chunk),
                RecordingStatus::Cancelled => return Err(RecorderError::Cancelled),
                _ => return Err(RecorderError::NotActive),
            }
        }
        Self::bump(&recording);
        Ok(())
    }

    async fn complete(&self, conversation_id: Uuid) -> RecorderResult<()> {
        let recording = self
            .recordings
            .get(&conversation_id)
            .ok_or(RecorderError::NotActive)?;
        {
            let mut state = recording.state.lock();
            if state.status == RecordingStatus::Active {
                state.status = RecordingStatus::Completed;
            }
        }
        Self::bump(&recording);
        Ok(())
    }

    async fn fail(&self, conversation_id: Uuid) -> RecorderResult<()> {
        let recording = self
            .recordings
            .get(&conversation_id)
            .ok_or(RecorderError::NotActive)?;
        {
            let mut state = recording.state.lock();
            if state.status == RecordingStatus::Active {
                state.status = RecordingStatus::Failed;
            }
        }
        Self::bump(&recording);
        Ok(())
    }

    async fn cancel(&self, conversation_id: Uuid) -> RecorderResult<()> {
        if let Some(recording) = self.recordings.get(&conversation_id) {
            {
                let mut state = recording.state.lock();
                if state.status == RecordingStatus::Active {
                    state.status = RecordingStatus::Cancelled;
                }
            }
            Self::bump(&recording);
        }
        // No recording: still success.
        Ok(())
    }

    async fn replay(&self, conversation_id: Uuid) -> RecorderResult<Option<ChunkStream>> {
        let Some(recording) = self.recordings.get(&conversation_id) else {
            return Ok(None);
        };
        let state = Arc::clone(&recording.state);
        let rx = recording.notify.subscribe();

        // Always from offset 0; follow live until terminal.
        let stream = futures_util::stream::unfold(
            (state, rx, 0usize),
            |(state, mut rx, index)| async move {
                loop {
                    let next = {
                        let guard = state.lock();
                        if index < guard.chunks.len() {
                            Some(guard.chunks[index].clone())
                        } else if guard.status.is_terminal() {
                            return None;
                        } else {
                            None
                        }
                    };
                    match next {
                        Some(chunk) => {
                            return Some((Ok(chunk), (state, rx, index + 1)));
                        }
                        None => {
                            // Wait for an append or a status change.
                            if rx.changed().await.is_err() {
                                return None;
                            }
                        }
                    }
                }
            },
        );
        Ok(Some(stream.boxed()))
    }

    async fn check_recordings(&self, conversation_ids: &[Uuid]) -> RecorderResult<Vec<Uuid>> {
        Ok(conversation_ids
            .iter()
            .filter(|id| {
                self.recordings
                    .get(id)
                    .is_some_and(|r| r.state.lock().status == RecordingStatus::Active)
            })
            .copied()
            .collect())
    }
}
