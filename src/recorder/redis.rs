use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use redis::{AsyncCommands, aio::MultiplexedConnection, streams::StreamRangeReply};
use uuid::Uuid;

use super::{
    ChunkStream, RecorderError, RecorderResult, RecordingStatus, ResponseRecorder,
};
use crate::config::RedisRecorderConfig;

/// How often replay polls for new chunks while the recording is live.
const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);

/// Redis-streams recorder for multi-replica deployments: chunks in a
/// stream per conversation, status in a companion key, both bounded by a
/// TTL. Replicas resolve recordings through Redis, so no locator
/// indirection is needed here.
pub struct RedisRecorder {
    conn: MultiplexedConnection,
    stream_ttl_secs: u64,
}

impl RedisRecorder {
    pub async fn connect(config: &RedisRecorderConfig) -> RecorderResult<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| RecorderError::Backend(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RecorderError::Backend(e.to_string()))?;
        Ok(Self {
            conn,
            stream_ttl_secs: config.stream_ttl_secs,
        })
    }

    fn status_key(conversation_id: Uuid) -> String {
        format!("engram:recording:{}:status", conversation_id)
    }

    fn chunks_key(conversation_id: Uuid) -> String {
        format!("engram:recording:{}:chunks", conversation_id)
    }

    async fn status(
        conn: &mut MultiplexedConnection,
        conversation_id: Uuid,
    ) -> RecorderResult<Option<RecordingStatus>> {
        let raw: Option<String> = conn
            .get(Self::status_key(conversation_id))
            .await
            .map_err(|e| RecorderError::Backend(e.to_string()))?;
        raw.map(|s| s.parse().map_err(RecorderError::Backend))
            .transpose()
    }

    async fn set_status(
        &self,
        conversation_id: Uuid,
        status: RecordingStatus,
    ) -> RecorderResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(
                Self::status_key(conversation_id),
                status.as_str(),
                self.stream_ttl_secs,
            )
            .await
            .map_err(|e| RecorderError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ResponseRecorder for RedisRecorder {
    async fn start(&self, conversation_id: Uuid) -> RecorderResult<()> {
        let mut conn = self.conn.clone();
        // A new recording supersedes the previous epoch's chunks.
        let _: () = conn
            .del(Self::chunks_key(conversation_id))
            .await
            .map_err(|e| RecorderError::Backend(e.to_string()))?;
        self.set_status(conversation_id, RecordingStatus::Active)
            .await
    }

    async fn append(&self, conversation_id: Uuid, chunk: Bytes) -> RecorderResult<()> {
        let mut conn = self.conn.clone();
        match Self::status(&mut conn, conversation_id).await? {
            Some(RecordingStatus::Active) => {}
            Some(RecordingStatus::Cancelled) => return Err(RecorderError::Cancelled),
            _ => return Err(RecorderError::NotActive),
        }
        let key = Self::chunks_key(conversation_id);
        let _: String = conn
            .xadd(&key, "*", &[("d", chunk.as_ref())])
            .await
            .map_err(|e| RecorderError::Backend(e.to_string()))?;
        let _: bool = conn
            .expire(&key, self.stream_ttl_secs as i64)
            .await
            .map_err(|e| RecorderError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn complete(&self, conversation_id: Uuid) -> RecorderResult<()> {
        self.set_status(conversation_id, RecordingStatus::Completed)
            .await
    }

    async fn fail(&self, conversation_id: Uuid) -> RecorderResult<()> {
        self.set_status(conversation_id, RecordingStatus::Failed)
            .await
    }

    async fn cancel(&self, conversation_id: Uuid) -> RecorderResult<()> {
        let mut conn = self.conn.clone();
        match Self::status(&mut conn, conversation_id).await? {
            Some(RecordingStatus::Active) => {
                self.set_status(conversation_id, RecordingStatus::Cancelled)
                    .await
            }
            // Finished or missing: still success.
            _ => Ok(()),
        }
    }

    async fn replay(&self, conversation_id: Uuid) -> RecorderResult<Option<ChunkStream>> {
        let mut conn = self.conn.clone();
        if Self::status(&mut conn, conversation_id).await?.is_none() {
            return Ok(None);
        }

        // Always from offset 0: page through the stream from "-",
        // polling while the recording is live.
        let stream = futures_util::stream::unfold(
            (conn, conversation_id, "-".to_string(), Vec::<Bytes>::new()),
            |(mut conn, conversation_id, last_id, mut queued)| async move {
                loop {
                    if let Some(chunk) = queued.pop() {
                        return Some((Ok(chunk), (conn, conversation_id, last_id, queued)));
                    }

                    let start = if last_id == "-" {
                        last_id.clone()
                    } else {
                        format!("({}", last_id)
                    };
                    let reply: Result<StreamRangeReply, _> = conn
                        .xrange(Self::chunks_key(conversation_id), start, "+")
                        .await;
                    let reply = match reply {
                        Ok(r) => r,
                        Err(e) => {
                            return Some((
                                Err(RecorderError::Backend(e.to_string())),
                                (conn, conversation_id, last_id, queued),
                            ));
                        }
                    };

                    if reply.ids.is_empty() {
                        let status = match Self::status(&mut conn, conversation_id).await {
                            Ok(s) => s,
                            Err(e) => {
                                return Some((
                                    Err(e),
                                    (conn, conversation_id, last_id, queued),
                                ));
                            }
                        };
                        match status {
                            Some(RecordingStatus::Active) => {
                                tokio::time::sleep(POLL_INTERVAL).await;
                                continue;
                            }
                            // Terminal or expired: end of replay.
                            _ => return None,
                        }
                    }

                    let mut new_last = last_id.clone();
                    // Reverse so pop() yields in stream order.
                    for entry in reply.ids.iter().rev() {
                        if let Some(value) = entry.map.get("d")
                            && let Ok(data) = redis::from_redis_value::<Vec<u8>>(value)
                        {
                            queued.push(Bytes::from(data));
                        }
                    }
                    if let Some(last_entry) = reply.ids.last() {
                        new_last = last_entry.id.clone();
                    }
                    let last_id = new_last;

                    if let Some(chunk) = queued.pop() {
                        return Some((Ok(chunk), (conn, conversation_id, last_id, queued)));
                    }
                }
            },
        );
        Ok(Some(stream.boxed()))
    }

    async fn check_recordings(&self, conversation_ids: &[Uuid]) -> RecorderResult<Vec<Uuid>> {
        let mut conn = self.conn.clone();
        let mut active = Vec::new();
        for id in conversation_ids {
            if Self::status(&mut conn, *id).await? == Some(RecordingStatus::Active) {
                active.push(*id);
            }
        }
        Ok(active)
    }
}
