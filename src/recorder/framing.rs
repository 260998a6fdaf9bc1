//! Rich-event framing: newline-delimited JSON events.
//!
//! Producers write events as JSON followed by `\n`, possibly fragmented
//! across chunks. On replay, [`line_buffered`] coalesces fragments back
//! into complete lines, emitting one event per line.

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};

use super::RecorderResult;

/// Wrap a chunk stream so it yields one complete line per item, without
/// the trailing newline. A trailing partial line (producer died
/// mid-event) is emitted as-is at end of stream.
pub fn line_buffered<S>(stream: S) -> impl Stream<Item = RecorderResult<Bytes>> + Send
where
    S: Stream<Item = RecorderResult<Bytes>> + Send + 'static,
{
    futures_util::stream::unfold(
        (Box::pin(stream), BytesMut::new(), false),
        |(mut stream, mut buffer, done)| async move {
            loop {
                // Drain any complete line already buffered.
                if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let mut line = buffer.split_to(pos + 1);
                    line.truncate(pos);
                    return Some((Ok(line.freeze()), (stream, buffer, done)));
                }
                if done {
                    if buffer.is_empty() {
                        return None;
                    }
                    let rest = buffer.split().freeze();
                    return Some((Ok(rest), (stream, buffer, true)));
                }
                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => return Some((Err(e), (stream, buffer, done))),
                    None => {
                        let (stream, buffer) = (stream, buffer);
                        // Mark exhausted; next loop iteration flushes.
                        return line_flush(stream, buffer).await;
                    }
                }
            }
        },
    )
}

type LineState<S> = (std::pin::Pin<Box<S>>, BytesMut, bool);

async fn line_flush<S>(
    stream: std::pin::Pin<Box<S>>,
    mut buffer: BytesMut,
) -> Option<(RecorderResult<Bytes>, LineState<S>)>
where
    S: Stream<Item = RecorderResult<Bytes>> + Send + 'static,
{
    if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let mut line = buffer.split_to(pos + 1);
        line.truncate(pos);
        return Some((Ok(line.freeze()), (stream, buffer, true)));
    }
    if buffer.is_empty() {
        return None;
    }
    let rest = buffer.split().freeze();
    Some((Ok(rest), (stream, buffer, true)))
}

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;

    async fn collect(chunks: Vec<&'static [u8]>) -> Vec<Bytes> {
        let input = stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(Bytes::from_static(c)))
                .collect::<Vec<RecorderResult<Bytes>>>(),
        );
        line_buffered(input).map(|l| l.unwrap()).collect().await
    }

    #[tokio::test]
    async fn whole_lines_pass_through() {
        let lines = collect(vec![b"{\"a\":1}\n", b"{\"b\":2}\n"]).await;
        assert_eq!(lines, vec![
            Bytes::from_static(b"{\"a\":1}"),
            Bytes::from_static(b"{\"b\":2}"),
        ]);
    }

    #[tokio::test]
    async fn fragmented_lines_are_coalesced() {
        let lines = collect(vec![b"{\"a\"", b":1}\n{\"b\":", b"2}\n"]).await;
        assert_eq!(lines, vec![
            Bytes::from_static(b"{\"a\":1}"),
            Bytes::from_static(b"{\"b\":2}"),
        ]);
    }

    #[tokio::test]
    async fn multiple_lines_in_one_chunk_split() {
        let lines = collect(vec![b"{\"a\":1}\n{\"b\":2}\n{\"c\":3}\n"]).await;
        assert_eq!(lines.len(), 3);
    }

    #[tokio::test]
    async fn trailing_partial_is_flushed() {
        let lines = collect(vec![b"{\"a\":1}\n{\"tr"]).await;
        assert_eq!(lines, vec![
            Bytes::from_static(b"{\"a\":1}"),
            Bytes::from_static(b"{\"tr"),
        ]);
    }

    #[tokio::test]
    async fn empty_stream_yields_nothing() {
        let lines = collect(vec![]).await;
        assert!(lines.is_empty());
    }
}
