use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::queue::AsyncQueue;

enum Item {
    Chunk(Bytes),
    Error { errno: i64, reason: String },
    EndOfStream,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("upstream error {errno}: {reason}")]
    Upstream { errno: i64, reason: String },
    #[error("end of stream")]
    EndOfStream,
    #[error("timed out waiting for the next chunk")]
    Timeout,
}

/// Per-session inbound channel. The dispatcher pushes `Bytes | Error |
/// EndOfStream` items; the handler drains them with `read`.
///
/// Invariant: once an `EndOfStream` or error item has been consumed no
/// further item is ever read — the queue is append-only then drained, and
/// callers are expected to stop reading once they observe either.
pub struct RequestStream {
    queue: AsyncQueue<Item>,
}

impl RequestStream {
    pub fn new() -> Self {
        Self { queue: AsyncQueue::new() }
    }

    /// `timeout = None` waits forever; `Some(d)` is a deadline. Documented
    /// here as a proper `Option` rather than carried as a silent overload
    /// on a numeric zero.
    pub async fn read(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Bytes, RequestError> {
        match self.queue.get(timeout).await {
            Ok(Item::Chunk(bytes)) => Ok(bytes),
            Ok(Item::Error { errno, reason }) => {
                Err(RequestError::Upstream { errno, reason })
            }
            Ok(Item::EndOfStream) => Err(RequestError::EndOfStream),
            Err(_) => Err(RequestError::Timeout),
        }
    }

    pub fn push(&self, data: Bytes) {
        self.queue.put_nowait(Item::Chunk(data));
    }

    pub fn error(&self, errno: i64, reason: impl Into<String>) {
        self.queue.put_nowait(Item::Error { errno, reason: reason.into() });
    }

    pub fn done(&self) {
        self.queue.put_nowait(Item::EndOfStream);
    }

    /// Alias used by the session manager on CHOKE.
    pub fn close(&self) {
        self.done();
    }
}

impl Default for RequestStream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;

    use super::{RequestError, RequestStream};

    #[tokio::test]
    async fn reads_chunks_in_arrival_order() {
        let stream = RequestStream::new();
        stream.push(Bytes::from_static(b"he"));
        stream.push(Bytes::from_static(b"llo"));
        stream.done();

        assert_eq!(stream.read(None).await.unwrap(), Bytes::from_static(b"he"));
        assert_eq!(
            stream.read(None).await.unwrap(),
            Bytes::from_static(b"llo")
        );
        assert_eq!(stream.read(None).await.unwrap_err(), RequestError::EndOfStream);
    }

    #[tokio::test]
    async fn error_then_done_is_observed_in_that_order() {
        let stream = RequestStream::new();
        stream.error(13, "boom");
        stream.done();

        assert_eq!(
            stream.read(None).await.unwrap_err(),
            RequestError::Upstream { errno: 13, reason: "boom".into() }
        );
        assert_eq!(stream.read(None).await.unwrap_err(), RequestError::EndOfStream);
    }

    #[tokio::test]
    async fn read_times_out_when_nothing_is_pushed() {
        let stream = RequestStream::new();
        let result = stream.read(Some(Duration::from_millis(20))).await;
        assert_eq!(result.unwrap_err(), RequestError::Timeout);
    }

    #[tokio::test]
    async fn handler_can_await_a_chunk_pushed_later() {
        let stream = Arc::new(RequestStream::new());
        let pusher = stream.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            pusher.push(Bytes::from_static(b"late"));
        });

        let chunk = stream.read(Some(Duration::from_secs(2))).await.unwrap();
        assert_eq!(chunk, Bytes::from_static(b"late"));
    }
}
