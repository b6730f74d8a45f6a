use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("timed out waiting for next item")]
pub struct Timeout;

/// Single-consumer FIFO queue: `put_nowait` never blocks and never fails
/// (producers may be many, the channel is unbounded); `get` blocks the one
/// consumer until an item arrives or an optional deadline elapses.
///
/// Only one task may call `get` at a time. A second concurrent `get` would
/// race the first for the receiver lock and is not a supported usage
/// pattern.
pub struct AsyncQueue<T> {
    sender: mpsc::UnboundedSender<T>,
    receiver: Mutex<mpsc::UnboundedReceiver<T>>,
}

impl<T> AsyncQueue<T> {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { sender, receiver: Mutex::new(receiver) }
    }

    /// Never blocks, never fails. If the consumer side has already been
    /// dropped the item is silently discarded — the session it belonged to
    /// is gone.
    pub fn put_nowait(&self, item: T) {
        let _ = self.sender.send(item);
    }

    /// `deadline = None` waits forever, matching the `Request` layer's
    /// `timeout=0` convention.
    pub async fn get(
        &self,
        deadline: Option<Duration>,
    ) -> Result<T, Timeout> {
        let mut receiver = self.receiver.lock().await;
        match deadline {
            None => receiver.recv().await.ok_or(Timeout),
            Some(dur) => match timeout(dur, receiver.recv()).await {
                Ok(Some(item)) => Ok(item),
                Ok(None) | Err(_) => Err(Timeout),
            },
        }
    }
}

impl<T> Default for AsyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
