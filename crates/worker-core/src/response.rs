use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, error};
use worker_proto::{ProtocolVersion, SessionId, encode_choke, encode_chunk, encode_error};

/// Per-session outbound channel. Chunks, the terminal error, and the
/// terminal close are encoded here and handed to the worker's single
/// outbound sender, which serialises them onto the socket in send order.
///
/// Invariant: at most one terminal (`error` or `close`) is ever emitted;
/// later calls — including a late `write` — are no-ops.
pub struct ResponseStream {
    session: SessionId,
    protocol: ProtocolVersion,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    closed: AtomicBool,
}

impl ResponseStream {
    pub fn new(
        session: SessionId,
        protocol: ProtocolVersion,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Self {
        Self { session, protocol, outbound, closed: AtomicBool::new(false) }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Emits a CHUNK. A no-op, logged at debug, once the stream is closed —
    /// this keeps a handler that writes after a late injected error from
    /// crashing.
    pub fn write(&self, data: impl Into<Bytes>) {
        if self.is_closed() {
            debug!(session = self.session, "write on closed response stream, ignoring");
            return;
        }

        let data = data.into();
        match encode_chunk(self.protocol, self.session, &data) {
            Ok(frame) => self.send(frame),
            Err(err) => error!(
                session = self.session,
                "failed to encode chunk: error={}", err
            ),
        }
    }

    /// Emits ERROR and marks the stream closed. A no-op if already closed.
    pub fn error(&self, errno: i64, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        match encode_error(self.protocol, self.session, errno, reason) {
            Ok(frame) => self.send(frame),
            Err(err) => error!(
                session = self.session,
                "failed to encode error frame: error={}", err
            ),
        }
    }

    /// Emits CHOKE and marks the stream closed. A no-op if already closed.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        match encode_choke(self.protocol, self.session) {
            Ok(frame) => self.send(frame),
            Err(err) => error!(
                session = self.session,
                "failed to encode choke frame: error={}", err
            ),
        }
    }

    fn send(&self, frame: Vec<u8>) {
        if self.outbound.send(frame).is_err() {
            debug!(
                session = self.session,
                "outbound channel closed, dropping frame"
            );
        }
    }
}
