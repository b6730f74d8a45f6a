use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{info, warn};
use worker_proto::{ProtocolVersion, SessionId};

use crate::error::errno;
use crate::handler::{Handler, Request, Response};
use crate::request::RequestStream;
use crate::response::ResponseStream;

/// Owns the live session table. All mutation happens from the event-loop
/// thread that drives `on_invoke`/`on_chunk`/`on_choke`/`on_error`, so no
/// locking is needed here.
pub struct SessionManager {
    sessions: HashMap<SessionId, Arc<RequestStream>>,
    handlers: HashMap<String, Arc<dyn Handler>>,
    protocol: ProtocolVersion,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

impl SessionManager {
    pub fn new(
        protocol: ProtocolVersion,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            handlers: HashMap::new(),
            protocol,
            outbound,
        }
    }

    pub fn register(&mut self, event: impl Into<String>, handler: Arc<dyn Handler>) {
        let event = event.into();
        info!("registering handler for event {event}");
        self.handlers.insert(event.clone(), handler);
        info!("handler for event {event} has been attached");
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Constructs the request/response streams, looks up the handler
    /// (falling back to the ENOHANDLER responder), inserts into the session
    /// table, then spawns the handler as a task with a completion trap
    /// attached.
    pub fn on_invoke(&mut self, session: SessionId, event: String) {
        if self.sessions.contains_key(&session) {
            warn!(session, "duplicate invoke for a live session, refusing");
            let response =
                ResponseStream::new(session, self.protocol, self.outbound.clone());
            response.error(
                errno::EINVFAILED,
                &format!("session {session} is already live"),
            );
            response.close();
            return;
        }

        let request = Arc::new(RequestStream::new());
        let response = Arc::new(ResponseStream::new(
            session,
            self.protocol,
            self.outbound.clone(),
        ));
        let handler = self.handlers.get(&event).cloned();

        self.sessions.insert(session, request.clone());

        tokio::spawn(run_session(handler, event, request, response));
    }

    pub fn on_chunk(&mut self, session: SessionId, data: Bytes) {
        match self.sessions.get(&session) {
            Some(request) => request.push(data),
            None => warn!(session, "chunk for unknown session, dropping"),
        }
    }

    pub fn on_choke(&mut self, session: SessionId) {
        if let Some(request) = self.sessions.remove(&session) {
            request.close();
        }
    }

    pub fn on_error(&mut self, session: SessionId, errno: i64, reason: String) {
        if let Some(request) = self.sessions.remove(&session) {
            request.error(errno, reason);
            request.close();
        }
    }
}

/// Runs the handler task and attaches the completion trap: any completion —
/// success, an error return, or a panic — guarantees a terminal response
/// frame. `tokio::spawn`'s `JoinHandle` is how a Rust task surfaces a panic.
async fn run_session(
    handler: Option<Arc<dyn Handler>>,
    event: String,
    request: Request,
    response: Response,
) {
    let Some(handler) = handler else {
        response.error(
            errno::ENOHANDLER,
            &format!("there is no handler for event {event}"),
        );
        response.close();
        return;
    };

    let task_response = response.clone();
    let join = tokio::spawn(async move {
        handler.call(request, task_response).await;
    });

    if let Err(err) = join.await {
        response.error(errno::EUNCAUGHTEXCEPTION, &err.to_string());
    }

    if !response.is_closed() {
        response.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use worker_proto::{Decoder, ProtocolVersion, RawMessage, decode_v1};

    use super::SessionManager;
    use crate::handler::{Handler, Request, Response};

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn call(&self, request: Request, response: Response) {
            let mut buf = Vec::new();
            loop {
                match request.read(None).await {
                    Ok(chunk) => buf.extend_from_slice(&chunk),
                    Err(_) => break,
                }
            }
            response.write(bytes::Bytes::from(buf));
            response.close();
        }
    }

    struct Boom;

    #[async_trait]
    impl Handler for Boom {
        async fn call(&self, request: Request, _response: Response) {
            let _ = request.read(None).await;
            panic!("handler exploded");
        }
    }

    async fn drain(
        rx: &mut mpsc::UnboundedReceiver<Vec<u8>>
    ) -> Vec<RawMessage> {
        let mut out = Vec::new();
        while let Ok(Some(bytes)) =
            tokio::time::timeout(Duration::from_secs(1), rx.recv()).await
        {
            let mut decoder = Decoder::new();
            decoder.feed(&bytes);
            let value = decoder.next_value().unwrap().unwrap();
            out.push(decode_v1(&value).unwrap());
            if rx.is_empty() {
                break;
            }
        }
        out
    }

    #[tokio::test]
    async fn happy_invoke_echoes_concatenated_chunks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut manager = SessionManager::new(ProtocolVersion::V1, tx);
        manager.register("echo", Arc::new(Echo));

        manager.on_invoke(17, "echo".to_string());
        manager.on_chunk(17, bytes::Bytes::from_static(b"he"));
        manager.on_chunk(17, bytes::Bytes::from_static(b"llo"));
        manager.on_choke(17);

        let frames = drain(&mut rx).await;
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], RawMessage::V1 { type_id: 4, .. }));
        assert!(matches!(&frames[1], RawMessage::V1 { type_id: 6, .. }));
    }

    #[tokio::test]
    async fn missing_handler_emits_enohandler_then_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut manager = SessionManager::new(ProtocolVersion::V1, tx);

        manager.on_invoke(5, "foo".to_string());

        let frames = drain(&mut rx).await;
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], RawMessage::V1 { type_id: 5, .. }));
        assert!(matches!(&frames[1], RawMessage::V1 { type_id: 6, .. }));
    }

    #[tokio::test]
    async fn handler_panic_emits_euncaughtexception_then_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut manager = SessionManager::new(ProtocolVersion::V1, tx);
        manager.register("boom", Arc::new(Boom));

        manager.on_invoke(9, "boom".to_string());
        manager.on_chunk(9, bytes::Bytes::from_static(b"x"));

        let frames = drain(&mut rx).await;
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], RawMessage::V1 { type_id: 5, .. }));
        assert!(matches!(&frames[1], RawMessage::V1 { type_id: 6, .. }));
    }

    #[tokio::test]
    async fn chunk_for_unknown_session_is_dropped_not_fatal() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut manager = SessionManager::new(ProtocolVersion::V1, tx);
        manager.on_chunk(123, bytes::Bytes::from_static(b"x"));
        assert_eq!(manager.session_count(), 0);
    }
}
