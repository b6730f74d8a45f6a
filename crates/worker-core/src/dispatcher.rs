use bytes::Bytes;
use rmpv::Value;
use tracing::{debug, warn};
use worker_proto::{CONTROL_SESSION, ProtocolVersion, RawMessage, SessionId, rpc_id};

/// The internal event set every wire message normalises to, independent of
/// protocol version.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Heartbeat,
    Terminate { errno: i64, reason: String },
    Invoke { session: SessionId, event: String },
    Chunk { session: SessionId, data: Bytes },
    Choke { session: SessionId },
    Error { session: SessionId, errno: i64, reason: String },
}

/// Protocol-version-specific decoding into the internal event set. Holds
/// the `max_session_seen` watermark the v1 profile needs for its session-
/// ordering check; v0 carries no extra state.
pub struct Dispatcher {
    protocol: ProtocolVersion,
    max_session_seen: SessionId,
}

impl Dispatcher {
    pub fn new(protocol: ProtocolVersion) -> Self {
        Self { protocol, max_session_seen: 0 }
    }

    pub fn normalize(&mut self, raw: RawMessage) -> Option<Event> {
        match (self.protocol, raw) {
            (ProtocolVersion::V0, RawMessage::V0 { kind, session, args }) => {
                self.normalize_v0(kind, session, &args)
            }
            (ProtocolVersion::V1, RawMessage::V1 { session, type_id, payload }) => {
                self.normalize_v1(session, type_id, &payload)
            }
            _ => {
                warn!("frame shaped for the other protocol version, dropping");
                None
            }
        }
    }

    fn normalize_v0(
        &mut self,
        kind: i64,
        session: SessionId,
        args: &[Value],
    ) -> Option<Event> {
        match kind {
            rpc_id::HEARTBEAT => Some(Event::Heartbeat),
            rpc_id::TERMINATE => {
                let (errno, reason) = as_errno_reason(args, "v0 TERMINATE")?;
                Some(Event::Terminate { errno, reason })
            }
            rpc_id::INVOKE => {
                let event = as_str(args.first(), "v0 INVOKE event")?;
                Some(Event::Invoke { session, event })
            }
            rpc_id::CHUNK => {
                let data = as_bytes(args.first(), "v0 CHUNK data")?;
                Some(Event::Chunk { session, data })
            }
            rpc_id::CHOKE => Some(Event::Choke { session }),
            // v0 accepts and dispatches ERROR frames.
            rpc_id::ERROR => {
                let (errno, reason) = as_errno_reason(args, "v0 ERROR")?;
                Some(Event::Error { session, errno, reason })
            }
            other => {
                warn!(kind = other, "unknown v0 message kind, dropping");
                None
            }
        }
    }

    fn normalize_v1(
        &mut self,
        session: SessionId,
        type_id: i64,
        payload: &[Value],
    ) -> Option<Event> {
        if session == CONTROL_SESSION {
            return match type_id {
                rpc_id::HEARTBEAT => Some(Event::Heartbeat),
                rpc_id::TERMINATE => {
                    let (errno, reason) =
                        as_errno_reason(payload, "v1 TERMINATE")?;
                    Some(Event::Terminate { errno, reason })
                }
                other => {
                    debug!(type_id = other, "ignoring control frame");
                    None
                }
            };
        }

        if session > self.max_session_seen {
            if type_id != rpc_id::INVOKE {
                warn!(
                    session,
                    type_id, "new session must start with INVOKE, dropping"
                );
                return None;
            }

            self.max_session_seen = session;
            let event = as_str(payload.first(), "v1 INVOKE event")?;
            return Some(Event::Invoke { session, event });
        }

        match type_id {
            rpc_id::CHUNK => {
                let data = as_bytes(payload.first(), "v1 WRITE data")?;
                Some(Event::Chunk { session, data })
            }
            rpc_id::CHOKE => Some(Event::Choke { session }),
            rpc_id::ERROR => {
                let (errno, reason) = as_errno_reason(payload, "v1 ERROR")?;
                Some(Event::Error { session, errno, reason })
            }
            other => {
                warn!(session, type_id = other, "unknown v1 type id, dropping");
                None
            }
        }
    }
}

fn as_str(value: Option<&Value>, what: &str) -> Option<String> {
    let text = value.and_then(Value::as_str);
    match text {
        Some(text) => Some(text.to_string()),
        None => {
            warn!("{what} is not a string, dropping frame");
            None
        }
    }
}

fn as_bytes(value: Option<&Value>, what: &str) -> Option<Bytes> {
    match value {
        Some(Value::Binary(bytes)) => Some(Bytes::copy_from_slice(bytes)),
        Some(Value::String(text)) => {
            Some(Bytes::copy_from_slice(text.as_bytes()))
        }
        _ => {
            warn!("{what} is not bytes, dropping frame");
            None
        }
    }
}

fn as_errno_reason(args: &[Value], what: &str) -> Option<(i64, String)> {
    let errno = args.first().and_then(Value::as_i64);
    let reason = args.get(1).and_then(Value::as_str).map(str::to_string);
    match (errno, reason) {
        (Some(errno), Some(reason)) => Some((errno, reason)),
        _ => {
            warn!("{what} payload is not [errno, reason], dropping frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use worker_proto::{RawMessage, rpc_id};

    use super::*;

    #[test]
    fn v1_rejects_write_to_unseen_session() {
        let mut dispatcher = Dispatcher::new(ProtocolVersion::V1);
        let raw = RawMessage::V1 {
            session: 4,
            type_id: rpc_id::CHUNK,
            payload: vec![Value::Binary(b"data".to_vec())],
        };
        assert_eq!(dispatcher.normalize(raw), None);
    }

    #[test]
    fn v1_invoke_then_chunk_on_same_session() {
        let mut dispatcher = Dispatcher::new(ProtocolVersion::V1);
        let invoke = RawMessage::V1 {
            session: 17,
            type_id: rpc_id::INVOKE,
            payload: vec![Value::from("echo")],
        };
        assert_eq!(
            dispatcher.normalize(invoke),
            Some(Event::Invoke { session: 17, event: "echo".into() })
        );

        let chunk = RawMessage::V1 {
            session: 17,
            type_id: rpc_id::CHUNK,
            payload: vec![Value::Binary(b"hi".to_vec())],
        };
        assert_eq!(
            dispatcher.normalize(chunk),
            Some(Event::Chunk { session: 17, data: Bytes::from_static(b"hi") })
        );
    }

    #[test]
    fn v1_control_session_heartbeat_and_terminate() {
        let mut dispatcher = Dispatcher::new(ProtocolVersion::V1);
        let heartbeat = RawMessage::V1 {
            session: CONTROL_SESSION,
            type_id: rpc_id::HEARTBEAT,
            payload: vec![],
        };
        assert_eq!(dispatcher.normalize(heartbeat), Some(Event::Heartbeat));

        let terminate = RawMessage::V1 {
            session: CONTROL_SESSION,
            type_id: rpc_id::TERMINATE,
            payload: vec![Value::from(42_i64), Value::from("stop")],
        };
        assert_eq!(
            dispatcher.normalize(terminate),
            Some(Event::Terminate { errno: 42, reason: "stop".into() })
        );
    }

    #[test]
    fn v0_dispatches_error() {
        let mut dispatcher = Dispatcher::new(ProtocolVersion::V0);
        let raw = RawMessage::V0 {
            kind: rpc_id::ERROR,
            session: 9,
            args: vec![Value::from(7_i64), Value::from("bad")],
        };
        assert_eq!(
            dispatcher.normalize(raw),
            Some(Event::Error { session: 9, errno: 7, reason: "bad".into() })
        );
    }

    #[test]
    fn v0_and_v1_agree_on_the_same_logical_sequence() {
        let mut v0 = Dispatcher::new(ProtocolVersion::V0);
        let mut v1 = Dispatcher::new(ProtocolVersion::V1);

        let v0_invoke = RawMessage::V0 {
            kind: rpc_id::INVOKE,
            session: 5,
            args: vec![Value::from("ping")],
        };
        let v1_invoke = RawMessage::V1 {
            session: 5,
            type_id: rpc_id::INVOKE,
            payload: vec![Value::from("ping")],
        };

        assert_eq!(v0.normalize(v0_invoke), v1.normalize(v1_invoke));
    }
}
