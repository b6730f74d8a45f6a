use rmpv::Value;

use crate::rpc::{ProtocolVersion, rpc_id};
use crate::{CONTROL_SESSION, CodecError, SessionId};

/// A decoded frame, still shaped the way the wire protocol shapes it. The
/// dispatcher (in `worker-core`) turns this into the protocol-agnostic
/// internal event set.
#[derive(Debug, Clone, PartialEq)]
pub enum RawMessage {
    V0 { kind: i64, session: SessionId, args: Vec<Value> },
    V1 { session: SessionId, type_id: i64, payload: Vec<Value> },
}

/// Decodes a v0 frame: `[kind, session, args...]`.
pub fn decode_v0(value: &Value) -> Result<RawMessage, CodecError> {
    let items = value.as_array().ok_or(CodecError::Malformed {
        version: "v0",
        reason: "top-level value is not an array",
    })?;

    if items.len() < 2 {
        return Err(CodecError::Malformed {
            version: "v0",
            reason: "frame shorter than [kind, session]",
        });
    }

    let kind = items[0].as_i64().ok_or(CodecError::Malformed {
        version: "v0",
        reason: "kind is not an integer",
    })?;
    let session = items[1].as_u64().ok_or(CodecError::Malformed {
        version: "v0",
        reason: "session is not an unsigned integer",
    })?;

    Ok(RawMessage::V0 { kind, session, args: items[2..].to_vec() })
}

/// Decodes a v1 frame: `[session, type_id, payload]`.
pub fn decode_v1(value: &Value) -> Result<RawMessage, CodecError> {
    let items = value.as_array().ok_or(CodecError::Malformed {
        version: "v1",
        reason: "top-level value is not an array",
    })?;

    if items.len() != 3 {
        return Err(CodecError::Malformed {
            version: "v1",
            reason: "frame is not [session, type_id, payload]",
        });
    }

    let session = items[0].as_u64().ok_or(CodecError::Malformed {
        version: "v1",
        reason: "session is not an unsigned integer",
    })?;
    let type_id = items[1].as_i64().ok_or(CodecError::Malformed {
        version: "v1",
        reason: "type_id is not an integer",
    })?;
    let payload = items[2]
        .as_array()
        .ok_or(CodecError::Malformed {
            version: "v1",
            reason: "payload is not an array",
        })?
        .clone();

    Ok(RawMessage::V1 { session, type_id, payload })
}

fn v0_frame(kind: i64, session: SessionId, args: Vec<Value>) -> Value {
    let mut items = Vec::with_capacity(args.len() + 2);
    items.push(Value::from(kind));
    items.push(Value::from(session));
    items.extend(args);
    Value::Array(items)
}

fn v1_frame(session: SessionId, type_id: i64, payload: Vec<Value>) -> Value {
    Value::Array(vec![
        Value::from(session),
        Value::from(type_id),
        Value::Array(payload),
    ])
}

fn encode_value(value: Value) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &value)
        .map_err(|err| CodecError::Encode(err.to_string()))?;
    Ok(buf)
}

pub fn encode_handshake(
    version: ProtocolVersion,
    uuid: &str,
) -> Result<Vec<u8>, CodecError> {
    let frame = match version {
        ProtocolVersion::V0 => v0_frame(
            rpc_id::HANDSHAKE,
            CONTROL_SESSION,
            vec![Value::from(uuid)],
        ),
        ProtocolVersion::V1 => v1_frame(
            CONTROL_SESSION,
            rpc_id::HANDSHAKE,
            vec![Value::from(uuid)],
        ),
    };
    encode_value(frame)
}

pub fn encode_heartbeat(version: ProtocolVersion) -> Result<Vec<u8>, CodecError> {
    let frame = match version {
        ProtocolVersion::V0 => {
            v0_frame(rpc_id::HEARTBEAT, CONTROL_SESSION, vec![])
        }
        ProtocolVersion::V1 => {
            v1_frame(CONTROL_SESSION, rpc_id::HEARTBEAT, vec![])
        }
    };
    encode_value(frame)
}

pub fn encode_terminate(
    version: ProtocolVersion,
    errno: i64,
    reason: &str,
) -> Result<Vec<u8>, CodecError> {
    let args = vec![Value::from(errno), Value::from(reason)];
    let frame = match version {
        ProtocolVersion::V0 => v0_frame(rpc_id::TERMINATE, CONTROL_SESSION, args),
        ProtocolVersion::V1 => {
            v1_frame(CONTROL_SESSION, rpc_id::TERMINATE, args)
        }
    };
    encode_value(frame)
}

/// Only used by test fixtures that play the role of the daemon.
pub fn encode_invoke(
    version: ProtocolVersion,
    session: SessionId,
    event: &str,
) -> Result<Vec<u8>, CodecError> {
    let args = vec![Value::from(event)];
    let frame = match version {
        ProtocolVersion::V0 => v0_frame(rpc_id::INVOKE, session, args),
        ProtocolVersion::V1 => v1_frame(session, rpc_id::INVOKE, args),
    };
    encode_value(frame)
}

pub fn encode_chunk(
    version: ProtocolVersion,
    session: SessionId,
    data: &[u8],
) -> Result<Vec<u8>, CodecError> {
    let args = vec![Value::Binary(data.to_vec())];
    let frame = match version {
        ProtocolVersion::V0 => v0_frame(rpc_id::CHUNK, session, args),
        ProtocolVersion::V1 => v1_frame(session, rpc_id::CHUNK, args),
    };
    encode_value(frame)
}

pub fn encode_choke(
    version: ProtocolVersion,
    session: SessionId,
) -> Result<Vec<u8>, CodecError> {
    let frame = match version {
        ProtocolVersion::V0 => v0_frame(rpc_id::CHOKE, session, vec![]),
        ProtocolVersion::V1 => v1_frame(session, rpc_id::CHOKE, vec![]),
    };
    encode_value(frame)
}

pub fn encode_error(
    version: ProtocolVersion,
    session: SessionId,
    errno: i64,
    reason: &str,
) -> Result<Vec<u8>, CodecError> {
    let args = vec![Value::from(errno), Value::from(reason)];
    let frame = match version {
        ProtocolVersion::V0 => v0_frame(rpc_id::ERROR, session, args),
        ProtocolVersion::V1 => v1_frame(session, rpc_id::ERROR, args),
    };
    encode_value(frame)
}
