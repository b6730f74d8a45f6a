mod codec;
mod rpc;
mod wire;

pub use codec::Decoder;
pub use rpc::{ProtocolVersion, rpc_id};
pub use wire::{
    RawMessage, decode_v0, decode_v1, encode_choke, encode_chunk,
    encode_error, encode_handshake, encode_heartbeat, encode_invoke,
    encode_terminate,
};

use thiserror::Error;

/// Session id assigned by the daemon. Session 1 is reserved for control
/// traffic (handshake, heartbeat, terminate).
pub type SessionId = u64;

pub const CONTROL_SESSION: SessionId = 1;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("msgpack decode error: {0}")]
    Decode(String),
    #[error("msgpack encode error: {0}")]
    Encode(String),
    #[error("malformed {version} frame: {reason}")]
    Malformed { version: &'static str, reason: &'static str },
}
