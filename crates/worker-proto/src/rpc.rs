/// Wire protocol version the worker has been told to speak. There is no
/// in-band version discovery; the supervisor configures this out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V0,
    V1,
}

/// Stable numeric ids shared by both wire profiles: v0 uses them directly as
/// the message `kind`, v1 uses them as `type_id`. v1's WRITE/CLOSE are the
/// same wire ids as v0's CHUNK/CHOKE under different names.
pub mod rpc_id {
    pub const HANDSHAKE: i64 = 0;
    pub const HEARTBEAT: i64 = 1;
    pub const TERMINATE: i64 = 2;
    pub const INVOKE: i64 = 3;
    pub const CHUNK: i64 = 4;
    pub const ERROR: i64 = 5;
    pub const CHOKE: i64 = 6;
}
