use thiserror::Error;

/// Error codes reported to the daemon on a session's response stream.
/// Values are assigned by the platform's published `CocaineErrno` table;
/// kept as a stable, crate-local mirror since that table is an external
/// collaborator.
pub mod errno {
    pub const ENOHANDLER: i64 = 40;
    pub const EINVFAILED: i64 = 41;
    pub const EUNCAUGHTEXCEPTION: i64 = 42;
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to connect to {endpoint}: {source}")]
    Connect { endpoint: String, #[source] source: std::io::Error },
    #[error("socket io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] worker_proto::CodecError),
    #[error("disowned: no heartbeat within the configured window")]
    Disowned,
}
