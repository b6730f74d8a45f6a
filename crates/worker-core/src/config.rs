use std::time::Duration;

use worker_proto::ProtocolVersion;

use crate::error::WorkerError;

const DEFAULT_DISOWN_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(20);

/// Discovery of these values (CLI flags, environment variables, defaults)
/// is the binary's concern; this struct only holds and validates the
/// resolved values.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub uuid: String,
    pub app: String,
    pub endpoint: String,
    pub protocol: ProtocolVersion,
    pub disown_timeout: Duration,
    pub heartbeat_timeout: Duration,
}

impl WorkerConfig {
    /// Builds a config, enforcing the `heartbeat_timeout > disown_timeout`
    /// guard. Invalid configuration refuses to construct.
    pub fn new(
        uuid: impl Into<String>,
        app: impl Into<String>,
        endpoint: impl Into<String>,
        protocol: ProtocolVersion,
        disown_timeout: Duration,
        heartbeat_timeout: Duration,
    ) -> Result<Self, WorkerError> {
        let uuid = uuid.into();
        let app = app.into();
        let endpoint = endpoint.into();

        if uuid.is_empty() {
            return Err(WorkerError::Config("uuid must not be empty".into()));
        }
        if endpoint.is_empty() {
            return Err(WorkerError::Config(
                "endpoint must not be empty".into(),
            ));
        }
        if disown_timeout.is_zero() {
            return Err(WorkerError::Config(
                "disown_timeout must be positive".into(),
            ));
        }
        if heartbeat_timeout <= disown_timeout {
            return Err(WorkerError::Config(format!(
                "heartbeat_timeout ({heartbeat_timeout:?}) must exceed disown_timeout ({disown_timeout:?})"
            )));
        }

        Ok(Self {
            uuid,
            app,
            endpoint,
            protocol,
            disown_timeout,
            heartbeat_timeout,
        })
    }

    pub fn default_disown_timeout() -> Duration {
        DEFAULT_DISOWN_TIMEOUT
    }

    pub fn default_heartbeat_timeout() -> Duration {
        DEFAULT_HEARTBEAT_TIMEOUT
    }

    /// The watchdog's disown period: a large multiple (42x) of the
    /// event-loop disown period, so it only fires when the event loop
    /// itself is wedged.
    pub fn watchdog_timeout(&self) -> Duration {
        self.disown_timeout * 42
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_heartbeat_not_exceeding_disown() {
        let err = WorkerConfig::new(
            "uuid",
            "app",
            "/tmp/worker.sock",
            ProtocolVersion::V1,
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(matches!(err, WorkerError::Config(_)));
    }

    #[test]
    fn accepts_valid_config() {
        let config = WorkerConfig::new(
            "uuid",
            "app",
            "/tmp/worker.sock",
            ProtocolVersion::V1,
            Duration::from_secs(5),
            Duration::from_secs(20),
        )
        .unwrap();
        assert_eq!(config.watchdog_timeout(), Duration::from_secs(210));
    }

    #[test]
    fn rejects_empty_uuid() {
        let err = WorkerConfig::new(
            "",
            "app",
            "/tmp/worker.sock",
            ProtocolVersion::V1,
            Duration::from_secs(5),
            Duration::from_secs(20),
        )
        .unwrap_err();
        assert!(matches!(err, WorkerError::Config(_)));
    }
}
