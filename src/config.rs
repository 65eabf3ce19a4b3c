use std::time::Duration;
use tracing::warn;

/// Configuration for the per-session heartbeat task
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// How often a `ping` is sent to a live session
    pub interval: Duration,
    /// How many unanswered pings are tolerated before the session's
    /// connections are force-closed
    pub max_missed: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(40),
            max_missed: 3,
        }
    }
}

/// Per-session resource limits
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub heartbeat: HeartbeatConfig,
    /// Maximum number of envelopes retained while a session is offline.
    /// The oldest envelope is evicted once the cap is reached.
    pub backlog_capacity: usize,
    /// Capacity of each connection's outbound write queue
    pub connection_queue_capacity: usize,
    /// How long a flush waits for a connection's queue to make room before
    /// treating the connection as stalled
    pub flush_write_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::default(),
            backlog_capacity: 1000,
            connection_queue_capacity: 256,
            flush_write_timeout: Duration::from_secs(10),
        }
    }
}

/// Process configuration, read once at startup
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub session: SessionConfig,
}

impl ServerConfig {
    /// Reads the configuration from the environment, falling back to defaults
    /// for anything missing or unparsable
    pub fn from_env() -> Self {
        let defaults = SessionConfig::default();

        let interval_secs =
            env_or("HEARTBEAT_INTERVAL_SECS", defaults.heartbeat.interval.as_secs());
        let max_missed = env_or("HEARTBEAT_MAX_MISSED", defaults.heartbeat.max_missed);
        let backlog_capacity = env_or("BACKLOG_CAPACITY", defaults.backlog_capacity);
        let connection_queue_capacity =
            env_or("CONNECTION_QUEUE_CAPACITY", defaults.connection_queue_capacity);
        let flush_timeout_secs = env_or(
            "FLUSH_WRITE_TIMEOUT_SECS",
            defaults.flush_write_timeout.as_secs(),
        );

        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            session: SessionConfig {
                heartbeat: HeartbeatConfig {
                    interval: Duration::from_secs(interval_secs.max(1)),
                    max_missed,
                },
                backlog_capacity: backlog_capacity.max(1),
                connection_queue_capacity: connection_queue_capacity.max(1),
                flush_write_timeout: Duration::from_secs(flush_timeout_secs.max(1)),
            },
        }
    }
}

pub(crate) fn env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key = %key, value = %raw, "Ignoring unparsable configuration value");
            default
        }),
        Err(_) => default,
    }
}
