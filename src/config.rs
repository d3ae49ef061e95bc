//! Broker configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`), with sensible defaults for local
//! development.

use std::net::SocketAddr;
use std::time::Duration;

use crate::domain::forwarder::DEFAULT_RESPONSE_TIMEOUT;

/// Top-level broker configuration.
///
/// Loaded once at startup via [`BrokerConfig::from_env`].
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:4000`).
    pub listen_addr: SocketAddr,

    /// Identity of this broker process, used as the sender of
    /// broker-originated commands.
    pub broker_id: String,

    /// Shared secret the token authenticator checks `subject:secret`
    /// tokens against.
    pub auth_secret: String,

    /// Capacity of each stream's bounded outbound queue.
    pub stream_queue_capacity: usize,

    /// Default deadline in seconds for wait-for-response sends.
    pub response_timeout_secs: u64,
}

impl BrokerConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set. Calls
    /// `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:4000".to_string())
            .parse()?;

        let broker_id =
            std::env::var("BROKER_ID").unwrap_or_else(|_| "nimbus-broker".to_string());

        let auth_secret = std::env::var("AUTH_SECRET").unwrap_or_else(|_| {
            tracing::warn!("AUTH_SECRET not set; using the development default");
            "dev-secret".to_string()
        });

        let stream_queue_capacity = parse_env("STREAM_QUEUE_CAPACITY", 256);
        let response_timeout_secs =
            parse_env("RESPONSE_TIMEOUT_SECS", DEFAULT_RESPONSE_TIMEOUT.as_secs());

        Ok(Self {
            listen_addr,
            broker_id,
            auth_secret,
            stream_queue_capacity,
            response_timeout_secs,
        })
    }

    /// Default deadline for wait-for-response sends.
    #[must_use]
    pub const fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    /// Fixed configuration for tests, independent of the environment.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            listen_addr: ([127, 0, 0, 1], 0).into(),
            broker_id: "test-broker".to_string(),
            auth_secret: "s3cret".to_string(),
            stream_queue_capacity: 16,
            response_timeout_secs: 5,
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
