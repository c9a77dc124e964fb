//! Transport abstractions for appliance connections
//!
//! A transport moves JSON text frames to and from one appliance, hiding
//! which channel security is in use. Lifecycle notifications are delivered
//! as [`TransportEvent`]s on the channel returned at construction.

pub mod liveness;
pub mod websocket;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use liveness::{ConnectionChecks, KeepaliveTarget, Liveness};
pub use websocket::WebSocketTransport;

/// Notification from a transport to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The WebSocket handshake completed
    Opened,
    /// A decrypted text frame
    Message(String),
    /// The connection ended without `disconnect()` being called
    Closed { reason: Option<String> },
    /// A read or write failure; a `Closed` event follows
    Error(String),
}

/// A bidirectional text-frame channel to one appliance
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection. Emits [`TransportEvent::Opened`] on success.
    async fn connect(&self) -> Result<()>;

    /// Queue a text frame. Fails with `NotConnected` when closed.
    async fn send(&self, text: &str) -> Result<()>;

    /// Close the connection and stop keepalive checks. No `Closed` event is emitted.
    async fn disconnect(&self);

    async fn is_open(&self) -> bool;
}

/// Keepalive and timeout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_ping_initial_delay", with = "secs")]
    pub ping_initial_delay: Duration,

    #[serde(default = "default_ping_interval", with = "secs")]
    pub ping_interval: Duration,

    #[serde(default = "default_inactivity_check_delay", with = "secs")]
    pub inactivity_check_delay: Duration,

    #[serde(default = "default_inactivity_check_interval", with = "secs")]
    pub inactivity_check_interval: Duration,

    /// Force a reconnect when nothing was received for this long
    #[serde(default = "default_inactivity_timeout", with = "secs")]
    pub inactivity_timeout: Duration,

    #[serde(default = "default_connect_timeout", with = "secs")]
    pub connect_timeout: Duration,
}

fn default_ping_initial_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_ping_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_inactivity_check_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_inactivity_check_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_inactivity_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ping_initial_delay: default_ping_initial_delay(),
            ping_interval: default_ping_interval(),
            inactivity_check_delay: default_inactivity_check_delay(),
            inactivity_check_interval: default_inactivity_check_interval(),
            inactivity_timeout: default_inactivity_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// Durations expressed as whole seconds in configuration files
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let config = TransportConfig::default();
        assert_eq!(config.ping_initial_delay, Duration::from_secs(5));
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(config.inactivity_check_interval, Duration::from_secs(10));
        assert_eq!(config.inactivity_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: TransportConfig = serde_json::from_str(r#"{"inactivity_timeout": 90}"#).unwrap();
        assert_eq!(config.inactivity_timeout, Duration::from_secs(90));
        assert_eq!(config.ping_interval, Duration::from_secs(30));
    }
}
