//! Core type definitions for hcd
//!
//! These types are shared by the transport, the protocol layer and the
//! agent, and form the vocabulary used to talk about an appliance.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric feature identifier assigned by the appliance firmware
pub type Uid = u32;

/// Home appliance identifier (the "haId", e.g. `BOSCH-WAW28500-68A40E123456`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HaId(String);

impl HaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Channel security used to reach an appliance
///
/// Older appliances speak a WebSocket over plain TCP whose frames are
/// encrypted with a chained AES-CBC/HMAC scheme. Newer ones run the same
/// WebSocket inside TLS 1.2 with a pre-shared key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionType {
    #[serde(rename = "AES_HMAC_SHA256")]
    AesHmacSha256,
    #[serde(rename = "TLS")]
    Tls,
}

impl ConnectionType {
    /// Port the appliance listens on for this channel type
    pub fn default_port(&self) -> u16 {
        match self {
            ConnectionType::AesHmacSha256 => 80,
            ConnectionType::Tls => 443,
        }
    }

    /// WebSocket endpoint URI for an appliance address
    pub fn endpoint_uri(&self, address: &str) -> String {
        let scheme = match self {
            ConnectionType::AesHmacSha256 => "ws",
            ConnectionType::Tls => "wss",
        };
        format!("{}://{}:{}/homeconnect", scheme, address, self.default_port())
    }
}

impl FromStr for ConnectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "AES_HMAC_SHA256" | "AES" => Ok(ConnectionType::AesHmacSha256),
            "TLS" => Ok(ConnectionType::Tls),
            _ => Err(format!("Unknown connection type: {}", s)),
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionType::AesHmacSha256 => write!(f, "AES_HMAC_SHA256"),
            ConnectionType::Tls => write!(f, "TLS"),
        }
    }
}

/// Key material for one appliance, base64url encoded as delivered by the
/// pairing profile
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Credentials {
    #[serde(rename = "AES_HMAC_SHA256")]
    AesHmac { key: String, iv: String },
    #[serde(rename = "TLS")]
    Psk { key: String },
}

impl Credentials {
    pub fn connection_type(&self) -> ConnectionType {
        match self {
            Credentials::AesHmac { .. } => ConnectionType::AesHmacSha256,
            Credentials::Psk { .. } => ConnectionType::Tls,
        }
    }
}

// Key material never ends up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credentials({})", self.connection_type())
    }
}

/// How we introduce ourselves to the appliance during the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Shown in the appliance's list of connected devices
    pub device_name: String,
    /// Stable client identifier
    pub device_id: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            device_name: "hcd".to_string(),
            device_id: "0badcafe".to_string(),
        }
    }
}

/// Why an appliance connection stopped for good
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Missing or invalid settings; fixed by editing the configuration
    ConfigurationError,
    /// The required channel security is not available on this host
    Disabled,
}

/// Externally visible connection status of an appliance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ApplianceStatus {
    /// Initial connect in progress
    Connecting,
    /// WebSocket is open
    Online,
    /// Not connected; a reconnect may be pending
    Offline { reason: Option<String> },
    /// Terminal, no reconnect will be attempted
    Failed { kind: FailureKind, reason: String },
}

impl ApplianceStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, ApplianceStatus::Online)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplianceStatus::Failed { .. })
    }
}

impl fmt::Display for ApplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplianceStatus::Connecting => write!(f, "connecting"),
            ApplianceStatus::Online => write!(f, "online"),
            ApplianceStatus::Offline { reason: None } => write!(f, "offline"),
            ApplianceStatus::Offline { reason: Some(r) } => write!(f, "offline ({})", r),
            ApplianceStatus::Failed { kind, reason } => write!(f, "failed: {:?} ({})", kind, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_type_from_str() {
        assert_eq!(
            "AES_HMAC_SHA256".parse::<ConnectionType>().unwrap(),
            ConnectionType::AesHmacSha256
        );
        assert_eq!("tls".parse::<ConnectionType>().unwrap(), ConnectionType::Tls);
        assert!("ssh".parse::<ConnectionType>().is_err());
    }

    #[test]
    fn test_connection_type_display_roundtrip() {
        for ct in [ConnectionType::AesHmacSha256, ConnectionType::Tls] {
            assert_eq!(ct.to_string().parse::<ConnectionType>().unwrap(), ct);
        }
    }

    #[test]
    fn test_endpoint_uri() {
        assert_eq!(
            ConnectionType::AesHmacSha256.endpoint_uri("192.168.1.20"),
            "ws://192.168.1.20:80/homeconnect"
        );
        assert_eq!(
            ConnectionType::Tls.endpoint_uri("dishwasher.local"),
            "wss://dishwasher.local:443/homeconnect"
        );
    }

    #[test]
    fn test_credentials_debug_hides_keys() {
        let creds = Credentials::Psk {
            key: "c2VjcmV0".to_string(),
        };
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("c2VjcmV0"));
        assert!(printed.contains("TLS"));
    }

    #[test]
    fn test_status_terminal() {
        assert!(ApplianceStatus::Failed {
            kind: FailureKind::Disabled,
            reason: "no psk".into()
        }
        .is_terminal());
        assert!(!ApplianceStatus::Offline { reason: None }.is_terminal());
        assert!(ApplianceStatus::Online.is_online());
    }
}
