//! Error types for appliance communication
//!
//! Errors fall into two groups that callers treat differently: configuration
//! errors ([`HcdError::is_configuration`]) stop an appliance for good, while
//! everything else is a transient failure that a reconnect may resolve.

use thiserror::Error;

/// Central error type for appliance communication
#[derive(Error, Debug)]
pub enum HcdError {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unsupported on this platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    // === Protocol Errors ===
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    // === Transport Errors ===
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Not connected")]
    NotConnected,

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization ===
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl HcdError {
    /// Errors that retrying cannot fix: the appliance settings must change first.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HcdError::ConfigError(_) | HcdError::UnsupportedPlatform(_) | HcdError::InvalidKey(_)
        )
    }
}

/// Result type alias using HcdError
pub type Result<T> = std::result::Result<T, HcdError>;

impl From<serde_json::Error> for HcdError {
    fn from(err: serde_json::Error) -> Self {
        HcdError::Serialization(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for HcdError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        HcdError::WebSocket(err.to_string())
    }
}

impl From<openssl::error::ErrorStack> for HcdError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        HcdError::TlsError(err.to_string())
    }
}

impl From<openssl::ssl::Error> for HcdError {
    fn from(err: openssl::ssl::Error) -> Self {
        HcdError::TlsError(err.to_string())
    }
}

impl From<base64::DecodeError> for HcdError {
    fn from(err: base64::DecodeError) -> Self {
        HcdError::InvalidKey(format!("not valid base64url: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HcdError::MessageTooLarge { size: 10, max: 5 };
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: HcdError = io_err.into();
        assert!(matches!(err, HcdError::Io(_)));
    }

    #[test]
    fn test_configuration_classification() {
        assert!(HcdError::InvalidKey("short".into()).is_configuration());
        assert!(HcdError::UnsupportedPlatform("psk".into()).is_configuration());
        assert!(!HcdError::ConnectionClosed.is_configuration());
        assert!(!HcdError::ConnectionFailed("refused".into()).is_configuration());
    }
}
