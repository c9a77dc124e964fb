//! PSK-TLS channel
//!
//! Newer appliances serve `wss://` on port 443 using TLS 1.2 with a single
//! pre-shared-key cipher suite. The appliance presents no certificate chain
//! we could validate; the shared key authenticates both ends.
//!
//! ## Security Defaults
//! - TLS 1.2 only
//! - ECDHE-PSK-CHACHA20-POLY1305 only
//! - No certificate verification (PSK authenticated)

use std::pin::Pin;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode, SslVersion};
use tokio::net::TcpStream;
use tokio_openssl::SslStream;
use tracing::debug;

use crate::error::{HcdError, Result};

/// Identity presented in the PSK handshake
pub const PSK_IDENTITY: &str = "HCCOM_Local_App";

/// OpenSSL name of the only accepted cipher suite
pub const PSK_CIPHER_SUITE: &str = "ECDHE-PSK-CHACHA20-POLY1305";

/// TLS connector bound to one appliance key
pub struct PskTlsConnector {
    connector: SslConnector,
}

impl PskTlsConnector {
    /// Whether the linked TLS library can negotiate the PSK suite.
    ///
    /// Callers should check this before constructing a connector so that an
    /// unsupported host is reported as a configuration problem.
    pub fn is_supported() -> bool {
        match base_builder() {
            Ok(_) => true,
            Err(e) => {
                debug!("PSK-TLS unavailable: {}", e);
                false
            }
        }
    }

    /// Create a connector from the base64url appliance key
    pub fn new(key: &str) -> Result<Self> {
        let psk = URL_SAFE_NO_PAD.decode(key.trim().trim_end_matches('='))?;
        if psk.is_empty() {
            return Err(HcdError::InvalidKey("psk must not be empty".into()));
        }

        let mut builder = base_builder()?;
        builder.set_psk_client_callback(move |_ssl, _hint, identity_out, psk_out| {
            let identity = PSK_IDENTITY.as_bytes();
            if identity.len() + 1 > identity_out.len() || psk.len() > psk_out.len() {
                return Err(openssl::error::ErrorStack::get());
            }
            identity_out[..identity.len()].copy_from_slice(identity);
            identity_out[identity.len()] = 0;
            psk_out[..psk.len()].copy_from_slice(&psk);
            Ok(psk.len())
        });

        Ok(Self {
            connector: builder.build(),
        })
    }

    /// Open TCP to `address:port` and run the TLS handshake
    pub async fn connect(&self, address: &str, port: u16) -> Result<SslStream<TcpStream>> {
        let tcp = TcpStream::connect((address, port))
            .await
            .map_err(|e| HcdError::ConnectionFailed(format!("{}:{}: {}", address, port, e)))?;

        let mut config = self.connector.configure()?;
        config.set_use_server_name_indication(false);
        config.set_verify_hostname(false);
        let ssl = config.into_ssl(address)?;

        let mut stream = SslStream::new(ssl, tcp)?;
        Pin::new(&mut stream).connect().await?;
        debug!("PSK-TLS handshake with {} complete", address);
        Ok(stream)
    }
}

fn base_builder() -> Result<openssl::ssl::SslConnectorBuilder> {
    let mut builder = SslConnector::builder(SslMethod::tls_client())?;
    builder.set_min_proto_version(Some(SslVersion::TLS1_2))?;
    builder.set_max_proto_version(Some(SslVersion::TLS1_2))?;
    builder.set_cipher_list(PSK_CIPHER_SUITE)?;
    builder.set_verify(SslVerifyMode::NONE);
    Ok(builder)
}
