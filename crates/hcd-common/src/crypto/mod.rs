//! Channel security for appliance connections
//!
//! This module provides:
//! - The chained AES-CBC/HMAC frame cipher for `ws://` appliances
//! - The PSK-TLS connector for `wss://` appliances
//!
//! ## Security Design
//!
//! - Key material is base64url decoded once and never logged
//! - A failed frame tag is reported, not fatal; see [`aes_hmac::Decrypted`]

pub mod aes_hmac;
pub mod psk;

pub use aes_hmac::{AesHmacCipher, Decrypted};
pub use psk::{PskTlsConnector, PSK_CIPHER_SUITE, PSK_IDENTITY};
