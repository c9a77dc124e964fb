//! # hcd-common
//!
//! Local communication with Home Connect appliances.
//!
//! This crate contains:
//! - Channel security: the chained AES-HMAC frame cipher and PSK-TLS
//! - The WebSocket transport with keepalive and inactivity detection
//! - Wire protocol envelopes, resources and typed payloads
//! - The appliance description model and UID resolution
//! - Shared types and error definitions
//!
//! ## Architecture
//!
//! Nothing here owns session state. The agent drives one
//! [`transport::Transport`] per appliance and runs the protocol state
//! machine on top of the codec and resolver provided here.

pub mod crypto;
pub mod description;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod types;

// Re-export commonly used items at crate root
pub use error::{HcdError, Result};
pub use protocol::{Action, Message, MessageCodec, Payload, Resource};
pub use types::{ApplianceStatus, ConnectionType, Credentials, DeviceIdentity, HaId, Uid};
