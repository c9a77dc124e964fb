//! Wire protocol for local appliance communication
//!
//! ## Protocol Design
//!
//! 1. **JSON envelopes**: one object per WebSocket frame
//! 2. **Resource addressed**: every message targets `/service/endpoint`
//! 3. **Versioned per service**: versions are announced by the appliance via `ci/services`
//! 4. **Session scoped**: the appliance assigns the session id and the first message id
//!
//! ## Security
//!
//! Envelopes are plaintext JSON. They must only travel over the AES-HMAC
//! channel or PSK-TLS, both provided by the transport layer.

pub mod codec;
pub mod message;
pub mod payload;
pub mod resource;

pub use codec::{MessageCodec, ServiceVersions};
pub use message::{Action, Message};
pub use payload::{
    Access, ApplianceInfo, AuthenticationNonce, DescriptionChange, DeviceInfo, FeatureValue,
    InitialValues, Payload, ProgramSelection, ServiceDescriptor,
};
pub use resource::Resource;

/// Maximum frame size (1 MB)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Device type we announce during the handshake
pub const CLIENT_DEVICE_TYPE: &str = "Application";
