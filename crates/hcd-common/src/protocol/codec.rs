//! Message codec for the appliance JSON protocol
//!
//! Decoding happens in two phases: the envelope is parsed generically with
//! `data` left as raw JSON, then [`Payload::decode`] interprets the records
//! based on resource and action.
//!
//! ## Frame Format
//!
//! ```text
//! {"sID":1001,"msgID":7,"resource":"/ro/values","version":1,"action":"NOTIFY",
//!  "data":[{"uid":527,"value":2}]}
//! ```

use serde::Deserialize;
use serde_json::Value;

use crate::error::{HcdError, Result};
use crate::protocol::message::{Action, Message};
use crate::protocol::payload::{Payload, ServiceDescriptor};
use crate::protocol::resource::{self, Resource};
use crate::protocol::MAX_MESSAGE_SIZE;

/// Envelope as it appears on the wire, before payload interpretation
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "sID", alias = "sId")]
    session_id: u64,
    #[serde(rename = "msgID", alias = "msgId")]
    message_id: u64,
    resource: Resource,
    #[serde(default = "default_version")]
    version: u32,
    action: Action,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    data: Option<Vec<Value>>,
}

fn default_version() -> u32 {
    1
}

/// Codec for encoding and decoding protocol envelopes
#[derive(Debug, Clone)]
pub struct MessageCodec {
    /// Maximum allowed frame size
    max_size: usize,
}

impl MessageCodec {
    /// Create a new codec with default settings
    pub fn new() -> Self {
        Self {
            max_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Create a codec with custom max message size
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Encode an envelope to its JSON text frame
    pub fn encode(&self, msg: &Message) -> Result<String> {
        let text = serde_json::to_string(msg)?;
        if text.len() > self.max_size {
            return Err(HcdError::MessageTooLarge {
                size: text.len(),
                max: self.max_size,
            });
        }
        Ok(text)
    }

    /// Decode a JSON text frame into an envelope with a typed payload
    pub fn decode(&self, text: &str) -> Result<Message> {
        if text.len() > self.max_size {
            return Err(HcdError::MessageTooLarge {
                size: text.len(),
                max: self.max_size,
            });
        }

        let raw: RawEnvelope = serde_json::from_str(text)
            .map_err(|e| HcdError::MalformedMessage(format!("invalid envelope: {}", e)))?;

        let data = raw
            .data
            .map(|records| Payload::decode(&raw.resource, raw.action, records));

        Ok(Message {
            session_id: raw.session_id,
            message_id: raw.message_id,
            resource: raw.resource,
            version: raw.version,
            action: raw.action,
            code: raw.code,
            data,
        })
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Protocol versions of the services an appliance announced
///
/// Cleared on every reconnect; filled from the `ci/services` answer.
#[derive(Debug, Clone, Default)]
pub struct ServiceVersions {
    services: Vec<ServiceDescriptor>,
}

impl ServiceVersions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, services: Vec<ServiceDescriptor>) {
        self.services = services;
    }

    pub fn clear(&mut self) {
        self.services.clear();
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Version to use for an outbound message without a pinned version.
    ///
    /// `GET ci/services` is always version 1 since it is sent before any
    /// version is known.
    pub fn version_for(&self, action: Action, resource: &Resource) -> u32 {
        if action == Action::Get && *resource == resource::CI_SERVICES {
            return 1;
        }
        self.services
            .iter()
            .find(|s| s.service == resource.service())
            .map(|s| s.version)
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::payload::FeatureValue;
    use crate::protocol::resource::{CI_INFO, RO_VALUES};

    #[test]
    fn test_decode_envelope() {
        let codec = MessageCodec::new();
        let msg = codec
            .decode(r#"{"sID":1001,"msgID":7,"resource":"/ro/values","version":1,"action":"NOTIFY","data":[{"uid":527,"value":2}]}"#)
            .unwrap();
        assert_eq!(msg.session_id, 1001);
        assert_eq!(msg.message_id, 7);
        assert_eq!(msg.resource, RO_VALUES);
        assert_eq!(msg.action, Action::Notify);
        assert_eq!(msg.code, None);
        assert_eq!(msg.data, Some(Payload::FeatureUpdate(vec![FeatureValue::new(527, 2)])));
    }

    #[test]
    fn test_decode_accepts_alternate_id_spelling() {
        let codec = MessageCodec::new();
        let msg = codec
            .decode(r#"{"sId":100,"msgId":1,"resource":"/ei/initialValues","action":"POST","data":[{"messageId":1}]}"#)
            .unwrap();
        assert_eq!(msg.session_id, 100);
        assert_eq!(msg.version, 1);
    }

    #[test]
    fn test_encode_omits_empty_fields() {
        let codec = MessageCodec::new();
        let text = codec.encode(&Message::new(5, 6, CI_INFO, 2, Action::Get)).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"sID":5,"msgID":6,"resource":"/ci/info","version":2,"action":"GET"})
        );
    }

    #[test]
    fn test_decode_error_code() {
        let codec = MessageCodec::new();
        let msg = codec
            .decode(r#"{"sID":1,"msgID":3,"resource":"/ro/values","version":1,"action":"RESPONSE","code":400}"#)
            .unwrap();
        assert!(msg.is_error());
        assert!(msg.data.is_none());
    }

    #[test]
    fn test_decode_garbage() {
        let codec = MessageCodec::new();
        assert!(matches!(codec.decode("not json"), Err(HcdError::MalformedMessage(_))));
        assert!(matches!(codec.decode(r#"{"sID":1}"#), Err(HcdError::MalformedMessage(_))));
    }

    #[test]
    fn test_max_size() {
        let codec = MessageCodec::new().with_max_size(16);
        let result = codec.decode(r#"{"sID":1,"msgID":3,"resource":"/ro/values"}"#);
        assert!(matches!(result, Err(HcdError::MessageTooLarge { max: 16, .. })));
    }

    #[test]
    fn test_version_selection() {
        let mut versions = ServiceVersions::new();
        assert_eq!(versions.version_for(Action::Get, &RO_VALUES), 1);

        versions.replace(vec![
            ServiceDescriptor { service: "ci".into(), version: 3 },
            ServiceDescriptor { service: "ro".into(), version: 2 },
        ]);
        assert_eq!(versions.version_for(Action::Get, &RO_VALUES), 2);
        assert_eq!(versions.version_for(Action::Get, &CI_INFO), 3);
        assert_eq!(versions.version_for(Action::Get, &resource::CI_SERVICES), 1);
        assert_eq!(versions.version_for(Action::Notify, &resource::CI_SERVICES), 3);
        assert_eq!(versions.version_for(Action::Get, &resource::NI_INFO), 1);

        versions.clear();
        assert_eq!(versions.version_for(Action::Get, &RO_VALUES), 1);
    }
}
