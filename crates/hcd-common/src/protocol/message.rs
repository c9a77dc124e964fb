//! Message envelope definitions
//!
//! Every frame on the appliance WebSocket carries exactly one JSON envelope.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::payload::Payload;
use crate::protocol::resource::Resource;

/// Verb of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    /// Read request
    Get,
    /// Write request (or session opener when sent by the appliance)
    Post,
    /// Answer to a GET or POST, echoing its message id
    Response,
    /// Unsolicited update
    Notify,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Get => write!(f, "GET"),
            Action::Post => write!(f, "POST"),
            Action::Response => write!(f, "RESPONSE"),
            Action::Notify => write!(f, "NOTIFY"),
        }
    }
}

/// A decoded protocol envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    /// Session id assigned by the appliance
    #[serde(rename = "sID")]
    pub session_id: u64,
    #[serde(rename = "msgID")]
    pub message_id: u64,
    pub resource: Resource,
    pub version: u32,
    pub action: Action,
    /// Error code; present only on failed requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Payload>,
}

impl Message {
    pub fn new(session_id: u64, message_id: u64, resource: Resource, version: u32, action: Action) -> Self {
        Self {
            session_id,
            message_id,
            resource,
            version,
            action,
            code: None,
            data: None,
        }
    }

    pub fn with_data(mut self, data: Payload) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_error(&self) -> bool {
        self.code.is_some()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (msg {})", self.action, self.resource, self.message_id)?;
        if let Some(code) = self.code {
            write!(f, " code={}", code)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::resource::CI_SERVICES;

    #[test]
    fn test_action_wire_names() {
        assert_eq!(serde_json::to_string(&Action::Response).unwrap(), "\"RESPONSE\"");
        let parsed: Action = serde_json::from_str("\"NOTIFY\"").unwrap();
        assert_eq!(parsed, Action::Notify);
    }

    #[test]
    fn test_message_display() {
        let mut msg = Message::new(1, 9, CI_SERVICES, 1, Action::Get);
        assert_eq!(msg.to_string(), "GET /ci/services (msg 9)");
        msg.code = Some(400);
        assert!(msg.to_string().ends_with("code=400"));
        assert!(msg.is_error());
    }
}
