//! Bounded diagnostic history of protocol messages
//!
//! Every frame sent or received is kept as an [`ApplianceMessage`]; the
//! oldest entries are evicted once the capacity is reached. Live listeners
//! receive each record as it is added.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

use hcd_common::description::Event;
use hcd_common::{Action, Message, Resource};

use crate::appliance::event::DescriptionChangeEvent;

/// Default number of messages kept per appliance
pub const DEFAULT_HISTORY_CAPACITY: usize = 300;

/// Which way a message travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// One recorded protocol message
///
/// Frames that could not be decoded keep their raw text and carry no
/// envelope. Outbound messages that failed to go out carry the send error.
#[derive(Debug, Clone, Serialize)]
pub struct ApplianceMessage {
    /// Sequence number within this history, assigned on record
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub resource: Option<Resource>,
    pub version: Option<u32>,
    pub action: Option<Action>,
    pub code: Option<i64>,
    pub envelope: Option<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub events: Vec<Event>,
    pub description_changes: Vec<DescriptionChangeEvent>,
}

impl ApplianceMessage {
    pub fn new(
        direction: Direction,
        envelope: Message,
        events: Vec<Event>,
        description_changes: Vec<DescriptionChangeEvent>,
    ) -> Self {
        Self {
            id: 0,
            timestamp: Utc::now(),
            direction,
            resource: Some(envelope.resource.clone()),
            version: Some(envelope.version),
            action: Some(envelope.action),
            code: envelope.code,
            envelope: Some(envelope),
            raw: None,
            error: None,
            events,
            description_changes,
        }
    }

    pub fn outbound(envelope: Message) -> Self {
        Self::new(Direction::Outbound, envelope, Vec::new(), Vec::new())
    }

    /// Inbound frame that did not decode
    pub fn undecodable(raw: impl Into<String>, error: impl ToString) -> Self {
        Self {
            id: 0,
            timestamp: Utc::now(),
            direction: Direction::Inbound,
            resource: None,
            version: None,
            action: None,
            code: None,
            envelope: None,
            raw: Some(raw.into()),
            error: Some(error.to_string()),
            events: Vec::new(),
            description_changes: Vec::new(),
        }
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn message_id(&self) -> Option<u64> {
        self.envelope.as_ref().map(|m| m.message_id)
    }
}

struct HistoryState {
    entries: VecDeque<ApplianceMessage>,
    next_id: u64,
}

/// Ring buffer of recent messages with live listeners
pub struct MessageHistory {
    capacity: usize,
    state: RwLock<HistoryState>,
    listeners: broadcast::Sender<ApplianceMessage>,
}

impl MessageHistory {
    pub fn new(capacity: usize) -> Self {
        let (listeners, _) = broadcast::channel(capacity.max(1));
        Self {
            capacity,
            state: RwLock::new(HistoryState {
                entries: VecDeque::with_capacity(capacity),
                next_id: 1,
            }),
            listeners,
        }
    }

    /// Store a message, evicting the oldest one when full
    pub fn record(&self, mut message: ApplianceMessage) {
        {
            let mut state = self.state.write();
            message.id = state.next_id;
            state.next_id += 1;
            if self.capacity == 0 {
                return;
            }
            while state.entries.len() >= self.capacity {
                state.entries.pop_front();
            }
            state.entries.push_back(message.clone());
        }

        // No receivers is fine
        let _ = self.listeners.send(message);
    }

    /// Oldest first
    pub fn snapshot(&self) -> Vec<ApplianceMessage> {
        self.state.read().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ApplianceMessage> {
        self.listeners.subscribe()
    }

    /// Pretty-printed JSON array of the current contents
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
    }
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcd_common::protocol::resource::{CI_SERVICES, RO_VALUES};

    fn message(msg_id: u64) -> ApplianceMessage {
        ApplianceMessage::outbound(Message::new(1, msg_id, RO_VALUES, 1, Action::Get))
    }

    #[test]
    fn test_evicts_oldest() {
        let history = MessageHistory::new(3);
        for i in 0..5 {
            history.record(message(i));
        }
        let ids: Vec<_> = history.snapshot().iter().map(|m| m.message_id()).collect();
        assert_eq!(ids, vec![Some(2), Some(3), Some(4)]);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_sequence_ids_keep_counting() {
        let history = MessageHistory::new(2);
        for i in 0..4 {
            history.record(message(i));
        }
        let ids: Vec<u64> = history.snapshot().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[test]
    fn test_default_capacity() {
        let history = MessageHistory::default();
        for i in 0..(DEFAULT_HISTORY_CAPACITY as u64 + 10) {
            history.record(message(i));
        }
        assert_eq!(history.len(), DEFAULT_HISTORY_CAPACITY);
        assert_eq!(history.snapshot()[0].message_id(), Some(10));
    }

    #[tokio::test]
    async fn test_listeners_receive_records() {
        let history = MessageHistory::new(10);
        let mut rx = history.subscribe();
        history.record(ApplianceMessage::outbound(Message::new(1, 7, CI_SERVICES, 1, Action::Get)));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.resource, Some(CI_SERVICES));
        assert_eq!(received.direction, Direction::Outbound);
    }

    #[test]
    fn test_export_json() {
        let history = MessageHistory::new(10);
        history.record(message(42));
        let json: serde_json::Value = serde_json::from_str(&history.export_json().unwrap()).unwrap();
        assert_eq!(json[0]["envelope"]["msgID"], 42);
        assert_eq!(json[0]["resource"], "/ro/values");
        assert_eq!(json[0]["direction"], "outbound");
        assert!(json[0].get("raw").is_none());
    }

    #[test]
    fn test_undecodable_frame_keeps_raw_text() {
        let history = MessageHistory::new(10);
        history.record(ApplianceMessage::undecodable("{not json", "expected value"));

        let entry = &history.snapshot()[0];
        assert_eq!(entry.direction, Direction::Inbound);
        assert_eq!(entry.message_id(), None);
        assert_eq!(entry.raw.as_deref(), Some("{not json"));

        let json: serde_json::Value = serde_json::from_str(&history.export_json().unwrap()).unwrap();
        assert_eq!(json[0]["raw"], "{not json");
        assert_eq!(json[0]["error"], "expected value");
        assert!(json[0]["envelope"].is_null());
    }
}
