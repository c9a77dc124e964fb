//! Events published to appliance subscribers

use serde::Serialize;
use serde_json::Value;

use hcd_common::description::Event;
use hcd_common::protocol::Access;
use hcd_common::Uid;

/// Capability change of a feature, with its name resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptionChangeEvent {
    pub uid: Uid,
    pub name: String,
    pub parent_uid: Option<Uid>,
    pub available: Option<bool>,
    pub access: Option<Access>,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub step_size: Option<i64>,
    pub default_value: Option<Value>,
    pub enum_type: Option<Uid>,
}

/// Something that happened on an appliance
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApplianceEvent {
    /// A feature value changed
    Feature(Event),
    /// A feature's constraints or availability changed
    Description(DescriptionChangeEvent),
    /// Handshake finished; commands are accepted from now on
    Subscribed,
}
