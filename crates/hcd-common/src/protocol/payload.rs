//! Typed payload records
//!
//! The `data` array of an envelope has no self-describing type tag; its
//! shape is implied by the resource and action. [`Payload::decode`] performs
//! the second decoding phase once the envelope is known.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::protocol::message::Action;
use crate::protocol::resource::{self, Resource};
use crate::types::Uid;

/// Feature access mode as announced by the appliance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Access {
    None,
    Read,
    ReadWrite,
    WriteOnly,
}

impl Access {
    /// Case-insensitive parse, matching how firmware spells these
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "none" => Some(Access::None),
            "read" => Some(Access::Read),
            "readwrite" => Some(Access::ReadWrite),
            "writeonly" => Some(Access::WriteOnly),
            _ => None,
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, Access::ReadWrite | Access::WriteOnly)
    }
}

fn lenient_access<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Access>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(Access::parse))
}

/// `{uid, value}` record carried by `ro/values` and friends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureValue {
    pub uid: Uid,
    pub value: Value,
}

impl FeatureValue {
    pub fn new(uid: Uid, value: impl Into<Value>) -> Self {
        Self {
            uid,
            value: value.into(),
        }
    }
}

/// Capability change of a single feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptionChange {
    pub uid: Uid,
    #[serde(default, rename = "parentUID", skip_serializing_if = "Option::is_none")]
    pub parent_uid: Option<Uid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
    #[serde(default, deserialize_with = "lenient_access", skip_serializing_if = "Option::is_none")]
    pub access: Option<Access>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_size: Option<i64>,
    #[serde(default, rename = "default", skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_type: Option<Uid>,
}

/// Our answer to `ei/initialValues`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(rename = "deviceType")]
    pub device_type: String,
    #[serde(rename = "deviceName")]
    pub device_name: String,
    #[serde(rename = "deviceID")]
    pub device_id: String,
}

/// Program selection, optionally with option values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramSelection {
    pub program: Uid,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FeatureValue>,
}

/// One entry of the `ci/services` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub service: String,
    pub version: u32,
}

/// Session opener sent by the appliance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialValues {
    /// First message id we are expected to use
    #[serde(rename = "edMsgID", alias = "messageId")]
    pub message_id: u64,
}

/// Appliance identity returned by `ci/info` and `iz/info`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplianceInfo {
    #[serde(rename = "deviceID")]
    pub device_id: Option<String>,
    #[serde(rename = "eNumber")]
    pub e_number: Option<String>,
    pub brand: Option<String>,
    pub vib: Option<String>,
    pub mac: Option<String>,
    #[serde(rename = "hwVersion")]
    pub hw_version: Option<String>,
    #[serde(rename = "swVersion")]
    pub sw_version: Option<String>,
    #[serde(rename = "haVersion")]
    pub ha_version: Option<String>,
    #[serde(rename = "deviceType")]
    pub device_type: Option<String>,
    #[serde(rename = "deviceInfo")]
    pub device_info: Option<String>,
    #[serde(rename = "serialNumber")]
    pub serial_number: Option<String>,
    #[serde(rename = "fdString")]
    pub fd_string: Option<String>,
    #[serde(rename = "shipSki")]
    pub ship_ski: Option<String>,
}

/// Client nonce for `ci/authentication`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationNonce {
    pub nonce: String,
}

/// Decoded `data` array of an envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    FeatureUpdate(Vec<FeatureValue>),
    DescriptionChange(Vec<DescriptionChange>),
    DeviceInfo(Vec<DeviceInfo>),
    ProgramSelection(Vec<ProgramSelection>),
    ServiceDescriptor(Vec<ServiceDescriptor>),
    InitialValues(Vec<InitialValues>),
    ApplianceInfo(Vec<ApplianceInfo>),
    Authentication(Vec<AuthenticationNonce>),
    Unknown(Vec<Value>),
}

impl Payload {
    /// Second decoding phase: interpret raw records based on where they came from.
    ///
    /// Records that do not match the expected shape are kept verbatim as
    /// [`Payload::Unknown`].
    pub fn decode(resource: &Resource, action: Action, data: Vec<Value>) -> Payload {
        let decoded = if *resource == resource::EI_INITIAL_VALUES {
            if action == Action::Post {
                typed(&data).map(Payload::InitialValues)
            } else {
                typed(&data).map(Payload::DeviceInfo)
            }
        } else if *resource == resource::CI_SERVICES || *resource == resource::IZ_SERVICES {
            typed(&data).map(Payload::ServiceDescriptor)
        } else if *resource == resource::CI_INFO || *resource == resource::IZ_INFO {
            typed(&data).map(Payload::ApplianceInfo)
        } else if *resource == resource::CI_AUTHENTICATION {
            typed(&data).map(Payload::Authentication)
        } else if *resource == resource::RO_VALUES || *resource == resource::RO_ALL_MANDATORY_VALUES {
            typed(&data).map(Payload::FeatureUpdate)
        } else if *resource == resource::RO_DESCRIPTION_CHANGE
            || *resource == resource::RO_ALL_DESCRIPTION_CHANGES
        {
            typed(&data).map(Payload::DescriptionChange)
        } else if *resource == resource::RO_ACTIVE_PROGRAM || *resource == resource::RO_SELECTED_PROGRAM {
            typed(&data).map(Payload::ProgramSelection)
        } else {
            return Payload::Unknown(data);
        };

        match decoded {
            Ok(payload) => payload,
            Err(e) => {
                debug!("Keeping raw payload of {} {}: {}", action, resource, e);
                Payload::Unknown(data)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::FeatureUpdate(v) => v.len(),
            Payload::DescriptionChange(v) => v.len(),
            Payload::DeviceInfo(v) => v.len(),
            Payload::ProgramSelection(v) => v.len(),
            Payload::ServiceDescriptor(v) => v.len(),
            Payload::InitialValues(v) => v.len(),
            Payload::ApplianceInfo(v) => v.len(),
            Payload::Authentication(v) => v.len(),
            Payload::Unknown(v) => v.len(),
        }
    }
}

fn typed<T: DeserializeOwned>(data: &[Value]) -> serde_json::Result<Vec<T>> {
    data.iter().cloned().map(serde_json::from_value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_feature_update() {
        let payload = Payload::decode(
            &resource::RO_VALUES,
            Action::Notify,
            vec![json!({"uid": 527, "value": 2}), json!({"uid": 512, "value": true})],
        );
        assert_eq!(
            payload,
            Payload::FeatureUpdate(vec![FeatureValue::new(527, 2), FeatureValue::new(512, true)])
        );
    }

    #[test]
    fn test_decode_initial_values_by_action() {
        let post = Payload::decode(&resource::EI_INITIAL_VALUES, Action::Post, vec![json!({"edMsgID": 42})]);
        assert_eq!(post, Payload::InitialValues(vec![InitialValues { message_id: 42 }]));

        let alias = Payload::decode(&resource::EI_INITIAL_VALUES, Action::Post, vec![json!({"messageId": 7})]);
        assert_eq!(alias, Payload::InitialValues(vec![InitialValues { message_id: 7 }]));

        let reply = Payload::decode(
            &resource::EI_INITIAL_VALUES,
            Action::Response,
            vec![json!({"deviceType": "Application", "deviceName": "hcd", "deviceID": "01"})],
        );
        assert!(matches!(reply, Payload::DeviceInfo(_)));
    }

    #[test]
    fn test_decode_description_change() {
        let payload = Payload::decode(
            &resource::RO_DESCRIPTION_CHANGE,
            Action::Notify,
            vec![json!({
                "uid": 539, "parentUID": 256, "available": true, "access": "READWRITE",
                "min": 0, "max": 86340, "stepSize": 60, "default": 0, "enumType": 17
            })],
        );
        let Payload::DescriptionChange(changes) = payload else {
            panic!("expected description change, got {:?}", payload);
        };
        assert_eq!(changes[0].parent_uid, Some(256));
        assert_eq!(changes[0].access, Some(Access::ReadWrite));
        assert_eq!(changes[0].step_size, Some(60));
        assert_eq!(changes[0].default_value, Some(json!(0)));
    }

    #[test]
    fn test_unknown_access_is_dropped() {
        let change: DescriptionChange = serde_json::from_value(json!({"uid": 1, "access": "sometimes"})).unwrap();
        assert_eq!(change.access, None);
    }

    #[test]
    fn test_shape_mismatch_falls_back_to_unknown() {
        let raw = vec![json!({"unexpected": "shape"})];
        let payload = Payload::decode(&resource::RO_VALUES, Action::Response, raw.clone());
        assert_eq!(payload, Payload::Unknown(raw));
    }

    #[test]
    fn test_unknown_resource_kept_raw() {
        let raw = vec![json!({"ssid": "home"})];
        let payload = Payload::decode(&resource::CI_WIFI_SETTING, Action::Response, raw.clone());
        assert_eq!(payload, Payload::Unknown(raw));
    }

    #[test]
    fn test_appliance_info_partial() {
        let payload = Payload::decode(
            &resource::CI_INFO,
            Action::Response,
            vec![json!({"deviceID": "68A40E000000", "brand": "SIEMENS", "swVersion": "3.2.1"})],
        );
        let Payload::ApplianceInfo(info) = payload else {
            panic!("expected appliance info");
        };
        assert_eq!(info[0].brand.as_deref(), Some("SIEMENS"));
        assert_eq!(info[0].mac, None);
    }

    #[test]
    fn test_payload_serializes_as_plain_array() {
        let payload = Payload::Authentication(vec![AuthenticationNonce { nonce: "abc".into() }]);
        assert_eq!(serde_json::to_value(&payload).unwrap(), json!([{"nonce": "abc"}]));
    }
}
