//! Appliance description data model
//!
//! An appliance is described by two documents shipped with its pairing
//! profile: the device description (which features exist and their
//! constraints) and the feature mapping (UIDs to names, enum labels).
//! Both are represented here already parsed; loading them from the
//! vendor XML is outside this crate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::protocol::Access;
use crate::types::Uid;

/// Severity of an appliance event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Hint,
    Info,
    Warning,
    Alert,
    Critical,
}

/// Whether an event expects a reaction from the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handling {
    None,
    Acknowledge,
    Decision,
}

/// Status, setting or option entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureEntry {
    pub uid: Uid,
    #[serde(default)]
    pub access: Option<Access>,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
    #[serde(default)]
    pub step_size: Option<i64>,
    #[serde(default)]
    pub enumeration_type: Option<Uid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEntry {
    pub uid: Uid,
    #[serde(default)]
    pub level: Option<Level>,
    #[serde(default)]
    pub handling: Option<Handling>,
    #[serde(default)]
    pub enumeration_type: Option<Uid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEntry {
    pub uid: Uid,
    #[serde(default)]
    pub access: Option<Access>,
    #[serde(default = "default_available")]
    pub available: bool,
}

/// A program and the option UIDs it accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramEntry {
    pub uid: Uid,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub options: Vec<Uid>,
}

/// Set of integer values a feature may take
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumerationType {
    pub id: Uid,
    #[serde(default)]
    pub subset_of: Option<Uid>,
    #[serde(default)]
    pub values: Vec<i64>,
}

fn default_available() -> bool {
    true
}

/// Capabilities of one appliance model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceDescription {
    pub statuses: Vec<FeatureEntry>,
    pub settings: Vec<FeatureEntry>,
    pub events: Vec<EventEntry>,
    pub commands: Vec<CommandEntry>,
    pub options: Vec<FeatureEntry>,
    pub programs: Vec<ProgramEntry>,
    pub active_program_uid: Option<Uid>,
    pub selected_program_uid: Option<Uid>,
    pub enumeration_types: Vec<EnumerationType>,
}

/// Labels of one enumeration type, e.g. `BSH.Common.EnumType.PowerState`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDescription {
    /// UID of the enumeration type
    pub id: Uid,
    pub key: String,
    pub values: BTreeMap<i64, String>,
}

/// Names for UIDs and enumeration values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureMapping {
    pub feature_map: BTreeMap<Uid, String>,
    pub error_map: BTreeMap<Uid, String>,
    pub enum_description_list: Vec<EnumDescription>,
}

/// The description pair of an appliance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplianceDescription {
    pub device_description: DeviceDescription,
    pub feature_mapping: FeatureMapping,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_description_pair() {
        let description: ApplianceDescription = serde_json::from_value(json!({
            "deviceDescription": {
                "settings": [{"uid": 539, "access": "readWrite", "enumerationType": 17}],
                "events": [{"uid": 21, "level": "alert", "handling": "acknowledge"}],
                "programs": [{"uid": 8192, "options": [558, 559]}],
                "enumerationTypes": [{"id": 17, "values": [0, 1, 2]}],
                "selectedProgramUid": 8192
            },
            "featureMapping": {
                "featureMap": {"539": "BSH.Common.Setting.PowerState"},
                "errorMap": {"21": "BSH.Common.Event.ProgramAborted"},
                "enumDescriptionList": [{"id": 17, "key": "BSH.Common.EnumType.PowerState", "values": {"1": "Off", "2": "On"}}]
            }
        }))
        .unwrap();

        let device = &description.device_description;
        assert_eq!(device.settings[0].access, Some(Access::ReadWrite));
        assert!(device.settings[0].available);
        assert_eq!(device.events[0].level, Some(Level::Alert));
        assert_eq!(device.programs[0].options, vec![558, 559]);
        assert_eq!(device.selected_program_uid, Some(8192));
        assert!(device.statuses.is_empty());

        let mapping = &description.feature_mapping;
        assert_eq!(mapping.feature_map.get(&539).map(String::as_str), Some("BSH.Common.Setting.PowerState"));
        assert_eq!(mapping.enum_description_list[0].values.get(&2).map(String::as_str), Some("On"));
    }
}
