//! Name and value resolution over an [`ApplianceDescription`]
//!
//! All lookups are total: a missing description, an unknown UID or a
//! dangling enumeration type degrade to a fallback instead of failing.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::description::keys;
use crate::description::model::{ApplianceDescription, EnumDescription, FeatureEntry};
use crate::types::Uid;

/// Resolved value of an appliance event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Null,
}

impl EventValue {
    /// Integer view; text is parsed, anything else is 0
    pub fn as_int(&self) -> i64 {
        match self {
            EventValue::Int(v) => *v,
            EventValue::Float(v) => *v as i64,
            EventValue::Text(s) => s.trim().parse().unwrap_or(0),
            EventValue::Bool(_) | EventValue::Null => 0,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            EventValue::Bool(v) => *v,
            EventValue::Text(s) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    pub fn as_text(&self) -> String {
        self.to_string()
    }
}

impl From<&Value> for EventValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => EventValue::Null,
            Value::Bool(b) => EventValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => EventValue::Int(i),
                None => EventValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => EventValue::Text(s.clone()),
            other => EventValue::Text(other.to_string()),
        }
    }
}

impl fmt::Display for EventValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventValue::Int(v) => write!(f, "{}", v),
            EventValue::Float(v) => write!(f, "{}", v),
            EventValue::Bool(v) => write!(f, "{}", v),
            EventValue::Text(v) => write!(f, "{}", v),
            EventValue::Null => write!(f, "null"),
        }
    }
}

/// A feature update with its name and value resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub uid: Uid,
    pub name: String,
    pub value: EventValue,
}

/// Integral view of a JSON value, as used for enum and program lookups
fn integral(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Lookup tables derived from one description pair
#[derive(Debug, Clone, Default)]
pub struct DescriptionResolver {
    description: ApplianceDescription,
    feature_uids: HashMap<String, Uid>,
    error_uids: HashMap<String, Uid>,
}

impl DescriptionResolver {
    pub fn new(description: ApplianceDescription) -> Self {
        let mapping = &description.feature_mapping;
        // BTreeMap iteration is ascending, so on duplicate names the lowest UID wins
        let mut feature_uids = HashMap::new();
        for (uid, name) in &mapping.feature_map {
            feature_uids.entry(name.clone()).or_insert(*uid);
        }
        let mut error_uids = HashMap::new();
        for (uid, name) in &mapping.error_map {
            error_uids.entry(name.clone()).or_insert(*uid);
        }

        Self {
            description,
            feature_uids,
            error_uids,
        }
    }

    /// Resolver without a description; every lookup falls back
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn description(&self) -> &ApplianceDescription {
        &self.description
    }

    /// Name of a UID: feature map, then error map, then the decimal UID
    pub fn uid_to_name(&self, uid: Uid) -> String {
        let mapping = &self.description.feature_mapping;
        mapping
            .feature_map
            .get(&uid)
            .or_else(|| mapping.error_map.get(&uid))
            .cloned()
            .unwrap_or_else(|| uid.to_string())
    }

    pub fn name_to_uid(&self, name: &str) -> Option<Uid> {
        self.feature_uids
            .get(name)
            .or_else(|| self.error_uids.get(name))
            .copied()
    }

    /// Enumeration type of a feature, searching statuses, settings, events and options in that order
    pub fn enum_uid_for(&self, uid: Uid) -> Option<Uid> {
        let device = &self.description.device_description;
        let in_features = |entries: &[FeatureEntry]| {
            entries
                .iter()
                .find(|entry| entry.uid == uid)
                .and_then(|entry| entry.enumeration_type)
        };

        in_features(&device.statuses)
            .or_else(|| in_features(&device.settings))
            .or_else(|| {
                device
                    .events
                    .iter()
                    .find(|entry| entry.uid == uid)
                    .and_then(|entry| entry.enumeration_type)
            })
            .or_else(|| in_features(&device.options))
    }

    fn enum_by_key(&self, key: &str) -> Option<&EnumDescription> {
        self.description
            .feature_mapping
            .enum_description_list
            .iter()
            .find(|e| e.key == key)
    }

    fn enum_by_id(&self, id: Uid) -> Option<&EnumDescription> {
        self.description
            .feature_mapping
            .enum_description_list
            .iter()
            .find(|e| e.id == id)
    }

    /// Label of `value` in the enumeration named `key`
    pub fn resolve_enum_value(&self, key: &str, value: i64) -> Option<&str> {
        self.enum_by_key(key)
            .and_then(|e| e.values.get(&value))
            .map(String::as_str)
    }

    /// Numeric value of `label` in the enumeration named `key`
    pub fn resolve_enum_label(&self, key: &str, label: &str) -> Option<i64> {
        self.enum_by_key(key).and_then(|e| {
            e.values
                .iter()
                .find(|(_, l)| l.as_str() == label)
                .map(|(v, _)| *v)
        })
    }

    /// Numeric value of `label` in the enumeration type with UID `enum_uid`
    pub fn resolve_enum_label_by_uid(&self, enum_uid: Uid, label: &str) -> Option<i64> {
        self.enum_by_id(enum_uid).and_then(|e| {
            e.values
                .iter()
                .find(|(_, l)| l.as_str() == label)
                .map(|(v, _)| *v)
        })
    }

    /// Declared values of an enumeration type
    pub fn enum_values(&self, enum_uid: Uid) -> Vec<i64> {
        self.description
            .device_description
            .enumeration_types
            .iter()
            .filter(|t| t.id == enum_uid)
            .flat_map(|t| t.values.iter().copied())
            .collect()
    }

    /// Enumeration type that `enum_uid` is a subset of
    pub fn enum_parent(&self, enum_uid: Uid) -> Option<Uid> {
        self.description
            .device_description
            .enumeration_types
            .iter()
            .filter(|t| t.id == enum_uid)
            .find_map(|t| t.subset_of)
    }

    /// Declared values of an enumeration type within `[min, max]`, in declaration order
    pub fn program_options(&self, enum_uid: Uid, min: Option<i64>, max: Option<i64>) -> Vec<i64> {
        self.enum_values(enum_uid)
            .into_iter()
            .filter(|v| min.map_or(true, |min| *v >= min))
            .filter(|v| max.map_or(true, |max| *v <= max))
            .collect()
    }

    /// Map a raw feature value to its enum label when the feature is enum-typed
    pub fn resolve_value(&self, uid: Uid, raw: &Value) -> EventValue {
        let label = self.enum_uid_for(uid).and_then(|enum_uid| {
            let value = integral(raw)?;
            self.enum_by_id(enum_uid)?.values.get(&value)
        });
        match label {
            Some(label) => EventValue::Text(label.clone()),
            None => EventValue::from(raw),
        }
    }

    /// Turn a `{uid, value}` record into a named event.
    ///
    /// Selected/active program values are program UIDs and resolve to the
    /// program name; other enum-typed values resolve to their label.
    pub fn resolve_event(&self, uid: Uid, raw: &Value) -> Event {
        let name = self.uid_to_name(uid);
        let value = if name == keys::SELECTED_PROGRAM || name == keys::ACTIVE_PROGRAM {
            match integral(raw) {
                Some(program) => match u32::try_from(program)
                    .ok()
                    .and_then(|p| self.description.feature_mapping.feature_map.get(&p))
                {
                    Some(program_name) => EventValue::Text(program_name.clone()),
                    None => EventValue::Int(program),
                },
                None => EventValue::from(raw),
            }
        } else {
            self.resolve_value(uid, raw)
        };
        Event { uid, name, value }
    }

    pub fn is_program(&self, uid: Uid) -> bool {
        self.description
            .device_description
            .programs
            .iter()
            .any(|p| p.uid == uid)
    }

    /// UID of a program by name; only UIDs present in the program list qualify
    pub fn program_uid(&self, name: &str) -> Option<Uid> {
        self.name_to_uid(name).filter(|uid| self.is_program(*uid))
    }

    /// Program names with their availability as declared by the description
    pub fn programs(&self) -> BTreeMap<String, bool> {
        self.description
            .device_description
            .programs
            .iter()
            .map(|p| (self.uid_to_name(p.uid), p.available))
            .collect()
    }
}

/// Human readable label for a dotted key.
///
/// Takes the last segment and splits it into words at case changes:
/// `BSH.Common.EnumType.OperationState.DelayedStart` becomes `Delayed Start`.
/// Keys without a dot are returned unchanged.
pub fn humanize(key: &str) -> String {
    let segment = match key.rfind('.') {
        Some(index) if index > 0 => &key[index + 1..],
        _ => return key.to_string(),
    };

    let chars: Vec<char> = segment.chars().collect();
    let mut label = String::with_capacity(segment.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_ascii_uppercase() {
            let prev_upper = chars[i - 1].is_ascii_uppercase();
            let next_lower = chars.get(i + 1).map_or(false, |n| n.is_ascii_lowercase());
            if !prev_upper || next_lower {
                label.push(' ');
            }
        }
        label.push(c);
    }
    label
}

/// Washer temperature label, e.g. `...Temperature.GC40` becomes `40 °C`
pub fn temperature_label(key: &str) -> String {
    let segment = key.rsplit('.').next().unwrap_or(key);
    let segment = segment.strip_prefix("Ul").unwrap_or(segment);
    match segment.strip_prefix("GC") {
        Some(degrees) if !degrees.is_empty() => format!("{} °C", degrees),
        _ => humanize(key),
    }
}

/// Spin speed label, e.g. `...SpinSpeed.RPM1400` becomes `1400 RPM`
pub fn spin_speed_label(key: &str) -> String {
    let segment = key.rsplit('.').next().unwrap_or(key);
    let segment = segment.strip_prefix("Ul").unwrap_or(segment);
    match segment.strip_prefix("RPM") {
        Some(rpm) if !rpm.is_empty() => format!("{} RPM", rpm),
        _ => humanize(key),
    }
}

/// Display label for an enumeration value of `feature`
pub fn value_label(feature: &str, label: &str) -> String {
    match feature {
        keys::WASHER_TEMPERATURE => temperature_label(label),
        keys::WASHER_SPIN_SPEED => spin_speed_label(label),
        _ => humanize(label),
    }
}
