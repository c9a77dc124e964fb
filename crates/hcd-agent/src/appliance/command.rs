//! User commands and their translation into protocol requests
//!
//! Commands are expressed with feature and program names. Resolution needs
//! the appliance description; when a name or label cannot be resolved the
//! command is rejected and nothing is sent.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

use hcd_common::description::{keys, DescriptionResolver};
use hcd_common::protocol::resource::{
    RO_ACTIVE_PROGRAM, RO_ALL_MANDATORY_VALUES, RO_SELECTED_PROGRAM, RO_VALUES,
};
use hcd_common::protocol::{FeatureValue, ProgramSelection};
use hcd_common::{Action, Payload, Resource, Uid};

/// Commands are written with this protocol version
const COMMAND_VERSION: u32 = 1;

/// Value for a feature write
#[derive(Debug, Clone, PartialEq)]
pub enum CommandValue {
    Bool(bool),
    Number(i64),
    /// Enum label, or free text for features without an enumeration type
    Text(String),
}

impl FromStr for CommandValue {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("on") {
            Ok(CommandValue::Bool(true))
        } else if s.eq_ignore_ascii_case("false") || s.eq_ignore_ascii_case("off") {
            Ok(CommandValue::Bool(false))
        } else if let Ok(n) = s.parse::<i64>() {
            Ok(CommandValue::Number(n))
        } else {
            Ok(CommandValue::Text(s.to_string()))
        }
    }
}

impl fmt::Display for CommandValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandValue::Bool(v) => write!(f, "{}", v),
            CommandValue::Number(v) => write!(f, "{}", v),
            CommandValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// An action requested by the user
#[derive(Debug, Clone, PartialEq)]
pub enum ApplianceCommand {
    /// Switch on, or off (standby when the appliance has no off state)
    SetPower(bool),
    SetFeature { name: String, value: CommandValue },
    /// Start the currently selected program
    StartProgram,
    StopProgram,
    PauseProgram,
    ResumeProgram,
    SelectProgram(String),
    /// Start a program with explicit option values
    ActivateProgram(ProgramSelection),
    /// Re-read all mandatory values
    Refresh,
}

/// Why a command could not be turned into a request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    #[error("unknown program: {0}")]
    UnknownProgram(String),

    #[error("value {label} is not part of the enumeration of {feature}")]
    UnknownEnumLabel { feature: String, label: String },

    #[error("no program selected")]
    NoSelectedProgram,

    #[error("appliance is not ready for commands")]
    NotReady,
}

impl CommandError {
    /// The command names something this appliance's description does not
    /// know, or needs a program selection that has not been reported
    pub fn is_resolution_miss(&self) -> bool {
        !matches!(self, CommandError::NotReady)
    }
}

/// A resolved command, ready to be assigned message ids
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub action: Action,
    pub resource: Resource,
    pub data: Option<Payload>,
    pub version: Option<u32>,
}

impl Request {
    fn post(resource: Resource, data: Payload) -> Self {
        Self {
            action: Action::Post,
            resource,
            data: Some(data),
            version: Some(COMMAND_VERSION),
        }
    }

    fn write_value(uid: Uid, value: impl Into<Value>) -> Self {
        Self::post(RO_VALUES, Payload::FeatureUpdate(vec![FeatureValue::new(uid, value)]))
    }

    fn program(resource: Resource, selection: ProgramSelection) -> Self {
        Self::post(resource, Payload::ProgramSelection(vec![selection]))
    }
}

impl ApplianceCommand {
    /// Translate into a request using the appliance description.
    ///
    /// `selected_program` is the program name last reported by the appliance.
    pub fn resolve(
        &self,
        resolver: &DescriptionResolver,
        selected_program: Option<&str>,
    ) -> Result<Request, CommandError> {
        match self {
            ApplianceCommand::SetPower(on) => {
                let uid = feature_uid(resolver, keys::POWER_STATE)?;
                let label = |l: &str| resolver.resolve_enum_label(keys::POWER_STATE_ENUM, l);
                let value = if *on {
                    label(keys::POWER_ON)
                } else {
                    label(keys::POWER_OFF).or_else(|| label(keys::POWER_STANDBY))
                };
                let value = value.ok_or_else(|| CommandError::UnknownEnumLabel {
                    feature: keys::POWER_STATE.to_string(),
                    label: if *on { keys::POWER_ON } else { keys::POWER_OFF }.to_string(),
                })?;
                Ok(Request::write_value(uid, value))
            }
            ApplianceCommand::SetFeature { name, value } => {
                let uid = feature_uid(resolver, name)?;
                Ok(Request::write_value(uid, feature_value(resolver, name, uid, value)?))
            }
            ApplianceCommand::StartProgram => {
                let name = selected_program.ok_or(CommandError::NoSelectedProgram)?;
                let uid = resolver
                    .program_uid(name)
                    .ok_or_else(|| CommandError::UnknownProgram(name.to_string()))?;
                Ok(Request::program(
                    RO_ACTIVE_PROGRAM,
                    ProgramSelection {
                        program: uid,
                        options: Vec::new(),
                    },
                ))
            }
            ApplianceCommand::StopProgram => {
                Ok(Request::write_value(feature_uid(resolver, keys::ABORT_PROGRAM)?, true))
            }
            ApplianceCommand::PauseProgram => {
                Ok(Request::write_value(feature_uid(resolver, keys::PAUSE_PROGRAM)?, true))
            }
            ApplianceCommand::ResumeProgram => {
                Ok(Request::write_value(feature_uid(resolver, keys::RESUME_PROGRAM)?, true))
            }
            ApplianceCommand::SelectProgram(name) => {
                let uid = resolver
                    .program_uid(name)
                    .ok_or_else(|| CommandError::UnknownProgram(name.clone()))?;
                Ok(Request::program(
                    RO_SELECTED_PROGRAM,
                    ProgramSelection {
                        program: uid,
                        options: Vec::new(),
                    },
                ))
            }
            ApplianceCommand::ActivateProgram(selection) => {
                if !resolver.is_program(selection.program) {
                    return Err(CommandError::UnknownProgram(selection.program.to_string()));
                }
                Ok(Request::program(RO_ACTIVE_PROGRAM, selection.clone()))
            }
            ApplianceCommand::Refresh => Ok(Request {
                action: Action::Get,
                resource: RO_ALL_MANDATORY_VALUES,
                data: None,
                version: None,
            }),
        }
    }
}

fn feature_uid(resolver: &DescriptionResolver, name: &str) -> Result<Uid, CommandError> {
    resolver
        .name_to_uid(name)
        .ok_or_else(|| CommandError::UnknownFeature(name.to_string()))
}

fn feature_value(
    resolver: &DescriptionResolver,
    name: &str,
    uid: Uid,
    value: &CommandValue,
) -> Result<Value, CommandError> {
    match value {
        CommandValue::Bool(b) => Ok(Value::Bool(*b)),
        CommandValue::Number(n) => Ok(Value::from(*n)),
        CommandValue::Text(label) => match resolver.enum_uid_for(uid) {
            Some(enum_uid) => resolver
                .resolve_enum_label_by_uid(enum_uid, label)
                .map(Value::from)
                .ok_or_else(|| CommandError::UnknownEnumLabel {
                    feature: name.to_string(),
                    label: label.clone(),
                }),
            None => Ok(Value::String(label.clone())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcd_common::description::ApplianceDescription;
    use serde_json::json;

    fn resolver(with_off: bool) -> DescriptionResolver {
        let power_values = if with_off {
            json!({"1": "Off", "2": "On", "3": "Standby"})
        } else {
            json!({"2": "On", "3": "Standby"})
        };
        let description: ApplianceDescription = serde_json::from_value(json!({
            "deviceDescription": {
                "settings": [
                    {"uid": 539, "enumerationType": 17},
                    {"uid": 700}
                ],
                "options": [{"uid": 558, "enumerationType": 40}],
                "programs": [{"uid": 8192}],
                "commands": [{"uid": 512}, {"uid": 513}, {"uid": 514}]
            },
            "featureMapping": {
                "featureMap": {
                    "539": "BSH.Common.Setting.PowerState",
                    "558": "LaundryCare.Washer.Option.Temperature",
                    "700": "BSH.Common.Setting.ChildLock",
                    "512": "BSH.Common.Command.AbortProgram",
                    "513": "BSH.Common.Command.PauseProgram",
                    "8192": "LaundryCare.Washer.Program.Cotton"
                },
                "enumDescriptionList": [
                    {"id": 17, "key": "BSH.Common.EnumType.PowerState", "values": power_values},
                    {"id": 40, "key": "LaundryCare.Washer.EnumType.Temperature", "values": {"0": "Cold", "4": "GC40"}}
                ]
            }
        }))
        .unwrap();
        DescriptionResolver::new(description)
    }

    fn values(request: &Request) -> Vec<FeatureValue> {
        match &request.data {
            Some(Payload::FeatureUpdate(values)) => values.clone(),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_command_value_parse() {
        assert_eq!("true".parse::<CommandValue>().unwrap(), CommandValue::Bool(true));
        assert_eq!("OFF".parse::<CommandValue>().unwrap(), CommandValue::Bool(false));
        assert_eq!("-5".parse::<CommandValue>().unwrap(), CommandValue::Number(-5));
        assert_eq!("GC40".parse::<CommandValue>().unwrap(), CommandValue::Text("GC40".into()));
    }

    #[test]
    fn test_power_on_off() {
        let r = resolver(true);
        let on = ApplianceCommand::SetPower(true).resolve(&r, None).unwrap();
        assert_eq!(on.action, Action::Post);
        assert_eq!(on.resource, RO_VALUES);
        assert_eq!(on.version, Some(1));
        assert_eq!(values(&on), vec![FeatureValue::new(539, 2)]);

        let off = ApplianceCommand::SetPower(false).resolve(&r, None).unwrap();
        assert_eq!(values(&off), vec![FeatureValue::new(539, 1)]);
    }

    #[test]
    fn test_power_off_falls_back_to_standby() {
        let off = ApplianceCommand::SetPower(false).resolve(&resolver(false), None).unwrap();
        assert_eq!(values(&off), vec![FeatureValue::new(539, 3)]);
    }

    #[test]
    fn test_set_feature_enum_label() {
        let r = resolver(true);
        let cmd = ApplianceCommand::SetFeature {
            name: "LaundryCare.Washer.Option.Temperature".into(),
            value: CommandValue::Text("GC40".into()),
        };
        assert_eq!(values(&cmd.resolve(&r, None).unwrap()), vec![FeatureValue::new(558, 4)]);

        let bad = ApplianceCommand::SetFeature {
            name: "LaundryCare.Washer.Option.Temperature".into(),
            value: CommandValue::Text("GC200".into()),
        };
        assert!(matches!(bad.resolve(&r, None), Err(CommandError::UnknownEnumLabel { .. })));
    }

    #[test]
    fn test_set_feature_plain_values() {
        let r = resolver(true);
        let cmd = ApplianceCommand::SetFeature {
            name: "BSH.Common.Setting.ChildLock".into(),
            value: CommandValue::Bool(true),
        };
        assert_eq!(values(&cmd.resolve(&r, None).unwrap()), vec![FeatureValue::new(700, true)]);

        let text = ApplianceCommand::SetFeature {
            name: "BSH.Common.Setting.ChildLock".into(),
            value: CommandValue::Text("free".into()),
        };
        assert_eq!(values(&text.resolve(&r, None).unwrap()), vec![FeatureValue::new(700, "free")]);
    }

    #[test]
    fn test_unknown_feature_dropped() {
        let cmd = ApplianceCommand::SetFeature {
            name: "Nope".into(),
            value: CommandValue::Number(1),
        };
        assert_eq!(
            cmd.resolve(&resolver(true), None),
            Err(CommandError::UnknownFeature("Nope".into()))
        );
        // no resume command in this description
        assert!(ApplianceCommand::ResumeProgram.resolve(&resolver(true), None).is_err());
    }

    #[test]
    fn test_program_commands() {
        let r = resolver(true);
        assert_eq!(
            ApplianceCommand::StartProgram.resolve(&r, None),
            Err(CommandError::NoSelectedProgram)
        );

        let start = ApplianceCommand::StartProgram
            .resolve(&r, Some("LaundryCare.Washer.Program.Cotton"))
            .unwrap();
        assert_eq!(start.resource, RO_ACTIVE_PROGRAM);
        assert_eq!(
            start.data,
            Some(Payload::ProgramSelection(vec![ProgramSelection { program: 8192, options: vec![] }]))
        );

        let select = ApplianceCommand::SelectProgram("LaundryCare.Washer.Program.Cotton".into())
            .resolve(&r, None)
            .unwrap();
        assert_eq!(select.resource, RO_SELECTED_PROGRAM);

        // a feature name that is not a program is rejected
        assert!(ApplianceCommand::SelectProgram("BSH.Common.Setting.PowerState".into())
            .resolve(&r, None)
            .is_err());

        let stop = ApplianceCommand::StopProgram.resolve(&r, None).unwrap();
        assert_eq!(values(&stop), vec![FeatureValue::new(512, true)]);
    }

    #[test]
    fn test_activate_program_with_options() {
        let r = resolver(true);
        let selection = ProgramSelection {
            program: 8192,
            options: vec![FeatureValue::new(558, 4)],
        };
        let request = ApplianceCommand::ActivateProgram(selection.clone()).resolve(&r, None).unwrap();
        assert_eq!(request.data, Some(Payload::ProgramSelection(vec![selection])));

        let unknown = ProgramSelection { program: 1, options: vec![] };
        assert!(ApplianceCommand::ActivateProgram(unknown).resolve(&r, None).is_err());
    }

    #[test]
    fn test_refresh_uses_negotiated_version() {
        let request = ApplianceCommand::Refresh.resolve(&resolver(true), None).unwrap();
        assert_eq!(request.action, Action::Get);
        assert_eq!(request.resource, RO_ALL_MANDATORY_VALUES);
        assert_eq!(request.version, None);
    }
}
