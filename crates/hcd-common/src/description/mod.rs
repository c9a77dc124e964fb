//! Appliance description model and resolution
//!
//! Maps the numeric UIDs used on the wire to the feature, program and
//! enumeration names of an appliance.

pub mod keys;
pub mod model;
pub mod resolver;

pub use model::{
    ApplianceDescription, CommandEntry, DeviceDescription, EnumDescription, EnumerationType,
    EventEntry, FeatureEntry, FeatureMapping, Handling, Level, ProgramEntry,
};
pub use resolver::{
    humanize, spin_speed_label, temperature_label, value_label, DescriptionResolver, Event,
    EventValue,
};
