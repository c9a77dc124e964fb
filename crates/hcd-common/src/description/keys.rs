//! Well-known feature keys shared across appliance types

pub const POWER_STATE: &str = "BSH.Common.Setting.PowerState";
pub const POWER_STATE_ENUM: &str = "BSH.Common.EnumType.PowerState";
pub const POWER_ON: &str = "On";
pub const POWER_OFF: &str = "Off";
pub const POWER_STANDBY: &str = "Standby";

pub const SELECTED_PROGRAM: &str = "BSH.Common.Root.SelectedProgram";
pub const ACTIVE_PROGRAM: &str = "BSH.Common.Root.ActiveProgram";

pub const ABORT_PROGRAM: &str = "BSH.Common.Command.AbortProgram";
pub const PAUSE_PROGRAM: &str = "BSH.Common.Command.PauseProgram";
pub const RESUME_PROGRAM: &str = "BSH.Common.Command.ResumeProgram";

pub const WASHER_TEMPERATURE: &str = "LaundryCare.Washer.Option.Temperature";
pub const WASHER_SPIN_SPEED: &str = "LaundryCare.Washer.Option.SpinSpeed";
