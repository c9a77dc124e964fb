//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::appliance::{ApplianceCommand, CommandValue};

/// hcd - talk to Home Connect appliances on the local network
#[derive(Parser, Debug)]
#[command(name = "hcd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: ~/.config/hcd/config.toml)
    #[arg(short, long, global = true, env = "HCD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to the configured appliances and log their events
    Run {
        /// Only connect to this appliance
        #[arg(short, long)]
        appliance: Option<String>,

        /// Write the message history as JSON on exit
        #[arg(long)]
        history_out: Option<PathBuf>,
    },

    /// Send a single command to an appliance
    #[command(alias = "cmd")]
    Command {
        /// Appliance id
        appliance: String,

        /// Seconds to wait for the handshake
        #[arg(long, default_value_t = 30)]
        timeout: u64,

        #[command(subcommand)]
        action: CommandAction,
    },

    /// Resolve a feature name or UID using the appliance description
    Lookup {
        /// Appliance id
        appliance: String,

        /// Feature name or numeric UID
        query: String,
    },

    /// Check whether the TLS library supports the appliance PSK cipher suite
    ProbeTls,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CommandAction {
    /// Switch the appliance on or off
    Power {
        #[arg(value_enum)]
        state: PowerArg,
    },

    /// Write a feature value (enum label, number or true/false)
    Set { name: String, value: String },

    /// Control the running program
    Program {
        #[arg(value_enum)]
        action: ProgramArg,
    },

    /// Select a program by name
    Select { program: String },

    /// Re-read all mandatory values
    Refresh,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerArg {
    On,
    Off,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramArg {
    Start,
    Stop,
    Pause,
    Resume,
}

impl CommandAction {
    pub fn to_command(&self) -> ApplianceCommand {
        match self {
            CommandAction::Power { state } => ApplianceCommand::SetPower(*state == PowerArg::On),
            CommandAction::Set { name, value } => ApplianceCommand::SetFeature {
                name: name.clone(),
                value: value
                    .parse::<CommandValue>()
                    .unwrap_or_else(|_| CommandValue::Text(value.clone())),
            },
            CommandAction::Program { action } => match action {
                ProgramArg::Start => ApplianceCommand::StartProgram,
                ProgramArg::Stop => ApplianceCommand::StopProgram,
                ProgramArg::Pause => ApplianceCommand::PauseProgram,
                ProgramArg::Resume => ApplianceCommand::ResumeProgram,
            },
            CommandAction::Select { program } => ApplianceCommand::SelectProgram(program.clone()),
            CommandAction::Refresh => ApplianceCommand::Refresh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_parsing() {
        let cli = Cli::parse_from(["hcd", "run", "--appliance", "BOSCH-X", "--history-out", "h.json"]);
        match cli.command {
            Commands::Run {
                appliance,
                history_out,
            } => {
                assert_eq!(appliance.as_deref(), Some("BOSCH-X"));
                assert_eq!(history_out, Some(PathBuf::from("h.json")));
            }
            _ => panic!("Wrong command"),
        }
    }

    #[test]
    fn test_command_parsing() {
        let cli = Cli::parse_from(["hcd", "-v", "command", "BOSCH-X", "power", "off"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Command {
                appliance, action, ..
            } => {
                assert_eq!(appliance, "BOSCH-X");
                assert_eq!(action.to_command(), ApplianceCommand::SetPower(false));
            }
            _ => panic!("Wrong command"),
        }
    }

    #[test]
    fn test_set_value_parsing() {
        let cli = Cli::parse_from([
            "hcd",
            "command",
            "BOSCH-X",
            "set",
            "LaundryCare.Washer.Option.SpinSpeed",
            "1400",
        ]);
        match cli.command {
            Commands::Command { action, .. } => assert_eq!(
                action.to_command(),
                ApplianceCommand::SetFeature {
                    name: "LaundryCare.Washer.Option.SpinSpeed".into(),
                    value: CommandValue::Number(1400),
                }
            ),
            _ => panic!("Wrong command"),
        }
    }

    #[test]
    fn test_set_label_stays_text() {
        let cli = Cli::parse_from([
            "hcd",
            "command",
            "BOSCH-X",
            "set",
            "LaundryCare.Washer.Option.Temperature",
            "GC40",
        ]);
        match cli.command {
            Commands::Command { action, .. } => assert_eq!(
                action.to_command(),
                ApplianceCommand::SetFeature {
                    name: "LaundryCare.Washer.Option.Temperature".into(),
                    value: CommandValue::Text("GC40".into()),
                }
            ),
            _ => panic!("Wrong command"),
        }
    }

    #[test]
    fn test_program_parsing() {
        let cli = Cli::parse_from(["hcd", "cmd", "BOSCH-X", "program", "pause"]);
        match cli.command {
            Commands::Command { action, .. } => {
                assert_eq!(action.to_command(), ApplianceCommand::PauseProgram)
            }
            _ => panic!("Wrong command"),
        }
    }

    #[test]
    fn test_probe_tls_parsing() {
        let cli = Cli::parse_from(["hcd", "probe-tls"]);
        assert!(matches!(cli.command, Commands::ProbeTls));
    }
}
