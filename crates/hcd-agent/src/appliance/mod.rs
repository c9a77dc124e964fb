//! Appliance connections
//!
//! Each configured appliance runs as one actor task ([`Appliance`]) that owns
//! its transport and protocol [`Session`](session::Session). Consumers
//! subscribe to [`ApplianceEvent`]s, watch the connection status, and read the
//! diagnostic [`MessageHistory`](history::MessageHistory).

pub mod command;
pub mod connection;
pub mod event;
pub mod history;
pub mod reconnect;
pub mod session;

pub use command::{ApplianceCommand, CommandValue};
pub use connection::{Appliance, ApplianceSetup};
pub use event::ApplianceEvent;
