//! Agent configuration management
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/hcd/config.toml, or `--config`)
//! 3. Environment variables (HCD__*)

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use hcd_common::description::{ApplianceDescription, DescriptionResolver};
use hcd_common::transport::TransportConfig;
use hcd_common::{ConnectionType, Credentials, DeviceIdentity, HaId, HcdError};

use crate::appliance::history::DEFAULT_HISTORY_CAPACITY;
use crate::appliance::ApplianceSetup;

/// Main agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// How this client presents itself to appliances
    #[serde(default)]
    pub identity: DeviceIdentity,

    /// Keepalive and timeout settings
    #[serde(default)]
    pub transport: TransportConfig,

    /// Messages kept per appliance for diagnostics
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default)]
    pub appliances: Vec<ApplianceConfig>,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

/// One appliance on the local network
#[derive(Clone, Serialize, Deserialize)]
pub struct ApplianceConfig {
    /// Home appliance id, e.g. `BOSCH-WAX32M41-68A40E000000`
    #[serde(default)]
    pub ha_id: String,

    /// Host name or IP address
    #[serde(default)]
    pub address: Option<String>,

    pub connection_type: Option<ConnectionType>,

    /// Base64url key (PSK for TLS, shared secret for AES)
    pub key: Option<String>,

    /// Base64url IV, AES only
    pub iv: Option<String>,

    /// Path to the appliance description JSON
    pub description: Option<PathBuf>,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

fn default_reconnect_delay() -> u64 {
    60
}

impl std::fmt::Debug for ApplianceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplianceConfig")
            .field("ha_id", &self.ha_id)
            .field("address", &self.address)
            .field("connection_type", &self.connection_type)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("iv", &self.iv.as_ref().map(|_| "<redacted>"))
            .field("description", &self.description)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .finish()
    }
}

impl AgentConfig {
    /// Load configuration from file and environment
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Self::defaults()?;

        match path {
            Some(path) => {
                builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
            }
            None => {
                let default_path = Self::config_path()?;
                if default_path.exists() {
                    builder = builder.add_source(config::File::from(default_path).required(false));
                }
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("HCD")
                .separator("__")
                .try_parsing(true),
        );

        let config: AgentConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    fn defaults() -> anyhow::Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let identity = DeviceIdentity::default();
        Ok(config::Config::builder()
            .set_default("identity.device_name", identity.device_name)?
            .set_default("identity.device_id", identity.device_id)?
            .set_default("history_capacity", DEFAULT_HISTORY_CAPACITY as i64)?)
    }

    /// Get the configuration file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("hcd");

        Ok(config_dir.join("config.toml"))
    }

    pub fn appliance(&self, ha_id: &str) -> Option<&ApplianceConfig> {
        self.appliances.iter().find(|a| a.ha_id == ha_id)
    }
}

impl ApplianceConfig {
    /// Check that the connection can be attempted at all
    pub fn validate(&self) -> hcd_common::Result<()> {
        if self.ha_id.trim().is_empty() {
            return Err(HcdError::ConfigError("appliance id is missing".into()));
        }
        if self.address.as_deref().map_or(true, |a| a.trim().is_empty()) {
            return Err(HcdError::ConfigError(format!("{}: address is missing", self.ha_id)));
        }
        if self.connection_type.is_none() {
            return Err(HcdError::ConfigError(format!(
                "{}: connection_type is missing",
                self.ha_id
            )));
        }
        Ok(())
    }

    /// Channel credentials for this appliance
    pub fn credentials(&self) -> hcd_common::Result<Credentials> {
        self.validate()?;
        let key = self
            .key
            .clone()
            .ok_or_else(|| HcdError::ConfigError(format!("{}: key is missing", self.ha_id)))?;

        match self.connection_type {
            Some(ConnectionType::AesHmacSha256) => {
                let iv = self.iv.clone().ok_or_else(|| {
                    HcdError::ConfigError(format!("{}: iv is required for AES", self.ha_id))
                })?;
                Ok(Credentials::AesHmac { key, iv })
            }
            Some(ConnectionType::Tls) => Ok(Credentials::Psk { key }),
            None => Err(HcdError::ConfigError(format!(
                "{}: connection_type is missing",
                self.ha_id
            ))),
        }
    }

    pub fn address(&self) -> &str {
        self.address.as_deref().unwrap_or_default()
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Read the description file. Without one, names fall back to UIDs.
    pub fn load_resolver(&self) -> anyhow::Result<Arc<DescriptionResolver>> {
        let Some(path) = &self.description else {
            warn!(ha_id = %self.ha_id, "No description configured, events will carry numeric names");
            return Ok(Arc::new(DescriptionResolver::empty()));
        };
        let description = load_description(path)?;
        Ok(Arc::new(DescriptionResolver::new(description)))
    }

    /// Actor settings for this appliance
    pub fn setup(&self, agent: &AgentConfig) -> anyhow::Result<ApplianceSetup> {
        let mut setup = ApplianceSetup::new(HaId::new(self.ha_id.clone()), self.load_resolver()?);
        setup.identity = agent.identity.clone();
        setup.reconnect_delay = self.reconnect_delay();
        setup.history_capacity = agent.history_capacity;
        Ok(setup)
    }
}

/// Parse an appliance description (`deviceDescription` + `featureMapping`) from JSON
pub fn load_description(path: &Path) -> anyhow::Result<ApplianceDescription> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read description {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid description {}", path.display()))
}
