use atem::ClientConfig;
use error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;

pub mod error;

const CONFIG_FILE_NAME: &str = "atemctl.toml";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub switcher: SwitcherConfig,
    pub log: LogConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SwitcherConfig {
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    pub level: String,
    /// Cap for the protocol/transport modules; their trace output is
    /// per-datagram and usually unwanted at the application's level.
    pub wire_level: String,
}

impl Default for SwitcherConfig {
    fn default() -> Self {
        Self {
            address: format!("192.168.10.240:{}", atem::ATEM_PORT),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            wire_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if SocketAddr::from_str(&self.switcher.address).is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid switcher address format: '{}'. Expected format like 'IP:PORT'.",
                self.switcher.address
            )));
        }

        for level in [&self.log.level, &self.log.wire_level] {
            if log::Level::from_str(level).is_err() {
                return Err(ConfigError::Validation(format!(
                    "Invalid log level: '{}'.",
                    level
                )));
            }
        }

        self.client
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        Ok(())
    }
}

/// Loads `atemctl.toml` from the working directory. A missing file is not
/// an error: defaults are written out for the user to edit and returned.
pub fn handle() -> Result<Config, ConfigError> {
    let path = Path::new(CONFIG_FILE_NAME);
    match fs::read_to_string(path) {
        Ok(raw) => {
            let config: Config = toml::from_str(&raw)?;
            config.validate()?;
            Ok(config)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let defaults = Config::default();
            fs::write(path, toml::to_string_pretty(&defaults)?)?;
            Ok(defaults)
        }
        Err(e) => Err(ConfigError::Io(e)),
    }
}
