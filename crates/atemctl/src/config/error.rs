use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write the configuration file: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlDeserialization(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerialization(#[from] toml::ser::Error),
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
