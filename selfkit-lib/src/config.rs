//! Account configuration handed to the SDK when a session is opened.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::{Result, SelfkitError};

/// Length of the storage key used to encrypt local account state.
pub const STORAGE_KEY_LEN: usize = 32;

/// Network environment the account targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Development environment.
    Develop,
    /// Public sandbox environment.
    #[default]
    Sandbox,
}

impl Target {
    /// Environment name as used on the command line and in env vars.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Develop => "develop",
            Self::Sandbox => "sandbox",
        }
    }
}

impl FromStr for Target {
    type Err = SelfkitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "develop" | "dev" => Ok(Self::Develop),
            "sandbox" => Ok(Self::Sandbox),
            other => Err(SelfkitError::invalid_data(
                "environment",
                format!("unknown environment '{}'", other),
            )),
        }
    }
}

/// Log granularity requested from the SDK itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration for opening an account session.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Key used to encrypt local account state at rest.
    pub storage_key: [u8; STORAGE_KEY_LEN],
    /// Directory holding local account state.
    pub storage_path: PathBuf,
    /// Environment to target.
    #[serde(default)]
    pub environment: Target,
    /// SDK log granularity.
    #[serde(default)]
    pub log_level: LogLevel,
}

impl AccountConfig {
    /// Create a configuration with default environment and log level.
    pub fn new(storage_path: impl Into<PathBuf>, storage_key: [u8; STORAGE_KEY_LEN]) -> Self {
        Self {
            storage_key,
            storage_path: storage_path.into(),
            environment: Target::default(),
            log_level: LogLevel::default(),
        }
    }

    /// Set the target environment.
    pub fn with_environment(mut self, environment: Target) -> Self {
        self.environment = environment;
        self
    }

    /// Set the SDK log level.
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// Parse a storage key from 64 hex characters.
    pub fn parse_storage_key(hex_key: &str) -> Result<[u8; STORAGE_KEY_LEN]> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| SelfkitError::invalid_data("storage key", e.to_string()))?;
        bytes.try_into().map_err(|b: Vec<u8>| {
            SelfkitError::invalid_data(
                "storage key",
                format!("expected {} bytes, got {}", STORAGE_KEY_LEN, b.len()),
            )
        })
    }

    /// Generate a random storage key.
    pub fn random_storage_key() -> [u8; STORAGE_KEY_LEN] {
        use rand::RngCore;

        let mut key = [0u8; STORAGE_KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        key
    }
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("storage_key", &"<redacted>")
            .field("storage_path", &self.storage_path)
            .field("environment", &self.environment)
            .field("log_level", &self.log_level)
            .finish()
    }
}
