//! Demo configuration
//!
//! Values resolve in order: explicit flag, environment variable, platform data
//! directory, current directory.

use anyhow::{Context, Result};
use selfkit_interactive::{ExchangeConfig, RoundTimeout};
use selfkit_lib::config::{AccountConfig, LogLevel, Target, STORAGE_KEY_LEN};
use std::path::PathBuf;
use std::time::Duration;

/// Storage directory override.
pub const ENV_DEMO_DIR: &str = "SELFKIT_DEMO_DIR";
/// `develop` or `sandbox`.
pub const ENV_ENVIRONMENT: &str = "SELFKIT_ENVIRONMENT";
/// Seconds to wait for each round; `0` waits indefinitely.
pub const ENV_ROUND_TIMEOUT_SECS: &str = "SELFKIT_ROUND_TIMEOUT_SECS";
/// 64 hex characters.
pub const ENV_STORAGE_KEY: &str = "SELFKIT_STORAGE_KEY";

const APP_DIR: &str = "selfkit-demo";

/// Whether a simulated counterparty runs alongside the demo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerMode {
    #[default]
    Simulated,
    None,
}

/// Where the storage key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKeySource {
    Environment,
    /// Freshly generated; state written this run cannot be read next run.
    Generated,
}

#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub storage_dir: PathBuf,
    pub environment: Target,
    pub storage_key: [u8; STORAGE_KEY_LEN],
    pub storage_key_source: StorageKeySource,
    pub discovery_expiry: chrono::Duration,
    pub presentation_expiry: chrono::Duration,
    pub verification_expiry: chrono::Duration,
    pub round_timeout: RoundTimeout,
    pub peer: PeerMode,
    pub peer_delay: Duration,
    pub log_level: LogLevel,
}

impl DemoConfig {
    /// Resolve from the process environment.
    pub fn from_env(storage_dir: Option<PathBuf>) -> Result<Self> {
        Self::resolve(storage_dir, |name| std::env::var(name).ok())
    }

    /// Resolve using `lookup` in place of the process environment.
    pub fn resolve(
        storage_dir: Option<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let storage_dir = storage_dir
            .or_else(|| lookup(ENV_DEMO_DIR).map(PathBuf::from))
            .unwrap_or_else(default_storage_dir);

        let environment = match lookup(ENV_ENVIRONMENT) {
            Some(value) => value
                .parse()
                .with_context(|| format!("Invalid {}", ENV_ENVIRONMENT))?,
            None => Target::default(),
        };

        let round_timeout = match lookup(ENV_ROUND_TIMEOUT_SECS) {
            Some(value) => {
                let secs: u64 = value
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid {}", ENV_ROUND_TIMEOUT_SECS))?;
                if secs == 0 {
                    RoundTimeout::Never
                } else {
                    RoundTimeout::After(Duration::from_secs(secs))
                }
            }
            None => RoundTimeout::UntilExpiry,
        };

        let (storage_key, storage_key_source) = match lookup(ENV_STORAGE_KEY) {
            Some(value) => (
                AccountConfig::parse_storage_key(&value)
                    .with_context(|| format!("Invalid {}", ENV_STORAGE_KEY))?,
                StorageKeySource::Environment,
            ),
            None => (
                AccountConfig::random_storage_key(),
                StorageKeySource::Generated,
            ),
        };

        Ok(Self {
            storage_dir,
            environment,
            storage_key,
            storage_key_source,
            round_timeout,
            ..Self::defaults()
        })
    }

    fn defaults() -> Self {
        Self {
            storage_dir: PathBuf::from("."),
            environment: Target::default(),
            storage_key: [0u8; STORAGE_KEY_LEN],
            storage_key_source: StorageKeySource::Generated,
            discovery_expiry: chrono::Duration::minutes(5),
            presentation_expiry: chrono::Duration::minutes(5),
            verification_expiry: chrono::Duration::hours(24),
            round_timeout: RoundTimeout::UntilExpiry,
            peer: PeerMode::Simulated,
            peer_delay: Duration::from_millis(250),
            log_level: LogLevel::default(),
        }
    }

    /// Configuration rooted at `storage_dir` with a random key, for tests.
    pub fn ephemeral(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            storage_key: AccountConfig::random_storage_key(),
            ..Self::defaults()
        }
    }

    pub fn with_peer(mut self, peer: PeerMode) -> Self {
        self.peer = peer;
        self
    }

    pub fn with_round_timeout(mut self, round_timeout: RoundTimeout) -> Self {
        self.round_timeout = round_timeout;
        self
    }

    /// Account configuration for the SDK session.
    pub fn account_config(&self) -> AccountConfig {
        AccountConfig::new(self.storage_dir.join("account"), self.storage_key)
            .with_environment(self.environment)
            .with_log_level(self.log_level)
    }

    pub fn exchange_config(&self) -> ExchangeConfig {
        ExchangeConfig {
            presentation_expiry: self.presentation_expiry,
            verification_expiry: self.verification_expiry,
            round_timeout: self.round_timeout,
            store_accepted: true,
        }
    }

    /// Concrete wait for a discovery round.
    pub fn discovery_timeout(&self) -> Option<Duration> {
        self.round_timeout.resolve(self.discovery_expiry)
    }

    pub fn identities_dir(&self) -> PathBuf {
        self.storage_dir.join("identities")
    }
}

fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}
