//! Configuration file management.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use eco_core::SecretKey;
use eco_types::PinCode;
use serde::{Deserialize, Serialize};

/// Default connection timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default interval between refreshes in `watch`, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Configuration file structure
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default device name or address
    #[serde(default)]
    pub device: Option<String>,

    /// Secret key of the default device (32 hex characters)
    #[serde(default)]
    pub secret_key: Option<String>,

    /// PIN of the default device (4 digits)
    #[serde(default)]
    pub pin: Option<String>,

    /// Connection timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Interval between refreshes in `watch`, in seconds
    #[serde(default)]
    pub poll_interval: Option<u64>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("device", &self.device)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("pin", &self.pin.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl Config {
    /// Get the default config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("danfoss-eco")
            .join("config.toml")
    }

    /// Load and validate the config at `path`. A missing file yields the default.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config)
    }

    /// Save config to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Check every field that has a fixed format.
    pub fn validate(&self) -> Result<()> {
        self.secret_key()?;
        self.pin()?;
        if self.timeout == Some(0) {
            anyhow::bail!("timeout must be at least 1 second");
        }
        if self.poll_interval == Some(0) {
            anyhow::bail!("poll_interval must be at least 1 second");
        }
        Ok(())
    }

    /// The parsed secret key, if set.
    pub fn secret_key(&self) -> Result<Option<SecretKey>> {
        self.secret_key
            .as_deref()
            .map(|hex| hex.parse().context("secret_key must be exactly 32 hex characters"))
            .transpose()
    }

    /// The parsed PIN, if set.
    pub fn pin(&self) -> Result<Option<PinCode>> {
        self.pin
            .as_deref()
            .map(|pin| pin.parse().context("pin must be exactly 4 digits"))
            .transpose()
    }
}

/// Resolve device from arg, env var, or config.
pub fn resolve_device(device: Option<String>, config: &Config) -> Option<String> {
    device.or_else(|| config.device.clone())
}

/// Resolve timeout: use provided value, fall back to config, then default
pub fn resolve_timeout(cmd_timeout: Option<u64>, config: &Config) -> u64 {
    cmd_timeout
        .or(config.timeout)
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
}

/// Resolve the watch interval: use provided value, fall back to config, then default
pub fn resolve_interval(cmd_interval: Option<u64>, config: &Config) -> u64 {
    cmd_interval
        .or(config.poll_interval)
        .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
}
