//! Client configuration parsing, layering, and validation.
//!
//! Configuration is an explicit [`RpcConfig`] value built once by the caller
//! and handed to [`RpcSession`](crate::session::RpcSession). Three sources
//! are layered, highest precedence first: command-line overrides, the
//! `CLIENT_ID` / `TARGET_GUILD_ID` environment variables, and an optional
//! TOML file.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::protocol::PROTOCOL_VERSION;
use crate::{AppError, Result};

/// Environment variable holding the application (client) identifier.
pub const CLIENT_ID_ENV: &str = "CLIENT_ID";

/// Environment variable holding the target guild identifier.
pub const GUILD_ID_ENV: &str = "TARGET_GUILD_ID";

/// Largest accepted handshake or command timeout: one day.
pub const MAX_TIMEOUT_SECONDS: u64 = 24 * 60 * 60;

/// Largest accepted poll interval: one minute.
pub const MAX_POLL_INTERVAL_MS: u64 = 60 * 1000;

/// Configurable timeout values for the protocol session.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Upper bound for the handshake response read.
    #[serde(default = "default_handshake_seconds")]
    pub handshake_seconds: u64,
    /// Deadline for a command's matching response.
    #[serde(default = "default_command_seconds")]
    pub command_seconds: u64,
    /// Per-read bound while polling for a command response.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl TimeoutConfig {
    /// Handshake read timeout as a [`Duration`].
    #[must_use]
    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake_seconds)
    }

    /// Command response deadline as a [`Duration`].
    #[must_use]
    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_seconds)
    }

    /// Poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            handshake_seconds: default_handshake_seconds(),
            command_seconds: default_command_seconds(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_handshake_seconds() -> u64 {
    5
}

fn default_command_seconds() -> u64 {
    5
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_protocol_version() -> u32 {
    PROTOCOL_VERSION
}

/// On-disk shape of the TOML file; identifiers may come from other layers.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
struct RawConfig {
    client_id: Option<String>,
    guild_id: Option<String>,
    #[serde(default = "default_protocol_version")]
    protocol_version: u32,
    #[serde(default)]
    timeouts: TimeoutConfig,
}

/// Values supplied on the command line. `None` leaves lower layers in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// `--client-id`.
    pub client_id: Option<String>,
    /// `--guild-id`.
    pub guild_id: Option<String>,
    /// `--timeout-seconds`.
    pub command_seconds: Option<u64>,
}

/// Validated client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcConfig {
    /// Application identifier registered with the vendor.
    pub client_id: String,
    /// Guild whose channels are listed.
    pub guild_id: String,
    /// Protocol version sent in the handshake.
    pub protocol_version: u32,
    /// Timeouts for the handshake and command loop.
    pub timeouts: TimeoutConfig,
}

impl RpcConfig {
    /// Build a configuration from the two required identifiers using
    /// default timeouts and protocol version.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if either identifier is blank.
    pub fn new(client_id: impl Into<String>, guild_id: impl Into<String>) -> Result<Self> {
        let config = Self {
            client_id: client_id.into(),
            guild_id: guild_id.into(),
            protocol_version: PROTOCOL_VERSION,
            timeouts: TimeoutConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(raw)?;
        Self::layer(raw, &ConfigOverrides::default(), |_| None)
    }

    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Build configuration from the process environment alone.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the missing variable.
    pub fn from_env() -> Result<Self> {
        Self::resolve(None, &ConfigOverrides::default())
    }

    /// Layer an optional TOML file, the process environment, and
    /// command-line overrides into one validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or parsed, or
    /// if a required identifier is missing after layering.
    pub fn resolve(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        Self::resolve_with(path, overrides, |key| env::var(key).ok())
    }

    /// Same as [`RpcConfig::resolve`] with an explicit environment lookup.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` under the same conditions as
    /// [`RpcConfig::resolve`].
    pub fn resolve_with<F>(path: Option<&Path>, overrides: &ConfigOverrides, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|err| {
                    AppError::Config(format!("failed to read config {}: {err}", path.display()))
                })?;
                debug!(path = %path.display(), "config file loaded");
                toml::from_str(&text)?
            }
            None => RawConfig {
                protocol_version: default_protocol_version(),
                ..RawConfig::default()
            },
        };
        Self::layer(raw, overrides, lookup)
    }

    fn layer<F>(raw: RawConfig, overrides: &ConfigOverrides, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        let client_id = non_empty(overrides.client_id.clone())
            .or_else(|| non_empty(lookup(CLIENT_ID_ENV)))
            .or_else(|| non_empty(raw.client_id))
            .ok_or_else(|| {
                AppError::Config(format!(
                    "client id not set: pass --client-id, set {CLIENT_ID_ENV}, or add client_id to the config file"
                ))
            })?;

        let guild_id = non_empty(overrides.guild_id.clone())
            .or_else(|| non_empty(lookup(GUILD_ID_ENV)))
            .or_else(|| non_empty(raw.guild_id))
            .ok_or_else(|| {
                AppError::Config(format!(
                    "guild id not set: pass --guild-id, set {GUILD_ID_ENV}, or add guild_id to the config file"
                ))
            })?;

        let mut timeouts = raw.timeouts;
        if let Some(seconds) = overrides.command_seconds {
            timeouts.command_seconds = seconds;
        }

        let config = Self {
            client_id: client_id.trim().to_owned(),
            guild_id: guild_id.trim().to_owned(),
            protocol_version: raw.protocol_version,
            timeouts,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(AppError::Config("client_id must not be empty".into()));
        }

        if self.guild_id.trim().is_empty() {
            return Err(AppError::Config("guild_id must not be empty".into()));
        }

        if self.protocol_version == 0 {
            return Err(AppError::Config(
                "protocol_version must be greater than zero".into(),
            ));
        }

        if self.timeouts.handshake_seconds == 0 || self.timeouts.command_seconds == 0 {
            return Err(AppError::Config(
                "timeouts must be greater than zero".into(),
            ));
        }

        if self.timeouts.handshake_seconds > MAX_TIMEOUT_SECONDS
            || self.timeouts.command_seconds > MAX_TIMEOUT_SECONDS
        {
            return Err(AppError::Config(format!(
                "timeouts must not exceed {MAX_TIMEOUT_SECONDS} seconds"
            )));
        }

        if self.timeouts.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }

        if self.timeouts.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(AppError::Config(format!(
                "poll_interval_ms must not exceed {MAX_POLL_INTERVAL_MS}"
            )));
        }

        Ok(())
    }
}
