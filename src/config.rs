//! Configuration for the reboot-mode controller.
//!
//! The configuration bundle describes where the PMU alive block lives and
//! which offsets/trigger values drive warm reset, power-hold and the reboot
//! command register. It is loaded once during setup, validated, and then
//! handed to the controller by value; nothing in the crate mutates it after
//! construction.
//!
//! Property names follow the device-tree binding (`swreset-system-offset`,
//! `pshold-control-trigger`, ...). Sources are layered with figment:
//!
//! 1. Built-in defaults
//! 2. Configuration file (TOML, when the `toml` feature is enabled)
//! 3. `REBOOT_`-prefixed environment variables
//!
//! Environment keys map onto property names with `_` as `-`; a double
//! underscore enters a section, so `REBOOT_GUARD__MAX_POLLS` sets
//! `guard.max-polls`.

use figment::providers::Env;
#[cfg(feature = "toml")]
use figment::providers::Format;
use figment::{Figment, Provider};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level logging (most verbose)
    Trace,
    /// Debug level logging
    Debug,
    /// Info level logging (default)
    #[default]
    Info,
    /// Warning level logging
    Warn,
    /// Error level logging
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LogConfig {
    /// Logging level
    pub level: LogLevel,
    /// Enable JSON formatted logs
    pub json: bool,
    /// Enable colored output (ignored for JSON logs)
    pub color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: false,
            color: true,
        }
    }
}

/// Power-off guard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GuardConfig {
    /// Interval between power key polls in milliseconds
    pub poll_interval_ms: u64,
    /// Give up after this many polls that still report the key as pressed.
    ///
    /// Must stay unset on real hardware: the guard exists so the device never
    /// powers off while someone holds the key.
    pub max_polls: Option<u32>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: crate::DEFAULT_GUARD_POLL_INTERVAL_MS,
            max_polls: None,
        }
    }
}

/// Which hardware reset a register write performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    /// Software (warm) system reset
    Warm,
    /// Cold reset by dropping power-hold
    Cold,
    /// Power-off; shares the power-hold control with cold reset
    PowerOff,
}

/// A single register write that triggers a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetRegister {
    /// Offset inside the PMU register space
    pub offset: u32,
    /// Value to write at `offset`
    pub trigger: u32,
}

/// Main reboot-mode configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Physical base address of the PMU alive register block
    pub base_address: Option<u64>,
    /// Offset of the software reset register
    pub swreset_system_offset: Option<u32>,
    /// Value written to trigger a software reset
    pub swreset_system_trigger: Option<u32>,
    /// Offset of the power-hold control register
    pub pshold_control_offset: Option<u32>,
    /// Value written to drop power-hold
    pub pshold_control_trigger: Option<u32>,
    /// Offset of the reboot command (mode) register
    pub reboot_cmd_offset: u32,
    /// Priority of the restart-only handler
    pub restart_priority: i32,
    /// Power-off guard configuration
    pub guard: GuardConfig,
    /// Logging configuration
    pub logging: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_address: None,
            swreset_system_offset: None,
            swreset_system_trigger: None,
            pshold_control_offset: None,
            pshold_control_trigger: None,
            reboot_cmd_offset: crate::DEFAULT_REBOOT_CMD_OFFSET,
            restart_priority: crate::DEFAULT_RESTART_PRIORITY,
            guard: GuardConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default file and environment.
    ///
    /// # Errors
    ///
    /// Will return an error if a source contains malformed values.
    pub fn load() -> Result<Self> {
        Self::load_from_file(crate::DEFAULT_CONFIG_FILE)
    }

    /// Load config from a file, layered under `REBOOT_` environment variables.
    ///
    /// A missing file is not an error; required properties are checked by
    /// [`Config::validate`].
    ///
    /// # Errors
    ///
    /// Will return an error if the file or environment contains invalid data.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        #[allow(unused_mut)]
        let mut figment = Figment::new();

        if path.exists() {
            #[cfg(feature = "toml")]
            {
                figment = figment.merge(figment::providers::Toml::file(path));
            }
        }

        figment.merge(Self::env()).extract().map_err(Error::from)
    }

    /// Load config using a configuration provider.
    ///
    /// Values from `provider` take precedence over the environment.
    ///
    /// # Errors
    ///
    /// Will return an error if the provider yields invalid configuration data.
    pub fn load_with_provider<P: Provider>(provider: P) -> Result<Self> {
        Figment::new()
            .merge(Self::env())
            .merge(provider)
            .extract()
            .map_err(Error::from)
    }

    fn env() -> Env {
        Env::prefixed("REBOOT_")
            .split("__")
            .map(|key| key.as_str().replace('_', "-").into())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first required property that is missing,
    /// describing an out-of-range guard setting, or rejecting a reboot
    /// command address that overflows.
    pub fn validate(&self) -> Result<()> {
        if self.base_address.is_none() {
            return Err(Error::config_missing("base-address"));
        }
        if self.swreset_system_offset.is_none() {
            return Err(Error::config_missing("swreset-system-offset"));
        }
        if self.swreset_system_trigger.is_none() {
            return Err(Error::config_missing("swreset-system-trigger"));
        }
        if self.pshold_control_offset.is_none() {
            return Err(Error::config_missing("pshold-control-offset"));
        }
        if self.pshold_control_trigger.is_none() {
            return Err(Error::config_missing("pshold-control-trigger"));
        }

        if self.guard.poll_interval_ms == 0 {
            return Err(Error::config("Guard poll interval must be greater than 0"));
        }
        if self.guard.max_polls == Some(0) {
            return Err(Error::config("Guard max-polls must be greater than 0 when set"));
        }

        self.reboot_cmd_address()?;
        Ok(())
    }

    /// Absolute address of the reboot command register.
    ///
    /// # Errors
    ///
    /// Returns an error if `base-address` is missing or the offset carries
    /// the address past the end of the address space.
    pub fn reboot_cmd_address(&self) -> Result<u64> {
        let base = self
            .base_address
            .ok_or_else(|| Error::config_missing("base-address"))?;
        base.checked_add(u64::from(self.reboot_cmd_offset))
            .ok_or_else(|| Error::config("reboot-cmd-offset overflows base-address"))
    }

    /// Register write that performs the given reset.
    ///
    /// # Errors
    ///
    /// Returns an error if the offset/trigger pair for `kind` is missing.
    pub fn reset_register(&self, kind: ResetKind) -> Result<ResetRegister> {
        let (offset, trigger, names) = match kind {
            ResetKind::Warm => (
                self.swreset_system_offset,
                self.swreset_system_trigger,
                ("swreset-system-offset", "swreset-system-trigger"),
            ),
            ResetKind::Cold | ResetKind::PowerOff => (
                self.pshold_control_offset,
                self.pshold_control_trigger,
                ("pshold-control-offset", "pshold-control-trigger"),
            ),
        };

        Ok(ResetRegister {
            offset: offset.ok_or_else(|| Error::config_missing(names.0))?,
            trigger: trigger.ok_or_else(|| Error::config_missing(names.1))?,
        })
    }

    /// Get the guard poll interval as a Duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.guard.poll_interval_ms)
    }

    /// Create a builder for this configuration.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for creating configurations programmatically.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the PMU alive base address.
    #[must_use]
    pub const fn base_address(mut self, base: u64) -> Self {
        self.config.base_address = Some(base);
        self
    }

    /// Set the warm reset offset and trigger.
    #[must_use]
    pub const fn swreset(mut self, offset: u32, trigger: u32) -> Self {
        self.config.swreset_system_offset = Some(offset);
        self.config.swreset_system_trigger = Some(trigger);
        self
    }

    /// Set the power-hold offset and trigger.
    #[must_use]
    pub const fn pshold(mut self, offset: u32, trigger: u32) -> Self {
        self.config.pshold_control_offset = Some(offset);
        self.config.pshold_control_trigger = Some(trigger);
        self
    }

    /// Override the reboot command register offset.
    #[must_use]
    pub const fn reboot_cmd_offset(mut self, offset: u32) -> Self {
        self.config.reboot_cmd_offset = offset;
        self
    }

    /// Set the restart handler priority.
    #[must_use]
    pub const fn restart_priority(mut self, priority: i32) -> Self {
        self.config.restart_priority = priority;
        self
    }

    /// Set the guard poll interval.
    ///
    /// # Errors
    ///
    /// Will return an error if the duration exceeds `u64::MAX` milliseconds
    pub fn poll_interval(mut self, interval: Duration) -> Result<Self> {
        self.config.guard.poll_interval_ms = u64::try_from(interval.as_millis())
            .map_err(|_| Error::config("Guard poll interval too large"))?;
        Ok(self)
    }

    /// Bound the guard to at most `polls` pressed readings.
    #[must_use]
    pub const fn max_polls(mut self, polls: u32) -> Self {
        self.config.guard.max_polls = Some(polls);
        self
    }

    /// Set the log level.
    #[must_use]
    pub const fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Will return an error if validation fails.
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
