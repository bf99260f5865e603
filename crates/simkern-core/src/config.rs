//! `simkern` Configuration Module
//!
//! Provides configuration file support via `simkern.toml`, environment variables,
//! and runtime overrides.
//!
//! # Priority (highest to lowest)
//!
//! 1. Runtime overrides (`Engine::enable` / `Engine::disable`)
//! 2. Environment variables (`SIMKERN_*`)
//! 3. Configuration file (`simkern.toml`)
//! 4. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::capability::Capability;
use crate::dtype::OutputDtype;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration file.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },
}

/// Capability overrides applied on top of hardware detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    /// When non-empty, the only tiers (besides `serial`) that start enabled.
    /// Tiers the hardware lacks stay disabled.
    pub enabled: Vec<String>,
    /// Tiers to disable. `serial` cannot be disabled.
    pub disabled: Vec<String>,
}

/// Batch evaluation configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Spread rows across the rayon pool.
    pub parallel: bool,
    /// Minimum number of kernel calls before going parallel.
    pub parallel_threshold: usize,
    /// Output dtype used when a call does not request one.
    pub default_output: Option<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            parallel_threshold: 256,
            default_output: None,
        }
    }
}

impl BatchConfig {
    /// Parses `default_output` into an output dtype.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag is not a known output dtype.
    pub fn output_dtype(&self) -> Result<Option<OutputDtype>, ConfigError> {
        self.default_output
            .as_deref()
            .map(|tag| {
                tag.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "batch.default_output".to_string(),
                    message: format!("unknown output dtype '{tag}'"),
                })
            })
            .transpose()
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace.
    pub level: String,
    /// Log format: text or json.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Main `simkern` configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimkernConfig {
    /// Capability overrides.
    pub capabilities: CapabilityConfig,
    /// Batch evaluation settings.
    pub batch: BatchConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl SimkernConfig {
    /// Loads configuration from default sources.
    ///
    /// Priority: defaults < file < environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("simkern.toml")
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SIMKERN_").split("__").lowercase(true));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Creates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, names) in [
            ("capabilities.enabled", &self.capabilities.enabled),
            ("capabilities.disabled", &self.capabilities.disabled),
        ] {
            for name in names {
                if name.parse::<Capability>().is_err() {
                    return Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        message: format!("unknown capability '{name}'"),
                    });
                }
            }
        }

        if let Some(name) = self
            .capabilities
            .enabled
            .iter()
            .find(|name| self.capabilities.disabled.contains(name))
        {
            return Err(ConfigError::InvalidValue {
                key: "capabilities".to_string(),
                message: format!("'{name}' is listed as both enabled and disabled"),
            });
        }

        if self.batch.parallel_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch.parallel_threshold".to_string(),
                message: "value must be >= 1".to_string(),
            });
        }

        self.batch.output_dtype()?;

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                message: format!(
                    "value '{}' is invalid, expected one of: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.format".to_string(),
                message: format!(
                    "value '{}' is invalid, expected one of: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        Ok(())
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}
