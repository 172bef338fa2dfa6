//! Configuration loading using figment.
//!
//! Supports layered sources, later ones overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. Config file (`weld.toml`, with the `toml-config` feature)
//! 3. Environment variables (`WELD_*`)
//! 4. Programmatic overrides
//!
//! Environment variables are mapped using the `WELD_` prefix with `__` as
//! separator: `WELD_LOGGING__LEVEL=debug` → `logging.level = "debug"`.
//!
//! # Example
//!
//! ```rust,ignore
//! use weld_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .file("./weld.toml")
//!     .with_env()
//!     .load()?;
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::Figment;
#[cfg(feature = "toml-config")]
use figment::providers::{Format, Toml};
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Schema
// =============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WeldConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Event loop settings.
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include thread ids in log output.
    #[serde(default)]
    pub thread_ids: bool,

    /// Per-module level overrides, e.g. `weld_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            thread_ids: false,
            filters: HashMap::new(),
        }
    }
}

/// Log verbosity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debugging detail.
    Debug,
    /// Normal operation.
    #[default]
    Info,
    /// Something unexpected but survivable.
    Warn,
    /// Failures.
    Error,
}

impl LogLevel {
    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }

    /// The lowercase directive form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line, abbreviated output.
    #[default]
    Compact,
    /// Standard formatter output.
    Full,
    /// Multi-line, human-oriented output.
    Pretty,
}

/// Event loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// How long shutdown waits for in-flight handlers, in seconds.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Bound of the incoming event queue, advisory for event sources.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl RuntimeConfig {
    /// The shutdown grace period as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    256
}

impl WeldConfig {
    /// Validates the configuration. Called by the loader; public so
    /// programmatically constructed configs can be checked the same way.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.runtime.queue_capacity == 0 {
            return Err(ConfigError::validation("runtime.queue_capacity must be > 0"));
        }
        Ok(())
    }
}

// =============================================================================
// Loader
// =============================================================================

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    figment: Figment,
    config_file: Option<PathBuf>,
    load_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader with built-in defaults and `WELD_*` env support.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            config_file: None,
            load_env: true,
        }
    }

    /// Loads a specific configuration file. Missing file is an error.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Enables or disables `WELD_*` environment variable overrides.
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables environment variable overrides, for hermetic tests.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges programmatic overrides, taking precedence over all file and
    /// environment sources.
    pub fn merge(mut self, config: WeldConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads, extracts and validates the configuration.
    pub fn load(self) -> ConfigResult<WeldConfig> {
        let figment = self.build_figment()?;
        let config: WeldConfig = figment
            .extract()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;

        debug!(
            logging_level = %config.logging.level,
            "configuration loaded"
        );
        Ok(config)
    }

    fn build_figment(self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(WeldConfig::default()));

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            info!(path = %path.display(), "loading configuration file");
            #[cfg(feature = "toml-config")]
            {
                figment = figment.merge(Toml::file(path));
            }
        } else {
            #[cfg(feature = "toml-config")]
            {
                figment = figment.merge(Toml::file("weld.toml"));
            }
        }

        if self.load_env {
            figment = figment.merge(
                Env::prefixed("WELD_")
                    .split("__")
                    .map(|key| key.as_str().replace("__", ".").into()),
            );
        }

        // Programmatic overrides win over everything else.
        figment = figment.merge(self.figment);

        Ok(figment)
    }
}
