//! # Weld Runtime
//!
//! Runtime orchestration for Weld bot applications.
//!
//! This layer provides:
//! - Configuration loading and validation ([`config`], figment-based)
//! - Logging setup ([`logging`], `tracing-subscriber`-based)
//! - The registration surface ([`AppBuilder`]) and the event loop ([`App`])
//!
//! The runtime consumes events from an `mpsc` channel fed by a transport
//! layer (not part of this workspace) and dispatches each on its own task.
//! Missing required wiring — most importantly an event source — is fatal at
//! [`AppBuilder::build`] time, before any traffic is served.

pub mod app;
pub mod builder;
pub mod config;
pub mod error;
pub mod logging;

pub use app::App;
pub use builder::{AppBuilder, LifecycleHook};
pub use config::{ConfigLoader, LogFormat, LogLevel, LoggingConfig, RuntimeConfig, WeldConfig};
pub use error::{ConfigError, ConfigResult};
pub use logging::LoggingBuilder;
