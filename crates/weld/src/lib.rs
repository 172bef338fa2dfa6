//! # Weld
//!
//! A dependency-binding bot framework: handlers declare what they need,
//! Weld resolves it per event and calls them with exactly those arguments.
//!
//! ## Overview
//!
//! Weld splits event handling into three layers:
//!
//! ```text
//! ┌───────────┐     ┌──────────┐     ┌───────────────────────────────────┐
//! │  Runtime  │────▶│  Router  │────▶│ Handler "start"   (filters, bind) │
//! │ (channel) │     │ (sinks)  │────▶│ Handler "confirm" (filters, bind) │
//! └───────────┘     └──────────┘────▶│ Handler ...                       │
//!                         │          └───────────────────────────────────┘
//!                         ▼
//!                   ┌───────────┐
//!                   │ Container │  static deps + async resolvers
//!                   └───────────┘
//! ```
//!
//! - **Runtime**: config, logging and the event loop; one task per event
//! - **Router**: per-variant handler sinks with filters and blocking rules
//! - **Binding engine**: fills each handler's declared parameters from the
//!   event, the session, resolved dependencies and preset arguments
//! - **Container**: named static values plus type-keyed async resolver
//!   factories, with sub-dependencies captured at registration time
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use weld::prelude::*;
//!
//! async fn start(args: BoundArgs) -> Result<(), BoxError> {
//!     let message = args.require::<MessageEvent>("message")?;
//!     let session = args.session()?;
//!     session.set("greeted");
//!     println!("hello, {}", message.from.first_name);
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), BoxError> {
//!     let config = ConfigLoader::new().load()?;
//!     weld::runtime::logging::init_from_config(&config.logging);
//!
//!     let (events, builder) = AppBuilder::with_config(config).event_channel();
//!     // hand `events` to your transport layer
//!
//!     let app = builder
//!         .dependency("db", connect_db().await?)
//!         .command("start", HandlerEntry::new("start", start)
//!             .param(ParamSpec::named("message"))
//!             .param(ParamSpec::named("state")))
//!         .build()?;
//!
//!     app.run_with_signals().await;
//!     Ok(())
//! }
//! ```

pub use weld_core as core;
pub use weld_framework as framework;
pub use weld_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use weld::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use weld_runtime::{App, AppBuilder, ConfigLoader, WeldConfig};

    // Events and sessions
    pub use weld_core::{
        CallbackEvent, EventKind, Incoming, InlineQueryEvent, MessageEvent, Session, UserRef,
    };

    // Handlers and binding
    pub use weld_framework::{
        BoundArgs, BoxError, Container, DepMap, HandlerEntry, ParamSpec, Router,
    };

    // Filters
    pub use weld_framework::filter::{self, Filter, FilterExt};

    // Outcome utilities
    pub use weld_core::outcome::{ResultExt, combine, sequence};
}
