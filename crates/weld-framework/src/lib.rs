//! # Weld Framework
//!
//! Dependency resolution, parameter binding and dispatch for Weld bot
//! applications.
//!
//! This layer provides:
//! - The [`Container`]: named static dependencies plus type-keyed async
//!   resolver factories, with sub-dependencies captured at registration
//! - The binding engine: matching a handler's declared [`ParamSpec`] list
//!   against event candidates, resolved values, call-site and preset
//!   arguments
//! - Filters for selecting handlers (commands, text menus, conversation
//!   state, callback prefixes)
//! - The [`Router`] and its dispatch strategy, mapping event variants to
//!   handler sinks
//!
//! The framework layer is pure coordination: it performs no network I/O and
//! owns no event loop. `weld-runtime` adds configuration, logging and the
//! run loop on top.

pub mod binder;
pub mod container;
pub mod dispatch;
pub mod error;
pub mod filter;

pub use binder::{BoundArgs, HandlerEntry, bind};
pub use container::{
    Container, DepKey, DepMap, IntoResolved, ParamSpec, ResolvedSet, Unavailable,
    UnresolvedPolicy,
};
pub use dispatch::{DispatchStrategy, ErrorHook, Router};
pub use error::{BindError, BindResult, BoxError, HandlerError, ResolveError};
pub use filter::{Filter, FilterExt, callback_prefix, command, state_is, text_in};
