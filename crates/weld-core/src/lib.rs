//! # Weld Core
//!
//! Leaf types for the Weld bot framework.
//!
//! This crate carries the pieces everything else builds on:
//!
//! - **Event model**: the [`Incoming`] variants produced by the transport
//!   boundary, plus the named binding candidates each variant contributes.
//! - **Session state**: the opaque [`Session`] handle and its store.
//! - **Outcome utilities**: `Result` combinators, aggregate operators and the
//!   panic/`Result` bridge in [`outcome`].
//!
//! Nothing here performs I/O; higher layers (`weld-framework`,
//! `weld-runtime`) add dependency resolution, binding and the run loop.

pub mod event;
pub mod outcome;
pub mod session;

pub use event::{
    AnyValue, CallbackEvent, EventKind, Incoming, InlineQueryEvent, MessageEvent, UnknownEvent,
    UserRef,
};
pub use outcome::{PanicPayload, ResultExt, catch_panic, combine, sequence};
pub use session::{Session, SessionStore};
