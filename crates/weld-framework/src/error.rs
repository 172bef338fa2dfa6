//! Error types for the Weld framework layer.
//!
//! The error taxonomy follows the propagation policy of the framework:
//!
//! - [`ResolveError`] is always **recovered** — the container logs it and
//!   leaves the dependency slot absent, the request continues degraded.
//! - [`BindError`] is raised to the dispatch layer after logging; a handler
//!   whose required parameters cannot be bound never runs.
//! - [`HandlerError`] wraps everything the dispatch layer can observe for a
//!   single handler invocation. The dispatch loop reports it and moves on;
//!   one failing handler never takes down processing of other events.

use thiserror::Error;
use weld_core::PanicPayload;

/// A type-erased error returned from handler bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Resolution Errors
// =============================================================================

/// Errors produced by dependency resolver factories.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The factory ran but could not produce a value.
    #[error("factory failed: {0}")]
    Factory(String),

    /// The factory determined the dependency does not exist for this event.
    #[error("dependency unavailable: {0}")]
    Unavailable(String),
}

impl ResolveError {
    /// Creates a factory failure from any displayable error.
    pub fn factory(err: impl std::fmt::Display) -> Self {
        Self::Factory(err.to_string())
    }

    /// Creates an unavailable-dependency error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }
}

// =============================================================================
// Binding Errors
// =============================================================================

/// Errors raised while matching a handler's declared parameters to values.
#[derive(Debug, Clone, Error)]
pub enum BindError {
    /// No rule produced a value for a required parameter.
    #[error("handler '{handler}' is missing required parameter '{param}'")]
    MissingParameter {
        /// The handler being bound.
        handler: String,
        /// The unsatisfied parameter name.
        param: String,
    },

    /// The parameter's resolver failed earlier; the slot holds a sentinel.
    #[error("handler '{handler}' parameter '{param}' is unavailable: {reason}")]
    DependencyUnavailable {
        /// The handler being bound.
        handler: String,
        /// The affected parameter name.
        param: String,
        /// Why resolution failed.
        reason: String,
    },

    /// A bound value could not be downcast to the requested type.
    #[error("parameter '{param}' holds '{actual}', not the requested '{expected}'")]
    TypeMismatch {
        /// The parameter name.
        param: String,
        /// The requested type.
        expected: &'static str,
        /// The type actually stored.
        actual: &'static str,
    },
}

/// Result type for binding operations.
pub type BindResult<T> = Result<T, BindError>;

// =============================================================================
// Handler Errors
// =============================================================================

/// Everything that can go wrong for one handler invocation.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Binding failed before the handler ran.
    #[error(transparent)]
    Bind(#[from] BindError),

    /// The handler body returned an error.
    #[error("handler '{handler}' failed: {source}")]
    Failed {
        /// The handler that failed.
        handler: String,
        /// The underlying error.
        #[source]
        source: BoxError,
    },

    /// The handler body panicked.
    #[error("handler '{handler}' panicked: {payload}")]
    Panicked {
        /// The handler that panicked.
        handler: String,
        /// The recovered panic payload.
        payload: PanicPayload,
    },
}
