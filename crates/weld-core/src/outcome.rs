//! Result combinators and the panic/`Result` bridge.
//!
//! Weld propagates recoverable failures as plain `Result` values instead of
//! letting them unwind across subsystem boundaries. This module adds the
//! combinators the framework relies on beyond what `std` ships:
//!
//! - [`ResultExt`] — `fold`, `tap_err` and async mapping variants.
//! - [`sequence`] / [`combine`] — aggregate a batch of results, either
//!   short-circuiting on the first error or collecting every error.
//! - [`catch_panic`] — the single adapter between panic-based and
//!   `Result`-based error styles. Request tasks wrap handler execution in it
//!   so one panicking handler cannot take down the event loop.
//!
//! # Example
//!
//! ```rust,ignore
//! use weld_core::outcome::{combine, sequence};
//!
//! let all: Result<Vec<i32>, &str> = sequence([Ok(1), Ok(2)]);
//! assert_eq!(all, Ok(vec![1, 2]));
//!
//! let errs = combine([Ok(1), Err("a"), Err("b")]);
//! assert_eq!(errs, Err(vec!["a", "b"]));
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use thiserror::Error;
use tracing::error;

// ============================================================================
// ResultExt
// ============================================================================

/// Extension combinators for `Result`.
///
/// `map`, `map_err`, `and_then` and `unwrap_or` are already on `std`'s
/// `Result`; this trait supplies the remaining operations Weld uses.
pub trait ResultExt<T, E>: Sized {
    /// Collapses the result into a single value by applying `ok_case` to the
    /// success value or `err_case` to the error.
    fn fold<U>(self, ok_case: impl FnOnce(T) -> U, err_case: impl FnOnce(E) -> U) -> U;

    /// Runs `f` on the error without consuming it. Used to log before an
    /// error is degraded or propagated.
    fn tap_err(self, f: impl FnOnce(&E)) -> Self;

    /// Like `map`, but awaits the mapping function.
    fn map_async<U, Fut>(
        self,
        f: impl FnOnce(T) -> Fut + Send,
    ) -> impl Future<Output = Result<U, E>> + Send
    where
        Fut: Future<Output = U> + Send,
        T: Send,
        E: Send;

    /// Like `and_then`, but awaits the chaining function.
    fn and_then_async<U, Fut>(
        self,
        f: impl FnOnce(T) -> Fut + Send,
    ) -> impl Future<Output = Result<U, E>> + Send
    where
        Fut: Future<Output = Result<U, E>> + Send,
        T: Send,
        E: Send;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn fold<U>(self, ok_case: impl FnOnce(T) -> U, err_case: impl FnOnce(E) -> U) -> U {
        match self {
            Ok(v) => ok_case(v),
            Err(e) => err_case(e),
        }
    }

    fn tap_err(self, f: impl FnOnce(&E)) -> Self {
        if let Err(e) = &self {
            f(e);
        }
        self
    }

    async fn map_async<U, Fut>(self, f: impl FnOnce(T) -> Fut + Send) -> Result<U, E>
    where
        Fut: Future<Output = U> + Send,
        T: Send,
        E: Send,
    {
        match self {
            Ok(v) => Ok(f(v).await),
            Err(e) => Err(e),
        }
    }

    async fn and_then_async<U, Fut>(self, f: impl FnOnce(T) -> Fut + Send) -> Result<U, E>
    where
        Fut: Future<Output = Result<U, E>> + Send,
        T: Send,
        E: Send,
    {
        match self {
            Ok(v) => f(v).await,
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// Aggregate operators
// ============================================================================

/// Collects an iterator of results into a single result, stopping at the
/// **first** error.
///
/// Callers that want every error instead should use [`combine`]; the two
/// behaviors are deliberately distinct.
pub fn sequence<T, E>(results: impl IntoIterator<Item = Result<T, E>>) -> Result<Vec<T>, E> {
    let mut values = Vec::new();
    for result in results {
        values.push(result?);
    }
    Ok(values)
}

/// Collects an iterator of results, gathering **all** errors.
///
/// Returns `Ok` with every success value only when no error occurred,
/// otherwise `Err` with every error in input order.
pub fn combine<T, E>(results: impl IntoIterator<Item = Result<T, E>>) -> Result<Vec<T>, Vec<E>> {
    let mut values = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(v) => values.push(v),
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        Ok(values)
    } else {
        Err(errors)
    }
}

// ============================================================================
// Panic bridge
// ============================================================================

/// The payload recovered from a panicking future.
///
/// Panic payloads are almost always `&str` or `String`; anything else is
/// reported as opaque.
#[derive(Debug, Clone, Error)]
#[error("panicked: {message}")]
pub struct PanicPayload {
    /// The stringified panic message.
    pub message: String,
}

impl PanicPayload {
    fn from_any(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&'static str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self { message }
    }
}

/// Runs a future, converting a panic into `Err(PanicPayload)` instead of
/// unwinding.
///
/// This is the outer boundary between panic-based and `Result`-based error
/// handling: everything below it returns `Result`, everything above it can
/// rely on the future never unwinding. The payload is logged before being
/// returned.
pub async fn catch_panic<Fut, T>(fut: Fut) -> Result<T, PanicPayload>
where
    Fut: Future<Output = T>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(value) => Ok(value),
        Err(payload) => {
            let payload = PanicPayload::from_any(payload);
            error!(panic = %payload.message, "caught panic in task");
            Err(payload)
        }
    }
}
