//! Application wiring.
//!
//! [`AppBuilder`] is the registration surface of the runtime: static
//! dependencies, resolvers, handlers, lifecycle callbacks and the event
//! source are all declared here, once, at startup. [`AppBuilder::build`]
//! validates the wiring and produces a ready-to-run [`App`] — missing
//! required wiring is fatal before any traffic is served.
//!
//! # Example
//!
//! ```rust,ignore
//! let (events, builder) = AppBuilder::new().event_channel();
//!
//! let app = builder
//!     .dependency("db", db_pool)
//!     .command("start", HandlerEntry::new("start", start_handler)
//!         .param(ParamSpec::named("message")))
//!     .build()?;
//!
//! app.run().await;
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use weld_core::{EventKind, Incoming};
use weld_framework::{
    BoxError, Container, DepMap, ErrorHook, HandlerEntry, IntoResolved, ParamSpec, Router,
    UnresolvedPolicy, filter,
};

use crate::app::App;
use crate::config::WeldConfig;
use crate::error::{ConfigError, ConfigResult};

/// An async callback run at application startup or shutdown.
pub type LifecycleHook =
    Arc<dyn Fn() -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Builder for a Weld [`App`].
pub struct AppBuilder {
    config: WeldConfig,
    container: Container,
    router: Router,
    source: Option<mpsc::Receiver<Incoming>>,
    on_startup: Vec<LifecycleHook>,
    on_shutdown: Vec<LifecycleHook>,
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppBuilder {
    /// Creates a builder with default configuration.
    pub fn new() -> Self {
        Self::with_config(WeldConfig::default())
    }

    /// Creates a builder with an already-loaded configuration.
    pub fn with_config(config: WeldConfig) -> Self {
        Self {
            config,
            container: Container::new(),
            router: Router::new(),
            source: None,
            on_startup: Vec::new(),
            on_shutdown: Vec::new(),
        }
    }

    /// Registers a named static dependency.
    pub fn dependency<T: Send + Sync + 'static>(
        mut self,
        key: impl Into<String>,
        value: T,
    ) -> Self {
        self.container.register(key, value);
        self
    }

    /// Registers an async resolver factory for type `T`.
    pub fn resolver<T, F, Fut, R>(mut self, params: Vec<ParamSpec>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Incoming, DepMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResolved<T>,
    {
        self.container.register_resolver::<T, _, _, _>(params, factory);
        self
    }

    /// Sets the policy applied when a resolver fails.
    pub fn unresolved_policy(mut self, policy: UnresolvedPolicy) -> Self {
        self.container = self.container.with_unresolved_policy(policy);
        self
    }

    /// Registers a handler for an event category.
    pub fn handler(mut self, kind: EventKind, entry: HandlerEntry) -> Self {
        self.router.register(kind, entry);
        self
    }

    /// Registers a message handler.
    pub fn on_message(self, entry: HandlerEntry) -> Self {
        self.handler(EventKind::Message, entry)
    }

    /// Registers a message handler gated on a slash command.
    pub fn command(self, name: impl Into<String>, entry: HandlerEntry) -> Self {
        self.on_message(entry.filter(filter::command(name)))
    }

    /// Registers a message handler gated on reply-menu button labels.
    pub fn reply_menu<I, S>(self, labels: I, entry: HandlerEntry) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.on_message(entry.filter(filter::text_in(labels)))
    }

    /// Registers a callback handler.
    pub fn on_callback(self, entry: HandlerEntry) -> Self {
        self.handler(EventKind::Callback, entry)
    }

    /// Registers an inline query handler.
    pub fn on_inline_query(self, entry: HandlerEntry) -> Self {
        self.handler(EventKind::InlineQuery, entry)
    }

    /// Installs the hook that receives every handler failure.
    pub fn error_hook(mut self, hook: ErrorHook) -> Self {
        self.router.set_error_hook(hook);
        self
    }

    /// Adds a callback run once before the event loop starts. Errors are
    /// logged and do not prevent startup.
    pub fn on_startup<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.on_startup.push(Arc::new(move || Box::pin(hook())));
        self
    }

    /// Adds a callback run once after the event loop stops.
    pub fn on_shutdown<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.on_shutdown.push(Arc::new(move || Box::pin(hook())));
        self
    }

    /// Attaches the receiving end of an event channel as the event source.
    pub fn event_source(mut self, source: mpsc::Receiver<Incoming>) -> Self {
        self.source = Some(source);
        self
    }

    /// Creates a bounded event channel sized per configuration, attaches its
    /// receiving end and hands the sender back for the transport layer.
    pub fn event_channel(self) -> (mpsc::Sender<Incoming>, Self) {
        let (tx, rx) = mpsc::channel(self.config.runtime.queue_capacity);
        (tx, self.event_source(rx))
    }

    /// Validates the wiring and produces the runnable [`App`].
    pub fn build(self) -> ConfigResult<App> {
        self.config.validate()?;
        let source = self.source.ok_or(ConfigError::EventSourceMissing)?;

        Ok(App::new(
            self.config,
            self.container,
            self.router,
            source,
            self.on_startup,
            self.on_shutdown,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weld_framework::BoundArgs;

    #[test]
    fn test_build_without_event_source_is_fatal() {
        let err = AppBuilder::new().build().unwrap_err();
        assert!(matches!(err, ConfigError::EventSourceMissing));
    }

    #[test]
    fn test_build_with_channel() {
        let (_tx, builder) = AppBuilder::new().event_channel();
        let app = builder
            .dependency("answer", 42u32)
            .command(
                "start",
                HandlerEntry::new("start", |_args: BoundArgs| async { Ok(()) }),
            )
            .build()
            .unwrap();
        assert_eq!(app.handler_count(), 1);
    }

    #[test]
    fn test_invalid_config_is_fatal_at_build() {
        let mut config = WeldConfig::default();
        config.runtime.queue_capacity = 0;
        let (_tx, rx) = mpsc::channel(1);
        let err = AppBuilder::with_config(config)
            .event_source(rx)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }
}
