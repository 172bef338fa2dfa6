//! Routing events to handler sinks.
//!
//! The [`Router`] keeps one ordered sink of [`HandlerEntry`] values per event
//! category. [`DispatchStrategy`] is the lookup table mapping an
//! [`EventKind`] to its sink at registration time — unsupported variants log
//! a warning and are dropped, never a crash.
//!
//! Dispatch walks the matching sink in registration order: for each entry
//! whose filters accept the event, resolve, bind and invoke. A failing
//! handler is reported through the error hook (when set) and never stops the
//! entries after it; a *successful* blocking handler does.

use std::sync::Arc;

use tracing::{debug, warn};

use weld_core::{EventKind, Incoming, Session};

use crate::binder::HandlerEntry;
use crate::container::{Container, DepMap};
use crate::error::HandlerError;

/// Callback invoked for every handler failure the router observes.
pub type ErrorHook = Arc<dyn Fn(&HandlerError) + Send + Sync>;

// ============================================================================
// DispatchStrategy
// ============================================================================

/// Maps an event variant to the router sink that should receive a handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchStrategy;

impl DispatchStrategy {
    /// Places `entry` in the sink for `kind`.
    ///
    /// Registering against an unsupported variant warns and drops the entry.
    pub fn register(router: &mut Router, kind: EventKind, entry: HandlerEntry) {
        let sink = match kind {
            EventKind::Message => &mut router.message,
            EventKind::Callback => &mut router.callback,
            EventKind::InlineQuery => &mut router.inline_query,
            EventKind::Other => {
                warn!(
                    handler = entry.name(),
                    kind = %kind,
                    "no sink for event variant, handler dropped"
                );
                return;
            }
        };
        debug!(handler = entry.name(), kind = %kind, "handler registered");
        sink.push(Arc::new(entry));
    }
}

// ============================================================================
// Router
// ============================================================================

/// Owns every registered handler for the lifetime of the application.
///
/// Registration is append-only and happens during wiring; entries are torn
/// down wholesale when the router is dropped at shutdown.
#[derive(Default)]
pub struct Router {
    message: Vec<Arc<HandlerEntry>>,
    callback: Vec<Arc<HandlerEntry>>,
    inline_query: Vec<Arc<HandlerEntry>>,
    error_hook: Option<ErrorHook>,
}

impl Router {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for an event category via the dispatch strategy.
    pub fn register(&mut self, kind: EventKind, entry: HandlerEntry) {
        DispatchStrategy::register(self, kind, entry);
    }

    /// Installs the hook that receives every handler failure.
    pub fn set_error_hook(&mut self, hook: ErrorHook) {
        self.error_hook = Some(hook);
    }

    /// Total number of registered handlers across all sinks.
    pub fn handler_count(&self) -> usize {
        self.message.len() + self.callback.len() + self.inline_query.len()
    }

    /// Dispatches one event and returns how many handlers ran successfully.
    ///
    /// The event's variant selects the sink; unclassified events are logged
    /// and dropped. Within the sink, entries run in registration order until
    /// a blocking entry succeeds. Handler failures are reported through the
    /// error hook and do not stop later entries — the last line of defense
    /// against one handler taking the loop down.
    pub async fn dispatch(
        &self,
        event: &Incoming,
        session: &Session,
        container: &Container,
    ) -> usize {
        let sink = match event.kind() {
            EventKind::Message => &self.message,
            EventKind::Callback => &self.callback,
            EventKind::InlineQuery => &self.inline_query,
            EventKind::Other => {
                warn!(kind = %event.kind(), "unsupported event variant, dropping");
                return 0;
            }
        };

        let call_args = DepMap::new().with("state", session.clone());
        let mut handled = 0;

        for entry in sink {
            if !entry.matches(event, session).await {
                continue;
            }
            match entry.bind_and_invoke(event, &call_args, container).await {
                Ok(()) => {
                    handled += 1;
                    if entry.is_blocking() {
                        debug!(handler = entry.name(), "blocking handler matched, stopping");
                        break;
                    }
                }
                Err(err) => {
                    if let Some(hook) = &self.error_hook {
                        hook(&err);
                    }
                }
            }
        }

        if handled == 0 {
            debug!(kind = %event.kind(), "event matched no handler");
        }
        handled
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("message", &self.message.len())
            .field("callback", &self.callback.len())
            .field("inline_query", &self.inline_query.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::BoundArgs;
    use crate::container::ParamSpec;
    use crate::filter;
    use parking_lot::Mutex;
    use weld_core::{MessageEvent, UnknownEvent, UserRef};

    fn message(text: &str) -> Incoming {
        Incoming::message(MessageEvent {
            message_id: 1,
            chat_id: 1,
            from: UserRef {
                id: 1,
                username: None,
                first_name: "u".into(),
            },
            text: text.into(),
        })
    }

    fn recording_entry(name: &str, log: &Arc<Mutex<Vec<String>>>) -> HandlerEntry {
        let log = Arc::clone(log);
        let tag = name.to_string();
        HandlerEntry::new(name, move |_args: BoundArgs| {
            let log = Arc::clone(&log);
            let tag = tag.clone();
            async move {
                log.lock().push(tag);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_unsupported_variant_is_noop() {
        let mut router = Router::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        router.register(EventKind::Other, recording_entry("ignored", &log));
        assert_eq!(router.handler_count(), 0);

        let event = Incoming::unknown(UnknownEvent {
            update_type: "poll".into(),
            raw: serde_json::Value::Null,
        });
        let container = Container::new();
        let handled = router.dispatch(&event, &Session::new(), &container).await;
        assert_eq!(handled, 0);
    }

    #[tokio::test]
    async fn test_filters_select_the_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::new();
        router.register(
            EventKind::Message,
            recording_entry("start", &log).filter(filter::command("start")),
        );
        router.register(
            EventKind::Message,
            recording_entry("help", &log).filter(filter::command("help")),
        );

        let container = Container::new();
        let handled = router
            .dispatch(&message("/help"), &Session::new(), &container)
            .await;
        assert_eq!(handled, 1);
        assert_eq!(&*log.lock(), &["help".to_string()]);
    }

    #[tokio::test]
    async fn test_blocking_stops_after_first_success() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::new();
        router.register(EventKind::Message, recording_entry("first", &log));
        router.register(EventKind::Message, recording_entry("second", &log));

        let container = Container::new();
        let handled = router
            .dispatch(&message("hi"), &Session::new(), &container)
            .await;
        assert_eq!(handled, 1);
        assert_eq!(&*log.lock(), &["first".to_string()]);
    }

    #[tokio::test]
    async fn test_non_blocking_falls_through() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::new();
        router.register(
            EventKind::Message,
            recording_entry("observer", &log).blocking(false),
        );
        router.register(EventKind::Message, recording_entry("responder", &log));

        let container = Container::new();
        let handled = router
            .dispatch(&message("hi"), &Session::new(), &container)
            .await;
        assert_eq!(handled, 2);
        assert_eq!(
            &*log.lock(),
            &["observer".to_string(), "responder".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_stop_later_entries() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));

        let mut router = Router::new();
        // Requires a parameter nothing provides: fails at bind time.
        router.register(
            EventKind::Message,
            recording_entry("broken", &log).param(ParamSpec::named("missing_dep")),
        );
        router.register(EventKind::Message, recording_entry("healthy", &log));

        let errors_in_hook = Arc::clone(&errors);
        router.set_error_hook(Arc::new(move |err| {
            errors_in_hook.lock().push(err.to_string());
        }));

        let container = Container::new();
        let handled = router
            .dispatch(&message("hi"), &Session::new(), &container)
            .await;

        assert_eq!(handled, 1);
        assert_eq!(&*log.lock(), &["healthy".to_string()]);
        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("missing_dep"));
    }
}
