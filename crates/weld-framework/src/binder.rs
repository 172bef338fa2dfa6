//! The binding engine: matching declared handler parameters to values.
//!
//! Given one handler's declared parameter list, a concrete event and the
//! per-request [`ResolvedSet`], [`bind`] produces the exact argument set the
//! handler asked for. A parameter is satisfied by the first of these rules
//! that produces a value:
//!
//! 1. an event-derived candidate with the same name (`message`, `callback`,
//!    `query`, ...) — candidates the handler did not declare are discarded,
//! 2. the session passthrough, when the parameter is named `state` and the
//!    call site supplied one,
//! 3. a type scan over the resolved set, when the parameter declares a type:
//!    the first value whose concrete type matches, in the set's documented
//!    iteration order,
//! 4. a name lookup in the resolved set,
//! 5. a name lookup in the call-site arguments,
//! 6. a name lookup in the handler's preset arguments.
//!
//! A required parameter no rule satisfies fails the bind with
//! [`BindError::MissingParameter`] before the handler body ever runs;
//! optional parameters are simply left absent.

use std::any::type_name;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, error};

use weld_core::{AnyValue, Incoming, Session, catch_panic};

use crate::container::{Container, DepMap, ParamSpec, ResolvedSet};
use crate::error::{BindError, BindResult, BoxError, HandlerError};
use crate::filter::BoxedFilter;

// ============================================================================
// BoundArgs
// ============================================================================

/// The concrete argument set produced by one successful bind.
///
/// Handlers pull their declared parameters back out by name, downcast to the
/// type they expect.
#[derive(Clone)]
pub struct BoundArgs {
    handler: Arc<str>,
    values: Vec<(&'static str, AnyValue, &'static str)>,
}

impl BoundArgs {
    /// Returns the bound value for `name`, downcast to `T`.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.values
            .iter()
            .find(|(n, _, _)| *n == name)
            .and_then(|(_, v, _)| Arc::clone(v).downcast::<T>().ok())
    }

    /// Like [`get`](Self::get), but distinguishes an absent parameter from a
    /// type mismatch.
    pub fn require<T: Send + Sync + 'static>(&self, name: &str) -> BindResult<Arc<T>> {
        let (_, value, stored) = self
            .values
            .iter()
            .find(|(n, _, _)| *n == name)
            .ok_or_else(|| BindError::MissingParameter {
                handler: self.handler.to_string(),
                param: name.to_string(),
            })?;
        Arc::clone(value)
            .downcast::<T>()
            .map_err(|_| BindError::TypeMismatch {
                param: name.to_string(),
                expected: type_name::<T>(),
                actual: *stored,
            })
    }

    /// Convenience accessor for the session passthrough parameter.
    pub fn session(&self) -> BindResult<Session> {
        self.require::<Session>("state").map(|s| (*s).clone())
    }

    /// Returns `true` if a value was bound for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.values.iter().any(|(n, _, _)| *n == name)
    }

    /// Number of bound arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing was bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for BoundArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.values.iter().map(|(n, _, t)| (n, t)))
            .finish()
    }
}

// ============================================================================
// bind
// ============================================================================

/// Matches `params` against the available value sources.
///
/// Pure with respect to its inputs: resolution has already happened, so this
/// performs no I/O and never suspends.
pub fn bind(
    handler: &str,
    params: &[ParamSpec],
    event: &Incoming,
    resolved: &ResolvedSet,
    call_args: &DepMap,
    preset: &DepMap,
) -> BindResult<BoundArgs> {
    let candidates = event.binding_candidates();
    let mut values: Vec<(&'static str, AnyValue, &'static str)> =
        Vec::with_capacity(params.len());

    'params: for param in params {
        // Rule 1: event-derived candidate with the declared name.
        if let Some((name, value)) = candidates.iter().find(|(n, _)| *n == param.name) {
            values.push((*name, Arc::clone(value), event_payload_type(event)));
            continue;
        }

        // Rule 2: session passthrough.
        if param.name == "state" {
            if let Some((value, type_name)) = map_entry(call_args, "state") {
                values.push((param.name, value, type_name));
                continue;
            }
        }

        // Rule 3: type scan over the resolved set.
        if let Some(ty) = param.type_id {
            if let Some(entry) = resolved.scan_value_type(ty) {
                values.push((param.name, Arc::clone(&entry.value), entry.type_name));
                continue;
            }
            if let Some(sentinel) = resolved.sentinel_for(ty) {
                if param.required {
                    return Err(BindError::DependencyUnavailable {
                        handler: handler.to_string(),
                        param: param.name.to_string(),
                        reason: sentinel.reason.clone(),
                    });
                }
                continue;
            }
        }

        // Rules 4-6: name lookups, in source precedence order.
        for source in [
            resolved.named_entry(param.name).map(|e| (Arc::clone(&e.value), e.type_name)),
            map_entry(call_args, param.name),
            map_entry(preset, param.name),
        ] {
            if let Some((value, type_name)) = source {
                values.push((param.name, value, type_name));
                continue 'params;
            }
        }

        if param.required {
            return Err(BindError::MissingParameter {
                handler: handler.to_string(),
                param: param.name.to_string(),
            });
        }
        debug!(handler, param = param.name, "optional parameter left unbound");
    }

    Ok(BoundArgs {
        handler: Arc::from(handler),
        values,
    })
}

fn event_payload_type(event: &Incoming) -> &'static str {
    use weld_core::{CallbackEvent, EventKind, InlineQueryEvent, MessageEvent};
    match event.kind() {
        EventKind::Message => type_name::<MessageEvent>(),
        EventKind::Callback => type_name::<CallbackEvent>(),
        EventKind::InlineQuery => type_name::<InlineQueryEvent>(),
        EventKind::Other => "unknown",
    }
}

fn map_entry(map: &DepMap, name: &str) -> Option<(AnyValue, &'static str)> {
    map.entry(name).map(|e| (Arc::clone(&e.value), e.type_name))
}

// ============================================================================
// HandlerEntry
// ============================================================================

type HandlerFuture = BoxFuture<'static, Result<(), BoxError>>;
type HandlerFn = Arc<dyn Fn(BoundArgs) -> HandlerFuture + Send + Sync>;

/// One registered handler: the callable plus everything binding and dispatch
/// need to know about it.
///
/// Built with a fluent API, then handed to the router:
///
/// ```rust,ignore
/// let entry = HandlerEntry::new("greet", |args: BoundArgs| async move {
///     let message = args.require::<MessageEvent>("message")?;
///     println!("{} says hi", message.from.first_name);
///     Ok(())
/// })
/// .param(ParamSpec::named("message"))
/// .filter(filter::command("start"));
/// ```
#[derive(Clone)]
pub struct HandlerEntry {
    name: String,
    params: Vec<ParamSpec>,
    filters: Vec<BoxedFilter>,
    preset: DepMap,
    deps: DepMap,
    blocking: bool,
    func: HandlerFn,
}

impl HandlerEntry {
    /// Wraps an async closure as a handler.
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(BoundArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            params: Vec::new(),
            filters: Vec::new(),
            preset: DepMap::new(),
            deps: DepMap::new(),
            blocking: true,
            func: Arc::new(move |args| Box::pin(func(args))),
        }
    }

    /// Declares a parameter. Order is preserved but not semantically
    /// meaningful; binding matches by name and type only.
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Attaches a filter. All attached filters must pass for the handler to
    /// be considered.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: crate::filter::Filter + 'static,
    {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Presets an argument, like a partial application: bound last, after
    /// every other source.
    pub fn preset<T: Send + Sync + 'static>(mut self, name: impl Into<String>, value: T) -> Self {
        self.preset.insert(name, value);
        self
    }

    /// Adds an extra named dependency for this handler only, merged into the
    /// resolved set ahead of the container's resolvers.
    pub fn dependency<T: Send + Sync + 'static>(
        mut self,
        name: impl Into<String>,
        value: T,
    ) -> Self {
        self.deps.insert(name, value);
        self
    }

    /// Controls whether a successful run stops dispatch to later handlers in
    /// the same sink. Defaults to `true`.
    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// The handler's registered name, used in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared parameter list.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub(crate) fn is_blocking(&self) -> bool {
        self.blocking
    }

    /// Returns `true` if every attached filter accepts the event.
    pub async fn matches(&self, event: &Incoming, session: &Session) -> bool {
        for filter in &self.filters {
            if !filter.check(event, session).await {
                return false;
            }
        }
        true
    }

    /// Resolves, binds and invokes this handler for one event.
    ///
    /// Resolution runs exactly once per invocation. Bind failures and handler
    /// failures are logged here with the handler's identity, then raised to
    /// the dispatch layer. Panics inside the handler body are caught and
    /// surfaced as [`HandlerError::Panicked`] so one misbehaving handler
    /// cannot take down the event loop.
    pub async fn bind_and_invoke(
        &self,
        event: &Incoming,
        call_args: &DepMap,
        container: &Container,
    ) -> Result<(), HandlerError> {
        let resolved = container.resolve(event, &self.deps).await;
        let args = bind(
            &self.name,
            &self.params,
            event,
            &resolved,
            call_args,
            &self.preset,
        )
        .map_err(|err| {
            error!(handler = %self.name, error = %err, "failed to bind handler parameters");
            err
        })?;

        debug!(handler = %self.name, args = ?args, "invoking handler");
        match catch_panic((self.func)(args)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => {
                error!(handler = %self.name, error = %source, "handler failed");
                Err(HandlerError::Failed {
                    handler: self.name.clone(),
                    source,
                })
            }
            Err(payload) => {
                error!(handler = %self.name, panic = %payload, "handler panicked");
                Err(HandlerError::Panicked {
                    handler: self.name.clone(),
                    payload,
                })
            }
        }
    }
}

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("filters", &self.filters.len())
            .field("blocking", &self.blocking)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::UnresolvedPolicy;
    use crate::error::ResolveError;
    use parking_lot::Mutex;
    use weld_core::{MessageEvent, UserRef};

    #[derive(Debug, Clone, PartialEq)]
    struct Db {
        url: String,
    }

    fn message(text: &str) -> Incoming {
        Incoming::message(MessageEvent {
            message_id: 1,
            chat_id: 7,
            from: UserRef {
                id: 42,
                username: Some("tester".into()),
                first_name: "Tester".into(),
            },
            text: text.into(),
        })
    }

    fn call_args_with_state(session: &Session) -> DepMap {
        DepMap::new().with("state", session.clone())
    }

    #[tokio::test]
    async fn test_binds_event_payload_and_state() {
        let container = Container::new();
        let event = message("hello");
        let session = Session::new();
        session.set("step1");
        let resolved = container.resolve(&event, &DepMap::new()).await;

        let args = bind(
            "greet",
            &[ParamSpec::named("message"), ParamSpec::named("state")],
            &event,
            &resolved,
            &call_args_with_state(&session),
            &DepMap::new(),
        )
        .unwrap();

        assert_eq!(args.require::<MessageEvent>("message").unwrap().text, "hello");
        assert_eq!(args.session().unwrap().get(), Some("step1".into()));
        // Undeclared candidates (msg) are never bound.
        assert!(!args.contains("msg"));
        assert_eq!(args.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_required_parameter_fails_fast() {
        let container = Container::new();
        let event = message("hi");
        let resolved = container.resolve(&event, &DepMap::new()).await;

        let err = bind(
            "needs_db",
            &[ParamSpec::named("db")],
            &event,
            &resolved,
            &DepMap::new(),
            &DepMap::new(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            BindError::MissingParameter { ref param, .. } if param == "db"
        ));
    }

    #[tokio::test]
    async fn test_optional_parameter_left_absent() {
        let container = Container::new();
        let event = message("hi");
        let resolved = container.resolve(&event, &DepMap::new()).await;

        let args = bind(
            "loose",
            &[ParamSpec::named("db").optional()],
            &event,
            &resolved,
            &DepMap::new(),
            &DepMap::new(),
        )
        .unwrap();
        assert!(args.is_empty());
    }

    #[tokio::test]
    async fn test_type_scan_uses_documented_order() {
        let mut container = Container::new();
        container.register("first", Db { url: "one".into() });
        container.register("second", Db { url: "two".into() });

        let event = message("hi");
        let resolved = container.resolve(&event, &DepMap::new()).await;

        // Two values of the same type: the scan picks the earlier slot.
        let args = bind(
            "typed",
            &[ParamSpec::of::<Db>("database")],
            &event,
            &resolved,
            &DepMap::new(),
            &DepMap::new(),
        )
        .unwrap();
        assert_eq!(args.require::<Db>("database").unwrap().url, "one");
    }

    #[tokio::test]
    async fn test_name_lookup_precedence_resolved_over_call_args_over_preset() {
        let mut container = Container::new();
        container.register("who", "resolved".to_string());

        let event = message("hi");
        let resolved = container.resolve(&event, &DepMap::new()).await;
        let call_args = DepMap::new().with("who", "call-site".to_string());
        let preset = DepMap::new().with("who", "preset".to_string());

        let args = bind("prec", &[ParamSpec::named("who")], &event, &resolved, &call_args, &preset)
            .unwrap();
        assert_eq!(*args.require::<String>("who").unwrap(), "resolved");

        // Without a resolved entry the call site wins over the preset.
        let empty = Container::new();
        let resolved = empty.resolve(&event, &DepMap::new()).await;
        let args = bind("prec", &[ParamSpec::named("who")], &event, &resolved, &call_args, &preset)
            .unwrap();
        assert_eq!(*args.require::<String>("who").unwrap(), "call-site");

        let args = bind(
            "prec",
            &[ParamSpec::named("who")],
            &event,
            &resolved,
            &DepMap::new(),
            &preset,
        )
        .unwrap();
        assert_eq!(*args.require::<String>("who").unwrap(), "preset");
    }

    #[tokio::test]
    async fn test_sentinel_surfaces_as_dependency_unavailable() {
        let mut container =
            Container::new().with_unresolved_policy(UnresolvedPolicy::Sentinel);
        container.register_resolver::<Db, _, _, _>(vec![], |_e, _d| async {
            Err::<Db, _>(ResolveError::factory("connection refused"))
        });

        let event = message("hi");
        let resolved = container.resolve(&event, &DepMap::new()).await;

        let err = bind(
            "needs_db",
            &[ParamSpec::of::<Db>("db")],
            &event,
            &resolved,
            &DepMap::new(),
            &DepMap::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BindError::DependencyUnavailable { ref reason, .. }
                if reason.contains("connection refused")
        ));
    }

    #[tokio::test]
    async fn test_type_mismatch_is_reported() {
        let container = Container::new();
        let event = message("hi");
        let resolved = container.resolve(&event, &DepMap::new()).await;

        let args = bind(
            "greet",
            &[ParamSpec::named("message")],
            &event,
            &resolved,
            &DepMap::new(),
            &DepMap::new(),
        )
        .unwrap();
        let err = args.require::<Db>("message").unwrap_err();
        assert!(matches!(err, BindError::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_bind_and_invoke_runs_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_handler = Arc::clone(&seen);

        let entry = HandlerEntry::new("echo", move |args: BoundArgs| {
            let seen = Arc::clone(&seen_in_handler);
            async move {
                let message = args.require::<MessageEvent>("message")?;
                seen.lock().push(message.text.clone());
                Ok(())
            }
        })
        .param(ParamSpec::named("message"));

        let container = Container::new();
        entry
            .bind_and_invoke(&message("ping"), &DepMap::new(), &container)
            .await
            .unwrap();
        assert_eq!(&*seen.lock(), &["ping".to_string()]);
    }

    #[tokio::test]
    async fn test_bind_and_invoke_catches_panic() {
        let entry = HandlerEntry::new("explode", |_args: BoundArgs| async { panic!("boom") });

        let container = Container::new();
        let err = entry
            .bind_and_invoke(&message("hi"), &DepMap::new(), &container)
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Panicked { ref handler, .. } if handler == "explode"));
    }

    #[tokio::test]
    async fn test_per_handler_dependency_reaches_binding() {
        let entry = HandlerEntry::new("cfg", |args: BoundArgs| async move {
            assert_eq!(*args.require::<u32>("limit")?, 10);
            Ok(())
        })
        .param(ParamSpec::named("limit"))
        .dependency("limit", 10u32);

        let container = Container::new();
        entry
            .bind_and_invoke(&message("hi"), &DepMap::new(), &container)
            .await
            .unwrap();
    }
}
