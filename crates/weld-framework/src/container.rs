//! Dependency container for the Weld framework.
//!
//! The [`Container`] owns two registries:
//!
//! - **static dependencies** — named, already-constructed values registered
//!   during wiring (`register("db", pool)`), and
//! - **resolvers** — asynchronous factories keyed by the type they produce,
//!   run once per request for every type a handler might need.
//!
//! When a resolver is registered, the container inspects its declared
//! parameter list and captures the matching static dependencies **at that
//! moment**. The capture is a value snapshot, not a live view: a static
//! dependency registered later is invisible to an already-registered
//! resolver. This is deliberate and covered by tests.
//!
//! Per request, [`Container::resolve`] layers static deps, caller-supplied
//! extras and resolver outputs into a [`ResolvedSet`] — the flat, ordered
//! value pool the binding engine draws from.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut container = Container::new();
//! container.register("db", Db::connect());
//! container.register_resolver::<User, _, _, _>(
//!     vec![ParamSpec::of::<Db>("db")],
//!     |event, deps| async move {
//!         let db = deps.get_as::<Db>("db").ok_or(ResolveError::unavailable("db"))?;
//!         db.load_user(event.sender_id()).await
//!     },
//! );
//!
//! let resolved = container.resolve(&event, &DepMap::new()).await;
//! let user = resolved.get_typed::<User>();
//! ```

use std::any::{Any, TypeId, type_name};
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use weld_core::{AnyValue, Incoming};

use crate::error::ResolveError;

// ============================================================================
// DepMap — ordered, name-keyed dependency storage
// ============================================================================

/// One stored dependency value, with its concrete type name for diagnostics.
#[derive(Clone)]
pub(crate) struct DepEntry {
    pub(crate) value: AnyValue,
    pub(crate) type_name: &'static str,
}

impl DepEntry {
    pub(crate) fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// The concrete type of the stored value.
    pub(crate) fn type_id(&self) -> TypeId {
        self.value.as_ref().type_id()
    }
}

/// An insertion-ordered map of named dependencies.
///
/// Used for the container's static registry, per-handler extra dependencies,
/// call-site arguments and resolver sub-dependency snapshots. Re-inserting an
/// existing key replaces the value in place, keeping the original position,
/// so iteration order stays deterministic.
#[derive(Clone, Default)]
pub struct DepMap {
    entries: Vec<(String, DepEntry)>,
}

impl DepMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a value. Last registration wins.
    pub fn insert<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.insert_entry(key.into(), DepEntry::new(value));
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with<T: Send + Sync + 'static>(mut self, key: impl Into<String>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    pub(crate) fn insert_entry(&mut self, key: String, entry: DepEntry) {
        if let Some(existing) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = entry;
        } else {
            self.entries.push((key, entry));
        }
    }

    pub(crate) fn entry(&self, key: &str) -> Option<&DepEntry> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, e)| e)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &(String, DepEntry)> {
        self.entries.iter()
    }

    /// Returns the raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&AnyValue> {
        self.entry(key).map(|e| &e.value)
    }

    /// Returns the value stored under `key`, downcast to `T`.
    pub fn get_as<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.entry(key)
            .and_then(|e| Arc::clone(&e.value).downcast::<T>().ok())
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for DepMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, e)| (k, e.type_name)))
            .finish()
    }
}

// ============================================================================
// ParamSpec — declared parameters
// ============================================================================

/// One declared parameter of a resolver factory or handler.
///
/// Rust cannot introspect function signatures at runtime, so factories and
/// handlers declare their parameter lists explicitly. A parameter carries a
/// name, optionally the type it expects (enabling type-based matching), and
/// whether binding may leave it absent.
#[derive(Clone, Debug)]
pub struct ParamSpec {
    /// The parameter name.
    pub name: &'static str,
    /// The declared type, when type-based matching should apply.
    pub type_id: Option<TypeId>,
    /// Human-readable form of the declared type.
    pub type_name: Option<&'static str>,
    /// Whether binding must produce a value. Defaults to `true`.
    pub required: bool,
}

impl ParamSpec {
    /// A parameter matched by name only.
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            type_id: None,
            type_name: None,
            required: true,
        }
    }

    /// A parameter with a declared type, eligible for type-based matching.
    pub fn of<T: 'static>(name: &'static str) -> Self {
        Self {
            name,
            type_id: Some(TypeId::of::<T>()),
            type_name: Some(type_name::<T>()),
            required: true,
        }
    }

    /// Marks the parameter as optional: binding leaves it absent instead of
    /// failing when no rule produces a value.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

// ============================================================================
// IntoResolved — normalizing factory return values
// ============================================================================

/// Conversion of a factory's return value into a resolution result.
///
/// Factories may return a plain `T` (always succeeds), a
/// `Result<T, ResolveError>` (passed through unchanged) or an `Option<T>`
/// (`None` becomes an unavailable-dependency error).
pub trait IntoResolved<T> {
    /// Performs the conversion.
    fn into_resolved(self) -> Result<T, ResolveError>;
}

impl<T> IntoResolved<T> for T {
    fn into_resolved(self) -> Result<T, ResolveError> {
        Ok(self)
    }
}

impl<T> IntoResolved<T> for Result<T, ResolveError> {
    fn into_resolved(self) -> Result<T, ResolveError> {
        self
    }
}

impl<T> IntoResolved<T> for Option<T> {
    fn into_resolved(self) -> Result<T, ResolveError> {
        self.ok_or_else(|| ResolveError::unavailable("factory returned no value"))
    }
}

// ============================================================================
// ResolvedSet — per-request value pool
// ============================================================================

/// Key of one slot in a [`ResolvedSet`]: static and caller-supplied values
/// are keyed by name, resolver outputs by the type they produce.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A named dependency.
    Name(String),
    /// A resolver output, keyed by its produced type.
    Type(TypeId),
}

/// Marker stored in a slot when its resolver failed and the container runs
/// under [`UnresolvedPolicy::Sentinel`].
#[derive(Debug, Clone)]
pub struct Unavailable {
    /// The type the failed resolver would have produced.
    pub type_name: &'static str,
    /// Why resolution failed.
    pub reason: String,
}

/// The per-request map of dependency identifiers to concrete values.
///
/// Iteration order is the **documented** order type-based binding relies on:
/// static dependencies in registration order, then caller-supplied extras not
/// overriding a static key, then resolver outputs in resolver registration
/// order. Overriding an existing key keeps its original position.
#[derive(Clone, Default)]
pub struct ResolvedSet {
    entries: Vec<(DepKey, DepEntry)>,
}

impl ResolvedSet {
    fn insert(&mut self, key: DepKey, entry: DepEntry) {
        if let Some(existing) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = entry;
        } else {
            self.entries.push((key, entry));
        }
    }

    /// Returns `true` if a slot exists for `key`.
    pub fn contains(&self, key: &DepKey) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub(crate) fn named_entry(&self, name: &str) -> Option<&DepEntry> {
        self.entries
            .iter()
            .find(|(k, _)| matches!(k, DepKey::Name(n) if n == name))
            .map(|(_, e)| e)
    }

    /// Returns the value stored under `name`, downcast to `T`.
    pub fn get_named<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.named_entry(name)
            .and_then(|e| Arc::clone(&e.value).downcast::<T>().ok())
    }

    /// Returns the resolver output for type `T`, if it resolved.
    pub fn get_typed<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.entries
            .iter()
            .find(|(k, _)| *k == DepKey::Type(TypeId::of::<T>()))
            .and_then(|(_, e)| Arc::clone(&e.value).downcast::<T>().ok())
    }

    /// Returns the first entry whose **stored** value has the given concrete
    /// type, in documented iteration order.
    pub(crate) fn scan_value_type(&self, ty: TypeId) -> Option<&DepEntry> {
        self.entries.iter().map(|(_, e)| e).find(|e| DepEntry::type_id(e) == ty)
    }

    /// Returns the sentinel recorded for the type-keyed slot `ty`, if any.
    pub(crate) fn sentinel_for(&self, ty: TypeId) -> Option<Arc<Unavailable>> {
        self.entries
            .iter()
            .find(|(k, _)| *k == DepKey::Type(ty))
            .and_then(|(_, e)| Arc::clone(&e.value).downcast::<Unavailable>().ok())
    }

    /// The slot keys, in documented iteration order.
    pub fn keys(&self) -> impl Iterator<Item = &DepKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Number of resolved slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing resolved.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ResolvedSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, e)| (k, e.type_name)))
            .finish()
    }
}

// ============================================================================
// Container
// ============================================================================

/// What [`Container::resolve`] records when a resolver fails.
///
/// The original behavior (and the default) is to log and leave the slot
/// absent; binding then reports a plain missing parameter. Under `Sentinel`
/// the slot is filled with an [`Unavailable`] marker instead, and binding a
/// required parameter against it fails with the resolver's actual error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnresolvedPolicy {
    /// Leave the slot absent.
    #[default]
    Omit,
    /// Record an [`Unavailable`] sentinel in the slot.
    Sentinel,
}

type ResolverFuture = BoxFuture<'static, Result<AnyValue, ResolveError>>;
type ResolverFn = Arc<dyn Fn(Incoming, DepMap) -> ResolverFuture + Send + Sync>;

struct ResolverEntry {
    type_id: TypeId,
    type_name: &'static str,
    sub_deps: DepMap,
    factory: ResolverFn,
}

/// The shared dependency container.
///
/// Registration happens during wiring, before traffic starts; after that the
/// container is read-only and [`resolve`](Self::resolve) needs no locking.
#[derive(Default)]
pub struct Container {
    static_deps: DepMap,
    resolvers: Vec<ResolverEntry>,
    policy: UnresolvedPolicy,
}

impl Container {
    /// Creates an empty container with the default [`UnresolvedPolicy`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the policy applied when a resolver fails.
    pub fn with_unresolved_policy(mut self, policy: UnresolvedPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Registers a static dependency. Overwrites silently on key collision.
    pub fn register<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        let key = key.into();
        debug!(key = %key, dep = type_name::<T>(), "static dependency registered");
        self.static_deps.insert(key, value);
    }

    /// Returns a registered static dependency.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.static_deps.get_as(key)
    }

    /// Registers a resolver for type `T`.
    ///
    /// `params` is the factory's declared parameter list. Each parameter is
    /// satisfied against the **currently registered** static dependencies:
    /// first by exact name, then — when the parameter declares a type — by a
    /// scan for exactly one static value of that type. An ambiguous type
    /// match (two or more candidates) leaves the parameter unresolved rather
    /// than picking one arbitrarily. The captured sub-dependency map is
    /// frozen here; later `register` calls do not update it.
    ///
    /// Re-registering the same output type replaces the previous resolver
    /// silently.
    pub fn register_resolver<T, F, Fut, R>(&mut self, params: Vec<ParamSpec>, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(Incoming, DepMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResolved<T>,
    {
        let sub_deps = self.snapshot_sub_deps(type_name::<T>(), &params);
        let factory: ResolverFn = Arc::new(move |event, deps| {
            let fut = factory(event, deps);
            Box::pin(async move {
                fut.await
                    .into_resolved()
                    .map(|value| Arc::new(value) as AnyValue)
            })
        });

        let entry = ResolverEntry {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            sub_deps,
            factory,
        };

        debug!(dep = entry.type_name, "resolver registered");
        if let Some(existing) = self
            .resolvers
            .iter_mut()
            .find(|r| r.type_id == entry.type_id)
        {
            *existing = entry;
        } else {
            self.resolvers.push(entry);
        }
    }

    fn snapshot_sub_deps(&self, resolver: &'static str, params: &[ParamSpec]) -> DepMap {
        let mut subs = DepMap::new();
        for param in params {
            if let Some(entry) = self.static_deps.entry(param.name) {
                subs.insert_entry(param.name.to_string(), entry.clone());
                continue;
            }
            let Some(ty) = param.type_id else { continue };
            let mut matches = self
                .static_deps
                .entries()
                .filter(|(_, e)| e.type_id() == ty);
            match (matches.next(), matches.next()) {
                (Some((_, entry)), None) => {
                    subs.insert_entry(param.name.to_string(), entry.clone());
                }
                (Some(_), Some(_)) => {
                    debug!(
                        resolver,
                        param = param.name,
                        "ambiguous type match for sub-dependency, leaving unresolved"
                    );
                }
                _ => {}
            }
        }
        subs
    }

    /// Resolves the full dependency set for one request. Never fails.
    ///
    /// Seeds the set with static dependencies, then `additional` (which wins
    /// on key collision), then runs every resolver whose type key is still
    /// absent, in registration order. A factory `Err` is logged and handled
    /// per the container's [`UnresolvedPolicy`].
    ///
    /// Resolvers only ever see the sub-dependencies captured at their
    /// registration — never each other's outputs, even within the same call.
    /// Chaining one resolver's output into another is not supported.
    pub async fn resolve(&self, event: &Incoming, additional: &DepMap) -> ResolvedSet {
        let mut resolved = ResolvedSet::default();
        for (name, entry) in self.static_deps.entries() {
            resolved.insert(DepKey::Name(name.clone()), entry.clone());
        }
        for (name, entry) in additional.entries() {
            resolved.insert(DepKey::Name(name.clone()), entry.clone());
        }

        for resolver in &self.resolvers {
            let key = DepKey::Type(resolver.type_id);
            if resolved.contains(&key) {
                continue;
            }

            match (resolver.factory)(event.clone(), resolver.sub_deps.clone()).await {
                Ok(value) => {
                    resolved.insert(
                        key,
                        DepEntry {
                            value,
                            type_name: resolver.type_name,
                        },
                    );
                }
                Err(err) => {
                    warn!(dep = resolver.type_name, error = %err, "failed to resolve dependency");
                    if self.policy == UnresolvedPolicy::Sentinel {
                        resolved.insert(
                            key,
                            DepEntry::new(Unavailable {
                                type_name: resolver.type_name,
                                reason: err.to_string(),
                            }),
                        );
                    }
                }
            }
        }

        resolved
    }

    /// Number of registered resolvers.
    pub fn resolver_count(&self) -> usize {
        self.resolvers.len()
    }

    /// Number of registered static dependencies.
    pub fn static_count(&self) -> usize {
        self.static_deps.len()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("static_deps", &self.static_deps)
            .field("resolver_count", &self.resolvers.len())
            .field("policy", &self.policy)
            .finish()
    }
}
