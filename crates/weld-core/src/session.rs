//! Per-chat conversation state.
//!
//! A [`Session`] is the opaque state handle handlers receive when they
//! declare a parameter named `state`. It carries the current conversation
//! state tag (used by state filters to implement multi-step flows) plus a
//! typed scratch map for anything a flow needs to remember between steps.
//!
//! Sessions are looked up in a [`SessionStore`], which populates an entry
//! under a single lock on first access and serves the cached handle from then
//! on.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::event::AnyValue;

#[derive(Default)]
struct SessionInner {
    state: Option<String>,
    data: HashMap<TypeId, AnyValue>,
}

/// A cheaply clonable handle to one chat's conversation state.
#[derive(Clone, Default)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
}

impl Session {
    /// Creates a fresh, empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state tag, if any.
    pub fn get(&self) -> Option<String> {
        self.inner.lock().state.clone()
    }

    /// Sets the current state tag.
    pub fn set(&self, state: impl Into<String>) {
        self.inner.lock().state = Some(state.into());
    }

    /// Clears the state tag and all scratch data.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.state = None;
        inner.data.clear();
    }

    /// Stores a scratch value. One value per type; overwrites silently.
    pub fn set_value<T: Send + Sync + 'static>(&self, value: T) {
        self.inner
            .lock()
            .data
            .insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Retrieves a scratch value by type.
    pub fn get_value<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner
            .lock()
            .data
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|v| v.downcast::<T>().ok())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Session")
            .field("state", &inner.state)
            .field("data_len", &inner.data.len())
            .finish()
    }
}

/// Maps chat ids to their [`Session`] handles.
///
/// The first access for a chat populates the entry under the store lock;
/// every later access hands out the cached handle. Handles themselves are
/// lock-free to clone, so the store lock is only ever held for the lookup.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<i64, Session>>,
}

impl SessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for `chat_id`, creating it on first access.
    pub fn get_or_create(&self, chat_id: i64) -> Session {
        self.sessions.lock().entry(chat_id).or_default().clone()
    }

    /// Drops the session for `chat_id`, if present.
    pub fn remove(&self, chat_id: i64) {
        self.sessions.lock().remove(&chat_id);
    }

    /// Returns the number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Returns `true` if no session exists.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
