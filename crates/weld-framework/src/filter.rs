//! Handler filters.
//!
//! A [`Filter`] decides whether a handler should run for a given event and
//! session. Filters run before resolution and binding, so a rejected event
//! costs no resolver work.
//!
//! Stock filters cover the common cases: [`command`] for slash commands,
//! [`text_in`] for reply-menu buttons, [`state_is`] for multi-step
//! conversation flows and [`callback_prefix`] for inline-button data.
//! [`FilterExt::or`] and [`FilterExt::and`] combine them.

use async_trait::async_trait;
use std::sync::Arc;

use weld_core::{Incoming, Session};

/// An asynchronous predicate over one incoming event.
#[async_trait]
pub trait Filter: Send + Sync {
    /// Returns `true` if the handler should be considered for this event.
    async fn check(&self, event: &Incoming, session: &Session) -> bool;
}

/// A shareable, type-erased filter.
pub type BoxedFilter = Arc<dyn Filter>;

#[async_trait]
impl<F> Filter for F
where
    F: Fn(&Incoming, &Session) -> bool + Send + Sync,
{
    async fn check(&self, event: &Incoming, session: &Session) -> bool {
        self(event, session)
    }
}

/// Combinators available on every filter.
pub trait FilterExt: Filter + Sized + 'static {
    /// Passes when either side passes. Short-circuits on the left.
    fn or<F: Filter + 'static>(self, other: F) -> Or {
        Or {
            left: Arc::new(self),
            right: Arc::new(other),
        }
    }

    /// Passes only when both sides pass.
    fn and<F: Filter + 'static>(self, other: F) -> And {
        And {
            left: Arc::new(self),
            right: Arc::new(other),
        }
    }
}

impl<F: Filter + Sized + 'static> FilterExt for F {}

/// See [`FilterExt::or`].
pub struct Or {
    left: BoxedFilter,
    right: BoxedFilter,
}

#[async_trait]
impl Filter for Or {
    async fn check(&self, event: &Incoming, session: &Session) -> bool {
        self.left.check(event, session).await || self.right.check(event, session).await
    }
}

/// See [`FilterExt::and`].
pub struct And {
    left: BoxedFilter,
    right: BoxedFilter,
}

#[async_trait]
impl Filter for And {
    async fn check(&self, event: &Incoming, session: &Session) -> bool {
        self.left.check(event, session).await && self.right.check(event, session).await
    }
}

// ============================================================================
// Stock filters
// ============================================================================

/// Matches messages starting with `/{name}`, with or without a `@bot` suffix.
pub struct Command {
    name: String,
}

/// Builds a [`Command`] filter. The leading slash is implied.
pub fn command(name: impl Into<String>) -> Command {
    Command { name: name.into() }
}

#[async_trait]
impl Filter for Command {
    async fn check(&self, event: &Incoming, _session: &Session) -> bool {
        let Incoming::Message(message) = event else {
            return false;
        };
        let Some(first) = message.text.split_whitespace().next() else {
            return false;
        };
        let Some(invocation) = first.strip_prefix('/') else {
            return false;
        };
        // "/start@my_bot" still invokes "start".
        invocation.split('@').next() == Some(self.name.as_str())
    }
}

/// Matches messages whose full text equals one of the given options. Used for
/// reply-menu buttons, where the button label arrives as plain text.
pub struct TextIn {
    options: Vec<String>,
}

/// Builds a [`TextIn`] filter.
pub fn text_in<I, S>(options: I) -> TextIn
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    TextIn {
        options: options.into_iter().map(Into::into).collect(),
    }
}

#[async_trait]
impl Filter for TextIn {
    async fn check(&self, event: &Incoming, _session: &Session) -> bool {
        matches!(event, Incoming::Message(m) if self.options.iter().any(|o| *o == m.text))
    }
}

/// Matches when the session's state tag equals the given value.
pub struct StateIs {
    state: String,
}

/// Builds a [`StateIs`] filter.
pub fn state_is(state: impl Into<String>) -> StateIs {
    StateIs {
        state: state.into(),
    }
}

#[async_trait]
impl Filter for StateIs {
    async fn check(&self, _event: &Incoming, session: &Session) -> bool {
        session.get().as_deref() == Some(self.state.as_str())
    }
}

/// Matches callback events whose data starts with the given prefix.
pub struct CallbackPrefix {
    prefix: String,
}

/// Builds a [`CallbackPrefix`] filter.
pub fn callback_prefix(prefix: impl Into<String>) -> CallbackPrefix {
    CallbackPrefix {
        prefix: prefix.into(),
    }
}

#[async_trait]
impl Filter for CallbackPrefix {
    async fn check(&self, event: &Incoming, _session: &Session) -> bool {
        matches!(event, Incoming::Callback(c) if c.data.starts_with(&self.prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weld_core::{CallbackEvent, MessageEvent, UserRef};

    fn user() -> UserRef {
        UserRef {
            id: 1,
            username: None,
            first_name: "u".into(),
        }
    }

    fn message(text: &str) -> Incoming {
        Incoming::message(MessageEvent {
            message_id: 1,
            chat_id: 1,
            from: user(),
            text: text.into(),
        })
    }

    fn callback(data: &str) -> Incoming {
        Incoming::callback(CallbackEvent {
            id: "cb".into(),
            from: user(),
            data: data.into(),
            message: None,
        })
    }

    #[tokio::test]
    async fn test_command_matching() {
        let session = Session::new();
        let filter = command("start");

        assert!(filter.check(&message("/start"), &session).await);
        assert!(filter.check(&message("/start now"), &session).await);
        assert!(filter.check(&message("/start@my_bot"), &session).await);
        assert!(!filter.check(&message("/started"), &session).await);
        assert!(!filter.check(&message("start"), &session).await);
        assert!(!filter.check(&callback("/start"), &session).await);
    }

    #[tokio::test]
    async fn test_text_in_exact_match() {
        let session = Session::new();
        let filter = text_in(["Menu", "Back"]);

        assert!(filter.check(&message("Menu"), &session).await);
        assert!(!filter.check(&message("menu"), &session).await);
        assert!(!filter.check(&message("Menu "), &session).await);
    }

    #[tokio::test]
    async fn test_state_filter_and_or_combinator() {
        let session = Session::new();
        let filter = state_is("ask_name").or(state_is("ask_age"));

        assert!(!filter.check(&message("x"), &session).await);
        session.set("ask_name");
        assert!(filter.check(&message("x"), &session).await);
        session.set("ask_age");
        assert!(filter.check(&message("x"), &session).await);
        session.set("done");
        assert!(!filter.check(&message("x"), &session).await);
    }

    #[tokio::test]
    async fn test_callback_prefix_and_and_combinator() {
        let session = Session::new();
        session.set("confirming");
        let filter = callback_prefix("order:").and(state_is("confirming"));

        assert!(filter.check(&callback("order:42"), &session).await);
        session.clear();
        assert!(!filter.check(&callback("order:42"), &session).await);
    }

    #[tokio::test]
    async fn test_closure_filter() {
        let session = Session::new();
        let filter = |event: &Incoming, _session: &Session| event.text().len() > 3;
        assert!(filter.check(&message("long enough"), &session).await);
        assert!(!filter.check(&message("no"), &session).await);
    }
}
