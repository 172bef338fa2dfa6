//! Incoming event model for the Weld framework.
//!
//! The transport layer (out of scope for this crate) deserializes protocol
//! updates into one of the [`Incoming`] variants. Everything downstream —
//! filters, the dependency container and the binding engine — works against
//! this model only, never against raw protocol payloads.
//!
//! Each variant exposes a stable set of **binding candidates**: named views
//! of the event that a handler can request by declaring a parameter with the
//! matching name. A message event, for example, offers itself under both
//! `message` and `msg`; a callback event under `callback`, `callback_query`
//! and `query`. Candidates a handler does not declare are simply not bound.

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A type-erased, shareable value.
///
/// Used for binding candidates, resolved dependencies and session scratch
/// data. The concrete type is recovered by downcasting.
pub type AnyValue = Arc<dyn Any + Send + Sync>;

// ============================================================================
// Event payloads
// ============================================================================

/// The sender of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// Unique user id on the platform.
    pub id: i64,
    /// Optional handle, without the leading `@`.
    #[serde(default)]
    pub username: Option<String>,
    /// Display name.
    #[serde(default)]
    pub first_name: String,
}

/// A plain chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    /// Message id, unique within the chat.
    pub message_id: i64,
    /// The chat this message was posted in.
    pub chat_id: i64,
    /// Who sent it.
    pub from: UserRef,
    /// Plain-text content.
    #[serde(default)]
    pub text: String,
}

/// An interactive callback, triggered by an inline button press.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackEvent {
    /// Globally unique callback id, used to acknowledge the interaction.
    pub id: String,
    /// Who pressed the button.
    pub from: UserRef,
    /// Opaque data attached to the pressed button.
    #[serde(default)]
    pub data: String,
    /// The message the button was attached to, when still available.
    #[serde(default)]
    pub message: Option<MessageEvent>,
}

/// An inline query typed into the chat input field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineQueryEvent {
    /// Unique query id.
    pub id: String,
    /// Who is typing the query.
    pub from: UserRef,
    /// The query text so far.
    #[serde(default)]
    pub query: String,
    /// Pagination offset controlled by the client.
    #[serde(default)]
    pub offset: String,
}

/// A protocol update the transport could not classify.
///
/// Kept so the dispatch layer can report and drop it instead of the transport
/// silently discarding data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnknownEvent {
    /// The update type name as reported by the protocol.
    pub update_type: String,
    /// The raw payload.
    pub raw: serde_json::Value,
}

// ============================================================================
// Incoming
// ============================================================================

/// The mutually exclusive shapes an incoming event can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A plain chat message.
    Message,
    /// An interactive callback.
    Callback,
    /// An inline query.
    InlineQuery,
    /// An update the transport could not classify.
    Other,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::Message => "message",
            EventKind::Callback => "callback",
            EventKind::InlineQuery => "inline_query",
            EventKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// One incoming event, ready for dispatch.
///
/// Payloads are held behind `Arc` so that cloning the event — which happens
/// once per binding candidate — never copies the payload itself.
#[derive(Debug, Clone)]
pub enum Incoming {
    /// A plain chat message.
    Message(Arc<MessageEvent>),
    /// An interactive callback.
    Callback(Arc<CallbackEvent>),
    /// An inline query.
    InlineQuery(Arc<InlineQueryEvent>),
    /// An unclassified protocol update.
    Unknown(Arc<UnknownEvent>),
}

impl Incoming {
    /// Wraps a message payload.
    pub fn message(event: MessageEvent) -> Self {
        Self::Message(Arc::new(event))
    }

    /// Wraps a callback payload.
    pub fn callback(event: CallbackEvent) -> Self {
        Self::Callback(Arc::new(event))
    }

    /// Wraps an inline query payload.
    pub fn inline_query(event: InlineQueryEvent) -> Self {
        Self::InlineQuery(Arc::new(event))
    }

    /// Wraps an unclassified update.
    pub fn unknown(event: UnknownEvent) -> Self {
        Self::Unknown(Arc::new(event))
    }

    /// Returns the variant tag of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Incoming::Message(_) => EventKind::Message,
            Incoming::Callback(_) => EventKind::Callback,
            Incoming::InlineQuery(_) => EventKind::InlineQuery,
            Incoming::Unknown(_) => EventKind::Other,
        }
    }

    /// Returns the id of the user that produced this event, when known.
    pub fn sender_id(&self) -> Option<i64> {
        match self {
            Incoming::Message(m) => Some(m.from.id),
            Incoming::Callback(c) => Some(c.from.id),
            Incoming::InlineQuery(q) => Some(q.from.id),
            Incoming::Unknown(_) => None,
        }
    }

    /// Returns the chat this event belongs to, used as the session key.
    ///
    /// Callbacks fall back to the sender id when the originating message is
    /// no longer attached; inline queries are always keyed by sender.
    pub fn chat_id(&self) -> Option<i64> {
        match self {
            Incoming::Message(m) => Some(m.chat_id),
            Incoming::Callback(c) => Some(c.message.as_ref().map_or(c.from.id, |m| m.chat_id)),
            Incoming::InlineQuery(q) => Some(q.from.id),
            Incoming::Unknown(_) => None,
        }
    }

    /// Returns the textual content filters match against: message text,
    /// callback data or query text.
    pub fn text(&self) -> &str {
        match self {
            Incoming::Message(m) => &m.text,
            Incoming::Callback(c) => &c.data,
            Incoming::InlineQuery(q) => &q.query,
            Incoming::Unknown(_) => "",
        }
    }

    /// Returns the named binding candidates this variant contributes.
    ///
    /// The binding engine only consumes candidates whose name appears in the
    /// target handler's declared parameter list; the rest are discarded.
    pub fn binding_candidates(&self) -> Vec<(&'static str, AnyValue)> {
        match self {
            Incoming::Message(m) => {
                let value: AnyValue = Arc::clone(m) as AnyValue;
                vec![("message", Arc::clone(&value)), ("msg", value)]
            }
            Incoming::Callback(c) => {
                let value: AnyValue = Arc::clone(c) as AnyValue;
                vec![
                    ("callback", Arc::clone(&value)),
                    ("callback_query", Arc::clone(&value)),
                    ("query", value),
                ]
            }
            Incoming::InlineQuery(q) => {
                let value: AnyValue = Arc::clone(q) as AnyValue;
                vec![("inline_query", Arc::clone(&value)), ("query", value)]
            }
            Incoming::Unknown(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(chat_id: i64, text: &str) -> Incoming {
        Incoming::message(MessageEvent {
            message_id: 1,
            chat_id,
            from: UserRef {
                id: 10,
                username: None,
                first_name: "Tester".into(),
            },
            text: text.into(),
        })
    }

    #[test]
    fn test_message_candidates() {
        let event = message(7, "hi");
        let candidates = event.binding_candidates();
        let names: Vec<_> = candidates.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["message", "msg"]);

        let (_, value) = &candidates[0];
        let payload = Arc::clone(value).downcast::<MessageEvent>().unwrap();
        assert_eq!(payload.text, "hi");
    }

    #[test]
    fn test_callback_candidates_and_chat_fallback() {
        let event = Incoming::callback(CallbackEvent {
            id: "cb1".into(),
            from: UserRef {
                id: 42,
                username: None,
                first_name: String::new(),
            },
            data: "confirm".into(),
            message: None,
        });

        let names: Vec<_> = event
            .binding_candidates()
            .iter()
            .map(|(n, _)| *n)
            .collect();
        assert_eq!(names, vec!["callback", "callback_query", "query"]);
        assert_eq!(event.chat_id(), Some(42));
        assert_eq!(event.text(), "confirm");
    }

    #[test]
    fn test_unknown_contributes_nothing() {
        let event = Incoming::unknown(UnknownEvent {
            update_type: "poll_answer".into(),
            raw: serde_json::json!({"poll_id": "p1"}),
        });
        assert_eq!(event.kind(), EventKind::Other);
        assert!(event.binding_candidates().is_empty());
        assert_eq!(event.chat_id(), None);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(EventKind::InlineQuery.to_string(), "inline_query");
    }
}
