//! Domain events and the handler contract (spec §4.6).

use std::any::type_name;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EventError;

/// Identifies one publishable event shape. For a plain event type this is
/// just the type name; for a member of a sealed hierarchy it also encodes
/// the concrete variant tag, so a handler registered against the hierarchy
/// root still only fires for the exact variant it was entered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey(Arc<str>);

impl EventKey {
    pub fn of<E: 'static>() -> Self {
        Self(type_name::<E>().into())
    }

    pub fn sealed_member<E: 'static>(tag: &str) -> Self {
        Self(format!("{}::{}", type_name::<E>(), tag).into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tagged union of concrete event variants. Rust enums are closed at
/// compile time, so "the bus expands a sealed-hierarchy root to its
/// concrete descendants at registration time" becomes: the bus enters the
/// handler under every tag the enum declares, and dispatch only ever
/// matches the exact tag of the published instance (spec §9 "Sealed
/// hierarchies for events").
pub trait SealedEvent: Send + Sync + 'static {
    /// Every discriminant this hierarchy can produce.
    fn variant_tags() -> &'static [&'static str];

    /// The discriminant of this particular instance.
    fn tag(&self) -> &'static str;
}

/// Handles one concrete event type. Handler failures are isolated by the
/// bus: they are logged and do not cancel sibling handlers or the publish
/// call itself (spec §4.6).
#[async_trait]
pub trait EventHandler<E: Send + Sync + 'static>: Send + Sync {
    async fn handle(&self, event: Arc<E>) -> Result<(), EventError>;
}

/// External message-broker bridge, invoked before local dispatch. Bridge
/// failures are logged and never block local handlers (spec §4.6).
#[async_trait]
pub trait EventMessagingPublisher: Send + Sync {
    async fn publish(&self, key: &EventKey, event: Arc<dyn std::any::Any + Send + Sync>) -> Result<(), EventError>;
}
