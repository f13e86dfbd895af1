//! Per-type handler registry and fanout dispatch (spec §4.6).

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{error, warn};

use crate::error::EventError;
use crate::event::{EventHandler, EventKey, EventMessagingPublisher, SealedEvent};

type ErasedEvent = Arc<dyn Any + Send + Sync>;
type BoxedHandler = Arc<dyn Fn(ErasedEvent) -> BoxFuture<'static, Result<(), EventError>> + Send + Sync>;

fn wrap<E, H>(handler: Arc<H>) -> BoxedHandler
where
    E: Send + Sync + 'static,
    H: EventHandler<E> + 'static,
{
    Arc::new(move |event: ErasedEvent| {
        let handler = handler.clone();
        Box::pin(async move {
            let event = event
                .downcast::<E>()
                .map_err(|_| EventError::Routing(std::any::type_name::<E>().to_string()))?;
            handler.handle(event).await
        })
    })
}

/// Insertion-ordered, mutation-safe handler registry keyed by event type
/// (spec §4.6 "stored per key in an insertion-ordered, mutation-safe
/// collection").
#[derive(Default)]
pub struct EventBus {
    handlers: DashMap<EventKey, Vec<BoxedHandler>>,
    bridge: RwLock<Option<Arc<dyn EventMessagingPublisher>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_bridge(&self, bridge: Arc<dyn EventMessagingPublisher>) {
        *self.bridge.write() = Some(bridge);
    }

    /// Registers a handler for a plain (non-sealed) event type.
    pub fn register<E, H>(&self, handler: Arc<H>)
    where
        E: Send + Sync + 'static,
        H: EventHandler<E> + 'static,
    {
        self.handlers.entry(EventKey::of::<E>()).or_default().push(wrap(handler));
    }

    /// Registers a handler against every concrete member of a sealed
    /// hierarchy, so publishing any single variant reaches it.
    pub fn register_sealed<E, H>(&self, handler: Arc<H>)
    where
        E: SealedEvent,
        H: EventHandler<E> + 'static,
    {
        let wrapped = wrap(handler);
        for tag in E::variant_tags() {
            self.handlers
                .entry(EventKey::sealed_member::<E>(tag))
                .or_default()
                .push(wrapped.clone());
        }
    }

    /// Publishes a plain event, dispatching to handlers immediately.
    pub async fn publish<E>(&self, event: E) -> Result<(), EventError>
    where
        E: Send + Sync + 'static,
    {
        let key = EventKey::of::<E>();
        self.dispatch(&key, Arc::new(event)).await
    }

    /// Publishes one member of a sealed hierarchy.
    pub async fn publish_sealed<E>(&self, event: E) -> Result<(), EventError>
    where
        E: SealedEvent,
    {
        let key = EventKey::sealed_member::<E>(event.tag());
        self.dispatch(&key, Arc::new(event)).await
    }

    /// Dispatches an already type-erased event by key. Used directly by the
    /// transaction manager when it drains the pending-events queue at
    /// `AfterCommit`, since by then the concrete type has already been
    /// erased into the queue.
    pub async fn dispatch(&self, key: &EventKey, event: ErasedEvent) -> Result<(), EventError> {
        if let Some(bridge) = self.bridge.read().clone() {
            if let Err(err) = bridge.publish(key, event.clone()).await {
                warn!(event = %key, error = %err, "event bridge publish failed, continuing with local dispatch");
            }
        }

        let handlers = match self.handlers.get(key) {
            Some(entry) => entry.clone(),
            None => return Ok(()),
        };

        // Handler invocation is started in registration order; each runs as
        // its own supervised task so one handler's panic or failure cannot
        // cancel its siblings (spec §4.6, §5 "supervisor isolation").
        let tasks: Vec<_> = handlers
            .into_iter()
            .map(|handler| {
                let event = event.clone();
                tokio::spawn(async move { handler(event).await })
            })
            .collect();

        for task in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(event = %key, error = %err, "event handler failed"),
                Err(join_err) => error!(event = %key, error = %join_err, "event handler panicked"),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct UserCreated {
        email: String,
    }

    struct RecordingHandler {
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl EventHandler<UserCreated> for RecordingHandler {
        async fn handle(&self, event: Arc<UserCreated>) -> Result<(), EventError> {
            self.calls.lock().unwrap().push(event.email.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn publish_reaches_registered_handler() {
        let bus = EventBus::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        bus.register(Arc::new(RecordingHandler { calls: calls.clone() }));

        bus.publish(UserCreated { email: "u@x".into() }).await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["u@x".to_string()]);
    }

    struct FailingHandler;
    #[async_trait::async_trait]
    impl EventHandler<UserCreated> for FailingHandler {
        async fn handle(&self, _event: Arc<UserCreated>) -> Result<(), EventError> {
            Err(EventError::Handler("boom".into()))
        }
    }

    #[tokio::test]
    async fn one_handler_failure_does_not_stop_siblings() {
        let bus = EventBus::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        bus.register(Arc::new(FailingHandler));
        bus.register(Arc::new(RecordingHandler { calls: calls.clone() }));

        bus.publish(UserCreated { email: "u@x".into() }).await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["u@x".to_string()]);
    }

    #[tokio::test]
    async fn publish_with_no_handlers_is_a_no_op() {
        let bus = EventBus::new();
        bus.publish(UserCreated { email: "u@x".into() }).await.unwrap();
    }

    enum CatalogEvent {
        Created,
        Removed,
    }
    impl SealedEvent for CatalogEvent {
        fn variant_tags() -> &'static [&'static str] {
            &["Created", "Removed"]
        }
        fn tag(&self) -> &'static str {
            match self {
                CatalogEvent::Created => "Created",
                CatalogEvent::Removed => "Removed",
            }
        }
    }

    struct CatalogCounter {
        count: Arc<AtomicUsize>,
    }
    #[async_trait::async_trait]
    impl EventHandler<CatalogEvent> for CatalogCounter {
        async fn handle(&self, _event: Arc<CatalogEvent>) -> Result<(), EventError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn sealed_registration_reaches_every_published_variant() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.register_sealed(Arc::new(CatalogCounter { count: count.clone() }));

        bus.publish_sealed(CatalogEvent::Created).await.unwrap();
        bus.publish_sealed(CatalogEvent::Removed).await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
