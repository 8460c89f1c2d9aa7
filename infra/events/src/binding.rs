use crate::error::{HandlerFailure, HandlerInvocationError};
use crate::subscriber::{Declared, Event, Subscriber, SubscriberId};
use courier_runtime::panic_message;
use std::any::{Any, TypeId};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

/// A posted event, type-erased and shared by every binding it is delivered to.
pub type SharedEvent = Arc<dyn Any + Send + Sync>;

/// `None` means the subscriber behind the binding no longer exists.
type Invoker = Box<dyn Fn(&(dyn Any + Send + Sync)) -> Option<anyhow::Result<()>> + Send + Sync>;

/// Exact runtime type of an event, used as the registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    id: TypeId,
    name: &'static str,
}

impl EventKey {
    #[must_use]
    pub fn of<E: Event>() -> Self {
        Self { id: TypeId::of::<E>(), name: std::any::type_name::<E>() }
    }

    #[must_use]
    pub const fn id(&self) -> TypeId {
        self.id
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// What happened when a binding was invoked without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The handler ran and returned `Ok`.
    Handled,
    /// Every strong reference to the subscriber was dropped; nothing ran.
    SubscriberGone,
}

/// One handler of one subscriber, bound to one event type.
///
/// Created at registration and immutable afterwards. Bindings of
/// [`Subscriber`] instances hold a weak reference: the caller owns the
/// subscriber, and a binding whose subscriber is gone is skipped until it is
/// unregistered.
pub struct HandlerBinding {
    subscriber: SubscriberId,
    subscriber_name: &'static str,
    event: EventKey,
    invoker: Invoker,
}

impl HandlerBinding {
    pub(crate) fn for_subscriber<S: Subscriber>(
        subscriber: SubscriberId,
        subscriber_name: &'static str,
        target: Weak<S>,
        declared: Declared<S>,
    ) -> Self {
        let Declared { key, method } = declared;
        Self {
            subscriber,
            subscriber_name,
            event: key,
            invoker: Box::new(move |event: &(dyn Any + Send + Sync)| {
                target.upgrade().map(|target| method(&*target, event))
            }),
        }
    }

    pub(crate) fn for_fn<E, F>(subscriber: SubscriberId, subscriber_name: &'static str, handler: F) -> Self
    where
        E: Event,
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let key = EventKey::of::<E>();
        Self {
            subscriber,
            subscriber_name,
            event: key,
            invoker: Box::new(move |event: &(dyn Any + Send + Sync)| {
                Some(event.downcast_ref::<E>().map_or_else(
                    || Err(anyhow::anyhow!("binding for {} received another event type", key.name())),
                    |event| handler(event),
                ))
            }),
        }
    }

    /// Runs the handler against `event`, converting an `Err` or a panic into
    /// a [`HandlerInvocationError`].
    ///
    /// # Errors
    /// Returns the contained failure of the handler; the caller decides how to
    /// report it.
    pub fn invoke(&self, event: &(dyn Any + Send + Sync)) -> Result<Delivery, HandlerInvocationError> {
        match catch_unwind(AssertUnwindSafe(|| (self.invoker)(event))) {
            Ok(Some(Ok(()))) => Ok(Delivery::Handled),
            Ok(None) => Ok(Delivery::SubscriberGone),
            Ok(Some(Err(err))) => Err(self.failure(HandlerFailure::Error(err))),
            Err(panic) => Err(self.failure(HandlerFailure::Panicked(panic_message(&*panic)))),
        }
    }

    fn failure(&self, failure: HandlerFailure) -> HandlerInvocationError {
        HandlerInvocationError { subscriber: self.subscriber_name, event: self.event.name(), failure }
    }

    #[must_use]
    pub const fn subscriber(&self) -> SubscriberId {
        self.subscriber
    }

    #[must_use]
    pub const fn subscriber_name(&self) -> &'static str {
        self.subscriber_name
    }

    #[must_use]
    pub const fn event(&self) -> EventKey {
        self.event
    }
}

impl fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("subscriber", &self.subscriber)
            .field("subscriber_name", &self.subscriber_name)
            .field("event", &self.event.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::Subscriptions;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Ping;
    struct Pong;

    #[derive(Default)]
    struct Counter {
        hits: AtomicUsize,
    }

    impl Counter {
        fn on_ping(&self, _: &Ping) -> anyhow::Result<()> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Subscriber for Counter {
        fn subscriptions(subscriptions: &mut Subscriptions<Self>) {
            subscriptions.with(Self::on_ping);
        }
    }

    fn bind(counter: &Arc<Counter>) -> HandlerBinding {
        let mut subscriptions = Subscriptions::new();
        Counter::subscriptions(&mut subscriptions);
        let declared = subscriptions.into_declared().pop().expect("one handler");
        HandlerBinding::for_subscriber(SubscriberId(1), "counter", Arc::downgrade(counter), declared)
    }

    #[test]
    fn test_invoke_reaches_live_subscriber() {
        let counter = Arc::new(Counter::default());
        let binding = bind(&counter);

        assert_eq!(binding.event(), EventKey::of::<Ping>());
        assert_eq!(binding.invoke(&Ping).expect("handled"), Delivery::Handled);
        assert_eq!(counter.hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invoke_skips_dropped_subscriber() {
        let counter = Arc::new(Counter::default());
        let binding = bind(&counter);
        drop(counter);

        assert_eq!(binding.invoke(&Ping).expect("no failure"), Delivery::SubscriberGone);
    }

    #[test]
    fn test_invoke_rejects_foreign_event_type() {
        let counter = Arc::new(Counter::default());
        let binding = bind(&counter);

        let err = binding.invoke(&Pong).expect_err("wrong type");
        assert!(!err.is_panic());
        assert_eq!(counter.hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invoke_contains_panics() {
        let binding = HandlerBinding::for_fn::<Ping, _>(SubscriberId(2), "exploder", |_| {
            panic!("handler exploded")
        });

        let err = binding.invoke(&Ping).expect_err("panic contained");
        assert!(err.is_panic());
        assert_eq!(err.subscriber, "exploder");
        assert!(err.to_string().contains("handler exploded"));
    }

    #[test]
    fn test_event_key_is_exact() {
        assert_ne!(EventKey::of::<Ping>(), EventKey::of::<Pong>());
        assert_ne!(EventKey::of::<Ping>(), EventKey::of::<Arc<Ping>>());
        assert_eq!(EventKey::of::<Ping>().id(), TypeId::of::<Ping>());
    }
}
