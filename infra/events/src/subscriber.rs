use crate::binding::EventKey;
use std::any::Any;
use std::fmt;

/// Marker trait for types that can be posted on the [`crate::EventBus`].
///
/// Any type that is `Send + Sync + 'static` automatically implements this trait.
/// The event type is the concrete Rust type: posting an `Arc<T>` through
/// [`crate::EventBus::post`] is an event of type `Arc<T>`, not `T`.
pub trait Event: Any + Send + Sync + 'static {}
impl<T: Any + Send + Sync + 'static> Event for T {}

/// Typed handler capability: the implementor receives events of type `E`.
///
/// Declared handlers are listed in [`Subscriber::subscriptions`] with
/// [`Subscriptions::on`].
pub trait Handles<E: Event>: Send + Sync + 'static {
    /// Handles one event.
    ///
    /// # Errors
    /// An error is logged and reported to the bus failure hook; it never
    /// reaches the poster and never stops delivery to other handlers.
    fn handle(&self, event: &E) -> anyhow::Result<()>;
}

/// An object exposing one or more event handlers.
///
/// The bus does not introspect subscribers: each type lists its handlers
/// once, and every registered instance gets one binding per listed handler.
///
/// # Example
/// ```rust
/// use courier_event_bus::{Handles, Subscriber, Subscriptions};
///
/// struct OrderPlaced(u64);
/// struct OrderShipped(u64);
///
/// struct Warehouse;
///
/// impl Handles<OrderPlaced> for Warehouse {
///     fn handle(&self, _event: &OrderPlaced) -> anyhow::Result<()> {
///         Ok(())
///     }
/// }
///
/// impl Warehouse {
///     fn on_shipped(&self, _event: &OrderShipped) -> anyhow::Result<()> {
///         Ok(())
///     }
/// }
///
/// impl Subscriber for Warehouse {
///     fn subscriptions(subscriptions: &mut Subscriptions<Self>) {
///         subscriptions.on::<OrderPlaced>().with(Self::on_shipped);
///     }
/// }
/// ```
pub trait Subscriber: Send + Sync + Sized + 'static {
    /// Lists the handlers of this subscriber type.
    fn subscriptions(subscriptions: &mut Subscriptions<Self>);

    /// Name used in logs and handler failure reports.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

pub(crate) type Method<S> =
    Box<dyn Fn(&S, &(dyn Any + Send + Sync)) -> anyhow::Result<()> + Send + Sync>;

pub(crate) struct Declared<S> {
    pub(crate) key: EventKey,
    pub(crate) method: Method<S>,
}

/// The handler list of one subscriber type, filled by [`Subscriber::subscriptions`].
pub struct Subscriptions<S> {
    declared: Vec<Declared<S>>,
}

impl<S: Subscriber> Subscriptions<S> {
    pub(crate) const fn new() -> Self {
        Self { declared: Vec::new() }
    }

    /// Declares the [`Handles<E>`] implementation of `S` as a handler.
    pub fn on<E: Event>(&mut self) -> &mut Self
    where
        S: Handles<E>,
    {
        self.with::<E, _>(<S as Handles<E>>::handle)
    }

    /// Declares an arbitrary method or closure of `S` as a handler for `E`.
    ///
    /// Declaring several handlers for the same event type is allowed; they
    /// run in declaration order.
    pub fn with<E, F>(&mut self, handler: F) -> &mut Self
    where
        E: Event,
        F: Fn(&S, &E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let key = EventKey::of::<E>();
        self.declared.push(Declared {
            key,
            method: Box::new(move |subscriber: &S, event: &(dyn Any + Send + Sync)| {
                event.downcast_ref::<E>().map_or_else(
                    || Err(anyhow::anyhow!("binding for {} received another event type", key.name())),
                    |event| handler(subscriber, event),
                )
            }),
        });
        self
    }

    /// Number of declared handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.declared.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }

    pub(crate) fn into_declared(self) -> Vec<Declared<S>> {
        self.declared
    }
}

impl<S> fmt::Debug for Subscriptions<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.declared.iter().map(|d| d.key.name())).finish()
    }
}

/// Identity token of one registration.
///
/// Returned by [`crate::EventBus::register`] and
/// [`crate::EventBus::subscribe_fn`]; the only way to remove the bindings
/// again is [`crate::EventBus::unregister`]. Registering the same subscriber
/// twice yields two distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

impl SubscriberId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber#{}", self.0)
    }
}
