use crate::binding::SharedEvent;
use crate::config::{BusConfig, DispatchMode};
use crate::dispatcher::{Dispatcher, FailureHook, InlineDispatcher, PooledDispatcher};
use crate::error::{EventBusError, EventBusErrorExt};
use crate::registry::ObserverRegistry;
use crate::subscriber::{Event, Subscriber, SubscriberId};
use courier_runtime::{Executor, WorkerPool};
use private::Sealed;
use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, trace, warn};

pub(crate) const DEFAULT_BUS_NAME: &str = "event-bus";

/// A thread-safe, type-indexed publish/subscribe bus.
///
/// Events are matched to handlers by their exact Rust type. Delivery is either
/// inline (handlers run on the posting thread before [`EventBus::post`]
/// returns) or pooled (handlers run on an [`Executor`] and `post` returns
/// immediately). A failing or panicking handler is logged and reported to
/// the failure hook; it never reaches the poster and never stops delivery to
/// the other handlers.
///
/// Clones share the registry and the dispatcher.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    name: Cow<'static, str>,
    registry: ObserverRegistry,
    dispatcher: Box<dyn Dispatcher>,
    closed: AtomicBool,
}

impl EventBus {
    /// Starts a [`EventBusBuilder`]; pick a dispatcher before building.
    #[must_use = "Select a dispatcher and call build()"]
    pub fn builder() -> EventBusBuilder<NoDispatcher> {
        EventBusBuilder::new()
    }

    /// A bus that runs every handler on the posting thread.
    ///
    /// # Examples
    /// ```rust
    /// use courier_event_bus::EventBus;
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicU32, Ordering};
    ///
    /// struct Tick(u32);
    ///
    /// # fn main() -> Result<(), courier_event_bus::EventBusError> {
    /// let bus = EventBus::sync();
    /// let total = Arc::new(AtomicU32::new(0));
    ///
    /// let sink = Arc::clone(&total);
    /// bus.subscribe_fn("ticker", move |tick: &Tick| {
    ///     sink.fetch_add(tick.0, Ordering::SeqCst);
    ///     Ok(())
    /// })?;
    ///
    /// assert_eq!(bus.post(Tick(3)), 1);
    /// assert_eq!(total.load(Ordering::SeqCst), 3);
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn sync() -> Self {
        Self::builder().inline().build()
    }

    /// A bus that hands every invocation to `executor`.
    #[must_use]
    pub fn with_executor(executor: Arc<dyn Executor>) -> Self {
        Self::builder().pooled(executor).build()
    }

    /// Builds a bus from configuration. A pooled bus owns a fresh
    /// [`WorkerPool`] that is shut down with the bus.
    ///
    /// # Errors
    /// Returns [`EventBusError::Executor`] if the worker threads cannot be
    /// spawned.
    pub fn from_config(config: &BusConfig) -> Result<Self, EventBusError> {
        Self::builder().configured(config).map(EventBusBuilder::build)
    }

    /// Registers every handler `subscriber` declares.
    ///
    /// The bus keeps only a weak reference: the caller owns the subscriber.
    /// Registering the same instance twice is additive, each handler then runs
    /// twice per event.
    ///
    /// # Errors
    /// - [`EventBusError::NoHandlerFound`] if `S` declares no handler.
    /// - [`EventBusError::Closed`] after [`EventBus::shutdown`].
    pub fn register<S: Subscriber>(&self, subscriber: &Arc<S>) -> Result<SubscriberId, EventBusError> {
        self.ensure_open(subscriber.name())?;
        let (id, _) = self
            .inner
            .registry
            .register(subscriber)
            .context(format!("registering on bus '{}'", self.inner.name))?;
        Ok(id)
    }

    /// Registers a single closure for events of type `E`.
    ///
    /// # Errors
    /// Returns [`EventBusError::Closed`] after [`EventBus::shutdown`].
    pub fn subscribe_fn<E, F>(&self, name: &'static str, handler: F) -> Result<SubscriberId, EventBusError>
    where
        E: Event,
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.ensure_open(name)?;
        Ok(self.inner.registry.insert_fn(name, handler))
    }

    /// Removes every binding of the registration `id` and returns how many
    /// were removed. Unknown ids remove nothing.
    ///
    /// A pooled invocation already submitted still runs.
    pub fn unregister(&self, id: SubscriberId) -> usize {
        self.inner.registry.unregister(id)
    }

    /// Delivers `event` to every handler registered for exactly `E`.
    ///
    /// Returns the number of handlers whose invocation was started. For an
    /// inline bus every one of them has finished when this returns.
    pub fn post<E: Event>(&self, event: E) -> usize {
        self.post_arc(Arc::new(event))
    }

    /// Like [`EventBus::post`] for an event that is already shared. The event
    /// type is `E`, not `Arc<E>`.
    pub fn post_arc<E: Event>(&self, event: Arc<E>) -> usize {
        let event_name = std::any::type_name::<E>();
        if self.inner.closed.load(Ordering::Acquire) {
            trace!(bus = %self.inner.name, event = event_name, "Post ignored: bus closed");
            return 0;
        }

        let bindings = self.inner.registry.bindings_for(TypeId::of::<E>());
        if bindings.is_empty() {
            trace!(bus = %self.inner.name, event = event_name, "No subscribers");
            return 0;
        }

        let event: SharedEvent = event;
        let mut dispatched = 0;
        for binding in bindings.iter() {
            match self.inner.dispatcher.dispatch(Arc::clone(binding), Arc::clone(&event)) {
                Ok(()) => dispatched += 1,
                Err(err) => warn!(
                    bus = %self.inner.name,
                    event = event_name,
                    subscriber = binding.subscriber_name(),
                    error = %err,
                    "Event not dispatched"
                ),
            }
        }

        trace!(bus = %self.inner.name, event = event_name, bindings = bindings.len(), dispatched, "Event posted");
        dispatched
    }

    /// Total number of handler bindings.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.inner.registry.len()
    }

    #[must_use]
    pub fn has_subscribers<E: Event>(&self) -> bool {
        !self.inner.registry.bindings_for(TypeId::of::<E>()).is_empty()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Drops every binding and shuts the dispatcher down.
    ///
    /// A pooled bus stops accepting tasks and waits for the ones already
    /// queued. Later posts reach nobody and registration fails with
    /// [`EventBusError::Closed`]. Returns the number of removed bindings;
    /// calling it again returns `0`.
    pub fn shutdown(&self) -> usize {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }

        let removed = self.inner.registry.clear();
        self.inner.dispatcher.shutdown();
        info!(bus = %self.inner.name, bindings = removed, "Event bus shut down");
        removed
    }

    fn ensure_open(&self, subscriber: &str) -> Result<(), EventBusError> {
        if self.is_closed() {
            debug!(bus = %self.inner.name, subscriber, "Registration refused: bus closed");
            return Err(EventBusError::Closed {
                message: format!("cannot register {subscriber}").into(),
                context: Some(format!("bus '{}'", self.inner.name).into()),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("name", &self.inner.name)
            .field("dispatcher", &self.inner.dispatcher)
            .field("bindings", &self.inner.registry.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct NoDispatcher;

/// Dispatcher selected through [`EventBusBuilder::inline`] or
/// [`EventBusBuilder::pooled`].
#[derive(Debug)]
pub enum WithDispatcher {
    Inline,
    Pooled(Arc<dyn Executor>),
}

mod private {
    pub(super) trait Sealed {}
}
impl Sealed for NoDispatcher {}
impl Sealed for WithDispatcher {}

/// Typestate builder of an [`EventBus`]; `build` exists only once a
/// dispatcher is chosen.
///
/// ```rust
/// use courier_event_bus::{EventBus, HandlerInvocationError};
/// use std::sync::Arc;
///
/// let bus = EventBus::builder()
///     .name("audit")
///     .on_failure(Arc::new(|err: &HandlerInvocationError| eprintln!("handler failed: {err}")))
///     .inline()
///     .build();
/// assert_eq!(bus.name(), "audit");
/// ```
#[allow(private_bounds)]
pub struct EventBusBuilder<S: Sealed = NoDispatcher> {
    state: S,
    name: Cow<'static, str>,
    hook: Option<FailureHook>,
}

#[allow(private_bounds)]
impl<S: Sealed> EventBusBuilder<S> {
    #[must_use = "Names the bus in log output"]
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Installs an observer for contained handler failures.
    #[must_use = "Installs a failure hook"]
    pub fn on_failure(mut self, hook: FailureHook) -> Self {
        self.hook = Some(hook);
        self
    }

    fn transition<N: Sealed>(self, state: N) -> EventBusBuilder<N> {
        EventBusBuilder { state, name: self.name, hook: self.hook }
    }
}

impl EventBusBuilder<NoDispatcher> {
    fn new() -> Self {
        Self { state: NoDispatcher, name: Cow::Borrowed(DEFAULT_BUS_NAME), hook: None }
    }

    #[must_use = "Selects inline delivery on the posting thread"]
    pub fn inline(self) -> EventBusBuilder<WithDispatcher> {
        self.transition(WithDispatcher::Inline)
    }

    #[must_use = "Selects delivery through an executor"]
    pub fn pooled(self, executor: Arc<dyn Executor>) -> EventBusBuilder<WithDispatcher> {
        self.transition(WithDispatcher::Pooled(executor))
    }

    /// Takes the name and the dispatcher from `config`. A pooled
    /// configuration starts its own [`WorkerPool`].
    ///
    /// # Errors
    /// Returns [`EventBusError::Executor`] if the worker threads cannot be
    /// spawned.
    pub fn configured(self, config: &BusConfig) -> Result<EventBusBuilder<WithDispatcher>, EventBusError> {
        let builder = self.name(config.name.clone());
        match config.mode {
            DispatchMode::Inline => Ok(builder.inline()),
            DispatchMode::Pooled => {
                let pool = WorkerPool::new(&config.pool)
                    .context(format!("starting worker pool of bus '{}'", config.name))?;
                Ok(builder.pooled(Arc::new(pool)))
            },
        }
    }
}

impl EventBusBuilder<WithDispatcher> {
    #[must_use]
    pub fn build(self) -> EventBus {
        let dispatcher: Box<dyn Dispatcher> = match (self.state, self.hook) {
            (WithDispatcher::Inline, None) => Box::new(InlineDispatcher::new()),
            (WithDispatcher::Inline, Some(hook)) => Box::new(InlineDispatcher::with_failure_hook(hook)),
            (WithDispatcher::Pooled(executor), None) => Box::new(PooledDispatcher::new(executor)),
            (WithDispatcher::Pooled(executor), Some(hook)) => {
                Box::new(PooledDispatcher::with_failure_hook(executor, hook))
            },
        };

        debug!(bus = %self.name, dispatcher = ?dispatcher, "Event bus created");
        EventBus {
            inner: Arc::new(BusInner {
                name: self.name,
                registry: ObserverRegistry::new(),
                dispatcher,
                closed: AtomicBool::new(false),
            }),
        }
    }
}

#[allow(private_bounds)]
impl<S: Sealed + fmt::Debug> fmt::Debug for EventBusBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBusBuilder")
            .field("state", &self.state)
            .field("name", &self.name)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}
