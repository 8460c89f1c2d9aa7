use crate::binding::{EventKey, HandlerBinding};
use crate::error::EventBusError;
use crate::subscriber::{Event, Subscriber, SubscriberId, Subscriptions};
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::any::TypeId;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Immutable, ordered snapshot of the bindings for one event type.
pub type BindingList = Arc<[Arc<HandlerBinding>]>;

fn empty_list() -> BindingList {
    Arc::from(Vec::new())
}

/// Index of handler bindings by exact event type.
///
/// Every per-type list is replaced copy-on-write under the write lock, so a
/// reader holding a [`BindingList`] never observes a partial update. A
/// subscriber's bindings for all of its event types become visible at once.
#[derive(Debug, Default)]
pub struct ObserverRegistry {
    bindings: RwLock<FxHashMap<TypeId, BindingList>>,
    next_id: AtomicU64,
}

impl ObserverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds every handler `S` declares to this subscriber instance.
    ///
    /// Returns the registration id and the number of bindings added.
    ///
    /// # Errors
    /// Returns [`EventBusError::NoHandlerFound`] if `S` declares no handler;
    /// nothing is added in that case.
    pub fn register<S: Subscriber>(
        &self,
        subscriber: &Arc<S>,
    ) -> Result<(SubscriberId, usize), EventBusError> {
        let mut subscriptions = Subscriptions::new();
        S::subscriptions(&mut subscriptions);
        let name = subscriber.name();

        if subscriptions.is_empty() {
            return Err(EventBusError::NoHandlerFound {
                message: format!("{name} declares no event handlers").into(),
                context: None,
            });
        }

        let id = self.next_id();
        let target = Arc::downgrade(subscriber);
        let bindings: Vec<_> = subscriptions
            .into_declared()
            .into_iter()
            .map(|declared| {
                Arc::new(HandlerBinding::for_subscriber(id, name, target.clone(), declared))
            })
            .collect();
        let added = bindings.len();

        self.insert(bindings);
        debug!(subscriber = name, %id, bindings = added, "Subscriber registered");
        Ok((id, added))
    }

    /// Binds a single closure to events of type `E`.
    ///
    /// The binding owns the closure; it lives until unregistered.
    pub fn insert_fn<E, F>(&self, name: &'static str, handler: F) -> SubscriberId
    where
        E: Event,
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.insert(vec![Arc::new(HandlerBinding::for_fn::<E, F>(id, name, handler))]);
        debug!(subscriber = name, %id, event = EventKey::of::<E>().name(), "Handler registered");
        id
    }

    /// Snapshot of the bindings for exactly `event_type`, in registration order.
    ///
    /// Empty when nothing matches.
    #[must_use]
    pub fn bindings_for(&self, event_type: TypeId) -> BindingList {
        self.bindings.read().get(&event_type).cloned().unwrap_or_else(empty_list)
    }

    /// Removes every binding created by the registration `id`.
    ///
    /// Returns the number of removed bindings; `0` for an unknown id.
    pub fn unregister(&self, id: SubscriberId) -> usize {
        let mut removed = 0;
        {
            let mut bindings = self.bindings.write();
            bindings.retain(|_, list| {
                if list.iter().any(|b| b.subscriber() == id) {
                    let kept: Vec<_> =
                        list.iter().filter(|b| b.subscriber() != id).cloned().collect();
                    removed += list.len() - kept.len();
                    *list = Arc::from(kept);
                }
                !list.is_empty()
            });
        }

        if removed > 0 {
            debug!(%id, bindings = removed, "Subscriber unregistered");
        } else {
            trace!(%id, "Unregister ignored: unknown subscriber");
        }
        removed
    }

    /// Removes every binding and returns how many there were.
    pub fn clear(&self) -> usize {
        let mut bindings = self.bindings.write();
        let count = bindings.values().map(|list| list.len()).sum();
        bindings.clear();
        count
    }

    /// Total number of bindings across all event types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.read().values().map(|list| list.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }

    /// Number of distinct event types with at least one binding.
    #[must_use]
    pub fn event_types(&self) -> usize {
        self.bindings.read().len()
    }

    fn next_id(&self) -> SubscriberId {
        SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn insert(&self, added: Vec<Arc<HandlerBinding>>) {
        let mut grouped: FxHashMap<TypeId, Vec<Arc<HandlerBinding>>> = FxHashMap::default();
        for binding in added {
            grouped.entry(binding.event().id()).or_default().push(binding);
        }

        let mut bindings = self.bindings.write();
        for (event_type, added) in grouped {
            let list = bindings.entry(event_type).or_insert_with(empty_list);
            let merged: Vec<_> = list.iter().cloned().chain(added).collect();
            *list = Arc::from(merged);
        }
    }
}
