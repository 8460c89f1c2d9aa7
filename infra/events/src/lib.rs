//! # Event Bus
//!
//! An in-process, type-indexed publish/subscribe bus.
//!
//! ## Overview
//!
//! Subscribers declare their handlers once through [`Subscriber::subscriptions`];
//! registration binds each handler to the exact Rust type of the events it
//! accepts. [`EventBus::post`] looks up the bindings of the posted type and
//! hands each of them to a [`Dispatcher`]:
//!
//! * [`InlineDispatcher`] runs handlers on the posting thread, in registration
//!   order, before `post` returns.
//! * [`PooledDispatcher`] submits each invocation to an
//!   [`courier_runtime::Executor`] and returns immediately.
//!
//! A handler that returns `Err` or panics is logged and reported to the
//! optional failure hook. It never reaches the poster and never stops the
//! other handlers of the same event.
//!
//! The bus holds weak references to subscribers. Bindings stay registered
//! until [`EventBus::unregister`] or [`EventBus::shutdown`]; a binding whose
//! subscriber was dropped is skipped.
//!
//! # Example
//!
//! ```rust
//! use courier_event_bus::{EventBus, EventBusError, Handles, Subscriber, Subscriptions};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! struct OrderCreated { total_cents: u64 }
//!
//! #[derive(Default)]
//! struct Revenue { cents: AtomicU64 }
//!
//! impl Handles<OrderCreated> for Revenue {
//!     fn handle(&self, event: &OrderCreated) -> anyhow::Result<()> {
//!         self.cents.fetch_add(event.total_cents, Ordering::SeqCst);
//!         Ok(())
//!     }
//! }
//!
//! impl Subscriber for Revenue {
//!     fn subscriptions(subscriptions: &mut Subscriptions<Self>) {
//!         subscriptions.on::<OrderCreated>();
//!     }
//! }
//!
//! fn main() -> Result<(), EventBusError> {
//!     let bus = EventBus::sync();
//!     let revenue = Arc::new(Revenue::default());
//!     let id = bus.register(&revenue)?;
//!
//!     bus.post(OrderCreated { total_cents: 1250 });
//!     assert_eq!(revenue.cents.load(Ordering::SeqCst), 1250);
//!
//!     assert_eq!(bus.unregister(id), 1);
//!     assert_eq!(bus.post(OrderCreated { total_cents: 99 }), 0);
//!     Ok(())
//! }
//! ```

mod binding;
mod bus;
mod config;
mod dispatcher;
mod error;
mod registry;
mod subscriber;

pub use binding::{Delivery, EventKey, HandlerBinding, SharedEvent};
pub use bus::{EventBus, EventBusBuilder, NoDispatcher, WithDispatcher};
pub use config::{BusConfig, DispatchMode};
pub use dispatcher::{Dispatcher, FailureHook, InlineDispatcher, PooledDispatcher};
pub use error::{EventBusError, EventBusErrorExt, HandlerFailure, HandlerInvocationError};
pub use registry::{BindingList, ObserverRegistry};
pub use subscriber::{Event, Handles, Subscriber, SubscriberId, Subscriptions};
