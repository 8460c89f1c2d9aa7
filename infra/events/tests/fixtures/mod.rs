#![allow(dead_code)]

use courier_event_bus::{FailureHook, Handles, HandlerInvocationError, Subscriber, Subscriptions};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderCreated {
    pub order_id: u64,
    pub total_cents: u64,
}

impl OrderCreated {
    pub const fn new(order_id: u64) -> Self {
        Self { order_id, total_cents: order_id * 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLoggedIn {
    pub user: String,
}

impl UserLoggedIn {
    pub fn new(user: &str) -> Self {
        Self { user: user.to_owned() }
    }
}

/// Ordered record of every handler invocation across subscribers.
#[derive(Debug, Default, Clone)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| e.as_str() == entry).count()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }
}

/// Handles `OrderCreated` only.
#[derive(Debug)]
pub struct Billing {
    pub journal: Journal,
}

impl Handles<OrderCreated> for Billing {
    fn handle(&self, event: &OrderCreated) -> anyhow::Result<()> {
        self.journal.record(format!("billing:order:{}", event.order_id));
        Ok(())
    }
}

impl Subscriber for Billing {
    fn subscriptions(subscriptions: &mut Subscriptions<Self>) {
        subscriptions.on::<OrderCreated>();
    }

    fn name(&self) -> &'static str {
        "billing"
    }
}

/// Handles `OrderCreated` and `UserLoggedIn`.
#[derive(Debug)]
pub struct Notifier {
    pub journal: Journal,
}

impl Notifier {
    fn on_login(&self, event: &UserLoggedIn) -> anyhow::Result<()> {
        self.journal.record(format!("notifier:login:{}", event.user));
        Ok(())
    }
}

impl Handles<OrderCreated> for Notifier {
    fn handle(&self, event: &OrderCreated) -> anyhow::Result<()> {
        self.journal.record(format!("notifier:order:{}", event.order_id));
        Ok(())
    }
}

impl Subscriber for Notifier {
    fn subscriptions(subscriptions: &mut Subscriptions<Self>) {
        subscriptions.on::<OrderCreated>().with(Self::on_login);
    }

    fn name(&self) -> &'static str {
        "notifier"
    }
}

/// Records its tag for every `OrderCreated`.
#[derive(Debug)]
pub struct Tagged {
    pub tag: String,
    pub journal: Journal,
}

impl Tagged {
    pub fn new(tag: impl Into<String>, journal: &Journal) -> Arc<Self> {
        Arc::new(Self { tag: tag.into(), journal: journal.clone() })
    }
}

impl Handles<OrderCreated> for Tagged {
    fn handle(&self, _: &OrderCreated) -> anyhow::Result<()> {
        self.journal.record(self.tag.clone());
        Ok(())
    }
}

impl Subscriber for Tagged {
    fn subscriptions(subscriptions: &mut Subscriptions<Self>) {
        subscriptions.on::<OrderCreated>();
    }

    fn name(&self) -> &'static str {
        "tagged"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Error,
    Panic,
}

/// Fails on every `OrderCreated`.
#[derive(Debug)]
pub struct Faulty {
    pub fault: Fault,
}

impl Handles<OrderCreated> for Faulty {
    fn handle(&self, event: &OrderCreated) -> anyhow::Result<()> {
        match self.fault {
            Fault::Error => anyhow::bail!("payment gateway rejected order {}", event.order_id),
            Fault::Panic => panic!("ledger corrupted at order {}", event.order_id),
        }
    }
}

impl Subscriber for Faulty {
    fn subscriptions(subscriptions: &mut Subscriptions<Self>) {
        subscriptions.on::<OrderCreated>();
    }

    fn name(&self) -> &'static str {
        "faulty"
    }
}

/// Declares no handler at all.
#[derive(Debug)]
pub struct Silent;

impl Subscriber for Silent {
    fn subscriptions(_: &mut Subscriptions<Self>) {}
}

/// A failure hook collecting rendered failures.
pub fn failure_log() -> (FailureHook, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let hook: FailureHook =
        Arc::new(move |err: &HandlerInvocationError| sink.lock().push(err.to_string()));
    (hook, seen)
}
