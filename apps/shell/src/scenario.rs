//! Order and login traffic driven through one bus.
//!
//! `Fulfillment` reacts to orders only; `CustomerNotifier` reacts to orders
//! and logins. Every fifth order is empty and is refused by fulfillment,
//! which exercises failure containment.

use crate::error::{ShellError, ShellErrorExt};
use courier_event_bus::{
    BusConfig, EventBus, FailureHook, Handles, HandlerInvocationError, Subscriber, Subscriptions,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

const EMPTY_ORDER_EVERY: u64 = 5;

#[derive(Debug, Clone)]
pub struct OrderCreated {
    pub order_id: u64,
    pub total_cents: u64,
}

#[derive(Debug, Clone)]
pub struct UserLoggedIn {
    pub user: String,
}

#[derive(Debug, Default)]
pub struct Fulfillment {
    shipped: AtomicU64,
    revenue_cents: AtomicU64,
}

impl Handles<OrderCreated> for Fulfillment {
    fn handle(&self, event: &OrderCreated) -> anyhow::Result<()> {
        anyhow::ensure!(event.total_cents > 0, "order {} has nothing to ship", event.order_id);
        self.shipped.fetch_add(1, Ordering::Relaxed);
        self.revenue_cents.fetch_add(event.total_cents, Ordering::Relaxed);
        debug!(order = event.order_id, "Order queued for shipping");
        Ok(())
    }
}

impl Subscriber for Fulfillment {
    fn subscriptions(subscriptions: &mut Subscriptions<Self>) {
        subscriptions.on::<OrderCreated>();
    }

    fn name(&self) -> &'static str {
        "fulfillment"
    }
}

#[derive(Debug, Default)]
pub struct CustomerNotifier {
    order_mails: AtomicU64,
    login_mails: AtomicU64,
}

impl CustomerNotifier {
    fn on_login(&self, event: &UserLoggedIn) -> anyhow::Result<()> {
        self.login_mails.fetch_add(1, Ordering::Relaxed);
        debug!(user = %event.user, "Login notice sent");
        Ok(())
    }
}

impl Handles<OrderCreated> for CustomerNotifier {
    fn handle(&self, event: &OrderCreated) -> anyhow::Result<()> {
        self.order_mails.fetch_add(1, Ordering::Relaxed);
        debug!(order = event.order_id, "Order confirmation sent");
        Ok(())
    }
}

impl Subscriber for CustomerNotifier {
    fn subscriptions(subscriptions: &mut Subscriptions<Self>) {
        subscriptions.on::<OrderCreated>().with(Self::on_login);
    }

    fn name(&self) -> &'static str {
        "customer-notifier"
    }
}

/// Outcome of one scenario run, read after every handler has finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub orders_posted: u64,
    pub logins_posted: u64,
    pub dispatched: usize,
    pub shipped: u64,
    pub revenue_cents: u64,
    pub order_mails: u64,
    pub login_mails: u64,
    pub failures: u64,
}

/// Posts `orders` orders, each followed by a login of its buyer, on a bus
/// built from `config`, then shuts the bus down and collects the counters.
///
/// # Errors
/// Returns [`ShellError::Bus`] if the bus cannot be built or a subscriber
/// cannot be registered.
pub fn run(config: &BusConfig, orders: u64) -> Result<Summary, ShellError> {
    let failures = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&failures);
    let hook: FailureHook = Arc::new(move |_: &HandlerInvocationError| {
        counter.fetch_add(1, Ordering::Relaxed);
    });

    let bus = EventBus::builder()
        .on_failure(hook)
        .configured(config)
        .context("Failed to build the event bus")?
        .build();

    let fulfillment = Arc::new(Fulfillment::default());
    let notifier = Arc::new(CustomerNotifier::default());
    bus.register(&fulfillment).context("Failed to register fulfillment")?;
    bus.register(&notifier).context("Failed to register notifier")?;

    let mut summary = Summary::default();
    for order_id in 1..=orders {
        let total_cents = if order_id % EMPTY_ORDER_EVERY == 0 { 0 } else { order_id * 1_000 };
        summary.dispatched += bus.post(OrderCreated { order_id, total_cents });
        summary.dispatched += bus.post(UserLoggedIn { user: format!("buyer-{order_id}") });
        summary.orders_posted += 1;
        summary.logins_posted += 1;
    }

    let removed = bus.shutdown();
    info!(bus = bus.name(), bindings = removed, "Scenario finished");

    summary.shipped = fulfillment.shipped.load(Ordering::Relaxed);
    summary.revenue_cents = fulfillment.revenue_cents.load(Ordering::Relaxed);
    summary.order_mails = notifier.order_mails.load(Ordering::Relaxed);
    summary.login_mails = notifier.login_mails.load(Ordering::Relaxed);
    summary.failures = failures.load(Ordering::Relaxed);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_event_bus::DispatchMode;

    fn expected(orders: u64) -> Summary {
        let posts = usize::try_from(orders).unwrap();
        let empty = orders / EMPTY_ORDER_EVERY;
        let revenue: u64 =
            (1..=orders).filter(|id| id % EMPTY_ORDER_EVERY != 0).map(|id| id * 1_000).sum();
        Summary {
            orders_posted: orders,
            logins_posted: orders,
            dispatched: posts * 3,
            shipped: orders - empty,
            revenue_cents: revenue,
            order_mails: orders,
            login_mails: orders,
            failures: empty,
        }
    }

    #[test]
    fn test_inline_scenario() {
        let summary = run(&BusConfig::default(), 10).unwrap();
        assert_eq!(summary, expected(10));
    }

    #[test]
    fn test_pooled_scenario_waits_for_handlers() {
        let mut config = BusConfig::default().with_mode(DispatchMode::Pooled);
        config.pool = config.pool.with_worker_threads(3);

        let summary = run(&config, 25).unwrap();
        assert_eq!(summary, expected(25));
    }

    #[test]
    fn test_zero_orders() {
        assert_eq!(run(&BusConfig::default(), 0).unwrap(), Summary::default());
    }
}
