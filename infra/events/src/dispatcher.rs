use crate::binding::{Delivery, HandlerBinding, SharedEvent};
use crate::error::{EventBusError, EventBusErrorExt, HandlerInvocationError};
use courier_runtime::{Executor, panic_message};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Observer of contained handler failures.
///
/// Runs on the thread that invoked the failing handler: the posting thread for
/// an inline bus, a worker for a pooled one.
pub type FailureHook = Arc<dyn Fn(&HandlerInvocationError) + Send + Sync>;

/// Executes one [`HandlerBinding`] against one event.
///
/// Implementations contain handler failures themselves. The only error a
/// dispatcher returns is its own failure to start the invocation.
pub trait Dispatcher: Send + Sync + fmt::Debug {
    /// Runs, or schedules, `binding` against `event`.
    ///
    /// # Errors
    /// Returns [`EventBusError::Executor`] if the invocation could not be
    /// scheduled. Handler failures are never returned.
    fn dispatch(&self, binding: Arc<HandlerBinding>, event: SharedEvent) -> Result<(), EventBusError>;

    /// Stops accepting work. Work already accepted is allowed to finish.
    fn shutdown(&self) {}
}

/// Logs contained failures and forwards them to the optional hook.
#[derive(Clone, Default)]
pub(crate) struct FailureReporter {
    hook: Option<FailureHook>,
}

impl FailureReporter {
    pub(crate) const fn new(hook: Option<FailureHook>) -> Self {
        Self { hook }
    }

    pub(crate) fn run(&self, binding: &HandlerBinding, event: &SharedEvent) {
        match binding.invoke(&**event) {
            Ok(Delivery::Handled) => {
                trace!(subscriber = binding.subscriber_name(), event = binding.event().name(), "Event handled");
            },
            Ok(Delivery::SubscriberGone) => {
                debug!(
                    subscriber = binding.subscriber_name(),
                    id = %binding.subscriber(),
                    event = binding.event().name(),
                    "Subscriber dropped, binding skipped"
                );
            },
            Err(failure) => self.report(failure),
        }
    }

    /// Hands the failure to the hook, then logs it as an [`EventBusError`].
    fn report(&self, failure: HandlerInvocationError) {
        if let Some(hook) = &self.hook
            && let Err(panic) = catch_unwind(AssertUnwindSafe(|| hook(&failure)))
        {
            error!(panic = %panic_message(&*panic), "Failure hook panicked");
        }

        let (subscriber, event, panicked) = (failure.subscriber, failure.event, failure.is_panic());
        let err = EventBusError::from(failure);
        error!(subscriber, event, panicked, error = %err, "Event handler failed");
    }
}

impl fmt::Debug for FailureReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureReporter").field("hook", &self.hook.is_some()).finish()
    }
}

/// Runs every handler on the posting thread; `post` returns once all of them
/// have run.
#[derive(Debug, Default)]
pub struct InlineDispatcher {
    reporter: FailureReporter,
}

impl InlineDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_failure_hook(hook: FailureHook) -> Self {
        Self { reporter: FailureReporter::new(Some(hook)) }
    }
}

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, binding: Arc<HandlerBinding>, event: SharedEvent) -> Result<(), EventBusError> {
        self.reporter.run(&binding, &event);
        Ok(())
    }
}

/// Submits every invocation to an [`Executor`]; `post` does not wait for
/// handlers.
#[derive(Debug)]
pub struct PooledDispatcher {
    executor: Arc<dyn Executor>,
    reporter: FailureReporter,
}

impl PooledDispatcher {
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor, reporter: FailureReporter::default() }
    }

    #[must_use]
    pub fn with_failure_hook(executor: Arc<dyn Executor>, hook: FailureHook) -> Self {
        Self { executor, reporter: FailureReporter::new(Some(hook)) }
    }

    #[must_use]
    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }
}

impl Dispatcher for PooledDispatcher {
    fn dispatch(&self, binding: Arc<HandlerBinding>, event: SharedEvent) -> Result<(), EventBusError> {
        let subscriber = binding.subscriber_name();
        let event_name = binding.event().name();
        let reporter = self.reporter.clone();

        self.executor
            .execute(Box::new(move || reporter.run(&binding, &event)))
            .context(format!("dispatching {event_name} to {subscriber}"))
    }

    fn shutdown(&self) {
        self.executor.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::SubscriberId;
    use courier_runtime::{ExecutorError, Task};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Ping;

    fn shared() -> SharedEvent {
        Arc::new(Ping)
    }

    fn counting(hits: &Arc<AtomicUsize>) -> Arc<HandlerBinding> {
        let hits = Arc::clone(hits);
        Arc::new(HandlerBinding::for_fn::<Ping, _>(SubscriberId(1), "counter", move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    }

    fn failing() -> Arc<HandlerBinding> {
        Arc::new(HandlerBinding::for_fn::<Ping, _>(SubscriberId(2), "failing", |_| {
            anyhow::bail!("storage offline")
        }))
    }

    fn collecting_hook() -> (FailureHook, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let hook: FailureHook =
            Arc::new(move |err: &HandlerInvocationError| sink.lock().push(err.to_string()));
        (hook, seen)
    }

    /// Runs tasks on the submitting thread.
    #[derive(Debug, Default)]
    struct CallerRuns {
        shut_down: AtomicUsize,
    }

    impl Executor for CallerRuns {
        fn execute(&self, task: Task) -> Result<(), ExecutorError> {
            task();
            Ok(())
        }

        fn shutdown(&self) {
            self.shut_down.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Debug)]
    struct Saturated;

    impl Executor for Saturated {
        fn execute(&self, _: Task) -> Result<(), ExecutorError> {
            Err(ExecutorError::QueueFull { message: "no free slot".into(), context: None })
        }
    }

    #[test]
    fn test_inline_contains_handler_error() {
        let (hook, seen) = collecting_hook();
        let dispatcher = InlineDispatcher::with_failure_hook(hook);

        dispatcher.dispatch(failing(), shared()).expect("failure is contained");

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("storage offline"));
    }

    #[test]
    fn test_inline_runs_on_calling_thread() {
        let hits = Arc::new(AtomicUsize::new(0));
        InlineDispatcher::new().dispatch(counting(&hits), shared()).expect("dispatched");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_hook_is_contained() {
        fn explode(_: &HandlerInvocationError) {
            panic!("hook exploded");
        }

        let dispatcher = InlineDispatcher::with_failure_hook(Arc::new(explode));

        dispatcher.dispatch(failing(), shared()).expect("hook panic is contained");
    }

    #[test]
    fn test_pooled_submits_to_executor() {
        let executor = Arc::new(CallerRuns::default());
        let (hook, seen) = collecting_hook();
        let dispatcher = PooledDispatcher::with_failure_hook(executor.clone(), hook);
        let hits = Arc::new(AtomicUsize::new(0));

        dispatcher.dispatch(counting(&hits), shared()).expect("accepted");
        dispatcher.dispatch(failing(), shared()).expect("accepted");

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().len(), 1);

        dispatcher.shutdown();
        assert_eq!(executor.shut_down.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pooled_reports_submission_failure() {
        let dispatcher = PooledDispatcher::new(Arc::new(Saturated));
        let hits = Arc::new(AtomicUsize::new(0));

        let err = dispatcher.dispatch(counting(&hits), shared()).expect_err("queue is full");
        assert!(matches!(
            err,
            EventBusError::Executor { source: ExecutorError::QueueFull { .. }, context: Some(_) }
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
