use courier_runtime::ExecutorError;
use std::borrow::Cow;
use std::fmt;

/// Errors that can occur during event bus operations.
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    /// A subscriber was registered without declaring a single handler.
    #[error("No handler found{}: {message}", format_context(.context))]
    NoHandlerFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A handler returned an error or panicked.
    ///
    /// Contained at the dispatch boundary: the failure hook receives the bare
    /// [`HandlerInvocationError`] and the log records this variant. It never
    /// reaches the caller of `post`.
    #[error("Handler invocation failed{}: {source}", format_context(.context))]
    HandlerInvocation {
        #[source]
        source: HandlerInvocationError,
        context: Option<Cow<'static, str>>,
    },

    /// The executor behind a pooled dispatcher refused a task.
    #[error("Executor error{}: {source}", format_context(.context))]
    Executor {
        #[source]
        source: ExecutorError,
        context: Option<Cow<'static, str>>,
    },

    /// The bus has been shut down and no longer accepts subscribers.
    #[error("Event bus closed{}: {message}", format_context(.context))]
    Closed { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

/// How a handler failed.
#[derive(Debug)]
pub enum HandlerFailure {
    /// The handler returned `Err`.
    Error(anyhow::Error),
    /// The handler panicked; holds the panic message.
    Panicked(String),
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(err) => write!(f, "{err:#}"),
            Self::Panicked(msg) => write!(f, "panicked: {msg}"),
        }
    }
}

/// A failure raised by one handler while one event was being delivered.
#[derive(Debug, thiserror::Error)]
#[error("{subscriber} failed to handle {event}: {failure}")]
pub struct HandlerInvocationError {
    pub subscriber: &'static str,
    pub event: &'static str,
    pub failure: HandlerFailure,
}

impl HandlerInvocationError {
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self.failure, HandlerFailure::Panicked(_))
    }
}

/// Adds context to results carrying an [`EventBusError`].
pub trait EventBusErrorExt<T> {
    /// Attaches `context` to the error, replacing any previous context.
    ///
    /// # Errors
    /// Returns the original error with the context attached.
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, EventBusError>;
}

impl<T> EventBusErrorExt<T> for Result<T, EventBusError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Self {
        self.map_err(|mut e| {
            match &mut e {
                EventBusError::NoHandlerFound { context: c, .. }
                | EventBusError::HandlerInvocation { context: c, .. }
                | EventBusError::Executor { context: c, .. }
                | EventBusError::Closed { context: c, .. } => *c = Some(context.into()),
            }
            e
        })
    }
}

impl<T> EventBusErrorExt<T> for Result<T, ExecutorError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, EventBusError> {
        self.map_err(|source| EventBusError::Executor { source, context: Some(context.into()) })
    }
}

impl From<ExecutorError> for EventBusError {
    #[inline]
    fn from(source: ExecutorError) -> Self {
        Self::Executor { source, context: None }
    }
}

impl From<HandlerInvocationError> for EventBusError {
    #[inline]
    fn from(source: HandlerInvocationError) -> Self {
        Self::HandlerInvocation { source, context: None }
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}
