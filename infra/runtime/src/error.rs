use std::borrow::Cow;

/// Errors raised when a task cannot be handed over to an executor.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// A bounded queue is full and the overflow policy is `reject`.
    #[error("Queue full{}: {message}", format_context(.context))]
    QueueFull { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A bounded queue is full and the overflow policy discarded the task.
    #[error("Task dropped{}: {message}", format_context(.context))]
    Dropped { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The executor no longer accepts tasks.
    #[error("Executor shut down{}: {message}", format_context(.context))]
    ShutDown { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// No async runtime is available on the current thread.
    #[error("No runtime{}: {message}", format_context(.context))]
    NoRuntime { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The operating system refused to start a worker thread.
    #[error("Worker spawn failed{}: {source}", format_context(.context))]
    Spawn {
        #[source]
        source: std::io::Error,
        context: Option<Cow<'static, str>>,
    },
}

/// Adds context to results carrying an [`ExecutorError`].
pub trait ExecutorErrorExt<T> {
    /// Attaches `context` to the error, replacing any previous context.
    ///
    /// # Errors
    /// Returns the original error with the context attached.
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, ExecutorError>;
}

impl<T> ExecutorErrorExt<T> for Result<T, ExecutorError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Self {
        self.map_err(|mut e| {
            match &mut e {
                ExecutorError::QueueFull { context: c, .. }
                | ExecutorError::Dropped { context: c, .. }
                | ExecutorError::ShutDown { context: c, .. }
                | ExecutorError::NoRuntime { context: c, .. }
                | ExecutorError::Spawn { context: c, .. } => *c = Some(context.into()),
            }
            e
        })
    }
}

impl<T> ExecutorErrorExt<T> for Result<T, std::io::Error> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, ExecutorError> {
        self.map_err(|source| ExecutorError::Spawn { source, context: Some(context.into()) })
    }
}

impl From<std::io::Error> for ExecutorError {
    #[inline]
    fn from(source: std::io::Error) -> Self {
        Self::Spawn { source, context: None }
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}
