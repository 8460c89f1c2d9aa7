use courier_event_bus::EventBusError;
use std::borrow::Cow;

/// Errors raised while preparing or running the demo.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("Config error{}: {source}", format_context(.context))]
    Config {
        #[source]
        source: config::ConfigError,
        context: Option<Cow<'static, str>>,
    },

    #[error("Invalid log filter{}: {message}", format_context(.context))]
    InvalidFilter { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Logging error{}: {source}", format_context(.context))]
    Subscriber {
        #[source]
        source: tracing_subscriber::util::TryInitError,
        context: Option<Cow<'static, str>>,
    },

    #[error("Event bus error{}: {source}", format_context(.context))]
    Bus {
        #[source]
        source: EventBusError,
        context: Option<Cow<'static, str>>,
    },
}

/// Adds context to results whose error converts into [`ShellError`].
pub trait ShellErrorExt<T> {
    /// # Errors
    /// Returns the original error wrapped with `context`.
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, ShellError>;
}

impl<T> ShellErrorExt<T> for Result<T, config::ConfigError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, ShellError> {
        self.map_err(|source| ShellError::Config { source, context: Some(context.into()) })
    }
}

impl<T> ShellErrorExt<T> for Result<T, EventBusError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, ShellError> {
        self.map_err(|source| ShellError::Bus { source, context: Some(context.into()) })
    }
}

impl<T> ShellErrorExt<T> for Result<T, tracing_subscriber::util::TryInitError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, ShellError> {
        self.map_err(|source| ShellError::Subscriber { source, context: Some(context.into()) })
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}
