use crate::error::{ShellError, ShellErrorExt};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Builds the filter: explicit directives win, then `RUST_LOG`, then `default`.
///
/// # Errors
/// Returns [`ShellError::InvalidFilter`] if `directives` does not parse.
pub fn env_filter(default: LevelFilter, directives: Option<&str>) -> Result<EnvFilter, ShellError> {
    let builder = EnvFilter::builder().with_default_directive(default.into());
    directives.map_or_else(
        || Ok(builder.from_env_lossy()),
        |filter| {
            builder.parse(filter).map_err(|e| ShellError::InvalidFilter {
                message: format!("'{filter}': {e}").into(),
                context: None,
            })
        },
    )
}

/// Installs the global subscriber: compact console output filtered by
/// [`env_filter`].
///
/// # Errors
/// - [`ShellError::InvalidFilter`] for unparsable directives.
/// - [`ShellError::Subscriber`] if a global subscriber is already set.
pub fn init(default: LevelFilter, directives: Option<&str>) -> Result<(), ShellError> {
    let filter = env_filter(default, directives)?;
    let console = layer().compact().with_ansi(true).with_thread_names(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .try_init()
        .context("Failed to install tracing subscriber")
}
