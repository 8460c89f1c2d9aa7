use crate::error::{ShellError, ShellErrorExt};
use config::{Config, Environment, File, Map};
use courier_event_bus::BusConfig;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Prefix of environment overrides; nested keys are separated by `__`,
/// e.g. `COURIER__BUS__POOL__WORKER_THREADS=2`.
pub const ENV_PREFIX: &str = "COURIER";

/// Settings of the `courier` binary.
///
/// ```toml
/// log_filter = "courier_event_bus=debug,info"
///
/// [bus]
/// mode = "pooled"
///
/// [bus.pool]
/// worker_threads = 2
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// `tracing` filter directives; `RUST_LOG` wins when unset.
    pub log_filter: Option<String>,
    pub bus: BusConfig,
}

/// Loads `T` from an optional TOML file overlaid with `COURIER__*`
/// environment variables.
///
/// Without a path only defaults and the environment apply. A given path must
/// exist. Loading emits no events: it runs before the subscriber is installed.
///
/// # Errors
/// Returns [`ShellError::Config`] if the file is missing or malformed, or if
/// the merged values do not fit `T`.
pub fn load_config<T: DeserializeOwned>(path: Option<&Path>) -> Result<T, ShellError> {
    load_config_from(path, None)
}

/// Like [`load_config`], reading overrides from `env` instead of the process
/// environment when given.
///
/// # Errors
/// See [`load_config`].
pub fn load_config_from<T: DeserializeOwned>(
    path: Option<&Path>,
    env: Option<Map<String, String>>,
) -> Result<T, ShellError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    let config = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true).source(env),
        )
        .build()
        .context("Failed to build config")?
        .try_deserialize::<T>()
        .context("Failed to deserialize config")?;

    Ok(config)
}
