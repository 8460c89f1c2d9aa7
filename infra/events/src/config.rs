use crate::bus::DEFAULT_BUS_NAME;
use courier_runtime::PoolConfig;
use serde::Deserialize;

/// How a bus built from [`BusConfig`] delivers events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Handlers run on the posting thread.
    #[default]
    Inline,
    /// Handlers run on a dedicated [`courier_runtime::WorkerPool`].
    Pooled,
}

/// Configuration consumed by [`crate::EventBus::from_config`].
///
/// ```toml
/// name = "orders"
/// mode = "pooled"
///
/// [pool]
/// worker_threads = 2
/// queue_capacity = 64
/// overflow = "reject"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Name attached to every log line of the bus.
    pub name: String,
    pub mode: DispatchMode,
    /// Only used in [`DispatchMode::Pooled`].
    pub pool: PoolConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { name: DEFAULT_BUS_NAME.to_owned(), mode: DispatchMode::Inline, pool: PoolConfig::default() }
    }
}

impl BusConfig {
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }
}
