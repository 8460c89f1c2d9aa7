//! Building blocks of the `courier` demo binary: argument parsing, layered
//! configuration, logging setup and the order/login scenario.

pub mod cli;
pub mod config;
pub mod error;
pub mod scenario;
pub mod telemetry;

pub use config::{ShellConfig, load_config, load_config_from};
pub use error::{ShellError, ShellErrorExt};
pub use scenario::Summary;
