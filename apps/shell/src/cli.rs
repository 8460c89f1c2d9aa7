//! # CLI Argument Definitions

use clap::{Parser, ValueEnum};
use courier_event_bus::DispatchMode;
use std::path::PathBuf;

/// Runs the order and login scenario on the event bus and logs a summary.
#[derive(Debug, Parser)]
#[command(name = "courier")]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "In-process event bus demo")]
pub struct Cli {
    /// TOML config file; `COURIER__*` environment variables override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Dispatch mode, overriding the configured one
    #[arg(short, long, value_enum)]
    pub mode: Option<Mode>,

    /// Number of orders to post
    #[arg(short, long, default_value_t = 10)]
    pub orders: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Handlers run on the posting thread
    Inline,
    /// Handlers run on a worker pool
    Pooled,
}

impl From<Mode> for DispatchMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Inline => Self::Inline,
            Mode::Pooled => Self::Pooled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["courier"]).unwrap();
        assert_eq!(cli.orders, 10);
        assert!(cli.mode.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_all_flags() {
        let cli = Cli::try_parse_from([
            "courier", "--config", "courier.toml", "--mode", "pooled", "--orders", "3",
        ])
        .unwrap();
        assert_eq!(cli.mode.map(DispatchMode::from), Some(DispatchMode::Pooled));
        assert_eq!(cli.orders, 3);
        assert_eq!(cli.config, Some(PathBuf::from("courier.toml")));
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        assert!(Cli::try_parse_from(["courier", "--mode", "broadcast"]).is_err());
    }
}
