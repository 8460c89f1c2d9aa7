use clap::Parser;
use courier_shell::cli::Cli;
use courier_shell::{ShellConfig, load_config, scenario, telemetry};
use tracing::info;
use tracing::level_filters::LevelFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config: ShellConfig = load_config(cli.config.as_deref())?;
    if let Some(mode) = cli.mode {
        config.bus.mode = mode.into();
    }

    telemetry::init(LevelFilter::INFO, config.log_filter.as_deref())?;
    if let Some(path) = &cli.config {
        info!(path = %path.display(), "Loaded config file");
    }
    info!(bus = %config.bus.name, mode = ?config.bus.mode, orders = cli.orders, "Starting scenario");

    let summary = scenario::run(&config.bus, cli.orders)?;
    info!(
        dispatched = summary.dispatched,
        shipped = summary.shipped,
        revenue_cents = summary.revenue_cents,
        order_mails = summary.order_mails,
        login_mails = summary.login_mails,
        failures = summary.failures,
        "Delivery summary"
    );

    Ok(())
}
