mod config;
mod controller;
mod model;
mod monitor;
mod sim;
mod table;

use anyhow::Result;
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;

use config::OutputFormat;
use controller::Controller;
use monitor::Monitor;
use sim::ReadingSim;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries status lines and the final table.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cfg = config::from_env()?;

    let mut controller = Controller::new(&cfg.controller);
    let mut sim = ReadingSim::new(cfg.sim.seed);
    let monitor = Monitor::new(&cfg.monitor)?;

    let mut out = io::stdout().lock();
    writeln!(out, "Starting hydroponic system monitoring...")?;
    out.flush()?;

    let table = monitor.run(&mut controller, &mut sim, &mut out).await?;

    if let (Some(intercept), Some(weights)) =
        (controller.model().intercept(), controller.model().weights())
    {
        tracing::info!(intercept, ?weights, "fitted regression coefficients");
    }

    tracing::debug!(rows = table.len(), "reading table ready");
    writeln!(out, "Sensor data collected:")?;
    match cfg.output.format {
        OutputFormat::Table => write!(out, "{table}")?,
        OutputFormat::Json => writeln!(out, "{}", table.to_json()?)?,
    }
    out.flush()?;

    Ok(())
}
