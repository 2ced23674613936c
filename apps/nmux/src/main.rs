use anyhow::{Context, bail};
use clap::Parser;
use nmux_client_core::cli::Cli;
use nmux_client_core::client::{self, ControllerStatus};
use nmux_client_core::telemetry::logging;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.logging.to_config()).context("failed to initialise logging")?;
    let config = cli.to_config();

    match client::run_terminal(&config).context("nmux client failed")? {
        ControllerStatus::GaveUp { attempts } => {
            bail!("could not reach {} after {attempts} attempts", config.server)
        }
        ControllerStatus::Running | ControllerStatus::Closed => Ok(()),
    }
}
