use anyhow::Context;
use clap::Parser;
use exam_coord::cli::{Cli, CliHandler};
use exam_coord::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let handler = CliHandler::load(cli.config.clone(), cli.rendezvous)
        .context("Failed to load configuration")?;
    logging::init(&handler.config().logging).context("Failed to initialise logging")?;

    handler.handle(&cli.command).await?;
    Ok(())
}
