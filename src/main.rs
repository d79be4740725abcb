mod cli;

use acadio::{Client, Outcome};
use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::Cli;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("acadio=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;
    let item = cli.work_item();

    let client = Client::new(config).context("failed to build HTTP client")?;
    match client.run(&item, &CancellationToken::new())? {
        Outcome::Downloaded { output, report, .. } => {
            println!("{}", output.display());
            println!("{}", report.display());
            Ok(())
        }
        Outcome::Finished { id, status } => {
            bail!("work item {} ended with status {}", id, status)
        }
    }
}
