//! BuildRelay CLI — upstream build insertion tool.
//!
//! Selects the latest insertable upstream build, resolves its artifacts and
//! component versions, and opens or updates the downstream insertion pull
//! request with a compiled changelog.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
