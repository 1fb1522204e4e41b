//! FightSync CLI — scheduled batch reconciliation of fighter data.
//!
//! Aggregates raw records from independently formatted sources into one
//! canonical, stably-identified record set.

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
