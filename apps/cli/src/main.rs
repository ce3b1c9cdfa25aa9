//! contractscope CLI: rank popular Stacks contracts and explain them.
//!
//! Harvests recent contract calls from the Hiro API, ranks contracts by call
//! volume, and enriches the top of the ranking with annotated analyses.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // A missing .env is fine; keys may come from the environment.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
