//! narrascript CLI: turn a story outline into a voiceover-ready narration script.
//!
//! Each outline point is expanded by a text-generation backend, cleaned of
//! anything a narrator should not read aloud, and stitched into one script.

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
