//! StudyKit CLI — local-first study-guide structuring tool.
//!
//! Turns a study guide into chapters, an assessment test, and study
//! elements, and keeps a library of processed books.

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
