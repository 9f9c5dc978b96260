//! docpipe CLI - assemble, check and publish the Kotlin DSL documentation.
//!
//! The binary is a thin shell over [`docpipe_core::DocsPipeline`]: it loads
//! the configuration, runs one lifecycle command and prints the run report.

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
pub mod error;
mod output;
mod utils;

use cli::{Cli, Commands};
use commands::Lifecycle;
use utils::initialize_logging;

/// Execute the docpipe CLI with the process arguments.
///
/// # Errors
///
/// Returns a [`error::CliError`] when configuration fails or any stage of the
/// run fails.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    initialize_logging(&cli)?;

    let settings = cli.settings();
    match cli.command {
        Commands::Clean { all } => commands::clean(&settings, all),
        Commands::Graph => commands::graph(&settings),
        Commands::Assemble => commands::lifecycle(&settings, Lifecycle::Assemble).await,
        Commands::Check => commands::lifecycle(&settings, Lifecycle::Check).await,
        Commands::PreparePublish => commands::lifecycle(&settings, Lifecycle::PreparePublish).await,
        Commands::Publish => commands::lifecycle(&settings, Lifecycle::Publish).await,
    }
}
