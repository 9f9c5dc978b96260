//! # CLI Structure and Argument Parsing
//!
//! Commands map one-to-one onto pipeline lifecycle targets:
//!
//! ```bash
//! docpipe assemble            # API reference + user guide
//! docpipe check               # assemble, then verify the API reference
//! docpipe prepare-publish     # stage the site locally
//! docpipe publish             # check, then push the staged site
//! docpipe clean [--all]       # remove derived artifacts (and fetched trees)
//! docpipe graph               # show stages with their inputs and outputs
//! ```
//!
//! Global options apply to every command. `--format json` writes the run
//! report to stdout and keeps logging at error level.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use docpipe_core::config::CONFIG_ENV;

use crate::output::OutputFormat;

/// Main CLI structure for the `docpipe` command.
#[derive(Parser, Clone, Debug)]
#[command(name = "docpipe")]
#[command(version)]
#[command(about = "docpipe - assemble and publish the Kotlin DSL documentation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./docpipe.toml when present)
    #[arg(long, global = true, env = CONFIG_ENV, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Maximum number of stages running at once
    #[arg(short = 'j', long, global = true, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub jobs: Option<u16>,

    /// Show debug logging
    #[arg(short = 'v', long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress informational messages (only show errors)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Disable colored output (also honors `NO_COLOR`)
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Output format for reports
    #[arg(short = 'f', long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl Cli {
    /// Options shared by every command.
    pub fn settings(&self) -> Settings {
        Settings {
            config: self.config.clone(),
            jobs: self.jobs.map(usize::from),
            quiet: self.quiet,
            format: self.format,
        }
    }
}

/// Resolved global options passed to command handlers.
#[derive(Clone, Debug)]
pub struct Settings {
    pub config: Option<PathBuf>,
    pub jobs: Option<usize>,
    pub quiet: bool,
    pub format: OutputFormat,
}

#[derive(Subcommand, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Remove derived artifacts, scratch directories and run state
    Clean {
        /// Also remove the fetched source trees
        #[arg(long)]
        all: bool,
    },

    /// Build the API reference and the user guide
    Assemble,

    /// Assemble, then verify every public symbol has a page
    Check,

    /// Assemble and stage the site locally without pushing
    PreparePublish,

    /// Check, then stage and force-push the site
    Publish,

    /// Show the stage graph in execution order
    Graph,
}
