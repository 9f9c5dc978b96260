//! Command implementations for the docpipe CLI

mod clean;
mod graph;
mod lifecycle;

pub use clean::execute as clean;
pub use graph::execute as graph;
pub use lifecycle::{Lifecycle, execute as lifecycle};

use anyhow::Result;
use docpipe_core::{DocsPipeline, PipelineConfig};

use crate::cli::Settings;
use crate::error::CliError;

/// Load configuration and apply command-line overrides.
fn load_config(settings: &Settings) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(settings.config.as_deref()).map_err(CliError::core)?;
    if let Some(jobs) = settings.jobs {
        config.execution.jobs = jobs;
    }
    Ok(config)
}

fn open_pipeline(settings: &Settings) -> Result<DocsPipeline> {
    let config = load_config(settings)?;
    Ok(DocsPipeline::new(config).map_err(CliError::core)?)
}
