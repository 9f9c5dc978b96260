//! Show the stage graph.

use anyhow::Result;

use super::open_pipeline;
use crate::cli::Settings;
use crate::output::{JsonFormatter, OutputFormat, TextFormatter};

pub fn execute(settings: &Settings) -> Result<()> {
    let pipeline = open_pipeline(settings)?;
    let stages = pipeline.describe();
    match settings.format {
        OutputFormat::Text => TextFormatter::print_graph(&stages),
        OutputFormat::Json => JsonFormatter::print_graph(&stages)?,
    }
    Ok(())
}
