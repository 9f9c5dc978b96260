//! Remove pipeline outputs.

use anyhow::Result;
use docpipe_core::CleanScope;

use super::open_pipeline;
use crate::cli::Settings;
use crate::error::CliError;
use crate::output::{JsonFormatter, OutputFormat, TextFormatter};

/// Remove derived artifacts, or everything including fetched trees with `all`.
pub fn execute(settings: &Settings, all: bool) -> Result<()> {
    let pipeline = open_pipeline(settings)?;
    let scope = if all { CleanScope::All } else { CleanScope::Derived };
    let report = pipeline.clean(scope).map_err(CliError::core)?;

    match settings.format {
        OutputFormat::Text => TextFormatter::print_clean(&report),
        OutputFormat::Json => JsonFormatter::print_clean(all, &report)?,
    }
    Ok(())
}
