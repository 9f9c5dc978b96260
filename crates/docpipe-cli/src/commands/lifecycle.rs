//! Lifecycle commands: assemble, check, prepare-publish and publish.
//!
//! Each command runs its target closure, prints every stage and turns a
//! failed run into a categorized error so the exit code tells a refused
//! publish apart from an ordinary stage failure.

use anyhow::{Result, anyhow};
use docpipe_core::{Error as CoreError, RunReport};
use tracing::debug;

use super::open_pipeline;
use crate::cli::Settings;
use crate::error::{CliError, ErrorCategory};
use crate::output::{JsonFormatter, OutputFormat, TextFormatter};

/// Lifecycle target selected on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Assemble,
    Check,
    PreparePublish,
    Publish,
}

impl Lifecycle {
    /// Command name as typed by the user.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Assemble => "assemble",
            Self::Check => "check",
            Self::PreparePublish => "prepare-publish",
            Self::Publish => "publish",
        }
    }
}

pub async fn execute(settings: &Settings, target: Lifecycle) -> Result<()> {
    let pipeline = open_pipeline(settings)?;
    debug!(command = target.name(), jobs = pipeline.config().execution.jobs, "Starting run");

    let report = match target {
        Lifecycle::Assemble => pipeline.assemble().await,
        Lifecycle::Check => pipeline.check().await,
        Lifecycle::PreparePublish => pipeline.prepare_publish().await,
        Lifecycle::Publish => pipeline.publish().await,
    }
    .map_err(CliError::core)?;

    match settings.format {
        OutputFormat::Text => TextFormatter::print_run(target.name(), &report, settings.quiet),
        OutputFormat::Json => JsonFormatter::print_run(target.name(), &report)?,
    }
    outcome(&report)
}

fn outcome(report: &RunReport) -> Result<()> {
    if report.is_success() {
        return Ok(());
    }

    let guard = CoreError::PublishGuard.category();
    if report.failed().any(|s| s.category.as_deref() == Some(guard)) {
        return Err(CliError::new(ErrorCategory::Guard, CoreError::PublishGuard).into());
    }

    let failed: Vec<&str> = report.failed().map(|s| s.stage.as_str()).collect();
    Err(CliError::new(
        ErrorCategory::StageFailed,
        anyhow!("{} stage(s) failed: {}", failed.len(), failed.join(", ")),
    )
    .into())
}
