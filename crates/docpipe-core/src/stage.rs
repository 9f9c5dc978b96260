//! The unit of work the orchestrator schedules.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::{Error, Result};

/// A pipeline stage.
///
/// Implementations read only the artifacts they were wired to consume and
/// write only the artifacts they produce. Scheduling, staleness checks and
/// failure propagation are the orchestrator's concern.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Description of every setting that influences the output beyond the
    /// consumed artifacts. Part of the staleness fingerprint.
    fn params(&self) -> String {
        String::new()
    }

    /// Stages that must run on every invocation opt out of up-to-date checks.
    fn always_run(&self) -> bool {
        false
    }

    /// Produce the stage's outputs.
    async fn execute(&self) -> Result<()>;
}

/// Run synchronous filesystem work off the async runtime.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Other(format!("blocking task failed: {e}")))?
}

/// Lifecycle of a stage within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    /// Waiting for predecessors.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully, or was already up to date.
    Succeeded,
    /// Returned an error.
    Failed,
    /// Not run because an upstream stage failed.
    Skipped,
}

impl StageState {
    /// Whether the state can no longer change during this run.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(text)
    }
}
