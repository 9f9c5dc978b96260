//! Per-stage completion records.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Result, fsutil};

/// What was true about a stage's inputs when it last succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    /// Stage name.
    pub stage: String,
    /// Input fingerprint at completion.
    pub fingerprint: String,
    /// When the stage completed.
    pub completed_at: DateTime<Utc>,
}

/// Stamps stored as `<dir>/<stage>.json`.
#[derive(Debug, Clone)]
pub struct StampStore {
    dir: PathBuf,
}

impl StampStore {
    /// Store stamps under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the stamps.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, stage: &str) -> PathBuf {
        self.dir.join(format!("{stage}.json"))
    }

    /// Read the stamp for `stage`. Unreadable stamps count as absent.
    pub fn load(&self, stage: &str) -> Option<Stamp> {
        let path = self.path(stage);
        if !path.is_file() {
            return None;
        }
        match fsutil::read_json::<Stamp>(&path) {
            Ok(stamp) if stamp.stage == stage => Some(stamp),
            Ok(_) => None,
            Err(e) => {
                warn!(stage, error = %e, "Ignoring unreadable stamp");
                None
            },
        }
    }

    /// Record a successful run.
    pub fn record(&self, stage: &str, fingerprint: &str) -> Result<Stamp> {
        let stamp = Stamp {
            stage: stage.to_string(),
            fingerprint: fingerprint.to_string(),
            completed_at: Utc::now(),
        };
        fsutil::write_json_atomic(&self.path(stage), &stamp)?;
        Ok(stamp)
    }

    /// Drop the stamp so the stage counts as stale.
    pub fn invalidate(&self, stage: &str) -> Result<()> {
        fsutil::remove_if_exists(&self.path(stage))?;
        Ok(())
    }
}
