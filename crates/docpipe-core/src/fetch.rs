//! Fetching source trees at pinned references.
//!
//! A tree is cloned into a sibling staging directory, checked out, stamped,
//! and only then swapped into its destination. Consumers therefore never see
//! a partially written tree, and a failed fetch leaves the previous tree in
//! place.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::fsutil::{self, DirLock};
use crate::tool::{Invocation, ToolRunner};
use crate::{Error, Result};

/// Stamp written at the root of every fetched tree.
pub const STAMP_FILE: &str = ".docpipe-source.json";

/// Provenance of a fetched tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchStamp {
    /// Repository location.
    pub uri: String,
    /// Requested reference.
    pub reference: String,
    /// Resolved commit, when the VCS reported one.
    pub commit: Option<String>,
    /// When the fetch completed.
    pub fetched_at: DateTime<Utc>,
}

impl FetchStamp {
    /// Read the stamp of the tree at `dir`, if it has a readable one.
    pub fn read(dir: &Path) -> Option<Self> {
        fsutil::read_json(&dir.join(STAMP_FILE)).ok()
    }

    fn matches(&self, uri: &str, reference: &str) -> bool {
        self.uri == uri && self.reference == reference
    }
}

/// A fetched, read-only source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    /// Local directory holding the tree.
    pub dir: PathBuf,
    /// Provenance.
    pub stamp: FetchStamp,
}

/// Fetches trees with git through a [`ToolRunner`].
#[derive(Clone)]
pub struct SourceFetcher {
    runner: Arc<dyn ToolRunner>,
    git: String,
}

impl std::fmt::Debug for SourceFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceFetcher")
            .field("git", &self.git)
            .finish_non_exhaustive()
    }
}

impl SourceFetcher {
    /// Create a fetcher invoking `git`.
    pub fn new(runner: Arc<dyn ToolRunner>, git: impl Into<String>) -> Self {
        Self {
            runner,
            git: git.into(),
        }
    }

    /// Make `dest` hold `uri` at `reference`.
    ///
    /// A no-op when `dest` already holds that pair.
    #[instrument(level = "debug", skip(self), fields(dest = %dest.display()))]
    pub async fn fetch(&self, uri: &str, reference: &str, dest: &Path) -> Result<SourceTree> {
        let Some(_lock) = DirLock::try_acquire(dest)? else {
            return Err(Error::FetchLocked(dest.to_path_buf()));
        };

        if let Some(stamp) = FetchStamp::read(dest) {
            if stamp.matches(uri, reference) {
                debug!(uri, reference, "Source tree already current");
                return Ok(SourceTree {
                    dir: dest.to_path_buf(),
                    stamp,
                });
            }
        }

        info!(uri, reference, "Fetching source tree");
        let staging = fsutil::staging_dir_for(dest)?;
        let checkout = staging.path().join("tree");

        let commit = self.clone_into(uri, reference, &checkout).await?;
        let stamp = FetchStamp {
            uri: uri.to_string(),
            reference: reference.to_string(),
            commit,
            fetched_at: Utc::now(),
        };
        fsutil::write_json_atomic(&checkout.join(STAMP_FILE), &stamp)?;
        fsutil::replace_dir(&checkout, dest)?;

        info!(uri, reference, commit = ?stamp.commit, "Source tree ready");
        Ok(SourceTree {
            dir: dest.to_path_buf(),
            stamp,
        })
    }

    async fn clone_into(&self, uri: &str, reference: &str, checkout: &Path) -> Result<Option<String>> {
        let fail = |reason: String| Error::Fetch {
            uri: uri.to_string(),
            reference: reference.to_string(),
            reason,
        };

        let clone = Invocation::new(&self.git)
            .args(["clone", "--quiet", "--no-checkout", uri])
            .path_arg(checkout);
        let output = self.runner.run(&clone).await.map_err(|e| fail(e.to_string()))?;
        if !output.is_success() {
            return Err(fail(format!("clone failed with {}", output.diagnostic())));
        }

        let switch = self.in_tree(checkout).args(["checkout", "--quiet", reference]);
        let output = self.runner.run(&switch).await.map_err(|e| fail(e.to_string()))?;
        if !output.is_success() {
            return Err(fail(format!(
                "reference could not be checked out: {}",
                output.diagnostic()
            )));
        }

        let rev_parse = self.in_tree(checkout).args(["rev-parse", "HEAD"]);
        let commit = match self.runner.run(&rev_parse).await {
            Ok(out) if out.is_success() => Some(out.stdout.trim().to_string()).filter(|c| !c.is_empty()),
            Ok(out) => {
                warn!(diagnostic = %out.diagnostic(), "Could not resolve fetched commit");
                None
            },
            Err(e) => {
                warn!(error = %e, "Could not resolve fetched commit");
                None
            },
        };

        if !checkout.is_dir() {
            fs::create_dir_all(checkout)?;
        }
        Ok(commit)
    }

    fn in_tree(&self, dir: &Path) -> Invocation {
        Invocation::new(&self.git).arg("-C").path_arg(dir)
    }
}
