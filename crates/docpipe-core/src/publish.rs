//! Staging and publishing the documentation site.
//!
//! Staging copies the output tree into a local site directory and verifies
//! every section is present. Publishing commits the staged site and force
//! pushes it as a single ref update, so the remote either moves to the new
//! site or keeps the old one.
//!
//! Publishing requires a [`CheckPassed`] proof. Proofs are only minted by a
//! successful documentation check, and handed out through the session's
//! [`CheckGate`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::fsutil::{self, VCS_DIR};
use crate::tool::{Invocation, ToolRunner};
use crate::{Error, Result};

/// File that disables static-site processing on the host.
pub const NOJEKYLL: &str = ".nojekyll";

/// Aggregated documentation directory with named sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTree {
    /// Root directory, e.g. `build/docs`.
    pub root: PathBuf,
    /// Section directory names that must be present, e.g. `api`, `userguide`.
    pub sections: Vec<String>,
}

/// A staged site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSite {
    /// Staged directory.
    pub dir: PathBuf,
    /// Files staged, excluding the marker file.
    pub files: usize,
}

/// Proof that the documentation check passed in this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckPassed {
    pages: usize,
    verified_at: DateTime<Utc>,
}

impl CheckPassed {
    pub(crate) fn new(pages: usize) -> Self {
        Self {
            pages,
            verified_at: Utc::now(),
        }
    }

    /// Pages that were verified.
    pub const fn pages(&self) -> usize {
        self.pages
    }

    /// When the check passed.
    pub const fn verified_at(&self) -> DateTime<Utc> {
        self.verified_at
    }
}

/// Holds the check proof for one pipeline session.
#[derive(Debug, Default)]
pub struct CheckGate {
    passed: Mutex<Option<CheckPassed>>,
}

impl CheckGate {
    /// An empty gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget any earlier proof; called when a check starts.
    pub fn reset(&self) {
        *self.passed.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub(crate) fn pass(&self, proof: CheckPassed) {
        *self.passed.lock().unwrap_or_else(PoisonError::into_inner) = Some(proof);
    }

    /// The current proof, if a check passed.
    pub fn proof(&self) -> Option<CheckPassed> {
        self.passed.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Record of a completed publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRecord {
    /// Push target.
    pub remote: String,
    /// Branch updated on the remote.
    pub branch: String,
    /// Commit that was pushed, if git reported it.
    pub commit: Option<String>,
    /// When the push completed.
    pub published_at: DateTime<Utc>,
}

/// Stages and pushes the site with git.
#[derive(Clone)]
pub struct Publisher {
    runner: Arc<dyn ToolRunner>,
    git: String,
    remote: String,
    branch: String,
    message: String,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("remote", &self.remote)
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}

impl Publisher {
    /// Create a publisher pushing to `branch` of `remote`.
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        git: impl Into<String>,
        remote: impl Into<String>,
        branch: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            git: git.into(),
            remote: remote.into(),
            branch: branch.into(),
            message: message.into(),
        }
    }

    /// Copy `tree` into `site`, replacing it atomically.
    pub fn stage(&self, tree: &OutputTree, site: &Path) -> Result<StagedSite> {
        for section in &tree.sections {
            let dir = tree.root.join(section);
            if !fsutil::has_files(&dir) {
                return Err(Error::Publish(format!(
                    "output tree is missing section '{section}' at {}",
                    dir.display()
                )));
            }
        }

        let staging = fsutil::staging_dir_for(site)?;
        let content = staging.path().join("content");
        let mut files = 0;
        for section in &tree.sections {
            files += fsutil::copy_tree(&tree.root.join(section), &content.join(section), &[VCS_DIR])?;
        }
        fs::write(content.join(NOJEKYLL), "")?;
        fsutil::replace_dir(&content, site)?;

        info!(site = %site.display(), files, "Staged site");
        Ok(StagedSite {
            dir: site.to_path_buf(),
            files,
        })
    }

    /// Push the staged `site`. Requires proof of a passed check.
    #[instrument(level = "debug", skip(self, proof), fields(remote = %self.remote, branch = %self.branch))]
    pub async fn publish(&self, site: &Path, proof: &CheckPassed) -> Result<PublishRecord> {
        if !fsutil::has_files(site) {
            return Err(Error::Publish(format!("nothing staged at {}", site.display())));
        }
        fsutil::remove_if_exists(&site.join(VCS_DIR))?;

        info!(pages = proof.pages(), "Publishing checked documentation");
        self.git(site, &["init", "--quiet"]).await?;
        self.git(site, &["add", "-A"]).await?;
        self.git(
            site,
            &[
                "-c",
                "user.name=docpipe",
                "-c",
                "user.email=docpipe@localhost",
                "commit",
                "--quiet",
                "-m",
                &self.message,
            ],
        )
        .await?;
        let refspec = format!("HEAD:refs/heads/{}", self.branch);
        self.git(site, &["push", "--force", "--quiet", &self.remote, &refspec])
            .await?;

        let commit = self
            .git(site, &["rev-parse", "HEAD"])
            .await
            .ok()
            .map(|out| out.trim().to_string())
            .filter(|c| !c.is_empty());

        info!(remote = %self.remote, branch = %self.branch, "Published site");
        Ok(PublishRecord {
            remote: self.remote.clone(),
            branch: self.branch.clone(),
            commit,
            published_at: Utc::now(),
        })
    }

    async fn git(&self, site: &Path, args: &[&str]) -> Result<String> {
        let invocation = Invocation::new(&self.git)
            .arg("-C")
            .path_arg(site)
            .args(args.iter().copied());
        let output = self.runner.run(&invocation).await?;
        if output.is_success() {
            Ok(output.stdout)
        } else {
            Err(Error::Publish(format!(
                "`{}` failed with {}",
                args.first().copied().unwrap_or("git"),
                output.diagnostic()
            )))
        }
    }
}
