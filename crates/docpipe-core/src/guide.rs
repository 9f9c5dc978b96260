//! Building the user guide from the host tree.

use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::tool::NestedBuild;
use crate::{Error, Result, fsutil};

/// Summary of a user guide build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGuide {
    /// Output directory.
    pub dir: PathBuf,
    /// Files copied.
    pub files: usize,
}

/// Runs the guide task and copies its output out of the tree.
#[derive(Debug, Clone)]
pub struct UserGuideBuilder {
    build: NestedBuild,
    tasks: Vec<String>,
    output_dir: PathBuf,
}

impl UserGuideBuilder {
    /// Create a builder; `output_dir` is relative to the tree root.
    pub fn new(build: NestedBuild, tasks: Vec<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            build,
            tasks,
            output_dir: output_dir.into(),
        }
    }

    /// Stable description for fingerprints.
    pub fn describe(&self) -> String {
        format!("tasks={};output={}", self.tasks.join(","), self.output_dir.display())
    }

    /// Build the guide from `tree` into `out`.
    #[instrument(level = "debug", skip(self), fields(tree = %tree.display()))]
    pub async fn build_guide(&self, tree: &Path, out: &Path) -> Result<UserGuide> {
        self.build.run(tree, &self.tasks, &[]).await?;

        let rendered = tree.join(&self.output_dir);
        if !fsutil::has_files(&rendered) {
            return Err(Error::Generation(format!(
                "user guide build produced nothing at {}",
                self.output_dir.display()
            )));
        }

        let staging = fsutil::staging_dir_for(out)?;
        let content = staging.path().join("content");
        let files = fsutil::copy_tree(&rendered, &content, &[])?;
        fsutil::replace_dir(&content, out)?;

        info!(out = %out.display(), files, "Built user guide");
        Ok(UserGuide {
            dir: out.to_path_buf(),
            files,
        })
    }
}
