//! In-place generation of extension sources inside the DSL tree.
//!
//! This is the one stage allowed to write into a fetched tree. While it runs
//! the tree carries [`GENERATION_MARKER`]; the marker is removed only when the
//! nested build succeeds, so an aborted generation stays observable and
//! downstream extraction refuses the tree.

use std::fs;
use std::path::Path;

use tracing::{info, instrument};

use crate::tool::NestedBuild;
use crate::{Error, Result};

/// Marker file present in a tree while generation is incomplete.
pub const GENERATION_MARKER: &str = ".docpipe-generating";

/// Runs the extension-generation sub-target of the DSL project.
#[derive(Debug, Clone)]
pub struct ExtensionCodeGenerator {
    build: NestedBuild,
    tasks: Vec<String>,
}

impl ExtensionCodeGenerator {
    /// Generate by running `tasks` through `build`.
    pub const fn new(build: NestedBuild, tasks: Vec<String>) -> Self {
        Self { build, tasks }
    }

    /// Tasks that will be run.
    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    /// Whether `tree` holds the remains of an unfinished generation.
    pub fn is_incomplete(tree: &Path) -> bool {
        tree.join(GENERATION_MARKER).exists()
    }

    /// Materialize generated sources in `tree`.
    #[instrument(level = "debug", skip(self), fields(tree = %tree.display()))]
    pub async fn generate(&self, tree: &Path) -> Result<()> {
        if !tree.is_dir() {
            return Err(Error::Generation(format!(
                "source tree {} does not exist",
                tree.display()
            )));
        }

        let marker = tree.join(GENERATION_MARKER);
        fs::write(&marker, self.tasks.join(" "))?;

        self.build.run(tree, &self.tasks, &[]).await?;

        fs::remove_file(&marker)?;
        info!(tasks = %self.tasks.join(" "), "Generated extension sources");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, clippy::disallowed_macros)]
mod tests {
    use super::*;
    use crate::tool::{Invocation, ToolOutput, ToolRunner};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Build {
        succeed: bool,
    }

    #[async_trait]
    impl ToolRunner for Build {
        async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
            let dir = invocation.working_dir().unwrap();
            // Generation writes before it can fail
            fs::create_dir_all(dir.join("provider/src/generated")).unwrap();
            fs::write(dir.join("provider/src/generated/Ext.kt"), "fun Project.ext() {}").unwrap();
            Ok(if self.succeed {
                ToolOutput::success("")
            } else {
                ToolOutput::failure(1, "compilation error")
            })
        }
    }

    fn generator(succeed: bool) -> ExtensionCodeGenerator {
        ExtensionCodeGenerator::new(
            NestedBuild::new(Arc::new(Build { succeed }), "gradle"),
            vec![":provider:generateExtensions".to_string()],
        )
    }

    #[tokio::test]
    async fn test_success_clears_marker() {
        let tree = TempDir::new().unwrap();
        generator(true).generate(tree.path()).await.unwrap();
        assert!(!ExtensionCodeGenerator::is_incomplete(tree.path()));
        assert!(tree.path().join("provider/src/generated/Ext.kt").is_file());
    }

    #[tokio::test]
    async fn test_failure_leaves_tree_marked_incomplete() {
        let tree = TempDir::new().unwrap();
        let err = generator(false).generate(tree.path()).await.unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
        assert!(ExtensionCodeGenerator::is_incomplete(tree.path()));
    }

    #[tokio::test]
    async fn test_missing_tree() {
        let tmp = TempDir::new().unwrap();
        let err = generator(true).generate(&tmp.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }
}
