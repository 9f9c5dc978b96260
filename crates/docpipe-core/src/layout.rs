//! Where every artifact lives under the build directory.

use std::path::{Path, PathBuf};

use crate::config::ProjectKey;

/// Name of the state directory holding stamps and bookkeeping files.
pub const STATE_DIR: &str = ".docpipe";

/// Paths of all artifacts, derived from one build directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
    root: PathBuf,
}

impl BuildLayout {
    /// Layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Build directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fetched tree of `project`.
    pub fn clone_dir(&self, project: ProjectKey) -> PathBuf {
        self.root.join("clones").join(project.as_str())
    }

    /// Extracted API sources of `project`.
    pub fn api_sources(&self, project: ProjectKey) -> PathBuf {
        self.root.join("api-sources").join(project.as_str())
    }

    /// Installation image of the host project.
    pub fn install_dir(&self) -> PathBuf {
        self.root.join("install").join(ProjectKey::Host.as_str())
    }

    /// Generated accessor sources.
    pub fn accessors_dir(&self) -> PathBuf {
        self.root.join("generated").join("plugin-accessors")
    }

    /// Single-use scratch project for accessor generation.
    pub fn accessors_scratch(&self) -> PathBuf {
        self.root.join("scratch").join("plugin-accessors")
    }

    /// Extracted versions.
    pub fn versions_file(&self) -> PathBuf {
        self.root.join("versions.json")
    }

    /// Resolved classpath.
    pub fn classpath_file(&self) -> PathBuf {
        self.root.join("classpath.json")
    }

    /// Aggregated output tree.
    pub fn docs_dir(&self) -> PathBuf {
        self.root.join("docs")
    }

    /// Rendered API reference.
    pub fn api_docs_dir(&self) -> PathBuf {
        self.docs_dir().join("api")
    }

    /// Rendered user guide.
    pub fn user_guide_dir(&self) -> PathBuf {
        self.docs_dir().join("userguide")
    }

    /// Local copy of the site that gets pushed.
    pub fn site_dir(&self) -> PathBuf {
        self.root.join("gh-pages")
    }

    /// Bookkeeping directory.
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    /// Per-stage completion stamps.
    pub fn stamps_dir(&self) -> PathBuf {
        self.state_dir().join("stamps")
    }

    /// Record written once extension sources are generated in the DSL tree.
    pub fn extensions_stamp(&self) -> PathBuf {
        self.state_dir().join("generated").join("dsl-extensions.json")
    }

    /// Report of the last passed check.
    pub fn check_report(&self) -> PathBuf {
        self.state_dir().join("check.json")
    }

    /// Record of the last publish.
    pub fn publish_record(&self) -> PathBuf {
        self.state_dir().join("publish.json")
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, clippy::disallowed_macros)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_under_root() {
        let layout = BuildLayout::new("build");
        assert_eq!(layout.clone_dir(ProjectKey::Dsl), Path::new("build/clones/dsl"));
        assert_eq!(layout.api_sources(ProjectKey::Host), Path::new("build/api-sources/host"));
        assert_eq!(layout.install_dir(), Path::new("build/install/host"));
        assert_eq!(
            layout.extensions_stamp(),
            Path::new("build/.docpipe/generated/dsl-extensions.json")
        );
        assert!(layout.api_docs_dir().starts_with(layout.docs_dir()));
    }
}
