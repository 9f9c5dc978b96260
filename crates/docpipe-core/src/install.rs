//! Building an installation image of the host project.

use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::tool::NestedBuild;
use crate::{Error, Result, fsutil};

/// A usable installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    /// Installation root.
    pub dir: PathBuf,
    /// Launcher inside the root.
    pub launcher: PathBuf,
}

/// Runs the host's install task into a staging directory and swaps the
/// image into place once its launcher exists.
#[derive(Debug, Clone)]
pub struct InstallationBuilder {
    build: NestedBuild,
    tasks: Vec<String>,
    install_property: String,
    launcher: PathBuf,
}

impl InstallationBuilder {
    /// Create a builder.
    ///
    /// `install_property` names the project property receiving the target
    /// directory (passed as `-P<property>=<dir>`); `launcher` is relative to
    /// the installation root.
    pub fn new(
        build: NestedBuild,
        tasks: Vec<String>,
        install_property: impl Into<String>,
        launcher: impl Into<PathBuf>,
    ) -> Self {
        Self {
            build,
            tasks,
            install_property: install_property.into(),
            launcher: launcher.into(),
        }
    }

    /// Launcher path relative to an installation root.
    pub fn launcher(&self) -> &Path {
        &self.launcher
    }

    /// Stable description for fingerprints.
    pub fn describe(&self) -> String {
        format!(
            "tasks={};property={};launcher={}",
            self.tasks.join(","),
            self.install_property,
            self.launcher.display()
        )
    }

    /// Install from `tree` into `install_dir`.
    #[instrument(level = "debug", skip(self), fields(tree = %tree.display()))]
    pub async fn install(&self, tree: &Path, install_dir: &Path) -> Result<Installation> {
        let staging = fsutil::staging_dir_for(install_dir)?;
        let image = staging.path().join("image");
        let property = format!("-P{}={}", self.install_property, image.display());

        self.build.run(tree, &self.tasks, &[property]).await?;

        if !image.join(&self.launcher).is_file() {
            return Err(Error::Generation(format!(
                "installation image has no launcher at {}",
                self.launcher.display()
            )));
        }

        fsutil::replace_dir(&image, install_dir)?;
        info!(dir = %install_dir.display(), "Installation ready");
        Ok(Installation {
            dir: install_dir.to_path_buf(),
            launcher: install_dir.join(&self.launcher),
        })
    }
}
