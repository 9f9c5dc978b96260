//! Generating accessor sources for built-in plugins.
//!
//! A template project applying the core plugins is copied into a scratch
//! directory and built with the freshly installed launcher. The scratch
//! directory is single-use: it is locked, cleaned before use and removed
//! afterwards whatever the outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::fsutil::{self, DirLock};
use crate::tool::{NestedBuild, ToolRunner};
use crate::{Error, Result};

/// Scripts that make a directory a buildable project.
const PROJECT_SCRIPTS: &[&str] = &[
    "settings.gradle.kts",
    "settings.gradle",
    "build.gradle.kts",
    "build.gradle",
];

/// Template outputs never copied into scratch.
pub const TEMPLATE_OUTPUTS: &[&str] = &["build", ".gradle"];

/// Summary of generated accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessorSources {
    /// Output directory.
    pub dir: PathBuf,
    /// Files copied.
    pub files: usize,
}

/// Drives the accessor snapshot build.
#[derive(Clone)]
pub struct AccessorGenerator {
    runner: Arc<dyn ToolRunner>,
    template: PathBuf,
    launcher: PathBuf,
    tasks: Vec<String>,
    generated_dir: PathBuf,
}

impl std::fmt::Debug for AccessorGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessorGenerator")
            .field("template", &self.template)
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}

impl AccessorGenerator {
    /// Create a generator.
    ///
    /// `launcher` is relative to the installation root and `generated_dir`
    /// relative to the scratch project.
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        template: impl Into<PathBuf>,
        launcher: impl Into<PathBuf>,
        tasks: Vec<String>,
        generated_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            template: template.into(),
            launcher: launcher.into(),
            tasks,
            generated_dir: generated_dir.into(),
        }
    }

    /// Template project location.
    pub fn template(&self) -> &Path {
        &self.template
    }

    /// Stable description for fingerprints. Includes the template content.
    pub fn describe(&self) -> Result<String> {
        let template = if self.template.is_dir() {
            let files = fsutil::walk_files(&self.template, TEMPLATE_OUTPUTS)?;
            let fp = files.iter().try_fold(crate::fingerprint::Fingerprint::new(), |fp, f| {
                crate::fingerprint::hash_file(&f.path)
                    .map(|h| fp.field(&f.relative.to_string_lossy(), &h))
            })?;
            fp.finish()
        } else {
            "absent".to_string()
        };
        Ok(format!(
            "tasks={};generated={};template={template}",
            self.tasks.join(","),
            self.generated_dir.display()
        ))
    }

    /// Generate accessors using the installation at `installation`.
    #[instrument(level = "debug", skip(self), fields(scratch = %scratch.display()))]
    pub async fn generate(&self, installation: &Path, scratch: &Path, out: &Path) -> Result<AccessorSources> {
        let launcher = installation.join(&self.launcher);
        if !launcher.is_file() {
            return Err(Error::Generation(format!(
                "installation at {} cannot start: no launcher at {}",
                installation.display(),
                self.launcher.display()
            )));
        }
        if !self.template.is_dir() || !PROJECT_SCRIPTS.iter().any(|s| self.template.join(s).is_file()) {
            return Err(Error::Generation(format!(
                "scratch project template {} has no settings or build script",
                self.template.display()
            )));
        }

        let Some(_lock) = DirLock::try_acquire(scratch)? else {
            return Err(Error::Generation(format!(
                "scratch directory {} is in use by another run",
                scratch.display()
            )));
        };

        fsutil::remove_if_exists(scratch)?;
        let result = self.generate_in(&launcher, scratch, out).await;
        match (result, fsutil::remove_if_exists(scratch)) {
            (Ok(sources), Ok(_)) => Ok(sources),
            (Ok(_), Err(cleanup)) => Err(cleanup),
            (Err(e), cleanup) => {
                if let Err(cleanup) = cleanup {
                    warn!(scratch = %scratch.display(), error = %cleanup, "Failed to remove scratch directory");
                }
                Err(e)
            },
        }
    }

    async fn generate_in(&self, launcher: &Path, scratch: &Path, out: &Path) -> Result<AccessorSources> {
        fsutil::copy_tree(&self.template, scratch, TEMPLATE_OUTPUTS)?;

        let build = NestedBuild::new(Arc::clone(&self.runner), launcher.to_string_lossy());
        build.run(scratch, &self.tasks, &[]).await?;

        let generated = scratch.join(&self.generated_dir);
        if !generated.is_dir() {
            return Err(Error::Generation(format!(
                "accessor build produced nothing at {}",
                self.generated_dir.display()
            )));
        }

        let staging = fsutil::staging_dir_for(out)?;
        let content = staging.path().join("content");
        let files = fsutil::copy_tree(&generated, &content, &[])?;
        fsutil::replace_dir(&content, out)?;

        info!(out = %out.display(), files, "Generated plugin accessors");
        Ok(AccessorSources {
            dir: out.to_path_buf(),
            files,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, clippy::disallowed_macros)]
mod tests {
    use super::*;
    use crate::tool::{Invocation, ToolOutput};
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    /// Writes one accessor file derived from the scratch project's scripts.
    struct Snapshot {
        produce: bool,
    }

    #[async_trait]
    impl ToolRunner for Snapshot {
        async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
            let dir = invocation.working_dir().unwrap();
            assert!(!dir.join("build/stale.txt").exists(), "template outputs leaked into scratch");
            if !self.produce {
                return Ok(ToolOutput::success(""));
            }
            let out = dir.join("build/generated-src/kotlin-dsl-accessors/org/gradle/kotlin/dsl");
            fs::create_dir_all(&out).unwrap();
            let script = fs::read_to_string(dir.join("build.gradle.kts")).unwrap();
            fs::write(out.join("Accessors.kt"), format!("// from {}\nfun Project.java() {{}}\n", script.len())).unwrap();
            Ok(ToolOutput::success(""))
        }
    }

    struct Fixture {
        tmp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let template = tmp.path().join("build-with-core-plugins");
            fs::create_dir_all(template.join("build")).unwrap();
            fs::write(template.join("build.gradle.kts"), "plugins { java }\n").unwrap();
            fs::write(template.join("build/stale.txt"), "stale").unwrap();
            let install = tmp.path().join("install/host/bin");
            fs::create_dir_all(&install).unwrap();
            fs::write(install.join("gradle"), "#!/bin/sh").unwrap();
            Self { tmp }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.tmp.path().join(rel)
        }

        fn generator(&self, produce: bool) -> AccessorGenerator {
            AccessorGenerator::new(
                Arc::new(Snapshot { produce }),
                self.path("build-with-core-plugins"),
                "bin/gradle",
                vec!["kotlinDslAccessorsSnapshot".to_string()],
                "build/generated-src/kotlin-dsl-accessors",
            )
        }
    }

    #[tokio::test]
    async fn test_generate_copies_output_and_removes_scratch() {
        let fx = Fixture::new();
        let scratch = fx.path("scratch/plugin-accessors");
        let out = fx.path("generated/plugin-accessors");

        let sources = fx
            .generator(true)
            .generate(&fx.path("install/host"), &scratch, &out)
            .await
            .unwrap();

        assert_eq!(sources.files, 1);
        assert!(out.join("org/gradle/kotlin/dsl/Accessors.kt").is_file());
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn test_missing_output_is_error_and_scratch_still_removed() {
        let fx = Fixture::new();
        let scratch = fx.path("scratch/plugin-accessors");

        let err = fx
            .generator(false)
            .generate(&fx.path("install/host"), &scratch, &fx.path("out"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Generation(ref m) if m.contains("produced nothing")));
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn test_installation_without_launcher_cannot_start() {
        let fx = Fixture::new();
        let err = fx
            .generator(true)
            .generate(&fx.path("nowhere"), &fx.path("scratch"), &fx.path("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Generation(ref m) if m.contains("cannot start")));
    }

    #[tokio::test]
    async fn test_malformed_template_is_rejected() {
        let fx = Fixture::new();
        fs::remove_file(fx.path("build-with-core-plugins/build.gradle.kts")).unwrap();
        let err = fx
            .generator(true)
            .generate(&fx.path("install/host"), &fx.path("scratch"), &fx.path("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Generation(ref m) if m.contains("no settings or build script")));
    }

    #[test]
    fn test_describe_tracks_template_content() {
        let fx = Fixture::new();
        let before = fx.generator(true).describe().unwrap();
        fs::write(fx.path("build-with-core-plugins/build.gradle.kts"), "plugins { application }\n").unwrap();
        assert_ne!(fx.generator(true).describe().unwrap(), before);
    }
}
