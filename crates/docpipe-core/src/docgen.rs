//! Rendering API documentation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument};

use crate::declare::ResolvedClasspath;
use crate::tool::{Invocation, ToolRunner};
use crate::{Error, Result, fsutil};

/// Summary of a rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocs {
    /// Output directory.
    pub dir: PathBuf,
    /// HTML pages produced.
    pub pages: usize,
}

/// Invokes the documentation generator.
///
/// Command line: `<generator> -src <dirs> -classpath <jars> -output <dir>
/// -format <fmt> -module <name> [extra args]`, where lists are joined with
/// the platform path separator.
#[derive(Clone)]
pub struct DocGenerator {
    runner: Arc<dyn ToolRunner>,
    program: String,
    format: String,
    module_name: String,
    extra_args: Vec<String>,
}

impl std::fmt::Debug for DocGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocGenerator")
            .field("program", &self.program)
            .field("format", &self.format)
            .field("module_name", &self.module_name)
            .finish_non_exhaustive()
    }
}

impl DocGenerator {
    /// Create a generator.
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        program: impl Into<String>,
        format: impl Into<String>,
        module_name: impl Into<String>,
        extra_args: Vec<String>,
    ) -> Self {
        Self {
            runner,
            program: program.into(),
            format: format.into(),
            module_name: module_name.into(),
            extra_args,
        }
    }

    /// Stable description for fingerprints.
    pub fn describe(&self) -> String {
        format!(
            "program={};format={};module={};extra={}",
            self.program,
            self.format,
            self.module_name,
            self.extra_args.join(" ")
        )
    }

    /// Render docs for `source_dirs` against `classpath` into `out`.
    #[instrument(level = "debug", skip_all, fields(out = %out.display()))]
    pub async fn generate(
        &self,
        source_dirs: &[PathBuf],
        classpath: &ResolvedClasspath,
        out: &Path,
    ) -> Result<RenderedDocs> {
        if let Some(missing) = source_dirs.iter().find(|d| !d.is_dir()) {
            return Err(Error::DocGen(format!(
                "source directory {} does not exist",
                missing.display()
            )));
        }

        let staging = fsutil::staging_dir_for(out)?;
        let content = staging.path().join("content");

        let invocation = Invocation::new(&self.program)
            .arg("-src")
            .arg(join_paths(source_dirs.iter())?)
            .arg("-classpath")
            .arg(join_paths(classpath.entries.iter().map(|e| &e.path))?)
            .arg("-output")
            .path_arg(&content)
            .arg("-format")
            .arg(&self.format)
            .arg("-module")
            .arg(&self.module_name)
            .args(self.extra_args.iter().cloned());

        let output = self.runner.run(&invocation).await?;
        if !output.is_success() {
            return Err(Error::DocGen(format!(
                "{} failed with {}",
                self.program,
                output.diagnostic()
            )));
        }

        if !fsutil::has_files(&content) {
            return Err(Error::DocGen(format!("{} produced no output", self.program)));
        }
        let pages = fsutil::count_files_with_extension(&content, "html")?;

        fsutil::replace_dir(&content, out)?;
        info!(out = %out.display(), pages, "Rendered API documentation");
        Ok(RenderedDocs {
            dir: out.to_path_buf(),
            pages,
        })
    }
}

fn join_paths<'a>(paths: impl Iterator<Item = &'a PathBuf>) -> Result<String> {
    std::env::join_paths(paths)
        .map(|joined| joined.to_string_lossy().into_owned())
        .map_err(|e| Error::DocGen(format!("cannot build path list: {e}")))
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, clippy::disallowed_macros)]
mod tests {
    use super::*;
    use crate::declare::{ClasspathEntry, DependencyCoordinate};
    use crate::tool::ToolOutput;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Renderer {
        write_pages: bool,
        seen: Mutex<Option<Invocation>>,
    }

    #[async_trait]
    impl ToolRunner for Renderer {
        async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
            *self.seen.lock().unwrap() = Some(invocation.clone());
            let args = invocation.arguments();
            let out = &args[args.iter().position(|a| a == "-output").unwrap() + 1];
            fs::create_dir_all(out).unwrap();
            if self.write_pages {
                fs::write(Path::new(out).join("index.html"), "<html></html>").unwrap();
            }
            Ok(ToolOutput::success(""))
        }
    }

    fn setup() -> (TempDir, Vec<PathBuf>, ResolvedClasspath) {
        let tmp = TempDir::new().unwrap();
        let host = tmp.path().join("api-sources/host");
        let dsl = tmp.path().join("api-sources/dsl");
        fs::create_dir_all(&host).unwrap();
        fs::create_dir_all(&dsl).unwrap();
        let classpath = ResolvedClasspath {
            entries: vec![ClasspathEntry {
                coordinate: DependencyCoordinate::new("g", "a", "1"),
                path: tmp.path().join("a-1.jar"),
            }],
        };
        (tmp, vec![host, dsl], classpath)
    }

    #[tokio::test]
    async fn test_invocation_shape_and_swap() {
        let (tmp, dirs, classpath) = setup();
        let runner = Arc::new(Renderer {
            write_pages: true,
            seen: Mutex::new(None),
        });
        let generator = DocGenerator::new(runner.clone(), "dokka", "html", "kotlin-dsl", vec![]);
        let out = tmp.path().join("docs/api");

        let rendered = generator.generate(&dirs, &classpath, &out).await.unwrap();

        assert_eq!(rendered.pages, 1);
        assert!(out.join("index.html").is_file());
        let seen = runner.seen.lock().unwrap().clone().unwrap();
        let args = seen.arguments();
        assert_eq!(args[0], "-src");
        assert_eq!(
            args[1],
            std::env::join_paths(&dirs).unwrap().to_string_lossy()
        );
        assert_eq!(&args[6..], ["-format", "html", "-module", "kotlin-dsl"]);
    }

    #[tokio::test]
    async fn test_empty_output_is_docgen_error() {
        let (tmp, dirs, classpath) = setup();
        let runner = Arc::new(Renderer {
            write_pages: false,
            seen: Mutex::new(None),
        });
        let generator = DocGenerator::new(runner, "dokka", "html", "kotlin-dsl", vec![]);

        let err = generator
            .generate(&dirs, &classpath, &tmp.path().join("docs/api"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DocGen(ref m) if m.contains("no output")));
        assert!(!tmp.path().join("docs/api").exists());
    }
}
