//! Pipeline configuration.
//!
//! Configuration is a single TOML file, `docpipe.toml`, looked up in this
//! order:
//!
//! 1. An explicit path (the CLI's `--config`)
//! 2. The `DOCPIPE_CONFIG` environment variable
//! 3. `./docpipe.toml`
//!
//! A missing file means built-in defaults. Every section is optional and
//! falls back to its defaults; relative paths are resolved against the
//! directory holding the file.
//!
//! ## Example
//!
//! ```toml
//! [sources.host]
//! uri = "../gradle"
//! reference = "kotlin-dsl-docs"
//!
//! [paths]
//! build_dir = "build"
//!
//! [[versions]]
//! name = "kotlin"
//! project = "dsl"
//! file = "kotlin-version.txt"
//!
//! [execution]
//! jobs = 2
//! ```
//!
//! A handful of environment variables override the file, so trees can be
//! pointed at local clones without editing it: `DOCPIPE_BUILD_DIR`,
//! `DOCPIPE_HOST_URI`, `DOCPIPE_HOST_REF`, `DOCPIPE_DSL_URI` and
//! `DOCPIPE_DSL_REF`.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::declare::{CoordinateTemplate, Repository};
use crate::version::{FileContents, MarkerLine, VersionSource};
use crate::{Error, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "DOCPIPE_CONFIG";

/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "docpipe.toml";

/// The two fetched projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKey {
    /// The host project providing the core API, installation and user guide.
    Host,
    /// The DSL project providing the extension API.
    Dsl,
}

impl ProjectKey {
    /// Directory-friendly name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Dsl => "dsl",
        }
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Trees to fetch.
    pub sources: SourcesConfig,
    /// Local directories.
    pub paths: PathsConfig,
    /// External programs.
    pub tools: ToolsConfig,
    /// API source filters per project.
    pub api: ApiConfig,
    /// In-tree extension generation.
    pub extensions: ExtensionsConfig,
    /// Host installation.
    pub install: InstallConfig,
    /// Plugin accessor generation.
    pub accessors: AccessorsConfig,
    /// Versions read from the trees.
    pub versions: Vec<VersionConfig>,
    /// Documentation classpath, with versions named by [`VersionConfig::name`].
    pub dependencies: Vec<CoordinateTemplate>,
    /// Where classpath jars come from.
    pub resolution: ResolutionConfig,
    /// API documentation rendering.
    pub docs: DocsConfig,
    /// User guide rendering.
    pub user_guide: UserGuideConfig,
    /// Site publishing.
    pub publish: PublishConfig,
    /// Scheduling.
    pub execution: ExecutionConfig,
}

/// A tree pinned at a reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Repository URI or local clone path.
    pub uri: String,
    /// Branch, tag or commit.
    pub reference: String,
}

impl SourceConfig {
    fn new(uri: &str, reference: &str) -> Self {
        Self {
            uri: uri.to_string(),
            reference: reference.to_string(),
        }
    }
}

/// Both fetched trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcesConfig {
    /// Host project.
    pub host: SourceConfig,
    /// DSL project.
    pub dsl: SourceConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            host: SourceConfig::new("https://github.com/gradle/gradle.git", "kotlin-dsl-docs"),
            dsl: SourceConfig::new("https://github.com/gradle/kotlin-dsl.git", "v0.12.0"),
        }
    }
}

impl SourcesConfig {
    /// Source of `project`.
    pub const fn get(&self, project: ProjectKey) -> &SourceConfig {
        match project {
            ProjectKey::Host => &self.host,
            ProjectKey::Dsl => &self.dsl,
        }
    }
}

/// Local directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Root of every derived artifact.
    pub build_dir: PathBuf,
    /// Template project used for accessor generation.
    pub accessors_project: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("build"),
            accessors_project: PathBuf::from("build-with-core-plugins"),
        }
    }
}

/// External programs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    /// Version control client.
    pub git: String,
    /// Build launcher run inside fetched trees; relative paths with a
    /// separator resolve against the tree.
    pub build_launcher: String,
    /// Documentation generator.
    pub doc_generator: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            git: "git".to_string(),
            build_launcher: "./gradlew".to_string(),
            doc_generator: "dokka".to_string(),
        }
    }
}

/// Which files of a tree are API sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiFilterConfig {
    /// Source root patterns; `*` matches one segment.
    pub roots: Vec<String>,
    /// Accepted file extensions.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Package path segments that exclude a file.
    #[serde(default = "default_exclude_segments")]
    pub exclude_segments: Vec<String>,
}

fn default_extensions() -> Vec<String> {
    strings(&["java", "kt", "groovy"])
}

fn default_exclude_segments() -> Vec<String> {
    strings(&["internal"])
}

impl ApiFilterConfig {
    fn with_roots(roots: &[&str]) -> Self {
        Self {
            roots: strings(roots),
            extensions: default_extensions(),
            exclude_segments: default_exclude_segments(),
        }
    }
}

/// API filters for both projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    /// Host project filter.
    pub host: ApiFilterConfig,
    /// DSL project filter.
    pub dsl: ApiFilterConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: ApiFilterConfig::with_roots(&[
                "subprojects/*/src/main/java",
                "subprojects/*/src/main/groovy",
                "subprojects/*/src/main/kotlin",
            ]),
            dsl: ApiFilterConfig::with_roots(&[
                "provider/src/main/kotlin",
                "provider/src/generated/kotlin",
                "tooling-models/src/main/kotlin",
            ]),
        }
    }
}

impl ApiConfig {
    /// Filter of `project`.
    pub const fn get(&self, project: ProjectKey) -> &ApiFilterConfig {
        match project {
            ProjectKey::Host => &self.host,
            ProjectKey::Dsl => &self.dsl,
        }
    }
}

/// Extension generation in the DSL tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtensionsConfig {
    /// Build tasks that generate the sources.
    pub tasks: Vec<String>,
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            tasks: strings(&[":provider:generateExtensions"]),
        }
    }
}

/// Host installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallConfig {
    /// Build tasks producing the image.
    pub tasks: Vec<String>,
    /// Project property receiving the target directory.
    pub install_property: String,
    /// Launcher relative to the installation root.
    pub launcher: PathBuf,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            tasks: strings(&["install"]),
            install_property: "gradle_installPath".to_string(),
            launcher: PathBuf::from("bin/gradle"),
        }
    }
}

/// Plugin accessor generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessorsConfig {
    /// Build tasks run in the scratch project.
    pub tasks: Vec<String>,
    /// Generated sources relative to the scratch project.
    pub generated_dir: PathBuf,
}

impl Default for AccessorsConfig {
    fn default() -> Self {
        Self {
            tasks: strings(&["kotlinDslAccessorsSnapshot"]),
            generated_dir: PathBuf::from("build/generated-src/kotlin-dsl-accessors"),
        }
    }
}

/// One version to read from a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionConfig {
    /// Name used by dependency templates.
    pub name: String,
    /// Tree holding the file.
    pub project: ProjectKey,
    /// File relative to the tree root.
    pub file: PathBuf,
    /// Line prefix of the assignment; without one the file's first line is
    /// the version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
}

impl VersionConfig {
    /// The extraction rule this entry describes.
    pub fn source(&self) -> Box<dyn VersionSource> {
        match &self.marker {
            Some(marker) => Box::new(MarkerLine {
                file: self.file.clone(),
                marker: marker.clone(),
            }),
            None => Box::new(FileContents {
                file: self.file.clone(),
            }),
        }
    }
}

/// Classpath resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolutionConfig {
    /// Maven-layout repositories in lookup order: `http(s)` URLs or paths.
    pub repositories: Vec<String>,
    /// Download cache; defaults to the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        let mut repositories = Vec::new();
        if let Some(base) = directories::BaseDirs::new() {
            repositories.push(
                base.home_dir()
                    .join(".m2")
                    .join("repository")
                    .to_string_lossy()
                    .into_owned(),
            );
        }
        repositories.push("https://repo.maven.apache.org/maven2".to_string());
        Self {
            repositories,
            cache_dir: None,
        }
    }
}

/// API documentation rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocsConfig {
    /// Output format passed to the generator.
    pub format: String,
    /// Module name shown in the rendered docs.
    pub module_name: String,
    /// Extra generator arguments.
    pub extra_args: Vec<String>,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            format: "html".to_string(),
            module_name: "kotlin-dsl".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// User guide rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UserGuideConfig {
    /// Build tasks rendering the guide.
    pub tasks: Vec<String>,
    /// Rendered guide relative to the host tree.
    pub output_dir: PathBuf,
}

impl Default for UserGuideConfig {
    fn default() -> Self {
        Self {
            tasks: strings(&[":docs:ktsUserGuideHtml"]),
            output_dir: PathBuf::from("subprojects/docs/build/docs/ktsUserGuide"),
        }
    }
}

/// Site publishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    /// Push target.
    pub remote: String,
    /// Branch replaced on the remote.
    pub branch: String,
    /// Commit message.
    pub message: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            remote: "https://github.com/gradle/kotlin-dsl-docs.git".to_string(),
            branch: "gh-pages".to_string(),
            message: "Publish documentation".to_string(),
        }
    }
}

/// Scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Stages allowed to run at once.
    pub jobs: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { jobs: 4 }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sources: SourcesConfig::default(),
            paths: PathsConfig::default(),
            tools: ToolsConfig::default(),
            api: ApiConfig::default(),
            extensions: ExtensionsConfig::default(),
            install: InstallConfig::default(),
            accessors: AccessorsConfig::default(),
            versions: vec![
                VersionConfig {
                    name: "groovy".to_string(),
                    project: ProjectKey::Host,
                    file: PathBuf::from("gradle/dependencies.gradle"),
                    marker: Some("versions.groovy =".to_string()),
                },
                VersionConfig {
                    name: "kotlin".to_string(),
                    project: ProjectKey::Dsl,
                    file: PathBuf::from("kotlin-version.txt"),
                    marker: None,
                },
            ],
            dependencies: vec![
                CoordinateTemplate::new("org.codehaus.groovy", "groovy-all", "groovy"),
                CoordinateTemplate::new("org.jetbrains.kotlin", "kotlin-stdlib", "kotlin"),
                CoordinateTemplate::new("org.jetbrains.kotlin", "kotlin-reflect", "kotlin"),
                CoordinateTemplate::new("org.jetbrains.kotlin", "kotlin-compiler-embeddable", "kotlin"),
            ],
            resolution: ResolutionConfig::default(),
            docs: DocsConfig::default(),
            user_guide: UserGuideConfig::default(),
            publish: PublishConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration and apply environment overrides.
    ///
    /// `explicit` wins over `DOCPIPE_CONFIG`, which wins over
    /// `./docpipe.toml`. An explicitly named file must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match named {
            Some(path) => Self::load_from(&path)?,
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.is_file() {
                    Self::load_from(local)?
                } else {
                    debug!("No configuration file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path`, resolving relative paths against its directory.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        debug!(path = %path.display(), "Loading configuration");
        Self::from_toml(&content, base)
    }

    /// Parse `content`, resolving relative paths against `base`.
    pub fn from_toml(content: &str, base: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;
        config.resolve_paths(base);
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        if base.as_os_str().is_empty() {
            return;
        }
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.paths.build_dir);
        resolve(&mut self.paths.accessors_project);
        if let Some(cache) = self.resolution.cache_dir.as_mut() {
            resolve(cache);
        }
        for repository in &mut self.resolution.repositories {
            if !is_url(repository) && Path::new(repository.as_str()).is_relative() {
                *repository = base.join(repository.as_str()).to_string_lossy().into_owned();
            }
        }
        for source in [&mut self.sources.host, &mut self.sources.dsl] {
            if is_relative_local(&source.uri) {
                source.uri = base.join(&source.uri).to_string_lossy().into_owned();
            }
        }
    }

    /// Apply `DOCPIPE_*` overrides using `lookup` to read variables.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("DOCPIPE_BUILD_DIR") {
            self.paths.build_dir = PathBuf::from(dir);
        }
        let targets = [
            ("DOCPIPE_HOST_URI", &mut self.sources.host.uri),
            ("DOCPIPE_HOST_REF", &mut self.sources.host.reference),
            ("DOCPIPE_DSL_URI", &mut self.sources.dsl.uri),
            ("DOCPIPE_DSL_REF", &mut self.sources.dsl.reference),
        ];
        for (key, target) in targets {
            if let Some(value) = lookup(key) {
                debug!(key, "Applying environment override");
                *target = value;
            }
        }
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        for project in [ProjectKey::Host, ProjectKey::Dsl] {
            let source = self.sources.get(project);
            if source.uri.trim().is_empty() {
                return Err(Error::Config(format!("sources.{project}.uri is empty")));
            }
            if source.reference.trim().is_empty() {
                return Err(Error::Config(format!("sources.{project}.reference is empty")));
            }
            if self.api.get(project).roots.is_empty() {
                return Err(Error::Config(format!("api.{project}.roots is empty")));
            }
        }

        let task_lists = [
            ("extensions.tasks", &self.extensions.tasks),
            ("install.tasks", &self.install.tasks),
            ("accessors.tasks", &self.accessors.tasks),
            ("user_guide.tasks", &self.user_guide.tasks),
        ];
        for (name, tasks) in task_lists {
            if tasks.is_empty() {
                return Err(Error::Config(format!("{name} is empty")));
            }
        }

        let mut names = BTreeSet::new();
        for version in &self.versions {
            if !names.insert(version.name.as_str()) {
                return Err(Error::Config(format!(
                    "version '{}' is defined more than once",
                    version.name
                )));
            }
        }
        for template in &self.dependencies {
            if !names.contains(template.version.as_str()) {
                return Err(Error::Config(format!(
                    "dependency {}:{} uses unknown version '{}'",
                    template.group, template.artifact, template.version
                )));
            }
        }

        if self.execution.jobs == 0 {
            return Err(Error::Config("execution.jobs must be at least 1".into()));
        }
        self.repositories().map(|_| ())
    }

    /// Parsed repositories.
    pub fn repositories(&self) -> Result<Vec<Repository>> {
        self.resolution
            .repositories
            .iter()
            .map(|spec| Repository::parse(spec))
            .collect()
    }

    /// Download cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.resolution.cache_dir.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("dev", "docpipe", "docpipe").map_or_else(
                || self.paths.build_dir.join("repository-cache"),
                |dirs| dirs.data_dir().join("repository"),
            )
        })
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn is_url(spec: &str) -> bool {
    spec.contains("://")
}

/// Local relative clone URIs, e.g. `../gradle`; scp-style `host:path` is left alone.
fn is_relative_local(uri: &str) -> bool {
    !is_url(uri) && !uri.contains(':') && Path::new(uri).is_relative()
}
