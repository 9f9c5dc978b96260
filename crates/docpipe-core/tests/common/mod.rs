#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic, dead_code)]

//! Scripted stand-ins for git, the nested build, the documentation generator
//! and the publisher, acting on the real filesystem.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docpipe_core::config::{PipelineConfig, ProjectKey, VersionConfig};
use docpipe_core::declare::{CoordinateTemplate, Repository, RepositoryResolver};
use docpipe_core::symbols::{SourceLanguage, public_symbols};
use docpipe_core::tool::{Invocation, ToolOutput, ToolRunner};
use docpipe_core::{DocsPipeline, Result};
use tempfile::TempDir;

pub const HOST_URI: &str = "https://example.test/host.git";
pub const DSL_URI: &str = "https://example.test/dsl.git";

type Files = BTreeMap<String, String>;

/// Failure switches understood by [`FakeTools`].
pub mod fail {
    pub const EXTENSIONS: &str = "extensions";
    pub const INSTALL: &str = "install";
    pub const ACCESSORS: &str = "accessors";
    pub const DOKKA: &str = "dokka";
    pub const USER_GUIDE: &str = "user-guide";
    pub const PUSH: &str = "push";
}

#[derive(Default)]
pub struct FakeTools {
    remotes: Mutex<HashMap<String, HashMap<String, Files>>>,
    clones: Mutex<HashMap<PathBuf, String>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Invocation>>,
    pushes: Mutex<Vec<(String, String)>>,
}

impl FakeTools {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn remote(&self, uri: &str, reference: &str, files: &[(&str, &str)]) {
        let files = files
            .iter()
            .map(|(p, c)| ((*p).to_string(), (*c).to_string()))
            .collect();
        self.remotes
            .lock()
            .unwrap()
            .entry(uri.to_string())
            .or_default()
            .insert(reference.to_string(), files);
    }

    pub fn fail(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    pub fn recover(&self, key: &str) {
        self.failing.lock().unwrap().remove(key);
    }

    fn failing(&self, key: &str) -> bool {
        self.failing.lock().unwrap().contains(key)
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Invocations whose arguments contain `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.arguments().iter().any(|a| a == needle))
            .count()
    }

    pub fn pushes(&self) -> Vec<(String, String)> {
        self.pushes.lock().unwrap().clone()
    }

    fn git(&self, args: &[&str]) -> ToolOutput {
        match args {
            ["clone", "--quiet", "--no-checkout", uri, dest] => {
                if !self.remotes.lock().unwrap().contains_key(*uri) {
                    return ToolOutput::failure(128, format!("fatal: repository '{uri}' not found"));
                }
                fs::create_dir_all(dest).unwrap();
                self.clones
                    .lock()
                    .unwrap()
                    .insert(PathBuf::from(dest), (*uri).to_string());
                ToolOutput::success("")
            },
            ["-C", dir, "checkout", "--quiet", reference] => {
                let uri = self.clones.lock().unwrap().get(Path::new(dir)).cloned();
                let files = uri.and_then(|uri| {
                    self.remotes
                        .lock()
                        .unwrap()
                        .get(&uri)
                        .and_then(|refs| refs.get(*reference))
                        .cloned()
                });
                let Some(files) = files else {
                    return ToolOutput::failure(
                        1,
                        format!("error: pathspec '{reference}' did not match any file(s) known to git"),
                    );
                };
                for (path, content) in files {
                    write(&Path::new(dir).join(path), &content);
                }
                ToolOutput::success("")
            },
            ["-C", _, "rev-parse", "HEAD"] => ToolOutput::success("4b825dc642cb6eb9a060e54bf8d69288fbee4904\n"),
            ["-C", _, "init", ..] | ["-C", _, "add", ..] => ToolOutput::success(""),
            ["-C", _, "-c", .., "commit", "--quiet", "-m", _] => ToolOutput::success(""),
            ["-C", _, "push", "--force", "--quiet", remote, refspec] => {
                if self.failing(fail::PUSH) {
                    return ToolOutput::failure(1, "! [rejected] (permission denied)");
                }
                self.pushes
                    .lock()
                    .unwrap()
                    .push(((*remote).to_string(), (*refspec).to_string()));
                ToolOutput::success("")
            },
            other => panic!("unexpected git invocation {other:?}"),
        }
    }

    fn nested_build(&self, args: &[&str]) -> ToolOutput {
        let ["--project-dir", dir, "--stacktrace", rest @ ..] = args else {
            panic!("unexpected build invocation {args:?}");
        };
        let dir = Path::new(dir);
        let mut output = ToolOutput::success("BUILD SUCCESSFUL");
        for task in rest.iter().filter(|a| !a.starts_with('-')) {
            output = match *task {
                ":provider:generateExtensions" => {
                    write(
                        &dir.join("provider/src/generated/kotlin/org/gradle/kotlin/dsl/GeneratedExtensions.kt"),
                        "package org.gradle.kotlin.dsl\n\nfun Project.generatedHelper() {}\n",
                    );
                    if self.failing(fail::EXTENSIONS) {
                        ToolOutput::failure(1, "> Task :provider:generateExtensions FAILED")
                    } else {
                        output
                    }
                },
                "install" => {
                    if self.failing(fail::INSTALL) {
                        return ToolOutput::failure(1, "> Task :install FAILED");
                    }
                    let target = rest
                        .iter()
                        .find_map(|a| a.strip_prefix("-Pgradle_installPath="))
                        .expect("install path property");
                    write(&Path::new(target).join("bin/gradle"), "#!/bin/sh\n");
                    write(&Path::new(target).join("lib/gradle-core.jar"), "jar");
                    output
                },
                "kotlinDslAccessorsSnapshot" => {
                    if self.failing(fail::ACCESSORS) {
                        return ToolOutput::failure(1, "> Task :kotlinDslAccessorsSnapshot FAILED");
                    }
                    write(
                        &dir.join("build/generated-src/kotlin-dsl-accessors/org/gradle/kotlin/dsl/PluginAccessors.kt"),
                        "package org.gradle.kotlin.dsl\n\nval PluginDependenciesSpec.java: PluginDependencySpec get() = id(\"java\")\n",
                    );
                    output
                },
                ":docs:ktsUserGuideHtml" => {
                    if self.failing(fail::USER_GUIDE) {
                        return ToolOutput::failure(1, "> Task :docs:ktsUserGuideHtml FAILED");
                    }
                    write(
                        &dir.join("subprojects/docs/build/docs/ktsUserGuide/index.html"),
                        "<html><body>Kotlin DSL user guide</body></html>\n",
                    );
                    output
                },
                other => panic!("unexpected task {other}"),
            };
        }
        output
    }

    /// Writes one page per public symbol under `<output>/<module>/`.
    fn dokka(&self, args: &[&str]) -> ToolOutput {
        if self.failing(fail::DOKKA) {
            return ToolOutput::failure(1, "e: compilation of sources failed");
        }
        let value = |flag: &str| {
            let at = args.iter().position(|a| *a == flag).expect("flag present");
            args[at + 1]
        };
        let out = Path::new(value("-output")).join(value("-module"));
        write(&out.join("index.html"), "<html>module</html>\n");

        for src in std::env::split_paths(value("-src")) {
            for file in walk(&src) {
                let Some(language) = SourceLanguage::from_path(&file) else {
                    continue;
                };
                let content = fs::read_to_string(&file).unwrap();
                for symbol in public_symbols(&content, language) {
                    write(
                        &out.join(format!("-{}", kebab(&symbol))).join("index.html"),
                        &format!("<html><body>{symbol}</body></html>\n"),
                    );
                }
            }
        }
        ToolOutput::success("")
    }
}

#[async_trait]
impl ToolRunner for FakeTools {
    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        let args: Vec<&str> = invocation.arguments().iter().map(String::as_str).collect();
        let program = Path::new(invocation.program())
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(match program.as_str() {
            "git" => self.git(&args),
            "gradlew" | "gradle" => self.nested_build(&args),
            "dokka" => self.dokka(&args),
            other => panic!("unexpected program {other}"),
        })
    }
}

pub fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn walk(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return found;
    };
    for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
            found.extend(walk(&path));
        } else {
            found.push(path);
        }
    }
    found.sort();
    found
}

fn kebab(symbol: &str) -> String {
    let mut out = String::new();
    for c in symbol.chars() {
        if c.is_uppercase() {
            if !out.is_empty() {
                out.push('-');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

pub const HOST_R1: &[(&str, &str)] = &[
    ("gradlew", "#!/bin/sh\n"),
    ("gradle/dependencies.gradle", "versions.tool = \"1.2.3\"\nversions.other = \"9\"\n"),
    (
        "subprojects/core/src/main/java/org/gradle/api/Project.java",
        "package org.gradle.api;\n\npublic interface Project {}\n",
    ),
    (
        "subprojects/core/src/main/java/org/gradle/api/internal/ProjectInternal.java",
        "package org.gradle.api.internal;\n\npublic interface ProjectInternal {}\n",
    ),
    (
        "subprojects/core/src/main/java/org/gradle/api/Helper.java",
        "package org.gradle.api;\n\nclass Helper {}\n",
    ),
];

pub const DSL_R2: &[(&str, &str)] = &[
    ("gradlew", "#!/bin/sh\n"),
    ("kotlin-version.txt", "1.1.51\n"),
    (
        "provider/src/main/kotlin/org/gradle/kotlin/dsl/ProjectExtensions.kt",
        "package org.gradle.kotlin.dsl\n\nfun Project.configureDocs() {}\n",
    ),
];

/// A workspace with remotes, a local Maven repository and an accessor template.
pub struct Workspace {
    pub tmp: TempDir,
    pub tools: Arc<FakeTools>,
}

impl Workspace {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let tools = FakeTools::new();
        tools.remote(HOST_URI, "r1", HOST_R1);
        tools.remote(DSL_URI, "r2", DSL_R2);

        let repo = tmp.path().join("repo");
        write(&repo.join("org/example/tool/1.2.3/tool-1.2.3.jar"), "tool jar");
        write(
            &repo.join("org/jetbrains/kotlin/kotlin-stdlib/1.1.51/kotlin-stdlib-1.1.51.jar"),
            "stdlib jar",
        );

        let template = tmp.path().join("template");
        write(&template.join("settings.gradle.kts"), "rootProject.name = \"accessors\"\n");
        write(&template.join("build.gradle.kts"), "plugins {\n    java\n}\n");
        write(&template.join("build/stale.txt"), "left over from an earlier build");

        Self { tmp, tools }
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    pub fn build_dir(&self) -> PathBuf {
        self.root().join("build")
    }

    pub fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.sources.host.uri = HOST_URI.to_string();
        config.sources.host.reference = "r1".to_string();
        config.sources.dsl.uri = DSL_URI.to_string();
        config.sources.dsl.reference = "r2".to_string();
        config.paths.build_dir = self.build_dir();
        config.paths.accessors_project = self.root().join("template");
        config.versions = vec![
            VersionConfig {
                name: "tool".to_string(),
                project: ProjectKey::Host,
                file: PathBuf::from("gradle/dependencies.gradle"),
                marker: Some("versions.tool =".to_string()),
            },
            VersionConfig {
                name: "kotlin".to_string(),
                project: ProjectKey::Dsl,
                file: PathBuf::from("kotlin-version.txt"),
                marker: None,
            },
        ];
        config.dependencies = vec![
            CoordinateTemplate::new("org.example", "tool", "tool"),
            CoordinateTemplate::new("org.jetbrains.kotlin", "kotlin-stdlib", "kotlin"),
        ];
        config.resolution.repositories = vec![self.root().join("repo").to_string_lossy().into_owned()];
        config.resolution.cache_dir = Some(self.root().join("cache"));
        config.publish.remote = "https://example.test/site.git".to_string();
        config
    }

    pub fn pipeline(&self) -> DocsPipeline {
        self.pipeline_with(self.config())
    }

    pub fn pipeline_with(&self, config: PipelineConfig) -> DocsPipeline {
        let repositories: Vec<Repository> = config.repositories().unwrap();
        let resolver = RepositoryResolver::new(repositories, config.cache_dir()).unwrap();
        DocsPipeline::with_collaborators(config, self.tools.clone(), Arc::new(resolver)).unwrap()
    }
}
