//! The documentation pipeline: a fixed graph of stages plus lifecycle commands.
//!
//! Two trees are fetched. The host tree feeds API extraction, the
//! installation (and through it the plugin accessors) and the user guide. The
//! DSL tree first gets its extension sources generated in place, then feeds
//! API extraction. Versions read from both trees pick the classpath. The API
//! reference converges on all of these, while the user guide is an
//! independent branch; both meet again when the site is staged.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::accessors::{AccessorGenerator, TEMPLATE_OUTPUTS};
use crate::api::{ApiFilter, ApiSourceExtractor};
use crate::config::{PipelineConfig, ProjectKey};
use crate::declare::{RepositoryResolver, Resolver};
use crate::docgen::DocGenerator;
use crate::extensions::ExtensionCodeGenerator;
use crate::fetch::SourceFetcher;
use crate::fsutil;
use crate::graph::{ArtifactKind, PipelineGraph, PipelineGraphBuilder, StageId, StageSpec};
use crate::guide::UserGuideBuilder;
use crate::install::InstallationBuilder;
use crate::layout::BuildLayout;
use crate::orchestrator::{Orchestrator, RunReport, StageReport};
use crate::publish::{CheckGate, OutputTree, Publisher};
use crate::stage::StageState;
use crate::stages::{
    AccessorsStage, ApiDocsStage, ApiSourcesStage, CheckDocsStage, CloneStage, DeclareStage,
    ExtensionsStage, InstallStage, PublishStage, StageSiteStage, UserGuideStage, VersionInput,
    VersionsStage,
};
use crate::stamps::StampStore;
use crate::tool::{NestedBuild, ProcessRunner, ToolRunner};
use crate::{Error, Result};

/// Stage names.
pub mod names {
    /// Fetch the host tree.
    pub const CLONE_HOST: &str = "clone-host";
    /// Fetch the DSL tree.
    pub const CLONE_DSL: &str = "clone-dsl";
    /// Extract host API sources.
    pub const HOST_API_SOURCES: &str = "host-api-sources";
    /// Generate extension sources in the DSL tree.
    pub const DSL_EXTENSIONS: &str = "dsl-extensions";
    /// Extract DSL API sources.
    pub const DSL_API_SOURCES: &str = "dsl-api-sources";
    /// Build the host installation.
    pub const INSTALL_HOST: &str = "install-host";
    /// Generate plugin accessors.
    pub const PLUGIN_ACCESSORS: &str = "plugin-accessors";
    /// Read versions from the trees.
    pub const EXTRACT_VERSIONS: &str = "extract-versions";
    /// Resolve the documentation classpath.
    pub const DECLARE_DEPENDENCIES: &str = "declare-dependencies";
    /// Render the API reference.
    pub const API_DOCS: &str = "api-docs";
    /// Render the user guide.
    pub const USER_GUIDE: &str = "user-guide";
    /// Verify the API reference.
    pub const CHECK_API_DOCS: &str = "check-api-docs";
    /// Copy the output tree into the site directory.
    pub const STAGE_SITE: &str = "stage-site";
    /// Push the site.
    pub const PUBLISH_SITE: &str = "publish-site";
}

/// What `clean` removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanScope {
    /// Derived artifacts, scratch and bookkeeping; fetched trees stay.
    #[default]
    Derived,
    /// Everything, including fetched trees.
    All,
}

/// Paths removed by `clean`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    /// Removed files and directories.
    pub removed: Vec<PathBuf>,
}

/// An artifact as shown by [`DocsPipeline::describe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactDescription {
    /// Artifact name.
    pub name: String,
    /// Location.
    pub path: PathBuf,
    /// Kind.
    pub kind: ArtifactKind,
}

/// A stage as shown by [`DocsPipeline::describe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageDescription {
    /// Stage name.
    pub name: String,
    /// Whether the stage skips up-to-date checks.
    pub always_run: bool,
    /// Inputs.
    pub consumes: Vec<ArtifactDescription>,
    /// Outputs.
    pub produces: Vec<ArtifactDescription>,
}

/// The assembled pipeline for one configuration.
#[derive(Debug)]
pub struct DocsPipeline {
    config: PipelineConfig,
    layout: BuildLayout,
    graph: Arc<PipelineGraph>,
    gate: Arc<CheckGate>,
    orchestrator: Orchestrator,
}

impl DocsPipeline {
    /// Pipeline using real processes and repository resolution.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let resolver = RepositoryResolver::new(config.repositories()?, config.cache_dir())?;
        Self::with_collaborators(config, Arc::new(ProcessRunner), Arc::new(resolver))
    }

    /// Pipeline with substituted tool runner and resolver.
    pub fn with_collaborators(
        config: PipelineConfig,
        runner: Arc<dyn ToolRunner>,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Self> {
        config.validate()?;
        let layout = BuildLayout::new(&config.paths.build_dir);
        let gate = Arc::new(CheckGate::new());
        let graph = Arc::new(build_graph(&config, &layout, &runner, resolver, &gate)?);
        let orchestrator = Orchestrator::new(Arc::clone(&graph), StampStore::new(layout.stamps_dir()))
            .with_jobs(config.execution.jobs);

        Ok(Self {
            config,
            layout,
            graph,
            gate,
            orchestrator,
        })
    }

    /// The validated graph.
    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    /// Artifact locations.
    pub const fn layout(&self) -> &BuildLayout {
        &self.layout
    }

    /// Configuration in use.
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the named stages and their dependencies.
    pub async fn run_stages(&self, stages: &[&str]) -> Result<RunReport> {
        let targets = stages
            .iter()
            .map(|name| {
                self.graph
                    .find(name)
                    .ok_or_else(|| Error::Graph(format!("unknown stage '{name}'")))
            })
            .collect::<Result<Vec<StageId>>>()?;
        Ok(self.orchestrator.run(&targets).await)
    }

    /// Build the API reference and the user guide.
    pub async fn assemble(&self) -> Result<RunReport> {
        self.run_stages(&[names::API_DOCS, names::USER_GUIDE]).await
    }

    /// Assemble and verify the API reference.
    pub async fn check(&self) -> Result<RunReport> {
        self.run_stages(&[names::API_DOCS, names::USER_GUIDE, names::CHECK_API_DOCS])
            .await
    }

    /// Assemble and stage the site locally.
    pub async fn prepare_publish(&self) -> Result<RunReport> {
        self.run_stages(&[names::STAGE_SITE]).await
    }

    /// Check, then stage and push the site.
    ///
    /// When the check does not pass nothing is staged or pushed; the report
    /// carries the check's failures plus a `publish-site` entry failed with
    /// the guard error.
    pub async fn publish(&self) -> Result<RunReport> {
        let mut report = self.check().await?;
        if !report.is_success() || self.gate.proof().is_none() {
            warn!("Documentation check did not pass, refusing to publish");
            let guard = Error::PublishGuard;
            report.stages.push(StageReport {
                stage: names::PUBLISH_SITE.to_string(),
                state: StageState::Failed,
                up_to_date: false,
                duration_ms: 0,
                error: Some(guard.to_string()),
                category: Some(guard.category().to_string()),
                blocked_by: None,
            });
            return Ok(report);
        }

        let published = self.run_stages(&[names::PUBLISH_SITE]).await?;
        // Stages shared with the check run are reported once.
        let fresh: Vec<StageReport> = published
            .stages
            .into_iter()
            .filter(|s| report.get(&s.stage).is_none())
            .collect();
        report.extend(RunReport { stages: fresh });
        Ok(report)
    }

    /// Remove artifacts according to `scope`.
    pub fn clean(&self, scope: CleanScope) -> Result<CleanReport> {
        let mut targets: Vec<PathBuf> = Vec::new();
        for artifact in self.graph.artifacts() {
            let path = artifact.path().to_path_buf();
            match artifact.kind() {
                ArtifactKind::SourceTree => {
                    if scope == CleanScope::All {
                        targets.push(fsutil::lock_path(&path));
                        targets.push(path);
                    }
                },
                ArtifactKind::Scratch => {
                    targets.push(fsutil::lock_path(&path));
                    targets.push(path);
                },
                ArtifactKind::Directory | ArtifactKind::File => targets.push(path),
            }
        }
        targets.push(self.layout.state_dir());
        for output in TEMPLATE_OUTPUTS {
            targets.push(self.config.paths.accessors_project.join(output));
        }

        let mut report = CleanReport::default();
        for target in targets {
            if fsutil::remove_if_exists(&target)? {
                report.removed.push(target);
            }
        }
        info!(removed = report.removed.len(), ?scope, "Cleaned build directory");
        Ok(report)
    }

    /// Stages with their inputs and outputs, in execution order.
    pub fn describe(&self) -> Vec<StageDescription> {
        let artifact = |id| {
            let a = self.graph.artifact(id);
            ArtifactDescription {
                name: a.name().to_string(),
                path: a.path().to_path_buf(),
                kind: a.kind(),
            }
        };
        self.graph
            .topological_order()
            .iter()
            .map(|&id| {
                let node = self.graph.stage(id);
                StageDescription {
                    name: node.name().to_string(),
                    always_run: node.stage().always_run(),
                    consumes: node.consumes().iter().map(|&a| artifact(a)).collect(),
                    produces: node.produces().iter().map(|&a| artifact(a)).collect(),
                }
            })
            .collect()
    }
}

fn build_graph(
    config: &PipelineConfig,
    layout: &BuildLayout,
    runner: &Arc<dyn ToolRunner>,
    resolver: Arc<dyn Resolver>,
    gate: &Arc<CheckGate>,
) -> Result<PipelineGraph> {
    let tools = &config.tools;
    let fetcher = SourceFetcher::new(Arc::clone(runner), &tools.git);
    let nested = NestedBuild::new(Arc::clone(runner), &tools.build_launcher);
    let publisher = Publisher::new(
        Arc::clone(runner),
        &tools.git,
        &config.publish.remote,
        &config.publish.branch,
        &config.publish.message,
    );
    let extractor = |project: ProjectKey| {
        let filter = config.api.get(project);
        ApiSourceExtractor::new(ApiFilter::new(
            &filter.roots,
            &filter.extensions,
            &filter.exclude_segments,
        ))
    };

    let mut g = PipelineGraphBuilder::new();
    let host_tree = g.artifact("host-tree", layout.clone_dir(ProjectKey::Host), ArtifactKind::SourceTree);
    let dsl_tree = g.artifact("dsl-tree", layout.clone_dir(ProjectKey::Dsl), ArtifactKind::SourceTree);
    let host_api = g.artifact(
        "host-api-sources",
        layout.api_sources(ProjectKey::Host),
        ArtifactKind::Directory,
    );
    let extensions = g.artifact("dsl-extensions", layout.extensions_stamp(), ArtifactKind::File);
    let dsl_api = g.artifact(
        "dsl-api-sources",
        layout.api_sources(ProjectKey::Dsl),
        ArtifactKind::Directory,
    );
    let installation = g.artifact("host-installation", layout.install_dir(), ArtifactKind::Directory);
    let accessors = g.artifact("plugin-accessors", layout.accessors_dir(), ArtifactKind::Directory);
    let scratch = g.artifact(
        "plugin-accessors-scratch",
        layout.accessors_scratch(),
        ArtifactKind::Scratch,
    );
    let versions = g.artifact("versions", layout.versions_file(), ArtifactKind::File);
    let classpath = g.artifact("classpath", layout.classpath_file(), ArtifactKind::File);
    let api_docs = g.artifact("api-docs", layout.api_docs_dir(), ArtifactKind::Directory);
    let user_guide = g.artifact("user-guide", layout.user_guide_dir(), ArtifactKind::Directory);
    let check_report = g.artifact("check-report", layout.check_report(), ArtifactKind::File);
    let site = g.artifact("site", layout.site_dir(), ArtifactKind::Directory);
    let publish_record = g.artifact("publish-record", layout.publish_record(), ArtifactKind::File);

    let documented = vec![
        host_api.path().to_path_buf(),
        dsl_api.path().to_path_buf(),
        accessors.path().to_path_buf(),
    ];

    g.stage(
        StageSpec::new(
            names::CLONE_HOST,
            CloneStage {
                fetcher: fetcher.clone(),
                source: config.sources.host.clone(),
                dest: host_tree.path().to_path_buf(),
            },
        )
        .produces(&host_tree),
    )
    .stage(
        StageSpec::new(
            names::CLONE_DSL,
            CloneStage {
                fetcher,
                source: config.sources.dsl.clone(),
                dest: dsl_tree.path().to_path_buf(),
            },
        )
        .produces(&dsl_tree),
    )
    .stage(
        StageSpec::new(
            names::HOST_API_SOURCES,
            ApiSourcesStage {
                extractor: extractor(ProjectKey::Host),
                tree: host_tree.path().to_path_buf(),
                out: host_api.path().to_path_buf(),
            },
        )
        .consumes(&host_tree)
        .produces(&host_api),
    )
    .stage(
        StageSpec::new(
            names::DSL_EXTENSIONS,
            ExtensionsStage {
                generator: ExtensionCodeGenerator::new(nested.clone(), config.extensions.tasks.clone()),
                tree: dsl_tree.path().to_path_buf(),
                record: extensions.path().to_path_buf(),
            },
        )
        .consumes(&dsl_tree)
        .produces(&extensions),
    )
    .stage(
        StageSpec::new(
            names::DSL_API_SOURCES,
            ApiSourcesStage {
                extractor: extractor(ProjectKey::Dsl),
                tree: dsl_tree.path().to_path_buf(),
                out: dsl_api.path().to_path_buf(),
            },
        )
        .consumes(&dsl_tree)
        .consumes(&extensions)
        .produces(&dsl_api),
    )
    .stage(
        StageSpec::new(
            names::INSTALL_HOST,
            InstallStage {
                builder: InstallationBuilder::new(
                    nested.clone(),
                    config.install.tasks.clone(),
                    &config.install.install_property,
                    &config.install.launcher,
                ),
                tree: host_tree.path().to_path_buf(),
                out: installation.path().to_path_buf(),
            },
        )
        .consumes(&host_tree)
        .produces(&installation),
    )
    .stage(
        StageSpec::new(
            names::PLUGIN_ACCESSORS,
            AccessorsStage {
                generator: AccessorGenerator::new(
                    Arc::clone(runner),
                    &config.paths.accessors_project,
                    &config.install.launcher,
                    config.accessors.tasks.clone(),
                    &config.accessors.generated_dir,
                ),
                installation: installation.path().to_path_buf(),
                scratch: scratch.path().to_path_buf(),
                out: accessors.path().to_path_buf(),
            },
        )
        .consumes(&installation)
        .produces(&accessors)
        .produces(&scratch),
    )
    .stage(
        StageSpec::new(
            names::EXTRACT_VERSIONS,
            VersionsStage {
                inputs: config
                    .versions
                    .iter()
                    .map(|v| VersionInput {
                        name: v.name.clone(),
                        tree: layout.clone_dir(v.project),
                        source: v.source(),
                    })
                    .collect(),
                out: versions.path().to_path_buf(),
            },
        )
        .consumes(&host_tree)
        .consumes(&dsl_tree)
        .produces(&versions),
    )
    .stage(
        StageSpec::new(
            names::DECLARE_DEPENDENCIES,
            DeclareStage {
                templates: config.dependencies.clone(),
                resolver,
                versions: versions.path().to_path_buf(),
                out: classpath.path().to_path_buf(),
            },
        )
        .consumes(&versions)
        .produces(&classpath),
    )
    .stage(
        StageSpec::new(
            names::API_DOCS,
            ApiDocsStage {
                generator: DocGenerator::new(
                    Arc::clone(runner),
                    &tools.doc_generator,
                    &config.docs.format,
                    &config.docs.module_name,
                    config.docs.extra_args.clone(),
                ),
                sources: documented.clone(),
                classpath: classpath.path().to_path_buf(),
                out: api_docs.path().to_path_buf(),
            },
        )
        .consumes(&host_api)
        .consumes(&dsl_api)
        .consumes(&accessors)
        .consumes(&classpath)
        .produces(&api_docs),
    )
    .stage(
        StageSpec::new(
            names::USER_GUIDE,
            UserGuideStage {
                builder: UserGuideBuilder::new(
                    nested,
                    config.user_guide.tasks.clone(),
                    &config.user_guide.output_dir,
                ),
                tree: host_tree.path().to_path_buf(),
                out: user_guide.path().to_path_buf(),
            },
        )
        .consumes(&host_tree)
        .produces(&user_guide),
    )
    .stage(
        StageSpec::new(
            names::CHECK_API_DOCS,
            CheckDocsStage {
                gate: Arc::clone(gate),
                docs: api_docs.path().to_path_buf(),
                sources: documented,
                report: check_report.path().to_path_buf(),
            },
        )
        .consumes(&api_docs)
        .consumes(&host_api)
        .consumes(&dsl_api)
        .consumes(&accessors)
        .produces(&check_report),
    )
    .stage(
        StageSpec::new(
            names::STAGE_SITE,
            StageSiteStage {
                publisher: publisher.clone(),
                tree: OutputTree {
                    root: layout.docs_dir(),
                    sections: vec!["api".to_string(), "userguide".to_string()],
                },
                site: site.path().to_path_buf(),
            },
        )
        .consumes(&api_docs)
        .consumes(&user_guide)
        .produces(&site),
    )
    .stage(
        StageSpec::new(
            names::PUBLISH_SITE,
            PublishStage {
                publisher,
                gate: Arc::clone(gate),
                site: site.path().to_path_buf(),
                record: publish_record.path().to_path_buf(),
            },
        )
        .consumes(&site)
        .produces(&publish_record),
    );

    g.build()
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, clippy::disallowed_macros)]
mod tests {
    use super::*;
    use crate::declare::{DependencyCoordinate, ResolvedClasspath};
    use crate::tool::{Invocation, ToolOutput};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Unused;

    #[async_trait]
    impl ToolRunner for Unused {
        async fn run(&self, _invocation: &Invocation) -> Result<ToolOutput> {
            Ok(ToolOutput::failure(1, "unused"))
        }
    }

    #[async_trait]
    impl Resolver for Unused {
        async fn resolve(&self, _coordinates: &[DependencyCoordinate]) -> Result<ResolvedClasspath> {
            Ok(ResolvedClasspath::default())
        }
    }

    fn pipeline(tmp: &TempDir) -> DocsPipeline {
        let mut config = PipelineConfig::default();
        config.paths.build_dir = tmp.path().join("build");
        config.paths.accessors_project = tmp.path().join("template");
        DocsPipeline::with_collaborators(config, Arc::new(Unused), Arc::new(Unused)).unwrap()
    }

    #[test]
    fn test_fixed_topology() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp);
        let graph = pipeline.graph();

        assert_eq!(graph.stages().len(), 14);
        let api_docs = graph.find(names::API_DOCS).unwrap();
        let upstream: Vec<&str> = graph
            .predecessors(api_docs)
            .into_iter()
            .map(|id| graph.stage(id).name())
            .collect();
        assert_eq!(
            upstream,
            [
                names::HOST_API_SOURCES,
                names::DSL_API_SOURCES,
                names::PLUGIN_ACCESSORS,
                names::DECLARE_DEPENDENCIES
            ]
        );

        let user_guide = graph.find(names::USER_GUIDE).unwrap();
        assert!(!graph.transitive_successors(user_guide).contains(&api_docs));
    }

    #[test]
    fn test_describe_lists_every_stage_in_order() {
        let tmp = TempDir::new().unwrap();
        let described = pipeline(&tmp).describe();

        assert_eq!(described.len(), 14);
        let position = |name: &str| described.iter().position(|s| s.name == name).unwrap();
        assert!(position(names::DSL_EXTENSIONS) < position(names::DSL_API_SOURCES));
        assert!(described[position(names::CLONE_HOST)].always_run);
        assert!(!described[position(names::API_DOCS)].always_run);
    }

    #[tokio::test]
    async fn test_unknown_stage_is_graph_error() {
        let tmp = TempDir::new().unwrap();
        let err = pipeline(&tmp).run_stages(&["deploy"]).await.unwrap_err();
        assert!(matches!(err, Error::Graph(_)));
    }
}
