//! Stage adapters wiring each component to its artifact paths.
//!
//! Components stay free of scheduling concerns; the adapters here bind them
//! to concrete inputs and outputs and describe their parameters for the
//! staleness fingerprint. Filesystem-heavy synchronous work is moved off the
//! runtime with `spawn_blocking`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::accessors::AccessorGenerator;
use crate::api::ApiSourceExtractor;
use crate::config::SourceConfig;
use crate::declare::{self, CoordinateTemplate, ResolvedClasspath, Resolver};
use crate::docgen::DocGenerator;
use crate::extensions::ExtensionCodeGenerator;
use crate::fetch::SourceFetcher;
use crate::guide::UserGuideBuilder;
use crate::install::InstallationBuilder;
use crate::publish::{CheckGate, CheckPassed, OutputTree, Publisher};
use crate::stage::{Stage, blocking};
use crate::verify;
use crate::version::{VersionSource, VersionString};
use crate::{Error, Result, fsutil};

/// Fetches one tree. Always runs; the fetcher itself is idempotent.
#[derive(Debug)]
pub struct CloneStage {
    /// Fetcher.
    pub fetcher: SourceFetcher,
    /// Pinned source.
    pub source: SourceConfig,
    /// Destination tree.
    pub dest: PathBuf,
}

#[async_trait]
impl Stage for CloneStage {
    fn params(&self) -> String {
        format!("{}@{}", self.source.uri, self.source.reference)
    }

    fn always_run(&self) -> bool {
        true
    }

    async fn execute(&self) -> Result<()> {
        self.fetcher
            .fetch(&self.source.uri, &self.source.reference, &self.dest)
            .await
            .map(|_| ())
    }
}

/// Extracts one project's API sources.
#[derive(Debug)]
pub struct ApiSourcesStage {
    /// Extractor configured for the project.
    pub extractor: ApiSourceExtractor,
    /// Fetched tree.
    pub tree: PathBuf,
    /// Output directory.
    pub out: PathBuf,
}

#[async_trait]
impl Stage for ApiSourcesStage {
    fn params(&self) -> String {
        self.extractor.filter().describe()
    }

    async fn execute(&self) -> Result<()> {
        let extractor = self.extractor.clone();
        let tree = self.tree.clone();
        let out = self.out.clone();
        let sources = blocking(move || extractor.extract(&tree, &out)).await?;
        debug!(files = sources.files, symbols = sources.symbols, "API sources extracted");
        Ok(())
    }
}

/// Written once extension generation in the DSL tree completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// Tasks that ran.
    pub tasks: Vec<String>,
    /// Completion time.
    pub generated_at: DateTime<Utc>,
}

/// Generates extension sources inside the DSL tree.
#[derive(Debug)]
pub struct ExtensionsStage {
    /// Generator.
    pub generator: ExtensionCodeGenerator,
    /// DSL tree, written in place.
    pub tree: PathBuf,
    /// Completion record.
    pub record: PathBuf,
}

#[async_trait]
impl Stage for ExtensionsStage {
    fn params(&self) -> String {
        self.generator.tasks().join(",")
    }

    async fn execute(&self) -> Result<()> {
        self.generator.generate(&self.tree).await?;
        let record = GenerationRecord {
            tasks: self.generator.tasks().to_vec(),
            generated_at: Utc::now(),
        };
        fsutil::write_json_atomic(&self.record, &record)
    }
}

/// Builds the host installation.
#[derive(Debug)]
pub struct InstallStage {
    /// Builder.
    pub builder: InstallationBuilder,
    /// Host tree.
    pub tree: PathBuf,
    /// Installation directory.
    pub out: PathBuf,
}

#[async_trait]
impl Stage for InstallStage {
    fn params(&self) -> String {
        self.builder.describe()
    }

    async fn execute(&self) -> Result<()> {
        self.builder.install(&self.tree, &self.out).await.map(|_| ())
    }
}

/// Generates plugin accessors with the installation.
#[derive(Debug)]
pub struct AccessorsStage {
    /// Generator.
    pub generator: AccessorGenerator,
    /// Installation root.
    pub installation: PathBuf,
    /// Single-use scratch project.
    pub scratch: PathBuf,
    /// Output directory.
    pub out: PathBuf,
}

#[async_trait]
impl Stage for AccessorsStage {
    fn params(&self) -> String {
        // An unreadable template changes the description, so the stage reruns
        // and reports the real error.
        self.generator
            .describe()
            .unwrap_or_else(|e| format!("template unreadable: {e}"))
    }

    async fn execute(&self) -> Result<()> {
        self.generator
            .generate(&self.installation, &self.scratch, &self.out)
            .await
            .map(|_| ())
    }
}

/// One version read from one tree.
#[derive(Debug)]
pub struct VersionInput {
    /// Name used by dependency templates.
    pub name: String,
    /// Tree to read from.
    pub tree: PathBuf,
    /// Extraction rule.
    pub source: Box<dyn VersionSource>,
}

/// Extracts all configured versions into one file.
#[derive(Debug)]
pub struct VersionsStage {
    /// Versions to read.
    pub inputs: Vec<VersionInput>,
    /// Versions file.
    pub out: PathBuf,
}

#[async_trait]
impl Stage for VersionsStage {
    fn params(&self) -> String {
        self.inputs
            .iter()
            .map(|input| format!("{}={}", input.name, input.source.describe()))
            .collect::<Vec<_>>()
            .join(";")
    }

    async fn execute(&self) -> Result<()> {
        let mut versions: BTreeMap<String, VersionString> = BTreeMap::new();
        for input in &self.inputs {
            let version = input.source.extract(&input.tree)?;
            info!(name = %input.name, version = %version, "Extracted version");
            versions.insert(input.name.clone(), version);
        }
        fsutil::write_json_atomic(&self.out, &versions)
    }
}

/// Declares and resolves the documentation classpath.
pub struct DeclareStage {
    /// Coordinate templates.
    pub templates: Vec<CoordinateTemplate>,
    /// Resolver.
    pub resolver: Arc<dyn Resolver>,
    /// Versions file.
    pub versions: PathBuf,
    /// Classpath file.
    pub out: PathBuf,
}

impl std::fmt::Debug for DeclareStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeclareStage")
            .field("templates", &self.templates)
            .field("out", &self.out)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for DeclareStage {
    fn params(&self) -> String {
        let templates: Vec<String> = self
            .templates
            .iter()
            .map(|t| format!("{}:{}:{{{}}}", t.group, t.artifact, t.version))
            .collect();
        format!("{};repositories={}", templates.join(","), self.resolver.describe())
    }

    async fn execute(&self) -> Result<()> {
        let versions: BTreeMap<String, VersionString> = fsutil::read_json(&self.versions)?;
        let coordinates = declare::declare(&self.templates, &versions)?;
        let classpath = self.resolver.resolve(&coordinates).await?;
        info!(entries = classpath.entries.len(), "Resolved documentation classpath");
        fsutil::write_json_atomic(&self.out, &classpath)
    }
}

/// Renders the API reference.
#[derive(Debug)]
pub struct ApiDocsStage {
    /// Generator.
    pub generator: DocGenerator,
    /// API source and accessor directories.
    pub sources: Vec<PathBuf>,
    /// Classpath file.
    pub classpath: PathBuf,
    /// Output directory.
    pub out: PathBuf,
}

#[async_trait]
impl Stage for ApiDocsStage {
    fn params(&self) -> String {
        self.generator.describe()
    }

    async fn execute(&self) -> Result<()> {
        let classpath: ResolvedClasspath = fsutil::read_json(&self.classpath)?;
        self.generator
            .generate(&self.sources, &classpath, &self.out)
            .await
            .map(|_| ())
    }
}

/// Builds the user guide.
#[derive(Debug)]
pub struct UserGuideStage {
    /// Builder.
    pub builder: UserGuideBuilder,
    /// Host tree.
    pub tree: PathBuf,
    /// Output directory.
    pub out: PathBuf,
}

#[async_trait]
impl Stage for UserGuideStage {
    fn params(&self) -> String {
        self.builder.describe()
    }

    async fn execute(&self) -> Result<()> {
        self.builder.build_guide(&self.tree, &self.out).await.map(|_| ())
    }
}

/// Verifies the API reference and mints the publish proof.
#[derive(Debug)]
pub struct CheckDocsStage {
    /// Gate receiving the proof.
    pub gate: Arc<CheckGate>,
    /// Rendered API reference.
    pub docs: PathBuf,
    /// Directories whose public symbols need pages.
    pub sources: Vec<PathBuf>,
    /// Report file.
    pub report: PathBuf,
}

#[async_trait]
impl Stage for CheckDocsStage {
    fn always_run(&self) -> bool {
        true
    }

    async fn execute(&self) -> Result<()> {
        self.gate.reset();
        let docs = self.docs.clone();
        let sources = self.sources.clone();
        let report = blocking(move || verify::verify_docs(&docs, &sources)).await?;
        fsutil::write_json_atomic(&self.report, &report)?;
        self.gate.pass(CheckPassed::new(report.pages));
        Ok(())
    }
}

/// Copies the output tree into the local site directory.
#[derive(Debug)]
pub struct StageSiteStage {
    /// Publisher.
    pub publisher: Publisher,
    /// Output tree.
    pub tree: OutputTree,
    /// Site directory.
    pub site: PathBuf,
}

#[async_trait]
impl Stage for StageSiteStage {
    fn always_run(&self) -> bool {
        true
    }

    async fn execute(&self) -> Result<()> {
        let publisher = self.publisher.clone();
        let tree = self.tree.clone();
        let site = self.site.clone();
        blocking(move || publisher.stage(&tree, &site)).await.map(|_| ())
    }
}

/// Pushes the staged site. Refuses to run without a passed check.
#[derive(Debug)]
pub struct PublishStage {
    /// Publisher.
    pub publisher: Publisher,
    /// Gate holding the proof.
    pub gate: Arc<CheckGate>,
    /// Staged site.
    pub site: PathBuf,
    /// Publish record.
    pub record: PathBuf,
}

#[async_trait]
impl Stage for PublishStage {
    fn always_run(&self) -> bool {
        true
    }

    async fn execute(&self) -> Result<()> {
        let proof = self.gate.proof().ok_or(Error::PublishGuard)?;
        let record = self.publisher.publish(&self.site, &proof).await?;
        fsutil::write_json_atomic(&self.record, &record)
    }
}
