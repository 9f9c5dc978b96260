//! # docpipe-core
//!
//! Core of docpipe, a pipeline that assembles API reference documentation and
//! a user guide from pinned source trees and publishes them as a static site.
//!
//! ## Architecture
//!
//! - **Components**: one module per pipeline step (`fetch`, `version`, `api`,
//!   `extensions`, `install`, `accessors`, `declare`, `docgen`, `guide`,
//!   `publish`), each talking to external programs through [`tool::ToolRunner`]
//! - **Graph**: stages declare the artifacts they consume and produce; the
//!   [`graph::PipelineGraphBuilder`] validates ownership and acyclicity
//! - **Orchestration**: [`orchestrator::Orchestrator`] runs a target closure
//!   concurrently, skips up-to-date stages and isolates failing branches
//! - **Pipeline**: [`pipeline::DocsPipeline`] wires the fixed stage topology
//!   from a [`config::PipelineConfig`] and exposes the lifecycle commands
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docpipe_core::config::PipelineConfig;
//! use docpipe_core::pipeline::DocsPipeline;
//!
//! # async fn example() -> docpipe_core::Result<()> {
//! let config = PipelineConfig::load(None)?;
//! let pipeline = DocsPipeline::new(config)?;
//! let report = pipeline.assemble().await?;
//! for stage in report.failed() {
//!     eprintln!("{} failed: {:?}", stage.stage, stage.error);
//! }
//! # Ok(())
//! # }
//! ```

/// Accessor generation for built-in plugins
pub mod accessors;
/// API source extraction
pub mod api;
/// Pipeline configuration
pub mod config;
/// Dependency declaration and classpath resolution
pub mod declare;
/// API documentation rendering
pub mod docgen;
/// Error types and result aliases
pub mod error;
/// In-tree extension code generation
pub mod extensions;
/// Source tree fetching
pub mod fetch;
/// Artifact fingerprints
pub mod fingerprint;
/// Filesystem helpers: sorted walks, atomic swaps, locks
pub mod fsutil;
/// Stage and artifact graph
pub mod graph;
/// User guide building
pub mod guide;
/// Host installation building
pub mod install;
/// Artifact locations under the build directory
pub mod layout;
/// Stage scheduling
pub mod orchestrator;
/// The assembled documentation pipeline
pub mod pipeline;
/// Site staging and publishing
pub mod publish;
/// The stage abstraction
pub mod stage;
/// Stage adapters for each component
pub mod stages;
/// Per-stage completion stamps
pub mod stamps;
/// Public symbol detection
pub mod symbols;
/// External tool invocation
pub mod tool;
/// Rendered documentation checks
pub mod verify;
/// Version extraction from source trees
pub mod version;

pub use config::PipelineConfig;
pub use error::{Error, ExtractionErrorKind, Result};
pub use orchestrator::{RunReport, StageReport};
pub use pipeline::{CleanReport, CleanScope, DocsPipeline};
pub use stage::StageState;
