//! Error types for docpipe-core operations.
//!
//! Every component returns [`Result<T>`] with a single [`Error`] enum. Stage
//! failures carry the taxonomy the orchestrator reports:
//!
//! - **Fetch**: transport failures, unknown references, locked destinations
//! - **Extraction**: version markers and files that are missing or malformed
//! - **Generation**: nested builds that exit non-zero or produce nothing
//! - **Resolution**: dependency coordinates that no repository provides
//! - **DocGen / Verification**: rendering and checking the API reference
//! - **Publish / PublishGuard**: staging and pushing the site
//!
//! Each variant maps to a stable [`Error::category`] string used in run
//! reports and by the CLI to pick an exit code.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Why a version could not be extracted from a source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionErrorKind {
    /// The file exists but no line matched the marker predicate.
    MarkerNotFound,
    /// The file does not exist in the tree.
    FileMissing,
    /// A line matched but parsing produced no value.
    Malformed,
}

impl fmt::Display for ExtractionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MarkerNotFound => "marker not found",
            Self::FileMissing => "file missing",
            Self::Malformed => "malformed value",
        };
        f.write_str(text)
    }
}

/// The main error type for docpipe-core operations.
///
/// Stage implementations surface these to the orchestrator, which records
/// the message and [`category`](Error::category) in the run report and
/// skips every transitive successor of the failed stage.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    ///
    /// Covers staging directories, atomic swaps, copying trees and reading
    /// artifacts. The underlying `std::io::Error` is preserved.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Fetching a source tree failed.
    ///
    /// ## Common Causes
    ///
    /// - Transport errors (unreachable remote, authentication)
    /// - The requested reference does not exist
    /// - The VCS tool could not be started
    ///
    /// The previously fetched tree, if any, is left in place.
    #[error("Fetch of {uri}@{reference} failed: {reason}")]
    Fetch {
        /// Repository location.
        uri: String,
        /// Branch, tag or commit that was requested.
        reference: String,
        /// What went wrong.
        reason: String,
    },

    /// Another fetch currently owns the destination directory.
    #[error("Source directory {} is locked by another fetch", .0.display())]
    FetchLocked(PathBuf),

    /// A version could not be extracted from a source tree.
    ///
    /// There is never a fallback value: a missing marker fails the stage.
    #[error("Version extraction from {} failed: {kind}", .file.display())]
    Extraction {
        /// File that was read, relative to the tree root.
        file: PathBuf,
        /// Failure kind.
        kind: ExtractionErrorKind,
    },

    /// Code generation or a nested build failed.
    ///
    /// ## Common Causes
    ///
    /// - The nested build exited non-zero
    /// - The installation launcher is missing
    /// - The scratch project template is malformed
    /// - Generated output did not appear where it was expected
    /// - A tree still carries an in-progress generation marker
    #[error("Generation failed: {0}")]
    Generation(String),

    /// A dependency coordinate could not be resolved.
    #[error("Could not resolve {coordinate}: {reason}")]
    Resolution {
        /// The `group:artifact:version` coordinate.
        coordinate: String,
        /// Per-repository reasons, or a missing version.
        reason: String,
    },

    /// The documentation generator failed or produced no output.
    #[error("Documentation generation failed: {0}")]
    DocGen(String),

    /// Generated documentation did not pass verification.
    #[error("Documentation check failed: {0}")]
    Verification(String),

    /// Staging or pushing the site failed.
    ///
    /// Publishing is a single forced ref update, so a failure never leaves a
    /// partially published site.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Publishing was attempted without a successful check in this session.
    #[error("Publishing requires a successful check in the same run")]
    PublishGuard,

    /// An external tool could not be started.
    #[error("Tool '{program}' could not be started: {reason}")]
    ToolUnavailable {
        /// Program that was invoked.
        program: String,
        /// Spawn failure reason.
        reason: String,
    },

    /// The pipeline graph is invalid.
    ///
    /// Raised by graph construction for cycles, duplicate or missing
    /// producers, and overlapping outputs.
    #[error("Pipeline graph error: {0}")]
    Graph(String),

    /// Configuration is invalid or inaccessible.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network operation failed while downloading a dependency.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error for uncategorized failures.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        if err.is_io() {
            match err.into_io_error() {
                Some(io) => Self::Io(io),
                None => Self::Other("directory walk failed".to_string()),
            }
        } else {
            Self::Other(format!("directory walk failed: {err}"))
        }
    }
}

impl Error {
    /// Get the error category as a string identifier.
    ///
    /// Categories are stable and appear in JSON run reports:
    ///
    /// - `"io"`, `"fetch"`, `"extraction"`, `"generation"`, `"resolution"`
    /// - `"docgen"`, `"verification"`, `"publish"`, `"guard"`, `"tool"`
    /// - `"graph"`, `"config"`, `"network"`, `"serialization"`, `"other"`
    ///
    /// # Examples
    ///
    /// ```rust
    /// use docpipe_core::Error;
    ///
    /// assert_eq!(Error::PublishGuard.category(), "guard");
    /// assert_eq!(Error::Generation("exit 1".into()).category(), "generation");
    /// ```
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Fetch { .. } | Self::FetchLocked(_) => "fetch",
            Self::Extraction { .. } => "extraction",
            Self::Generation(_) => "generation",
            Self::Resolution { .. } => "resolution",
            Self::DocGen(_) => "docgen",
            Self::Verification(_) => "verification",
            Self::Publish(_) => "publish",
            Self::PublishGuard => "guard",
            Self::ToolUnavailable { .. } => "tool",
            Self::Graph(_) => "graph",
            Self::Config(_) => "config",
            Self::Network(_) => "network",
            Self::Serialization(_) => "serialization",
            Self::Other(_) => "other",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
