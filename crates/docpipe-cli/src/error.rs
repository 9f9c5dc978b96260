//! CLI error handling with semantic exit codes.
//!
//! | Code | Category | Description |
//! |------|----------|-------------|
//! | 0 | Success | Every selected stage succeeded |
//! | 1 | `Internal` | Unexpected/internal error |
//! | 2 | `Usage` | Invalid arguments or configuration |
//! | 3 | `StageFailed` | At least one stage failed or was skipped |
//! | 4 | `Guard` | Publishing refused because the check did not pass |
//! | 5 | `Network` | Network failure outside a stage |
//!
//! ```bash
//! docpipe publish
//! case $? in
//!     0) echo "published" ;;
//!     4) echo "documentation check failed, nothing pushed" ;;
//!     *) echo "pipeline failed" ;;
//! esac
//! ```

use std::fmt;
use std::process::ExitCode;

/// Semantic error category determining the exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCategory {
    /// Unexpected or internal error (exit code 1).
    Internal = 1,

    /// Invalid arguments or configuration (exit code 2).
    Usage = 2,

    /// A stage failed; its successors were skipped (exit code 3).
    StageFailed = 3,

    /// Publishing was refused by the check gate (exit code 4).
    Guard = 4,

    /// Network failure while setting up the pipeline (exit code 5).
    Network = 5,
}

impl ErrorCategory {
    /// Get the exit code for this category.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        self as u8
    }

    /// Create an `ExitCode` from this category.
    #[must_use]
    pub fn as_exit_code(self) -> ExitCode {
        ExitCode::from(self.exit_code())
    }

    /// Get a short description of this error category.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Internal => "internal error",
            Self::Usage => "usage error",
            Self::StageFailed => "stage failed",
            Self::Guard => "publish refused",
            Self::Network => "network error",
        }
    }

    /// Category for a core error raised outside a stage.
    #[must_use]
    pub const fn from_core(err: &docpipe_core::Error) -> Self {
        match err {
            docpipe_core::Error::Config(_) | docpipe_core::Error::Graph(_) => Self::Usage,
            docpipe_core::Error::Network(_) => Self::Network,
            docpipe_core::Error::PublishGuard => Self::Guard,
            _ => Self::Internal,
        }
    }

    /// Infer the error category from an error message.
    ///
    /// Fallback for errors that were not categorized where they arose.
    #[must_use]
    pub fn infer_from_message(msg: &str) -> Self {
        let msg_lower = msg.to_lowercase();

        if msg_lower.contains("requires a successful check") {
            return Self::Guard;
        }

        if msg_lower.contains("network")
            || msg_lower.contains("connection")
            || msg_lower.contains("dns")
            || msg_lower.contains("http")
        {
            return Self::Network;
        }

        if msg_lower.contains("config")
            || msg_lower.contains("invalid argument")
            || msg_lower.contains("invalid value")
            || msg_lower.contains("unknown stage")
        {
            return Self::Usage;
        }

        Self::Internal
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A CLI error with a semantic category for exit code mapping.
#[derive(Debug)]
pub struct CliError {
    /// The semantic category of this error.
    pub category: ErrorCategory,
    /// The underlying error with full context.
    pub source: anyhow::Error,
}

impl CliError {
    /// Create a new CLI error with explicit category.
    pub fn new(category: ErrorCategory, source: impl Into<anyhow::Error>) -> Self {
        Self {
            category,
            source: source.into(),
        }
    }

    /// Wrap a core error, categorizing it by variant.
    pub fn core(err: docpipe_core::Error) -> Self {
        Self::new(ErrorCategory::from_core(&err), err)
    }

    /// Get the exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.category.exit_code()
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Determine the exit code from an `anyhow::Error`.
///
/// A [`CliError`] keeps its category; a bare core error is categorized by
/// variant; anything else is inferred from the message.
#[must_use]
pub fn exit_code_from_error(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return cli_err.exit_code();
    }
    if let Some(core) = err.downcast_ref::<docpipe_core::Error>() {
        return ErrorCategory::from_core(core).exit_code();
    }
    ErrorCategory::infer_from_message(&err.to_string()).exit_code()
}
