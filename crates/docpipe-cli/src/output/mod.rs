//! # Output Formatting
//!
//! Reports go to stdout, logs to stderr.
//!
//! - [`text`]: colored, one line per stage, failures with their cause
//! - [`json`]: the serialized report for scripts
//!
//! ```bash
//! docpipe check -f json | jq '.stages[] | select(.state != "succeeded")'
//! ```

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub mod json;
pub mod text;

pub use json::JsonFormatter;
pub use text::TextFormatter;

/// Output format for CLI results.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable formatted text.
    #[default]
    Text,
    /// JSON for machine consumption.
    Json,
}

impl OutputFormat {
    /// Check if this format is machine-readable.
    #[must_use]
    pub const fn is_machine_readable(self) -> bool {
        matches!(self, Self::Json)
    }
}
