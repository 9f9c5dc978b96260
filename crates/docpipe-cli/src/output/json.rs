//! JSON output formatting

use anyhow::Result;
use docpipe_core::pipeline::StageDescription;
use docpipe_core::{CleanReport, RunReport};
use serde_json::json;

pub struct JsonFormatter;

impl JsonFormatter {
    /// Print a run report with the command that produced it.
    pub fn print_run(command: &str, report: &RunReport) -> Result<()> {
        let value = json!({
            "command": command,
            "success": report.is_success(),
            "stages": report.stages,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        Ok(())
    }

    /// Print removed paths.
    pub fn print_clean(all: bool, report: &CleanReport) -> Result<()> {
        let value = json!({
            "command": "clean",
            "scope": if all { "all" } else { "derived" },
            "removed": report.removed,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        Ok(())
    }

    /// Print the stage graph.
    pub fn print_graph(stages: &[StageDescription]) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(stages)?);
        Ok(())
    }
}
