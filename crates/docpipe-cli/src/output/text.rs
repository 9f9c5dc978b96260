//! Text output formatting

use colored::Colorize;
use docpipe_core::pipeline::StageDescription;
use docpipe_core::{CleanReport, RunReport, StageReport, StageState};

pub struct TextFormatter;

impl TextFormatter {
    /// Print one line per stage and a summary.
    ///
    /// With `quiet` only failed and skipped stages are listed.
    pub fn print_run(command: &str, report: &RunReport, quiet: bool) {
        for stage in &report.stages {
            if quiet && stage.state == StageState::Succeeded {
                continue;
            }
            println!("{}", stage_line(stage));
        }

        let failed = report.failed().count();
        let skipped = report.skipped().count();
        if failed == 0 && skipped == 0 {
            let fresh = report.stages.iter().filter(|s| s.up_to_date).count();
            if !quiet {
                println!(
                    "{} {command}: {} stage(s), {fresh} up to date",
                    "✓".green(),
                    report.stages.len()
                );
            }
        } else {
            println!(
                "{} {command}: {failed} failed, {skipped} skipped",
                "✗".red().bold()
            );
        }
    }

    /// Print removed paths.
    pub fn print_clean(report: &CleanReport) {
        if report.removed.is_empty() {
            println!("Nothing to clean");
            return;
        }
        for path in &report.removed {
            println!("  {} {}", "removed".bright_black(), path.display());
        }
        println!("{} Removed {} path(s)", "✓".green(), report.removed.len());
    }

    /// Print stages in execution order with their artifacts.
    pub fn print_graph(stages: &[StageDescription]) {
        for (index, stage) in stages.iter().enumerate() {
            let marker = if stage.always_run { " (always runs)" } else { "" };
            println!("{:>2}. {}{}", index + 1, stage.name.bold(), marker.bright_black());
            for input in &stage.consumes {
                println!("      {} {}", "<-".cyan(), input.name);
            }
            for output in &stage.produces {
                println!(
                    "      {} {} {}",
                    "->".green(),
                    output.name,
                    output.path.display().to_string().bright_black()
                );
            }
        }
    }
}

fn stage_line(stage: &StageReport) -> String {
    match stage.state {
        StageState::Succeeded => {
            let note = if stage.up_to_date {
                "up to date".to_string()
            } else {
                format_duration(stage.duration_ms)
            };
            format!("  {} {} {}", "✓".green(), stage.stage, note.bright_black())
        },
        StageState::Failed => {
            let category = stage.category.as_deref().unwrap_or("error");
            let reason = stage.error.as_deref().unwrap_or("unknown failure");
            format!(
                "  {} {} [{}] {}",
                "✗".red().bold(),
                stage.stage.bold(),
                category,
                reason
            )
        },
        StageState::Skipped => {
            let cause = stage
                .blocked_by
                .as_deref()
                .map_or_else(String::new, |b| format!(" (blocked by {b})"));
            format!("  {} {} skipped{}", "-".yellow(), stage.stage, cause)
        },
        StageState::Pending | StageState::Running => {
            format!("  {} {} {}", "?".yellow(), stage.stage, stage.state)
        },
    }
}

fn format_duration(ms: u64) -> String {
    if ms < 1_000 {
        format!("{ms}ms")
    } else {
        let secs = ms / 1_000;
        let tenths = (ms % 1_000) / 100;
        format!("{secs}.{tenths}s")
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, clippy::disallowed_macros)]
mod tests {
    use super::*;

    fn report(state: StageState) -> StageReport {
        StageReport {
            stage: "api-docs".to_string(),
            state,
            up_to_date: false,
            duration_ms: 1_250,
            error: None,
            category: None,
            blocked_by: None,
        }
    }

    #[test]
    fn test_failed_line_names_category_and_reason() {
        colored::control::set_override(false);
        let mut failed = report(StageState::Failed);
        failed.category = Some("docgen".to_string());
        failed.error = Some("dokka exited with 1".to_string());
        assert_eq!(stage_line(&failed), "  ✗ api-docs [docgen] dokka exited with 1");
    }

    #[test]
    fn test_skipped_line_names_blocker() {
        colored::control::set_override(false);
        let mut skipped = report(StageState::Skipped);
        skipped.blocked_by = Some("clone-dsl".to_string());
        assert_eq!(stage_line(&skipped), "  - api-docs skipped (blocked by clone-dsl)");
    }

    #[test]
    fn test_durations() {
        assert_eq!(format_duration(15), "15ms");
        assert_eq!(format_duration(1_250), "1.2s");
        assert_eq!(format_duration(61_000), "61.0s");
    }
}
