//! External tool invocation.
//!
//! Fetching, nested builds, documentation rendering and publishing all shell
//! out to external programs. They go through the [`ToolRunner`] seam so the
//! pipeline can be driven by scripted runners in tests. Runners only report
//! what happened; each caller maps a non-zero exit to its own domain error.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::{Error, Result};

/// Number of trailing output lines kept in failure diagnostics.
const DIAGNOSTIC_LINES: usize = 12;

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl Invocation {
    /// Start describing a call to `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a path argument.
    #[must_use]
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the program from `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set an environment variable for the child process.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The program name or path.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments in order.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Working directory, if one was set.
    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Extra environment variables.
    pub fn envs(&self) -> &[(String, String)] {
        &self.env
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Captured result of a finished tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ToolOutput {
    /// A successful exit with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed exit with the given code and stderr.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the tool exited with status zero.
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Short description of a failure for error messages.
    ///
    /// Uses the tail of stderr, falling back to stdout.
    pub fn diagnostic(&self) -> String {
        let status = self
            .code
            .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit status {c}"));
        let text = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.is_empty() {
            return status;
        }
        let tail = &lines[lines.len().saturating_sub(DIAGNOSTIC_LINES)..];
        format!("{status}: {}", tail.join("\n"))
    }
}

/// Executes external tools.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the invocation to completion and capture its output.
    ///
    /// Returns `Err(Error::ToolUnavailable)` only when the program could not
    /// be started. A non-zero exit is `Ok` with a failing [`ToolOutput`].
    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput>;
}

/// Runs tools as child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    #[instrument(level = "debug", skip(self), fields(program = %invocation.program()))]
    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
        debug!(command = %invocation, "Executing tool");

        let mut command = Command::new(invocation.program());
        command.args(invocation.arguments()).stdin(Stdio::null());
        if let Some(dir) = invocation.working_dir() {
            command.current_dir(dir);
        }
        for (key, value) in invocation.envs() {
            command.env(key, value);
        }

        let output = command
            .output()
            .await
            .map_err(|e| Error::ToolUnavailable {
                program: invocation.program().to_string(),
                reason: e.to_string(),
            })?;

        let result = ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.is_success() {
            warn!(
                exit_code = ?result.code,
                stderr = %result.stderr.trim(),
                command = %invocation,
                "Tool exited unsuccessfully"
            );
        }

        Ok(result)
    }
}

/// A nested build tool driven by task names.
///
/// Invoked as `<launcher> --project-dir <dir> --stacktrace <tasks...> [extra]`.
/// A relative launcher containing a path separator (`./gradlew`) resolves
/// against the project directory; a bare name is looked up on `PATH`.
#[derive(Clone)]
pub struct NestedBuild {
    runner: Arc<dyn ToolRunner>,
    launcher: String,
}

impl fmt::Debug for NestedBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedBuild")
            .field("launcher", &self.launcher)
            .finish_non_exhaustive()
    }
}

impl NestedBuild {
    /// Create a nested build using `launcher`.
    pub fn new(runner: Arc<dyn ToolRunner>, launcher: impl Into<String>) -> Self {
        Self {
            runner,
            launcher: launcher.into(),
        }
    }

    /// The configured launcher.
    pub fn launcher(&self) -> &str {
        &self.launcher
    }

    /// Describe the invocation without running it.
    pub fn invocation(&self, project_dir: &Path, tasks: &[String], extra: &[String]) -> Invocation {
        Invocation::new(resolve_launcher(&self.launcher, project_dir))
            .arg("--project-dir")
            .path_arg(project_dir)
            .arg("--stacktrace")
            .args(tasks.iter().cloned())
            .args(extra.iter().cloned())
            .current_dir(project_dir)
    }

    /// Run `tasks` in `project_dir`.
    ///
    /// A non-zero exit becomes [`Error::Generation`].
    pub async fn run(&self, project_dir: &Path, tasks: &[String], extra: &[String]) -> Result<ToolOutput> {
        let invocation = self.invocation(project_dir, tasks, extra);
        let output = self.runner.run(&invocation).await?;
        if output.is_success() {
            Ok(output)
        } else {
            Err(Error::Generation(format!(
                "nested build `{}` in {} failed with {}",
                tasks.join(" "),
                project_dir.display(),
                output.diagnostic()
            )))
        }
    }
}

fn resolve_launcher(launcher: &str, project_dir: &Path) -> String {
    let path = Path::new(launcher);
    if path.is_relative() && path.components().count() > 1 {
        project_dir.join(path).to_string_lossy().into_owned()
    } else {
        launcher.to_string()
    }
}
