#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

#[allow(dead_code)]
pub const CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// A git binary that cannot exist, so every fetch fails without network.
#[allow(dead_code)]
pub const MISSING_GIT: &str = "/nonexistent/docpipe-test/git";

const OVERRIDE_ENV: &[&str] = &[
    "DOCPIPE_CONFIG",
    "DOCPIPE_BUILD_DIR",
    "DOCPIPE_HOST_URI",
    "DOCPIPE_HOST_REF",
    "DOCPIPE_DSL_URI",
    "DOCPIPE_DSL_REF",
];

/// Create a `docpipe` command isolated from the caller's environment.
#[allow(dead_code)]
pub fn docpipe_cmd(workdir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("docpipe"));
    cmd.timeout(CMD_TIMEOUT);
    for key in OVERRIDE_ENV {
        cmd.env_remove(key);
    }
    cmd.env("NO_COLOR", "1");
    cmd.current_dir(workdir);
    cmd
}

/// A project directory with a `docpipe.toml` whose tools cannot be found.
#[allow(dead_code)]
pub struct Project {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create project dir");
        let config = format!(
            r#"[paths]
build_dir = "build"
accessors_project = "template"

[tools]
git = "{MISSING_GIT}"

[resolution]
repositories = ["repo"]
cache_dir = "cache"

[execution]
jobs = 2
"#
        );
        fs::write(dir.path().join("docpipe.toml"), config).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn build(&self) -> PathBuf {
        self.path().join("build")
    }

    pub fn cmd(&self) -> Command {
        docpipe_cmd(self.path())
    }

    /// Write `content` at `relative`, creating parents.
    pub fn touch(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }
}
