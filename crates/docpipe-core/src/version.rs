//! Version extraction from source trees.
//!
//! Versions are read from marker lines in build files. Extraction fails
//! loudly: a missing file, a missing marker or an empty value is an error,
//! never a default.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ExtractionErrorKind;
use crate::{Error, Result};

/// A non-empty version scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionString(String);

impl VersionString {
    /// Wrap a trimmed, non-empty value.
    pub fn new(value: impl AsRef<str>) -> Option<Self> {
        let trimmed = value.as_ref().trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    /// The version text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read `file` (relative to `tree`), take the first line matching `marker`
/// and parse it with `parse`.
pub fn extract<P, F>(tree: &Path, file: &Path, marker: P, parse: F) -> Result<VersionString>
where
    P: Fn(&str) -> bool,
    F: FnOnce(&str) -> Option<String>,
{
    let fail = |kind| Error::Extraction {
        file: file.to_path_buf(),
        kind,
    };
    let content = match fs::read_to_string(tree.join(file)) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(fail(ExtractionErrorKind::FileMissing));
        },
        Err(e) => return Err(e.into()),
    };
    let line = content
        .lines()
        .find(|line| marker(line))
        .ok_or_else(|| fail(ExtractionErrorKind::MarkerNotFound))?;
    parse(line)
        .and_then(VersionString::new)
        .ok_or_else(|| fail(ExtractionErrorKind::Malformed))
}

/// Value of an assignment line: text after the last `=`, unquoted.
///
/// `versions.groovy = "2.4.12"` yields `2.4.12`.
pub fn assignment_value(line: &str) -> Option<String> {
    let (_, value) = line.rsplit_once('=')?;
    let value = value.trim().trim_end_matches(';').trim();
    let unquoted = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);
    Some(unquoted.trim().to_string()).filter(|v| !v.is_empty())
}

/// A way of reading one version out of a source tree.
pub trait VersionSource: Send + Sync + fmt::Debug {
    /// Extract the version from `tree`.
    fn extract(&self, tree: &Path) -> Result<VersionString>;

    /// Stable description of the rule, for fingerprints and logs.
    fn describe(&self) -> String;
}

/// Reads the assignment on the first line starting with `marker`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerLine {
    /// File relative to the tree root.
    pub file: PathBuf,
    /// Line prefix, compared against the raw line.
    pub marker: String,
}

impl VersionSource for MarkerLine {
    fn extract(&self, tree: &Path) -> Result<VersionString> {
        extract(
            tree,
            &self.file,
            |line| line.starts_with(&self.marker),
            assignment_value,
        )
    }

    fn describe(&self) -> String {
        format!("marker-line:{}:{}", self.file.display(), self.marker)
    }
}

/// Uses the first non-blank line of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContents {
    /// File relative to the tree root.
    pub file: PathBuf,
}

impl VersionSource for FileContents {
    fn extract(&self, tree: &Path) -> Result<VersionString> {
        extract(
            tree,
            &self.file,
            |line| !line.trim().is_empty(),
            |line| Some(line.trim().to_string()),
        )
        .map_err(|e| match e {
            // An empty file has no line to match; report it as malformed
            Error::Extraction {
                file,
                kind: ExtractionErrorKind::MarkerNotFound,
            } => Error::Extraction {
                file,
                kind: ExtractionErrorKind::Malformed,
            },
            other => other,
        })
    }

    fn describe(&self) -> String {
        format!("file-contents:{}", self.file.display())
    }
}
