//! Deriving API-only source sets from source trees.
//!
//! The extractor walks configured source roots in sorted order and keeps the
//! files that declare at least one public symbol. Output paths are
//! package-relative, so `subprojects/core/src/main/java/org/gradle/Foo.java`
//! lands at `org/gradle/Foo.java`. The result is deterministic: identical
//! input trees yield byte-identical output.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};

use crate::extensions::GENERATION_MARKER;
use crate::fsutil::{self, VCS_DIR};
use crate::symbols::{self, SourceLanguage};
use crate::{Error, Result};

/// A source root pattern; `*` matches exactly one path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RootPattern(Vec<String>);

impl RootPattern {
    fn parse(pattern: &str) -> Self {
        Self(
            pattern
                .split('/')
                .filter(|s| !s.is_empty() && *s != ".")
                .map(str::to_string)
                .collect(),
        )
    }

    /// Number of leading segments of `path` consumed by this pattern.
    fn match_prefix(&self, path: &[&str]) -> Option<usize> {
        if path.len() <= self.0.len() {
            return None;
        }
        self.0
            .iter()
            .zip(path)
            .all(|(pat, seg)| pat == "*" || pat == seg)
            .then_some(self.0.len())
    }
}

/// Which files of a tree count as API sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFilter {
    roots: Vec<RootPattern>,
    extensions: Vec<String>,
    exclude_segments: Vec<String>,
}

impl ApiFilter {
    /// Build a filter from root patterns, extensions and excluded segments.
    pub fn new(roots: &[String], extensions: &[String], exclude_segments: &[String]) -> Self {
        Self {
            roots: roots.iter().map(|r| RootPattern::parse(r)).collect(),
            extensions: extensions.to_vec(),
            exclude_segments: exclude_segments.to_vec(),
        }
    }

    /// Package-relative output path for `relative`, or `None` when the file
    /// is outside every root, has another extension, or sits in an excluded
    /// package.
    pub fn package_path(&self, relative: &Path) -> Option<PathBuf> {
        let ext = relative.extension()?.to_str()?;
        if !self.extensions.iter().any(|e| e == ext) {
            return None;
        }
        let segments: Vec<&str> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();
        let consumed = self.roots.iter().find_map(|root| root.match_prefix(&segments))?;
        let package = &segments[consumed..];
        let dirs = &package[..package.len() - 1];
        if dirs.iter().any(|d| self.exclude_segments.iter().any(|x| x == d)) {
            return None;
        }
        Some(package.iter().collect())
    }

    /// Stable description for fingerprints.
    pub fn describe(&self) -> String {
        let roots: Vec<String> = self.roots.iter().map(|r| r.0.join("/")).collect();
        format!(
            "roots={};ext={};exclude={}",
            roots.join(","),
            self.extensions.join(","),
            self.exclude_segments.join(",")
        )
    }
}

/// Summary of an extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSources {
    /// Output directory.
    pub dir: PathBuf,
    /// Files written.
    pub files: usize,
    /// Distinct public symbols across those files.
    pub symbols: usize,
}

/// Filters one project's tree into an API source directory.
#[derive(Debug, Clone)]
pub struct ApiSourceExtractor {
    filter: ApiFilter,
}

impl ApiSourceExtractor {
    /// Create an extractor with `filter`.
    pub const fn new(filter: ApiFilter) -> Self {
        Self { filter }
    }

    /// The filter in use.
    pub const fn filter(&self) -> &ApiFilter {
        &self.filter
    }

    /// Extract API sources from `tree` into `out`, replacing it atomically.
    ///
    /// Refuses a tree whose code generation is still in progress or was
    /// aborted, so a mixed tree is never read.
    pub fn extract(&self, tree: &Path, out: &Path) -> Result<ApiSources> {
        if tree.join(GENERATION_MARKER).exists() {
            return Err(Error::Generation(format!(
                "{} carries incomplete generated sources; generation must finish before extraction",
                tree.display()
            )));
        }

        let staging = fsutil::staging_dir_for(out)?;
        let content = staging.path().join("content");
        fs::create_dir_all(&content)?;

        let mut written: HashMap<PathBuf, PathBuf> = HashMap::new();
        let mut symbols_seen = BTreeSet::new();
        for file in fsutil::walk_files(tree, &[VCS_DIR])? {
            let Some(target) = self.filter.package_path(&file.relative) else {
                continue;
            };
            let Some(language) = SourceLanguage::from_path(&file.relative) else {
                continue;
            };
            let bytes = fs::read(&file.path)?;
            let text = String::from_utf8_lossy(&bytes);
            let found = symbols::public_symbols(&text, language);
            if found.is_empty() {
                debug!(file = %file.relative.display(), "No public symbols, skipping");
                continue;
            }
            if let Some(first) = written.get(&target) {
                warn!(
                    kept = %first.display(),
                    dropped = %file.relative.display(),
                    "Two sources map to the same package path"
                );
                continue;
            }

            let dest = content.join(&target);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&dest, &bytes)?;
            symbols_seen.extend(found);
            written.insert(target, file.relative);
        }

        if written.is_empty() {
            warn!(tree = %tree.display(), "No API sources matched the filter");
        }

        fsutil::replace_dir(&content, out)?;
        info!(
            out = %out.display(),
            files = written.len(),
            symbols = symbols_seen.len(),
            "Extracted API sources"
        );
        Ok(ApiSources {
            dir: out.to_path_buf(),
            files: written.len(),
            symbols: symbols_seen.len(),
        })
    }
}

/// Every public symbol declared by sources under `dirs`.
pub fn collect_symbols(dirs: &[PathBuf]) -> Result<BTreeSet<String>> {
    let mut all = BTreeSet::new();
    for dir in dirs {
        if !dir.is_dir() {
            continue;
        }
        for file in fsutil::walk_files(dir, &[VCS_DIR])? {
            let Some(language) = SourceLanguage::from_path(&file.relative) else {
                continue;
            };
            let text = String::from_utf8_lossy(&fs::read(&file.path)?).into_owned();
            all.extend(symbols::public_symbols(&text, language));
        }
    }
    Ok(all)
}
