//! Checking rendered documentation against the sources it was built from.
//!
//! Every HTML page must be non-empty and look like HTML, and every public
//! symbol in the API and accessor sources must have a page. Page names are
//! compared loosely: generators commonly render `FooBar` as `-foo-bar/`.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::collect_symbols;
use crate::{Error, Result, fsutil};

/// Missing symbols listed before the message is truncated.
const MAX_REPORTED: usize = 10;

/// Result of a successful check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocReport {
    /// HTML pages inspected.
    pub pages: usize,
    /// Public symbols matched to pages.
    pub symbols: usize,
}

/// Normalized lookup key for a page path.
///
/// `index.html` takes its parent directory's name; other pages use their
/// file stem.
pub fn page_key(relative: &Path) -> Option<String> {
    let stem = relative.file_stem()?.to_str()?;
    let name = if stem == "index" {
        relative.parent()?.file_name()?.to_str()?
    } else {
        stem
    };
    Some(normalize(name))
}

/// Normalized lookup key for a symbol.
pub fn symbol_key(symbol: &str) -> String {
    normalize(symbol)
}

fn normalize(name: &str) -> String {
    name.chars().filter(|c| *c != '-').flat_map(char::to_lowercase).collect()
}

/// Verify the documentation under `docs` covers the symbols under `sources`.
pub fn verify_docs(docs: &Path, sources: &[PathBuf]) -> Result<DocReport> {
    if !docs.is_dir() {
        return Err(Error::Verification(format!(
            "documentation directory {} does not exist",
            docs.display()
        )));
    }

    let mut keys = BTreeSet::new();
    let mut pages = 0;
    let mut broken = Vec::new();
    for file in fsutil::walk_files(docs, &[])? {
        if file.relative.extension().is_none_or(|e| e != "html") {
            continue;
        }
        pages += 1;
        let bytes = fs::read(&file.path)?;
        let content = String::from_utf8_lossy(&bytes);
        if content.trim().is_empty() || !content.to_ascii_lowercase().contains("<html") {
            broken.push(file.relative.display().to_string());
        }
        if let Some(key) = page_key(&file.relative) {
            keys.insert(key);
        }
    }

    if pages == 0 {
        return Err(Error::Verification("no HTML pages were generated".to_string()));
    }
    if !broken.is_empty() {
        return Err(Error::Verification(format!(
            "{} page(s) are empty or not HTML: {}",
            broken.len(),
            summarize(&broken)
        )));
    }

    let symbols = collect_symbols(sources)?;
    let missing: Vec<String> = symbols
        .iter()
        .filter(|s| !keys.contains(&symbol_key(s)))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(Error::Verification(format!(
            "{} public symbol(s) have no page: {}",
            missing.len(),
            summarize(&missing)
        )));
    }

    debug!(pages, symbols = symbols.len(), "Documentation covers all symbols");
    info!(docs = %docs.display(), pages, "Documentation check passed");
    Ok(DocReport {
        pages,
        symbols: symbols.len(),
    })
}

fn summarize(items: &[String]) -> String {
    let shown = items.iter().take(MAX_REPORTED).cloned().collect::<Vec<_>>().join(", ");
    if items.len() > MAX_REPORTED {
        format!("{shown} and {} more", items.len() - MAX_REPORTED)
    } else {
        shown
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, clippy::disallowed_macros)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_page_keys() {
        assert_eq!(page_key(Path::new("m/org.gradle/-foo-bar/index.html")).as_deref(), Some("foobar"));
        assert_eq!(page_key(Path::new("m/org.gradle/-foo-bar/configure.html")).as_deref(), Some("configure"));
        assert_eq!(symbol_key("FooBar"), "foobar");
    }

    #[test]
    fn test_every_symbol_needs_a_page() {
        let tmp = TempDir::new().unwrap();
        let sources = tmp.path().join("src");
        write(&sources, "org/Project.java", "public interface Project {}\n");
        write(&sources, "org/ext.kt", "fun Project.configureDocs() {}\n");
        let docs = tmp.path().join("docs");
        write(&docs, "m/index.html", "<html>module</html>");
        write(&docs, "m/org/-project/index.html", "<html>Project</html>");

        let err = verify_docs(&docs, std::slice::from_ref(&sources)).unwrap_err();
        assert!(matches!(err, Error::Verification(ref m) if m.contains("configureDocs")));

        write(&docs, "m/org/configure-docs.html", "<HTML>configureDocs</HTML>");
        let report = verify_docs(&docs, &[sources]).unwrap();
        assert_eq!(report.pages, 3);
        assert_eq!(report.symbols, 2);
    }

    #[test]
    fn test_non_utf8_page_is_still_html() {
        let tmp = TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        fs::create_dir_all(docs.join("m")).unwrap();
        fs::write(docs.join("m/index.html"), b"<html>caf\xe9</html>").unwrap();

        let report = verify_docs(&docs, &[]).unwrap();
        assert_eq!(report.pages, 1);
        assert_eq!(report.symbols, 0);
    }

    #[test]
    fn test_empty_pages_fail() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "docs/index.html", "   ");
        let err = verify_docs(&tmp.path().join("docs"), &[]).unwrap_err();
        assert!(matches!(err, Error::Verification(ref m) if m.contains("empty")));
    }

    #[test]
    fn test_no_pages_fail() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "docs/style.css", "body {}");
        let err = verify_docs(&tmp.path().join("docs"), &[]).unwrap_err();
        assert!(matches!(err, Error::Verification(ref m) if m.contains("no HTML")));
    }

    #[test]
    fn test_summary_truncates() {
        let items: Vec<String> = (0..12).map(|i| i.to_string()).collect();
        assert!(summarize(&items).ends_with("and 2 more"));
    }
}
