//! Lightweight public-symbol detection for Java, Kotlin and Groovy sources.
//!
//! This is a line-oriented scan, not a parser. It finds the declarations a
//! documentation generator would give their own page: public types in Java
//! and Groovy, and top-level types, functions and properties in Kotlin that
//! are not `private`, `internal` or `protected`.

use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

/// Source language, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLanguage {
    /// `.java`
    Java,
    /// `.kt`
    Kotlin,
    /// `.groovy`
    Groovy,
}

impl SourceLanguage {
    /// Language of `path`, if it is one we scan.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "java" => Some(Self::Java),
            "kt" => Some(Self::Kotlin),
            "groovy" => Some(Self::Groovy),
            _ => None,
        }
    }
}

const IDENT: &str = r"[A-Za-z_$][A-Za-z0-9_$]*";

#[allow(clippy::expect_used)]
fn java_types() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?m)^\s*public\s+(?:(?:abstract|final|static|sealed|non-sealed|strictfp)\s+)*(?:class|interface|enum|@interface|record)\s+({IDENT})"
        ))
        .expect("symbol regex is valid")
    })
}

#[allow(clippy::expect_used)]
fn groovy_types() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?m)^\s*(?:public\s+)?(?:(?:abstract|final|static)\s+)*(?:class|interface|enum|trait)\s+({IDENT})"
        ))
        .expect("symbol regex is valid")
    })
}

#[allow(clippy::expect_used)]
fn kotlin_types() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?m)^(?:(?:public|open|abstract|sealed|data|inline|value|enum|annotation|fun|expect|actual)\s+)*(?:class|interface|object|typealias)\s+({IDENT})"
        ))
        .expect("symbol regex is valid")
    })
}

#[allow(clippy::expect_used)]
fn kotlin_members() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?m)^(?:(?:public|inline|operator|infix|suspend|tailrec|external|const|actual)\s+)*(?:fun|val|var)\s+(?:<[^>]*>\s*)?(?:[A-Za-z_][\w.]*(?:<[^>]*>)?\??\.)?({IDENT})\s*[(:=]"
        ))
        .expect("symbol regex is valid")
    })
}

/// Public symbol names declared in `content`, in order of first appearance.
pub fn public_symbols(content: &str, language: SourceLanguage) -> Vec<String> {
    let patterns: Vec<&Regex> = match language {
        SourceLanguage::Java => vec![java_types()],
        SourceLanguage::Groovy => vec![groovy_types()],
        SourceLanguage::Kotlin => vec![kotlin_types(), kotlin_members()],
    };

    let mut found: Vec<(usize, String)> = patterns
        .iter()
        .flat_map(|re| re.captures_iter(content))
        .filter_map(|caps| caps.get(1).map(|m| (m.start(), m.as_str().to_string())))
        .collect();
    found.sort_by_key(|(offset, _)| *offset);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter_map(|(_, name)| seen.insert(name.clone()).then_some(name))
        .collect()
}
