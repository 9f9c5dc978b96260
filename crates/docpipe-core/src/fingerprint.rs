//! Content fingerprints for staleness checks.
//!
//! A stage is up to date when the fingerprint of its inputs matches the one
//! recorded after its last successful run. Fingerprints are SHA-256 digests
//! rendered as lowercase hex.

use std::fmt::Write as _;
use std::fs::File;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::fetch::STAMP_FILE;
use crate::fsutil::{self, VCS_DIR};
use crate::graph::{Artifact, ArtifactKind};
use crate::Result;

const ABSENT: &str = "absent";

/// Incrementally hashes labelled fields.
#[derive(Debug, Clone, Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    /// Start an empty fingerprint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mix in a labelled value. Labels and values are length-delimited.
    #[must_use]
    pub fn field(mut self, label: &str, value: &str) -> Self {
        for part in [label, value] {
            self.hasher.update((part.len() as u64).to_le_bytes());
            self.hasher.update(part.as_bytes());
        }
        self
    }

    /// Finish and render as hex.
    pub fn finish(self) -> String {
        to_hex(&self.hasher.finalize())
    }
}

/// Digest of a single file's bytes.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut file = File::open(path)?;
    io::copy(&mut file, &mut hasher)?;
    Ok(to_hex(&hasher.finalize()))
}

/// Digest of every file under `root`: relative path and content, in sorted
/// walk order. Version control metadata is ignored.
pub fn hash_tree(root: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    for file in fsutil::walk_files(root, &[VCS_DIR])? {
        let rel = file.relative.to_string_lossy().replace('\\', "/");
        hasher.update((rel.len() as u64).to_le_bytes());
        hasher.update(rel.as_bytes());
        let mut handle = File::open(&file.path)?;
        let len = handle.metadata()?.len();
        hasher.update(len.to_le_bytes());
        io::copy(&mut handle, &mut hasher)?;
    }
    Ok(to_hex(&hasher.finalize()))
}

/// Fingerprint of an artifact's current content.
///
/// Source trees are identified by their fetch stamp rather than their full
/// content. Missing artifacts hash to a fixed marker so their later
/// appearance changes the fingerprint.
pub fn artifact_fingerprint(artifact: &Artifact) -> Result<String> {
    let path = artifact.path();
    let value = match artifact.kind() {
        ArtifactKind::Scratch => String::new(),
        ArtifactKind::SourceTree => {
            let stamp = path.join(STAMP_FILE);
            if stamp.is_file() {
                hash_file(&stamp)?
            } else {
                ABSENT.to_string()
            }
        },
        ArtifactKind::File => {
            if path.is_file() {
                hash_file(path)?
            } else {
                ABSENT.to_string()
            }
        },
        ArtifactKind::Directory => {
            if path.is_dir() {
                hash_tree(path)?
            } else {
                ABSENT.to_string()
            }
        },
    };
    Ok(value)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, clippy::disallowed_macros)]
mod tests {
    use super::*;
    use crate::graph::PipelineGraphBuilder;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_field_order_and_boundaries_matter() {
        let a = Fingerprint::new().field("ab", "c").finish();
        let b = Fingerprint::new().field("a", "bc").finish();
        let c = Fingerprint::new().field("ab", "c").finish();
        assert_ne!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_tree_hash_tracks_paths_and_content() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("tree");
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::write(root.join("pkg/A.kt"), "class A").unwrap();
        let first = hash_tree(&root).unwrap();

        fs::write(root.join("pkg/A.kt"), "class B").unwrap();
        let changed = hash_tree(&root).unwrap();
        assert_ne!(first, changed);

        fs::write(root.join("pkg/A.kt"), "class A").unwrap();
        assert_eq!(hash_tree(&root).unwrap(), first);

        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join(".git/index"), "noise").unwrap();
        assert_eq!(hash_tree(&root).unwrap(), first);
    }

    #[test]
    fn test_missing_artifacts_hash_to_marker() {
        let tmp = TempDir::new().unwrap();
        let mut builder = PipelineGraphBuilder::new();
        let dir = builder.artifact("d", tmp.path().join("nope"), ArtifactKind::Directory);
        let tree = builder.artifact("t", tmp.path().join("tree"), ArtifactKind::SourceTree);

        assert_eq!(artifact_fingerprint(&dir).unwrap(), ABSENT);
        assert_eq!(artifact_fingerprint(&tree).unwrap(), ABSENT);

        fs::create_dir_all(tmp.path().join("tree")).unwrap();
        fs::write(tmp.path().join("tree").join(STAMP_FILE), "{}").unwrap();
        assert_ne!(artifact_fingerprint(&tree).unwrap(), ABSENT);
    }
}
