//! Filesystem helpers shared by the stages.
//!
//! Outputs are never written in place: content is staged in a sibling
//! temporary directory and swapped into its final location by rename, so a
//! reader sees either the previous artifact or the complete new one.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use ignore::WalkBuilder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::{NamedTempFile, TempDir};
use tracing::debug;

use crate::{Error, Result};

/// Version control metadata directory skipped by tree walks.
pub const VCS_DIR: &str = ".git";

/// A regular file found by [`walk_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    /// Path relative to the walk root.
    pub relative: PathBuf,
    /// Absolute (or root-joined) path.
    pub path: PathBuf,
}

/// List every regular file under `root` in a stable, sorted order.
///
/// Directories whose name appears in `skip` are pruned at any depth. Symbolic
/// links are not followed and not listed.
pub fn walk_files(root: &Path, skip: &[&str]) -> Result<Vec<WalkedFile>> {
    let skip: Vec<String> = skip.iter().map(|s| (*s).to_string()).collect();
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            entry.depth() == 0
                || !entry.file_type().is_some_and(|t| t.is_dir())
                || !skip.iter().any(|s| entry.file_name() == s.as_str())
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path().to_path_buf();
        let relative = path
            .strip_prefix(root)
            .map_err(|e| Error::Other(format!("walked outside {}: {e}", root.display())))?
            .to_path_buf();
        files.push(WalkedFile { relative, path });
    }
    Ok(files)
}

/// Copy the tree at `src` into `dst`, creating `dst` if needed.
///
/// Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path, skip: &[&str]) -> Result<usize> {
    if !src.is_dir() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", src.display()),
        )));
    }
    fs::create_dir_all(dst)?;
    let files = walk_files(src, skip)?;
    for file in &files {
        let target = dst.join(&file.relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&file.path, &target)?;
    }
    Ok(files.len())
}

/// Count regular files under `root` whose extension is `ext`.
pub fn count_files_with_extension(root: &Path, ext: &str) -> Result<usize> {
    Ok(walk_files(root, &[])?
        .iter()
        .filter(|f| f.relative.extension().is_some_and(|e| e == ext))
        .count())
}

/// Whether `dir` exists and contains at least one regular file.
pub fn has_files(dir: &Path) -> bool {
    dir.is_dir() && walk_files(dir, &[]).is_ok_and(|files| !files.is_empty())
}

/// Create a staging directory beside `dest`.
///
/// Staging beside the destination keeps the final swap on one filesystem.
pub fn staging_dir_for(dest: &Path) -> Result<TempDir> {
    let parent = parent_of(dest)?;
    fs::create_dir_all(parent)?;
    let name = dest
        .file_name()
        .map_or_else(|| "artifact".to_string(), |n| n.to_string_lossy().into_owned());
    Ok(tempfile::Builder::new()
        .prefix(&format!(".{name}-staging-"))
        .tempdir_in(parent)?)
}

/// Replace `dest` with `staged` in one rename.
///
/// An existing `dest` is moved aside first and restored if the swap fails.
pub fn replace_dir(staged: &Path, dest: &Path) -> Result<()> {
    let parent = parent_of(dest)?;
    fs::create_dir_all(parent)?;
    let trash = tempfile::Builder::new()
        .prefix(".docpipe-replaced-")
        .tempdir_in(parent)?;
    let previous = trash.path().join("previous");

    let had_previous = match fs::rename(dest, &previous) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => return Err(e.into()),
    };

    if let Err(e) = fs::rename(staged, dest) {
        if had_previous {
            fs::rename(&previous, dest)?;
        }
        return Err(e.into());
    }

    debug!(dest = %dest.display(), "Swapped staged output into place");
    Ok(())
}

/// Remove a file or directory if it exists. Returns whether anything was removed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(true)
}

/// Write `bytes` to `path` through a temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = parent_of(path)?;
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(value)?;
    json.push(b'\n');
    write_atomic(path, &json)
}

/// Read and deserialize a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Path of the lock file guarding `target`: a sibling named `<target>.lock`.
pub fn lock_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}

/// An exclusive advisory lock on a directory, held until dropped.
#[derive(Debug)]
pub struct DirLock {
    _file: File,
    path: PathBuf,
}

impl DirLock {
    /// Try to lock `target` without blocking.
    ///
    /// Returns `Ok(None)` when another holder owns the lock.
    pub fn try_acquire(target: &Path) -> Result<Option<Self>> {
        let path = lock_path(target);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(Self { _file: file, path })),
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Location of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parent_of(path: &Path) -> Result<&Path> {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => Ok(p),
        Some(_) => Ok(Path::new(".")),
        None => Err(Error::Other(format!("{} has no parent directory", path.display()))),
    }
}
