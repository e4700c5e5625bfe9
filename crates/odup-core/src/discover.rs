//! Input enumeration: one file, or the matching media files of a directory tree.
//!
//! Directory walks are depth-first with entries sorted by name, so the upload
//! order is the same on every run.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::UploadConfig;

/// A file selected for upload. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Path relative to the input root, `/`-separated. Used for the remote name.
    pub relative_path: String,
    /// Local path used to read the file.
    pub absolute_path: PathBuf,
    /// Size in bytes at discovery time.
    pub size: u64,
}

/// Which directory entries qualify for upload.
#[derive(Debug, Clone)]
pub struct MediaFilter {
    extensions: Vec<String>,
    min_size: u64,
}

impl MediaFilter {
    pub fn new<I, S>(extensions: I, min_size: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            min_size,
        }
    }

    pub fn from_config(cfg: &UploadConfig) -> Self {
        Self::new(&cfg.extensions, cfg.min_file_size)
    }

    pub fn matches(&self, path: &Path, size: u64) -> bool {
        if size < self.min_size {
            return false;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|e| self.extensions.iter().any(|allowed| *allowed == e))
    }
}

/// Enumerate the files to upload from `input`.
///
/// A regular file is returned as-is (no filtering). A directory is walked
/// recursively and only regular files accepted by `filter` are returned.
pub fn discover(input: &Path, filter: &MediaFilter) -> Result<Vec<FileDescriptor>> {
    let meta = fs::metadata(input).with_context(|| format!("stat {}", input.display()))?;
    if meta.is_file() {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("no file name in {}", input.display()))?;
        let absolute_path = fs::canonicalize(input)
            .with_context(|| format!("resolve {}", input.display()))?;
        return Ok(vec![FileDescriptor {
            relative_path: name,
            absolute_path,
            size: meta.len(),
        }]);
    }
    if !meta.is_dir() {
        anyhow::bail!("{} is neither a file nor a directory", input.display());
    }

    let root = fs::canonicalize(input).with_context(|| format!("resolve {}", input.display()))?;
    let mut out = Vec::new();
    walk(&root, &root, filter, &mut out)?;
    tracing::debug!(root = %root.display(), files = out.len(), "directory scan finished");
    Ok(out)
}

fn walk(root: &Path, dir: &Path, filter: &MediaFilter, out: &mut Vec<FileDescriptor>) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("read directory {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("read directory {}", dir.display()))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("stat {}", path.display()))?;
        if file_type.is_dir() {
            walk(root, &path, filter, out)?;
        } else if file_type.is_file() {
            let size = entry
                .metadata()
                .with_context(|| format!("stat {}", path.display()))?
                .len();
            if !filter.matches(&path, size) {
                tracing::trace!(path = %path.display(), size, "skipped by filter");
                continue;
            }
            out.push(FileDescriptor {
                relative_path: relative_remote_path(root, &path),
                absolute_path: path,
                size,
            });
        }
    }
    Ok(())
}

fn relative_remote_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
