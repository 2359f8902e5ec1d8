//! Filesystem utilities.

use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use walkdir::{DirEntry, WalkDir};

/// Version-control metadata (directory or gitlink file) never copied into a mirror.
pub const VCS_DIR: &str = ".git";

/// Why an entry was left out of a tree copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// Version-control metadata.
    Vcs,
    /// Socket, device, named pipe or other entry that cannot be duplicated.
    Irregular,
}

/// Classify a walked entry against the copy skip rules.
pub fn skip_reason(entry: &DirEntry) -> Option<Skip> {
    if entry.file_name() == VCS_DIR {
        return Some(Skip::Vcs);
    }
    let ty = entry.file_type();
    if ty.is_dir() || ty.is_file() || ty.is_symlink() {
        None
    } else {
        Some(Skip::Irregular)
    }
}

/// Recursively copy `src` into `dst`, merging with whatever `dst` holds.
///
/// `.git` entries are skipped, whether directory or gitlink file. Irregular entries are skipped with a
/// warning. Symlinks are recreated, not followed. A regular file that
/// cannot be copied aborts the copy.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)
        .with_context(|| format!("failed to create directory: {}", dst.display()))?;

    let walker = WalkDir::new(src)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| match skip_reason(entry) {
            Some(Skip::Vcs) => {
                tracing::info!("skip .git [{}]", entry.path().display());
                false
            }
            Some(Skip::Irregular) => {
                tracing::warn!(
                    "skip file [{}], the file type is {:?}",
                    entry.path().display(),
                    entry.file_type()
                );
                false
            }
            None => true,
        });

    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("{} escaped {}", entry.path().display(), src.display()))?;
        let target = dst.join(rel);
        let ty = entry.file_type();

        if ty.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("failed to create directory: {}", target.display()))?;
        } else if ty.is_symlink() {
            let link = fs::read_link(entry.path())
                .with_context(|| format!("failed to read link: {}", entry.path().display()))?;
            if target.symlink_metadata().is_ok() {
                fs::remove_file(&target).with_context(|| {
                    format!("failed to replace existing entry: {}", target.display())
                })?;
            }
            symlink(&link, &target).with_context(|| {
                format!("failed to create symlink: {}", target.display())
            })?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    entry.path().display(),
                    target.display()
                )
            })?;
        }
    }
    Ok(())
}

/// Remove a directory and all its contents, if it exists.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Write a string to a file, creating parent directories if needed.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write file: {}", path.display()))
}

/// Create a symlink (platform-aware).
#[cfg(unix)]
pub fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
pub fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    if src.is_dir() {
        std::os::windows::fs::symlink_dir(src, dst)
    } else {
        std::os::windows::fs::symlink_file(src, dst)
    }
}
