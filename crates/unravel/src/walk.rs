//! Collecting candidate files from the input paths.

use crate::cleanup::STAGING_PREFIX;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

/// System and tool files that are never treated as input.
pub const IGNORED_FILES: &[&str] = &[".DS_Store", "thumbs.db", "desktop.ini", "passwords.txt"];

/// Directory under the output folder where orphaned continuation parts wait
/// for their owner.
pub const HOLDING_DIR_NAME: &str = ".unravel-holding";

#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Descend into subdirectories of the input directories.
    pub recursive: bool,
    /// Directories to leave out entirely, such as the output folder.
    pub skip_dirs: Vec<PathBuf>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            skip_dirs: Vec::new(),
        }
    }
}

pub fn is_ignored_file(name: &str) -> bool {
    IGNORED_FILES.iter().any(|ignored| ignored.eq_ignore_ascii_case(name))
}

fn is_tool_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX)
}

/// Every regular file under `roots`, sorted and without duplicates.
///
/// A root may itself be a file. Unreadable entries are logged and skipped.
pub fn collect_files(roots: &[PathBuf], options: &WalkOptions) -> Vec<PathBuf> {
    let skipped = |path: &Path| options.skip_dirs.iter().any(|dir| path == dir);
    let max_depth = if options.recursive { usize::MAX } else { 1 };

    let mut files = Vec::new();
    for root in roots {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_tool_dir(e) && !(e.depth() > 0 && skipped(e.path())));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable path: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if is_ignored_file(&entry.file_name().to_string_lossy()) {
                continue;
            }
            files.push(entry.into_path());
        }
    }
    files.sort();
    files.dedup();
    files
}
