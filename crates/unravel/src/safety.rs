//! Guards applied to archive entries and delivered files.
//!
//! Entry paths come from untrusted archives. They are normalized here before
//! anything touches the file system so that no entry escapes its staging
//! directory (zip-slip), and delivered files never overwrite existing ones.

use crate::error::SecurityError;
use crate::types::ExtractOptions;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Entry type for filtering special file types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    File,
    Directory,
    Symlink,
    Hardlink,
    /// Devices, sockets, FIFOs.
    Other,
}

/// Validates and normalizes an archive entry path.
///
/// Archives written on Windows use `\` as separator, so both separators are
/// honoured on every platform. Absolute paths, drive prefixes and `..`
/// components are rejected; `.` components are dropped.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use unravel::safety::validate_entry_path;
///
/// let safe = validate_entry_path(Path::new("dir/./file.txt")).unwrap();
/// assert_eq!(safe, Path::new("dir/file.txt"));
///
/// assert!(validate_entry_path(Path::new("../../etc/passwd")).is_err());
/// assert!(validate_entry_path(Path::new("dir\\..\\..\\boot.ini")).is_err());
/// assert!(validate_entry_path(Path::new("/etc/passwd")).is_err());
/// ```
pub fn validate_entry_path(path: &Path) -> Result<PathBuf, SecurityError> {
    let raw = path
        .to_str()
        .ok_or_else(|| SecurityError::PathTraversal("path is not valid UTF-8".to_string()))?;
    let unified = raw.replace('\\', "/");

    if unified.starts_with('/') || has_drive_prefix(&unified) {
        return Err(SecurityError::AbsolutePath(raw.to_string()));
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => continue,
            Component::ParentDir => {
                return Err(SecurityError::PathTraversal(format!(
                    "path contains '..' component: {}",
                    raw
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(SecurityError::AbsolutePath(raw.to_string()));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(SecurityError::PathTraversal("path normalizes to empty".to_string()));
    }
    Ok(normalized)
}

/// `C:` style prefixes, which `Path` only understands on Windows.
fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Checks if the current extracted size exceeds the configured limit.
///
/// # Examples
///
/// ```
/// use unravel::safety::check_size_limits;
///
/// assert!(check_size_limits(1000, Some(2000)).is_ok());
/// assert!(check_size_limits(3000, Some(2000)).is_err());
/// assert!(check_size_limits(999_999_999, None).is_ok());
/// ```
pub fn check_size_limits(current_bytes: u64, limit: Option<u64>) -> Result<(), SecurityError> {
    match limit {
        Some(max_bytes) if current_bytes > max_bytes => Err(SecurityError::SizeLimitExceeded {
            current: current_bytes,
            limit: max_bytes,
        }),
        _ => Ok(()),
    }
}

/// Whether an entry of `entry_type` may be written under `options`.
///
/// Links are only written when explicitly allowed; device files and other
/// special entries never are.
pub fn is_safe_entry_type(entry_type: EntryType, options: &ExtractOptions) -> bool {
    match entry_type {
        EntryType::File | EntryType::Directory => true,
        EntryType::Symlink => options.allow_symlinks,
        EntryType::Hardlink => options.allow_hardlinks,
        EntryType::Other => false,
    }
}

/// First free variant of `path`: `name.ext`, then `name (1).ext`,
/// `name (2).ext`, and so on.
pub fn non_clobbering_path(path: &Path) -> io::Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    let parent = path.parent().unwrap_or(Path::new(""));
    let file_stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let extension = path.extension().and_then(|s| s.to_str());

    for i in 1..10_000 {
        let new_name = match extension {
            Some(ext) => format!("{} ({}).{}", file_stem, i, ext),
            None => format!("{} ({})", file_stem, i),
        };
        let candidate = parent.join(new_name);
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name next to {}", path.display()),
    ))
}
