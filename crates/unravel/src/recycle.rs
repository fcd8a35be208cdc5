//! Removal and relocation of files, through the recycle bin or for good.

use crate::types::RemovalMode;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Moves `path` to the operating system's recycle bin.
pub fn recycle(path: &Path) -> io::Result<()> {
    trash::delete(path).map_err(|e| io::Error::other(format!("cannot recycle {}: {}", path.display(), e)))
}

/// Deletes a file or a whole directory tree.
pub fn delete_permanently(path: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Removes a consumed source archive.
///
/// A failed recycle is reported and the file stays where it is; source data
/// is never deleted permanently unless that mode was chosen.
pub fn remove_source(path: &Path, mode: RemovalMode) -> io::Result<()> {
    debug!("Removing source {} ({:?})", path.display(), mode);
    match mode {
        RemovalMode::Recycle => recycle(path),
        RemovalMode::Permanent => delete_permanently(path),
    }
}

/// Removes a path this run created. Temp data may fall back to permanent
/// deletion when the recycle bin is unavailable.
pub fn remove_temp(path: &Path, mode: RemovalMode) -> io::Result<()> {
    match mode {
        RemovalMode::Recycle => recycle(path).or_else(|e| {
            warn!("{}; deleting temp path instead", e);
            delete_permanently(path)
        }),
        RemovalMode::Permanent => delete_permanently(path),
    }
}

/// Moves a file, copying across filesystems when a rename is not possible.
///
/// Refuses to overwrite an existing `to`.
pub fn move_path(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", to.display()),
        ));
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if from.is_file() => {
            debug!("rename {} failed ({}), copying", from.display(), e);
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}
