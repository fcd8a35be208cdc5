//! Run-scoped tracking of temporary paths.
//!
//! Every staging directory is registered the moment it is created, and only
//! registered paths can be removed through the guard. Source archives never
//! pass through here.

use crate::recycle::remove_temp;
use crate::types::RemovalMode;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Prefix of every staging directory the engine creates.
pub const STAGING_PREFIX: &str = ".unravel-";

/// Paths created by this run, in creation order.
#[derive(Debug, Default)]
struct TempArtifactSet {
    paths: Vec<PathBuf>,
}

/// Cloneable access to the run's temp paths, safe to move into a signal
/// handler.
#[derive(Debug, Clone)]
pub struct CleanupHandle {
    artifacts: Arc<Mutex<TempArtifactSet>>,
    mode: RemovalMode,
}

impl CleanupHandle {
    fn lock(&self) -> MutexGuard<'_, TempArtifactSet> {
        self.artifacts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Removes every registered path that still exists and forgets all of
    /// them. Failures are logged.
    ///
    /// # Returns
    ///
    /// Number of paths removed.
    pub fn cleanup_all(&self) -> usize {
        let paths = std::mem::take(&mut self.lock().paths);
        let mut removed = 0;
        // Newest first, so nested staging goes before its parent.
        for path in paths.iter().rev() {
            if !path.exists() {
                continue;
            }
            match remove_temp(path, self.mode) {
                Ok(()) => {
                    debug!("Removed temp path {}", path.display());
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove temp path {}: {}", path.display(), e),
            }
        }
        removed
    }
}

/// Owner of the run's temp paths. Dropping the guard cleans up whatever is
/// still registered.
#[derive(Debug)]
pub struct CleanupGuard {
    handle: CleanupHandle,
}

impl CleanupGuard {
    pub fn new(mode: RemovalMode) -> Self {
        Self {
            handle: CleanupHandle {
                artifacts: Arc::new(Mutex::new(TempArtifactSet::default())),
                mode,
            },
        }
    }

    /// Records a path the run has just created.
    pub fn register_temp(&self, path: PathBuf) {
        let mut set = self.handle.lock();
        if !set.paths.contains(&path) {
            set.paths.push(path);
        }
    }

    /// Creates a uniquely named staging directory under `parent` and
    /// registers it before returning.
    pub fn create_staging(&self, parent: &Path, label: &str) -> io::Result<PathBuf> {
        std::fs::create_dir_all(parent)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{STAGING_PREFIX}{}-", sanitize_label(label)))
            .tempdir_in(parent)?
            .keep();
        self.register_temp(dir.clone());
        debug!("Created staging directory {}", dir.display());
        Ok(dir)
    }

    pub fn is_registered(&self, path: &Path) -> bool {
        self.handle.lock().paths.iter().any(|p| p == path)
    }

    pub fn registered(&self) -> Vec<PathBuf> {
        self.handle.lock().paths.clone()
    }

    /// Removes one registered path and forgets it.
    ///
    /// # Errors
    ///
    /// Refuses with [`io::ErrorKind::PermissionDenied`] when `path` was not
    /// registered by this run.
    pub fn remove(&self, path: &Path) -> io::Result<()> {
        let mut set = self.handle.lock();
        let Some(position) = set.paths.iter().position(|p| p == path) else {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is not a temp path of this run", path.display()),
            ));
        };
        set.paths.remove(position);
        drop(set);
        if path.exists() {
            remove_temp(path, self.handle.mode)?;
        }
        Ok(())
    }

    pub fn cleanup_all(&self) -> usize {
        self.handle.cleanup_all()
    }

    pub fn handle(&self) -> CleanupHandle {
        self.handle.clone()
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.handle.cleanup_all();
    }
}

fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .take(24)
        .collect();
    if cleaned.is_empty() {
        "staging".to_string()
    } else {
        cleaned
    }
}
