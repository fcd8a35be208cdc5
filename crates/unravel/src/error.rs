//! Error types for grouping, codec and nested extraction operations.

use crate::types::{ArchiveType, GroupStatus, PartScheme};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by the in-process codec while reading or unpacking one archive.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Archive file not found at the specified path.
    #[error("Archive not found: {0}")]
    NotFound(PathBuf),

    /// The file is not an archive this codec understands.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The archive requires a password but none was provided.
    #[error("Password required")]
    PasswordRequired,

    /// The provided password is incorrect.
    #[error("Invalid password")]
    InvalidPassword,

    /// A volume of a multi-volume set is absent or truncated.
    #[error("Missing volume: {0}")]
    MissingVolume(String),

    /// A security violation was detected during extraction.
    #[error("Security violation: {0}")]
    Security(#[from] SecurityError),

    /// The archive is corrupted or malformed.
    #[error("Corrupted archive: {0}")]
    Corrupted(String),

    /// An I/O error occurred during extraction.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The extraction was cancelled by the user.
    #[error("Cancelled by user")]
    Cancelled,
}

impl ExtractError {
    /// Renders the error as a diagnostic line in the style of the 7-Zip console
    /// tool, so that a single keyword table classifies every codec.
    pub fn diagnostic(&self, archive: &Path) -> String {
        let name = archive.display();
        match self {
            ExtractError::NotFound(path) => {
                format!("ERROR: Can not open the file as archive : {}", path.display())
            }
            ExtractError::UnsupportedFormat(detail) => {
                format!("ERROR: {} : Can not open the file as archive ({})", name, detail)
            }
            ExtractError::PasswordRequired => {
                format!("ERROR: {} : Can not open encrypted archive. Wrong password?", name)
            }
            ExtractError::InvalidPassword => format!("ERROR: Wrong password : {}", name),
            ExtractError::MissingVolume(volume) => format!("ERROR: Missing volume : {}", volume),
            ExtractError::Security(e) => format!("ERROR: Unsafe content in {} : {}", name, e),
            ExtractError::Corrupted(detail) => {
                format!("ERROR: Data Error : {} ({})", name, detail)
            }
            ExtractError::Io(e) => format!("ERROR: {} : {}", name, e),
            ExtractError::Cancelled => "Break signaled".to_string(),
        }
    }
}

/// Security-related errors during extraction.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Path traversal attempt detected (e.g., "../../../etc/passwd").
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    /// Absolute path not allowed in archive entries.
    #[error("Absolute path not allowed: {0}")]
    AbsolutePath(String),

    /// Unsafe entry type detected (e.g., symlink when not allowed).
    #[error("Unsafe entry type: {0}")]
    UnsafeEntryType(String),

    /// The configured extraction size limit was exceeded.
    #[error("Size limit exceeded: {current} bytes > {limit} bytes")]
    SizeLimitExceeded {
        /// Current extracted size in bytes
        current: u64,
        /// Configured size limit in bytes
        limit: u64,
    },
}

/// Raised when a file cannot join an [`ArchiveGroup`](crate::group::ArchiveGroup).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartMismatchError {
    #[error("base name '{found}' does not match group base '{expected}'")]
    BaseName { expected: String, found: String },

    #[error("archive type {found:?} does not match group type {expected:?}")]
    ArchiveType {
        expected: ArchiveType,
        found: ArchiveType,
    },

    #[error("numbering {found:?} cannot continue a {expected:?} set")]
    Scheme {
        expected: PartScheme,
        found: PartScheme,
    },

    #[error("part {0} is already present in the group")]
    DuplicateIndex(u32),

    #[error("{0} is not a continuation part")]
    NotAContinuation(PathBuf),
}

/// Why a group stopped short of success. Converted into a terminal
/// [`GroupStatus`] at the engine boundary and never propagated further.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error(transparent)]
    PartMismatch(#[from] PartMismatchError),

    #[error("missing volume(s): {0}")]
    MissingVolume(String),

    #[error("no password worked after {attempts} attempt(s)")]
    WrongPassword { attempts: usize },

    #[error("archive is corrupted: {0}")]
    CorruptedArchive(String),

    #[error("not an archive: {0}")]
    UnsupportedFormat(String),

    #[error("nesting depth {depth} exceeds the limit of {max}")]
    NestingTooDeep { depth: usize, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

impl GroupError {
    /// Terminal status a group takes when it fails with this error.
    pub fn status(&self) -> GroupStatus {
        match self {
            GroupError::MissingVolume(_) => GroupStatus::FailedMissingPart,
            GroupError::WrongPassword { .. } => GroupStatus::FailedPassword,
            GroupError::NestingTooDeep { .. } => GroupStatus::FailedTooDeep,
            GroupError::Cancelled => GroupStatus::Pending,
            // Not an archive: the file is delivered as ordinary content.
            GroupError::UnsupportedFormat(_) => GroupStatus::Succeeded,
            GroupError::PartMismatch(_) | GroupError::CorruptedArchive(_) | GroupError::Io(_) => {
                GroupStatus::FailedCorrupt
            }
        }
    }
}

/// Errors loading or compiling cloak rules.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("failed to read rules: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid rules file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rule '{name}' has an invalid pattern: {source}")]
    Pattern {
        name: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors loading an engine configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors applying a normalized name on disk.
#[derive(Debug, Error)]
pub enum RenameError {
    #[error("cannot rename to {0}: target already exists")]
    Collision(PathBuf),

    #[error("rename failed: {0}")]
    Io(#[from] std::io::Error),
}
