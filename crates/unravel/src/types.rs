//! Type definitions shared by grouping, codecs and the extraction engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Individual entry within an archive, as reported by a codec listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Path of the entry within the archive
    pub path: String,

    /// Whether this entry is a directory
    pub is_directory: bool,

    /// Uncompressed size in bytes
    pub size: u64,

    /// Compressed size in bytes (if available)
    pub compressed_size: Option<u64>,
}

impl ArchiveEntry {
    /// Final path component of the entry, used to match needed volume names.
    pub fn file_name(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.path)
    }
}

/// Archive family inferred from a file name or signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveType {
    SevenZ,
    Rar,
    Zip,
    Tar,
    Gz,
    Bz2,
    Xz,
    /// Unknown from the name alone; the codec decides at extraction time.
    Auto,
    /// Not an archive.
    None,
}

impl ArchiveType {
    pub fn is_archive(&self) -> bool {
        !matches!(self, ArchiveType::None)
    }

    /// Parses the `archive_type` hint used by cloak rule files.
    pub fn from_hint(hint: &str) -> Option<ArchiveType> {
        match hint.to_ascii_lowercase().as_str() {
            "7z" | "sevenz" => Some(ArchiveType::SevenZ),
            "rar" => Some(ArchiveType::Rar),
            "zip" => Some(ArchiveType::Zip),
            "tar" => Some(ArchiveType::Tar),
            "gz" | "gzip" => Some(ArchiveType::Gz),
            "bz2" | "bzip2" => Some(ArchiveType::Bz2),
            "xz" => Some(ArchiveType::Xz),
            "auto" => Some(ArchiveType::Auto),
            _ => None,
        }
    }
}

/// Numbering convention followed by the parts of an archive set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartScheme {
    /// One self-contained file.
    Single,
    /// `name.ext.001`, `name.ext.002`, ... (3-digit, from 001).
    Volume,
    /// `name.part1.rar`, `name.part2.rar`, ... (decimal, from 1).
    RarNew,
    /// `name.rar` followed by `name.r00`, `name.r01`, ... (2-digit, from 00).
    RarOld,
    /// `name.zip` followed by `name.z01`, `name.z02`, ... (2-digit, from 01).
    ZipSplit,
}

impl PartScheme {
    /// Index of the first continuation part, or `None` when the scheme has no
    /// continuations.
    pub fn first_continuation(&self) -> Option<u32> {
        match self {
            PartScheme::Single => None,
            PartScheme::Volume | PartScheme::RarNew => Some(2),
            PartScheme::RarOld => Some(0),
            PartScheme::ZipSplit => Some(1),
        }
    }

    /// Canonical file name of part `index` of a set named `base`.
    ///
    /// Volume sets keep their inner extension in the base (`data.7z`), the
    /// RAR and ZIP schemes do not (`movie` for `movie.part2.rar`).
    pub fn part_name(&self, base: &str, index: u32) -> String {
        match self {
            PartScheme::Volume => format!("{base}.{index:03}"),
            PartScheme::RarNew => format!("{base}.part{index}.rar"),
            PartScheme::RarOld => format!("{base}.r{index:02}"),
            PartScheme::ZipSplit => format!("{base}.z{index:02}"),
            PartScheme::Single => base.to_string(),
        }
    }
}

/// Key under which files are grouped: base name (case-folded) plus type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub base: String,
    pub archive_type: ArchiveType,
}

/// A candidate file plus the metadata inferred for it at grouping time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub path: PathBuf,
    pub archive_type: ArchiveType,
    /// Belongs to a numbered multi-part set.
    pub is_archive_part: bool,
    /// Primary part of a set, or a standalone archive.
    pub is_primary: bool,
    pub part_index: Option<u32>,
    pub base_name: String,
    pub scheme: PartScheme,
}

impl FileEntry {
    /// A file that is not an archive at all.
    pub fn plain(path: PathBuf) -> Self {
        let base_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            archive_type: ArchiveType::None,
            is_archive_part: false,
            is_primary: false,
            part_index: None,
            base_name,
            scheme: PartScheme::Single,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn is_continuation(&self) -> bool {
        self.is_archive_part && !self.is_primary
    }

    /// Whether the file can start an extraction (primary or standalone archive).
    pub fn is_extractable(&self) -> bool {
        self.is_primary && self.archive_type.is_archive()
    }

    pub fn key(&self) -> GroupKey {
        GroupKey {
            base: self.base_name.to_lowercase(),
            archive_type: self.archive_type,
        }
    }

    /// Same entry after the file was moved to `path`.
    pub fn relocated(&self, path: PathBuf) -> Self {
        Self {
            path,
            ..self.clone()
        }
    }

    pub fn parent(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// Lifecycle of an [`ArchiveGroup`](crate::group::ArchiveGroup).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupStatus {
    Pending,
    Extracting,
    Succeeded,
    FailedMissingPart,
    FailedPassword,
    FailedCorrupt,
    FailedTooDeep,
}

impl GroupStatus {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            GroupStatus::FailedMissingPart
                | GroupStatus::FailedPassword
                | GroupStatus::FailedCorrupt
                | GroupStatus::FailedTooDeep
        )
    }
}

/// Result of a single codec invocation, classified from its output text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptOutcome {
    Ok,
    WrongPassword,
    MissingVolume,
    Corrupted,
    Unsupported,
}

/// Record of one extraction try, kept for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionAttempt {
    /// `None` for the password-less attempt.
    pub password_tried: Option<String>,
    pub outcome: AttemptOutcome,
    pub produced_files: Vec<PathBuf>,
}

/// How consumed source archives and leftover temp paths are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalMode {
    /// Move to the operating system's recycle bin.
    #[default]
    Recycle,
    /// Delete immediately.
    Permanent,
}

/// Limits applied by the in-process codec while unpacking.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Maximum total extracted size in bytes (default: 20 GB)
    pub size_limit_bytes: Option<u64>,

    /// Whether to allow extraction of symbolic links
    pub allow_symlinks: bool,

    /// Whether to allow extraction of hard links
    pub allow_hardlinks: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            size_limit_bytes: Some(20 * 1024 * 1024 * 1024), // 20 GB
            allow_symlinks: false,
            allow_hardlinks: false,
        }
    }
}
