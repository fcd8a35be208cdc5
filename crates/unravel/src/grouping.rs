//! Turning a flat list of files into archive groups.
//!
//! Each path is uncloaked (unless detection is strict), classified by name
//! and, failing that, by signature, then assigned to a group keyed by base
//! name and archive type. Assignment is deterministic: the same file set
//! always yields the same groups.

use crate::cloak::{apply_rename, CloakNormalizer};
use crate::error::RenameError;
use crate::group::ArchiveGroup;
use crate::naming::{classify_name, is_opaque_name, sniff_signature};
use crate::types::{ArchiveType, FileEntry, PartScheme};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// A cloaked name and what it was (or would be) renamed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rename {
    pub from: PathBuf,
    pub to: PathBuf,
    /// `false` in dry runs and when the rename was refused.
    pub applied: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GroupingOptions {
    /// Skip cloak normalization and signature sniffing.
    pub strict: bool,
    /// Plan renames without performing them.
    pub dry_run: bool,
}

#[derive(Debug, Default)]
pub struct GroupingResult {
    pub groups: Vec<ArchiveGroup>,
    /// Files that are not archives.
    pub plain: Vec<FileEntry>,
    /// Continuation parts no group could take.
    pub orphans: Vec<FileEntry>,
    pub renames: Vec<Rename>,
}

impl GroupingResult {
    pub fn next_id(&self) -> Option<usize> {
        self.groups.iter().map(|g| g.id + 1).max()
    }
}

/// Classifies a path by its name alone.
///
/// Returns `None` when the name matches no archive rule.
pub fn entry_for(path: PathBuf) -> Option<FileEntry> {
    let name = path.file_name()?.to_str()?.to_string();
    let class = classify_name(&name)?;
    Some(FileEntry {
        path,
        archive_type: class.archive_type,
        is_archive_part: class.is_archive_part,
        is_primary: class.is_primary,
        part_index: class.part_index,
        base_name: class.base_name,
        scheme: class.scheme,
    })
}

/// A self-contained archive whose type came from its content.
fn standalone(path: PathBuf, archive_type: ArchiveType) -> FileEntry {
    let mut entry = FileEntry::plain(path);
    entry.archive_type = archive_type;
    entry.is_primary = true;
    entry.scheme = PartScheme::Single;
    entry
}

pub struct Grouper<'a> {
    normalizer: &'a CloakNormalizer,
    options: GroupingOptions,
}

impl<'a> Grouper<'a> {
    pub fn new(normalizer: &'a CloakNormalizer, options: GroupingOptions) -> Self {
        Self {
            normalizer,
            options,
        }
    }

    /// Classifies one file, sniffing its signature when the name says
    /// nothing.
    pub fn classify_path(&self, path: PathBuf) -> FileEntry {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(entry) = entry_for(path.clone()) {
            return entry;
        }
        if self.options.strict {
            return FileEntry::plain(path);
        }
        match sniff_signature(&path) {
            Ok(Some(kind)) => {
                debug!("{} has a {:?} signature", path.display(), kind);
                standalone(path, kind)
            }
            Ok(None) if is_opaque_name(&name) => standalone(path, ArchiveType::Auto),
            Ok(None) => FileEntry::plain(path),
            Err(e) => {
                warn!("Cannot read {}: {}", path.display(), e);
                if is_opaque_name(&name) {
                    standalone(path, ArchiveType::Auto)
                } else {
                    FileEntry::plain(path)
                }
            }
        }
    }

    /// Uncloaks the name of `path`, renaming on disk unless this is a dry
    /// run. Returns the path to classify.
    fn uncloak(&self, path: PathBuf, renames: &mut Vec<Rename>) -> PathBuf {
        if self.options.strict {
            return path;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return path;
        };
        let normalized = self.normalizer.normalize(name);
        if normalized == name {
            return path;
        }
        let target = path.with_file_name(&normalized);

        if self.options.dry_run {
            info!("Would rename {} -> {}", name, normalized);
            renames.push(Rename {
                from: path,
                to: target.clone(),
                applied: false,
            });
            return target;
        }

        match apply_rename(&path, &normalized) {
            Ok(renamed) => {
                info!("Renamed {} -> {}", name, normalized);
                renames.push(Rename {
                    from: path,
                    to: renamed.clone(),
                    applied: true,
                });
                renamed
            }
            Err(RenameError::Collision(existing)) => {
                warn!(
                    "Not renaming {}: {} already exists",
                    path.display(),
                    existing.display()
                );
                renames.push(Rename {
                    from: path.clone(),
                    to: target,
                    applied: false,
                });
                path
            }
            Err(e) => {
                warn!("Not renaming {}: {}", path.display(), e);
                path
            }
        }
    }

    /// Uncloaks, classifies and groups `paths`. Group ids start at `first_id`.
    pub fn group<I>(&self, paths: I, first_id: usize) -> GroupingResult
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut renames = Vec::new();
        let mut entries: Vec<FileEntry> = paths
            .into_iter()
            .map(|path| {
                let path = self.uncloak(path, &mut renames);
                self.classify_path(path)
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let mut result = assign_groups(entries, first_id);
        result.renames = renames;
        result
    }
}

/// Builds groups from classified entries.
///
/// Every primary opens a group of its own, so a second primary with the same
/// key forms a second group. Each continuation then joins a group with its
/// key that accepts it, preferring one in its own directory.
pub fn assign_groups(entries: Vec<FileEntry>, first_id: usize) -> GroupingResult {
    let mut result = GroupingResult::default();
    let mut continuations = Vec::new();

    for entry in entries {
        if entry.is_extractable() {
            let id = first_id + result.groups.len();
            result.groups.push(ArchiveGroup::new(id, entry));
        } else if entry.is_continuation() {
            continuations.push(entry);
        } else {
            result.plain.push(entry);
        }
    }

    for part in continuations {
        match pick_owner(&result.groups, &part) {
            Some(index) => {
                if let Err(e) = result.groups[index].add_part(part.clone()) {
                    debug!("{} rejected {}: {}", result.groups[index].display_name(), part.path.display(), e);
                    result.orphans.push(part);
                }
            }
            None => {
                debug!("No group for {}", part.path.display());
                result.orphans.push(part);
            }
        }
    }
    result
}

/// Index of the group that should own `part`.
pub fn pick_owner(groups: &[ArchiveGroup], part: &FileEntry) -> Option<usize> {
    let key = part.key();
    let candidates: Vec<usize> = groups
        .iter()
        .enumerate()
        .filter(|(_, g)| g.primary.key() == key && g.accepts(part).is_ok())
        .map(|(i, _)| i)
        .collect();
    let same_dir = |i: &usize| groups[*i].source_dir.as_path() == part.parent();
    candidates
        .iter()
        .copied()
        .find(same_dir)
        .or_else(|| candidates.first().copied())
}
