//! The logical archive: one primary file plus its numbered continuations.

use crate::error::PartMismatchError;
use crate::types::{FileEntry, GroupStatus, PartScheme};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// One logical archive awaiting or undergoing extraction.
#[derive(Debug, Clone)]
pub struct ArchiveGroup {
    pub id: usize,
    pub primary: FileEntry,
    /// Sorted by part index, no duplicates.
    pub continuations: Vec<FileEntry>,
    pub status: GroupStatus,
    pub source_dir: PathBuf,
    pub staging_dir: Option<PathBuf>,
    pub discovered_passwords: BTreeSet<String>,
    scheme: PartScheme,
}

impl ArchiveGroup {
    /// Creates a pending group led by `primary`.
    pub fn new(id: usize, primary: FileEntry) -> Self {
        let source_dir = primary.parent().to_path_buf();
        let scheme = primary.scheme;
        Self {
            id,
            primary,
            continuations: Vec::new(),
            status: GroupStatus::Pending,
            source_dir,
            staging_dir: None,
            discovered_passwords: BTreeSet::new(),
            scheme,
        }
    }

    /// Numbering convention of the set. A `.rar` head takes on the scheme of
    /// the first continuation it accepts.
    pub fn scheme(&self) -> PartScheme {
        self.scheme
    }

    pub fn is_multipart(&self) -> bool {
        self.primary.is_archive_part || !self.continuations.is_empty()
    }

    /// Checks whether `entry` could be added without mutating the group.
    pub fn accepts(&self, entry: &FileEntry) -> Result<(), PartMismatchError> {
        if entry.is_primary || !entry.is_archive_part {
            return Err(PartMismatchError::NotAContinuation(entry.path.clone()));
        }
        if entry.base_name.to_lowercase() != self.primary.base_name.to_lowercase() {
            return Err(PartMismatchError::BaseName {
                expected: self.primary.base_name.clone(),
                found: entry.base_name.clone(),
            });
        }
        if entry.archive_type != self.primary.archive_type {
            return Err(PartMismatchError::ArchiveType {
                expected: self.primary.archive_type,
                found: entry.archive_type,
            });
        }
        if !self.scheme_accepts(entry.scheme) {
            return Err(PartMismatchError::Scheme {
                expected: self.scheme,
                found: entry.scheme,
            });
        }
        let index = entry
            .part_index
            .ok_or_else(|| PartMismatchError::NotAContinuation(entry.path.clone()))?;
        if self.present_indices().contains(&index) {
            return Err(PartMismatchError::DuplicateIndex(index));
        }
        Ok(())
    }

    fn scheme_accepts(&self, incoming: PartScheme) -> bool {
        if incoming == self.scheme {
            return true;
        }
        // `name.rar` can lead `name.part2.rar`, ... as their part 1.
        self.primary.scheme == PartScheme::RarOld
            && incoming == PartScheme::RarNew
            && self.continuations.is_empty()
    }

    /// Adds a continuation part, keeping the list sorted by index.
    ///
    /// # Errors
    ///
    /// Returns a [`PartMismatchError`] if the base name, type or numbering of
    /// `entry` differ from the group's, or if its index is already present.
    pub fn add_part(&mut self, entry: FileEntry) -> Result<(), PartMismatchError> {
        self.accepts(&entry)?;
        self.scheme = entry.scheme;
        let index = entry.part_index.unwrap_or_default();
        let position = self
            .continuations
            .partition_point(|c| c.part_index.unwrap_or_default() < index);
        self.continuations.insert(position, entry);
        Ok(())
    }

    fn present_indices(&self) -> BTreeSet<u32> {
        let mut present: BTreeSet<u32> = self
            .continuations
            .iter()
            .filter_map(|c| c.part_index)
            .collect();
        if let Some(first) = self.head_index() {
            present.insert(first);
        }
        present
    }

    /// Index the primary occupies in the set numbering, if it has one.
    fn head_index(&self) -> Option<u32> {
        match self.scheme {
            PartScheme::Volume | PartScheme::RarNew => Some(self.primary.part_index.unwrap_or(1)),
            _ => None,
        }
    }

    /// Expected-but-absent part indices, ascending.
    pub fn missing_parts(&self) -> Vec<u32> {
        let Some(first) = self.scheme.first_continuation() else {
            return Vec::new();
        };
        let present = self.present_indices();
        let Some(&max) = present.iter().next_back() else {
            return Vec::new();
        };
        let start = self.head_index().unwrap_or(first);
        (start..=max).filter(|i| !present.contains(i)).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_parts().is_empty()
    }

    /// Canonical file names of the missing parts.
    pub fn missing_part_names(&self) -> Vec<String> {
        self.missing_parts()
            .into_iter()
            .map(|i| self.scheme.part_name(&self.primary.base_name, i))
            .collect()
    }

    /// Primary first, then continuations in part order.
    pub fn members(&self) -> impl Iterator<Item = &FileEntry> {
        std::iter::once(&self.primary).chain(self.continuations.iter())
    }

    pub fn member_paths(&self) -> Vec<PathBuf> {
        self.members().map(|m| m.path.clone()).collect()
    }

    pub fn display_name(&self) -> String {
        self.primary.file_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::entry_for;

    fn entry(name: &str) -> FileEntry {
        entry_for(PathBuf::from("/in").join(name)).unwrap()
    }

    #[test]
    fn test_volume_set_complete() {
        let mut group = ArchiveGroup::new(0, entry("data.7z.001"));
        group.add_part(entry("data.7z.003")).unwrap();
        group.add_part(entry("data.7z.002")).unwrap();

        assert!(group.is_complete());
        let order: Vec<_> = group.continuations.iter().map(|c| c.part_index).collect();
        assert_eq!(order, vec![Some(2), Some(3)]);
    }

    #[test]
    fn test_volume_gap_reported() {
        let mut group = ArchiveGroup::new(0, entry("data.7z.001"));
        group.add_part(entry("data.7z.003")).unwrap();

        assert!(!group.is_complete());
        assert_eq!(group.missing_parts(), vec![2]);
        assert_eq!(group.missing_part_names(), vec!["data.7z.002".to_string()]);
    }

    #[test]
    fn test_rar_old_style_starts_at_zero() {
        let mut group = ArchiveGroup::new(0, entry("movie.rar"));
        assert!(group.is_complete());

        group.add_part(entry("movie.r01")).unwrap();
        assert_eq!(group.missing_parts(), vec![0]);
        assert_eq!(group.missing_part_names(), vec!["movie.r00".to_string()]);

        group.add_part(entry("movie.r00")).unwrap();
        assert!(group.is_complete());
    }

    #[test]
    fn test_rar_head_accepts_new_style_parts() {
        let mut group = ArchiveGroup::new(0, entry("inner.rar"));
        group.add_part(entry("inner.part2.rar")).unwrap();

        assert_eq!(group.scheme(), PartScheme::RarNew);
        assert!(group.is_complete());

        let err = group.add_part(entry("inner.r00")).unwrap_err();
        assert!(matches!(err, PartMismatchError::Scheme { .. }));
    }

    #[test]
    fn test_zip_split_starts_at_one() {
        let mut group = ArchiveGroup::new(0, entry("set.zip"));
        group.add_part(entry("set.z02")).unwrap();
        assert_eq!(group.missing_parts(), vec![1]);
    }

    #[test]
    fn test_add_part_rejects_mismatches() {
        let mut group = ArchiveGroup::new(0, entry("movie.part1.rar"));

        let err = group.add_part(entry("movie2.part2.rar")).unwrap_err();
        assert!(matches!(err, PartMismatchError::BaseName { .. }));

        let err = group.add_part(entry("movie.7z.002")).unwrap_err();
        assert!(matches!(err, PartMismatchError::BaseName { .. }));

        let err = group.add_part(entry("movie.part1.rar")).unwrap_err();
        assert!(matches!(err, PartMismatchError::NotAContinuation(_)));

        group.add_part(entry("movie.part2.rar")).unwrap();
        let err = group.add_part(entry("movie.part2.rar")).unwrap_err();
        assert_eq!(err, PartMismatchError::DuplicateIndex(2));
    }

    #[test]
    fn test_single_archive_takes_no_parts() {
        let mut group = ArchiveGroup::new(0, entry("photos.7z"));
        assert!(group.is_complete());
        assert!(!group.is_multipart());
        assert!(group.add_part(entry("photos.7z.002")).is_err());
    }
}
