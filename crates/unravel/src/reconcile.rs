//! Bringing stray continuation parts back to the groups that need them, and
//! ordering groups so that containers of needed parts run first.

use crate::codec::Codec;
use crate::error::GroupError;
use crate::group::ArchiveGroup;
use crate::grouping::{entry_for, pick_owner};
use crate::recycle::move_path;
use crate::types::{FileEntry, GroupStatus};
use crate::walk::{collect_files, WalkOptions};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Moves loose continuation parts found under `scan_dirs` into the source
/// directory of the pending group that is missing them.
///
/// A part is only claimed by a group with exactly its base name and type
/// that does not yet hold its index.
///
/// # Returns
///
/// Number of parts moved.
pub fn reconcile(scan_dirs: &[PathBuf], groups: &mut [ArchiveGroup]) -> Result<usize, GroupError> {
    let roots: Vec<PathBuf> = scan_dirs.iter().filter(|d| d.is_dir()).cloned().collect();
    if roots.is_empty() || !groups.iter().any(|g| g.status == GroupStatus::Pending) {
        return Ok(0);
    }

    let mut moved = 0;
    for path in collect_files(&roots, &WalkOptions::default()) {
        let Some(part) = entry_for(path) else {
            continue;
        };
        if !part.is_continuation() {
            continue;
        }
        let pending: Vec<ArchiveGroup> = groups
            .iter()
            .filter(|g| g.status == GroupStatus::Pending)
            .cloned()
            .collect();
        let Some(index) = pick_owner(&pending, &part) else {
            continue;
        };
        let owner_id = pending[index].id;
        let Some(group) = groups.iter_mut().find(|g| g.id == owner_id) else {
            continue;
        };

        if claim(group, &part)? {
            info!("Returned {} to {}", part.file_name(), group.display_name());
            moved += 1;
        } else {
            warn!(
                "Cannot return {} to {}: a file of that name is already there",
                part.path.display(),
                group.display_name()
            );
        }
    }
    Ok(moved)
}

/// Moves `part` into the source directory of `group` and adds it there.
///
/// The part is checked against the group before anything moves. Returns
/// `Ok(false)`, leaving the part in place, when the target name is taken.
pub fn claim(group: &mut ArchiveGroup, part: &FileEntry) -> Result<bool, GroupError> {
    let target = group.source_dir.join(part.file_name());
    if target.exists() {
        return Ok(false);
    }
    let relocated = part.relocated(target);
    group.accepts(&relocated)?;
    move_path(&part.path, &relocated.path)?;
    group.add_part(relocated)?;
    Ok(true)
}

/// Orders groups for extraction: standalone archives whose listing holds a
/// part some incomplete group needs, then the other standalone archives,
/// then multipart sets. Order within each tier is kept.
pub fn schedule(groups: Vec<ArchiveGroup>, codec: &dyn Codec) -> Vec<ArchiveGroup> {
    let needed: HashSet<String> = groups
        .iter()
        .filter(|g| !g.is_complete())
        .flat_map(|g| g.missing_part_names())
        .map(|name| name.to_lowercase())
        .collect();

    let mut tiered: Vec<(u8, ArchiveGroup)> = groups
        .into_iter()
        .map(|group| {
            let tier = if group.is_multipart() {
                2
            } else if !needed.is_empty() && holds_needed_part(&group, codec, &needed) {
                0
            } else {
                1
            };
            (tier, group)
        })
        .collect();
    tiered.sort_by_key(|(tier, _)| *tier);
    tiered.into_iter().map(|(_, group)| group).collect()
}

fn holds_needed_part(group: &ArchiveGroup, codec: &dyn Codec, needed: &HashSet<String>) -> bool {
    match codec.list_contents(&group.primary.path) {
        Ok(entries) => entries
            .iter()
            .any(|e| !e.is_directory && needed.contains(&e.file_name().to_lowercase())),
        Err(e) => {
            debug!("Cannot list {}: {}", group.display_name(), e);
            false
        }
    }
}
