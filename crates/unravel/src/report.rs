//! End-of-run summary, printable or serializable as JSON.

use crate::grouping::Rename;
use crate::types::{AttemptOutcome, GroupStatus};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// How one group ended.
#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub id: usize,
    pub name: String,
    /// 0 for archives found in the inputs, 1 for archives inside those, ...
    pub depth: usize,
    pub status: GroupStatus,
    /// The file turned out not to be an archive and was left as content.
    pub passthrough: bool,
    pub reason: Option<String>,
    /// Outcome of each extraction attempt, in order.
    pub attempts: Vec<AttemptOutcome>,
    /// Source files kept because the group or its chain failed.
    pub retained: Vec<PathBuf>,
    /// Number of files delivered to the output folder.
    pub delivered: usize,
}

impl GroupReport {
    pub fn new(id: usize, name: String, depth: usize) -> Self {
        Self {
            id,
            name,
            depth,
            status: GroupStatus::Pending,
            passthrough: false,
            reason: None,
            attempts: Vec::new(),
            retained: Vec::new(),
            delivered: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub groups: Vec<GroupReport>,
    /// Continuation parts no group claimed.
    pub orphans: Vec<PathBuf>,
    /// Parts moved into the holding area for lack of an owner.
    pub held: Vec<PathBuf>,
    pub renames: Vec<Rename>,
    /// Non-archive files seen in the inputs.
    pub plain_files: usize,
    pub learned_passwords: usize,
    pub cancelled: bool,
    /// Input paths that could not be processed at all.
    pub errors: Vec<String>,
}

impl RunReport {
    pub fn failures(&self) -> impl Iterator<Item = &GroupReport> {
        self.groups.iter().filter(|g| g.status.is_failure())
    }

    pub fn succeeded(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| g.status == GroupStatus::Succeeded)
            .count()
    }

    /// Process exit code: 130 when interrupted, 2 when an input could not be
    /// read, 1 when any group failed, else 0. Orphans do not count.
    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            130
        } else if !self.errors.is_empty() {
            2
        } else if self.failures().next().is_some() {
            1
        } else {
            0
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failures().count();
        let pending = self
            .groups
            .iter()
            .filter(|g| g.status == GroupStatus::Pending)
            .count();
        writeln!(
            f,
            "{} group(s): {} succeeded, {} failed, {} pending",
            self.groups.len(),
            self.succeeded(),
            failed,
            pending
        )?;
        for rename in &self.renames {
            let verb = if rename.applied { "renamed" } else { "would rename" };
            writeln!(f, "  {} {} -> {}", verb, rename.from.display(), rename.to.display())?;
        }
        for group in self.failures() {
            writeln!(
                f,
                "  FAILED {} ({:?}): {}",
                group.name,
                group.status,
                group.reason.as_deref().unwrap_or("unknown")
            )?;
            for path in &group.retained {
                writeln!(f, "    kept {}", path.display())?;
            }
        }
        for path in &self.orphans {
            writeln!(f, "  orphan part {}", path.display())?;
        }
        for path in &self.held {
            writeln!(f, "  held {}", path.display())?;
        }
        for error in &self.errors {
            writeln!(f, "  error: {}", error)?;
        }
        if self.learned_passwords > 0 {
            writeln!(f, "  learned {} new password(s)", self.learned_passwords)?;
        }
        if self.cancelled {
            writeln!(f, "  interrupted")?;
        }
        Ok(())
    }
}
