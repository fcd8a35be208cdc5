//! The nested extraction engine.
//!
//! Each input is walked and grouped, then every group runs through
//! `Pending → Extracting → Succeeded | Failed*`. A successful extraction
//! lands in a registered staging directory whose files are regrouped:
//! archives recurse one level deeper, continuation parts of other groups are
//! sent back to their owners, everything else is delivered to the output
//! folder. Sources are only removed once the whole chain below them
//! succeeded.

use crate::cleanup::{CleanupGuard, CleanupHandle};
use crate::cloak::CloakNormalizer;
use crate::codec::{Codec, CodecOutput};
use crate::config::EngineConfig;
use crate::error::GroupError;
use crate::group::ArchiveGroup;
use crate::grouping::{pick_owner, Grouper, GroupingOptions};
use crate::passwords::PasswordSource;
use crate::recycle::{delete_permanently, move_path, remove_source};
use crate::reconcile::{claim, reconcile, schedule};
use crate::report::{GroupReport, RunReport};
use crate::safety::non_clobbering_path;
use crate::types::{ArchiveType, AttemptOutcome, ExtractionAttempt, FileEntry, GroupStatus};
use crate::walk::{collect_files, WalkOptions, HOLDING_DIR_NAME};
use crate::ProgressCallback;
use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a group ended, as seen by whoever asked for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    /// Extracted and delivered. `complete` is false when something nested
    /// below it failed.
    Extracted { complete: bool },
    /// Not an archive after all; the file is ordinary content.
    Passthrough,
    Failed,
    Cancelled,
}

/// A file moved next to its primary, remembered so it can be put back.
type Move = (PathBuf, PathBuf);

pub struct Engine<'a> {
    config: &'a EngineConfig,
    codec: &'a dyn Codec,
    normalizer: &'a CloakNormalizer,
    passwords: &'a mut dyn PasswordSource,
    cancel: Arc<AtomicBool>,
    progress: Option<Arc<ProgressCallback>>,
    guard: CleanupGuard,
    /// Non-empty passwords already reported to the password source.
    recorded: BTreeSet<String>,
    /// Passwords that worked this run, in discovery order.
    discovered: Vec<String>,
    /// Top-level groups of the current input still waiting for their turn.
    pending: VecDeque<ArchiveGroup>,
    report: RunReport,
    next_id: usize,
    output_dir: PathBuf,
    holding_dir: PathBuf,
}

impl<'a> Engine<'a> {
    pub fn new(
        config: &'a EngineConfig,
        codec: &'a dyn Codec,
        normalizer: &'a CloakNormalizer,
        passwords: &'a mut dyn PasswordSource,
    ) -> Self {
        Self {
            config,
            codec,
            normalizer,
            passwords,
            cancel: Arc::new(AtomicBool::new(false)),
            progress: None,
            guard: CleanupGuard::new(config.removal),
            recorded: BTreeSet::new(),
            discovered: Vec::new(),
            pending: VecDeque::new(),
            report: RunReport::default(),
            next_id: 0,
            output_dir: PathBuf::new(),
            holding_dir: PathBuf::new(),
        }
    }

    /// Shares a cancellation flag with the caller, e.g. a Ctrl-C handler.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    /// Called with each group name before it is extracted. Returning
    /// `false` cancels the run.
    pub fn with_progress(mut self, progress: Arc<ProgressCallback>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Handle for best-effort temp cleanup from another thread.
    pub fn cleanup_handle(&self) -> CleanupHandle {
        self.guard.handle()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Processes every input path in order and returns the run summary.
    ///
    /// Groups are independent: a failed group never stops the others.
    pub fn run(&mut self, inputs: &[PathBuf]) -> RunReport {
        for input in inputs {
            if self.is_cancelled() {
                break;
            }
            if let Err(e) = self.run_input(input) {
                warn!("Cannot process {}: {}", input.display(), e);
                self.report.errors.push(format!("{}: {}", input.display(), e));
            }
            let removed = self.guard.cleanup_all();
            if removed > 0 {
                debug!("Removed {} leftover temp path(s)", removed);
            }
        }
        self.report.cancelled = self.is_cancelled();
        std::mem::take(&mut self.report)
    }

    fn grouping_options(&self, dry_run: bool) -> GroupingOptions {
        GroupingOptions {
            strict: self.config.strict_detection,
            dry_run,
        }
    }

    fn run_input(&mut self, input: &Path) -> io::Result<()> {
        let root = if fs::metadata(input)?.is_dir() {
            input.to_path_buf()
        } else {
            input.parent().map(Path::to_path_buf).unwrap_or_default()
        };
        self.output_dir = self.config.output_dir_for(&root);
        self.holding_dir = self.output_dir.join(HOLDING_DIR_NAME);

        let walk = WalkOptions {
            recursive: self.config.recursive,
            skip_dirs: vec![self.output_dir.clone()],
        };
        let files = collect_files(&[input.to_path_buf()], &walk);
        let grouping = Grouper::new(self.normalizer, self.grouping_options(self.config.dry_run))
            .group(files, self.next_id);
        self.next_id = grouping.next_id().unwrap_or(self.next_id);
        info!(
            "{}: {} group(s), {} other file(s), {} orphan part(s)",
            input.display(),
            grouping.groups.len(),
            grouping.plain.len(),
            grouping.orphans.len()
        );
        self.report.renames.extend(grouping.renames);
        self.report.plain_files += grouping.plain.len();

        if self.config.dry_run {
            for group in &grouping.groups {
                let mut report = GroupReport::new(group.id, group.display_name(), 0);
                if !group.is_complete() {
                    report.reason = Some(format!("missing {}", group.missing_part_names().join(", ")));
                }
                self.report.groups.push(report);
            }
            self.report
                .orphans
                .extend(grouping.orphans.into_iter().map(|o| o.path));
            return Ok(());
        }

        self.pending = schedule(grouping.groups, self.codec).into();
        let scan_dirs = [self.output_dir.clone(), self.holding_dir.clone()];
        while let Some(group) = self.pending.pop_front() {
            if self.is_cancelled() {
                let mut report = GroupReport::new(group.id, group.display_name(), 0);
                report.reason = Some("skipped after interruption".to_string());
                self.report.groups.push(report);
                continue;
            }
            let dest = self.output_dir.clone();
            self.process(group, 0, &dest, &BTreeSet::new());

            match reconcile(&scan_dirs, self.pending.make_contiguous()) {
                Ok(0) => {}
                Ok(moved) => info!("Returned {} part(s) to waiting groups", moved),
                Err(e) => warn!("Reconciliation failed: {}", e),
            }
        }

        self.report.orphans.extend(
            grouping
                .orphans
                .into_iter()
                .map(|o| o.path)
                .filter(|p| p.exists()),
        );
        Ok(())
    }

    /// Runs one group to a terminal state and records it in the report.
    fn process(
        &mut self,
        mut group: ArchiveGroup,
        depth: usize,
        dest: &Path,
        inherited: &BTreeSet<String>,
    ) -> Resolution {
        let slot = self.report.groups.len();
        let mut report = GroupReport::new(group.id, group.display_name(), depth);
        self.report.groups.push(report.clone());

        let resolution = match self.extract_group(&mut group, depth, dest, inherited, &mut report) {
            Ok(complete) => {
                group.status = GroupStatus::Succeeded;
                if !complete {
                    report.reason = Some("a nested archive failed; sources kept".to_string());
                    if depth == 0 {
                        report.retained = group.member_paths();
                    }
                }
                Resolution::Extracted { complete }
            }
            Err(GroupError::UnsupportedFormat(detail)) => {
                info!("{} is not an archive ({}), keeping it as is", group.display_name(), detail);
                group.status = GroupStatus::Succeeded;
                report.passthrough = true;
                Resolution::Passthrough
            }
            Err(GroupError::Cancelled) => {
                group.status = GroupStatus::Pending;
                report.reason = Some("cancelled".to_string());
                Resolution::Cancelled
            }
            Err(e) => {
                group.status = e.status();
                warn!("{} failed: {}", group.display_name(), e);
                report.reason = Some(e.to_string());
                if depth == 0 {
                    report.retained = group.member_paths();
                }
                Resolution::Failed
            }
        };
        report.status = group.status;
        self.report.groups[slot] = report;
        resolution
    }

    /// Extracts `group` and everything nested in it.
    ///
    /// # Returns
    ///
    /// Whether the whole chain below the group succeeded.
    fn extract_group(
        &mut self,
        group: &mut ArchiveGroup,
        depth: usize,
        dest: &Path,
        inherited: &BTreeSet<String>,
        report: &mut GroupReport,
    ) -> Result<bool, GroupError> {
        let name = group.display_name();
        if depth > self.config.max_depth {
            return Err(GroupError::NestingTooDeep {
                depth,
                max: self.config.max_depth,
            });
        }
        if !group.is_complete() {
            let missing = group.missing_part_names().join(", ");
            info!(
                "{} is missing {}; retaining its {} part(s)",
                name,
                missing,
                group.members().count()
            );
            return Err(GroupError::MissingVolume(missing));
        }
        self.tick(&name)?;

        let moves = colocate(group)?;
        let staging = match self.guard.create_staging(&self.output_dir, &name) {
            Ok(staging) => staging,
            Err(e) => {
                undo_colocation(group, &moves);
                return Err(e.into());
            }
        };
        group.staging_dir = Some(staging.clone());
        group.status = GroupStatus::Extracting;
        info!("Extracting {}", name);

        let result = match self.try_passwords(group, &staging, inherited, report) {
            Ok(attempt) => {
                if let Some(password) = attempt.password_tried {
                    group.discovered_passwords.insert(password);
                }
                let mut known = inherited.clone();
                known.extend(group.discovered_passwords.iter().cloned());
                self.settle_output(&staging, attempt.produced_files, depth, dest, &known, report)
            }
            Err(e) => Err(e),
        };

        self.discard_staging(&staging);
        group.staging_dir = None;

        let complete = match result {
            Ok(complete) => complete,
            Err(e) => {
                undo_colocation(group, &moves);
                return Err(e);
            }
        };
        if !complete {
            undo_colocation(group, &moves);
            return Ok(false);
        }
        if depth == 0 {
            for path in group.member_paths() {
                match remove_source(&path, self.config.removal) {
                    Ok(()) => debug!("Removed source {}", path.display()),
                    Err(e) => {
                        warn!("Could not remove {}: {}", path.display(), e);
                        report.retained.push(path);
                    }
                }
            }
        }
        info!("{} done", name);
        Ok(true)
    }

    fn tick(&self, name: &str) -> Result<(), GroupError> {
        if let Some(progress) = &self.progress {
            if !progress(name, 0, None) {
                self.cancel.store(true, Ordering::SeqCst);
                return Err(GroupError::Cancelled);
            }
        }
        if self.is_cancelled() {
            return Err(GroupError::Cancelled);
        }
        Ok(())
    }

    /// Candidate passwords in trial order: none, the password source, then
    /// passwords that worked earlier in this run.
    fn candidates(&self, inherited: &BTreeSet<String>) -> Vec<Option<String>> {
        let mut candidates: Vec<Option<String>> = vec![None];
        let later = self
            .passwords
            .candidates()
            .into_iter()
            .chain(inherited.iter().cloned())
            .chain(self.discovered.iter().cloned());
        for password in later {
            if password.is_empty() {
                continue;
            }
            let password = Some(password);
            if !candidates.contains(&password) {
                candidates.push(password);
            }
        }
        candidates
    }

    /// Tries each candidate password until one extracts cleanly.
    fn try_passwords(
        &mut self,
        group: &ArchiveGroup,
        staging: &Path,
        inherited: &BTreeSet<String>,
        report: &mut GroupReport,
    ) -> Result<ExtractionAttempt, GroupError> {
        let candidates = self.candidates(inherited);
        let mut attempts = 0;
        for password in candidates {
            if self.is_cancelled() {
                return Err(GroupError::Cancelled);
            }
            clear_dir(staging)?;
            attempts += 1;

            let output = self
                .codec
                .extract(&group.primary.path, staging, password.as_deref());
            let outcome = self
                .config
                .keywords
                .classify_for(&output, &group.primary.path);
            report.attempts.push(outcome);
            debug!(
                "{} attempt {} ({}): {:?}",
                group.display_name(),
                attempts,
                if password.is_some() { "with password" } else { "no password" },
                outcome
            );

            match outcome {
                AttemptOutcome::Ok => {
                    if let Some(password) = &password {
                        self.remember(password);
                    }
                    let produced_files = collect_files(&[staging.to_path_buf()], &WalkOptions::default());
                    return Ok(ExtractionAttempt {
                        password_tried: password,
                        outcome,
                        produced_files,
                    });
                }
                AttemptOutcome::WrongPassword => continue,
                _ if self.is_cancelled() => return Err(GroupError::Cancelled),
                AttemptOutcome::MissingVolume => {
                    return Err(GroupError::MissingVolume(headline(&output)))
                }
                AttemptOutcome::Corrupted => {
                    return Err(GroupError::CorruptedArchive(headline(&output)))
                }
                AttemptOutcome::Unsupported => {
                    return Err(GroupError::UnsupportedFormat(headline(&output)))
                }
            }
        }
        Err(GroupError::WrongPassword { attempts })
    }

    /// Reports a working password to the source once per run.
    fn remember(&mut self, password: &str) {
        if password.is_empty() || !self.recorded.insert(password.to_string()) {
            return;
        }
        self.passwords.record_success(password);
        self.discovered.push(password.to_string());
    }

    /// Sorts the files of a finished extraction into nested archives,
    /// foreign parts and final content, and delivers the content.
    ///
    /// # Returns
    ///
    /// Whether every nested archive succeeded.
    fn settle_output(
        &mut self,
        staging: &Path,
        files: Vec<PathBuf>,
        depth: usize,
        dest: &Path,
        known: &BTreeSet<String>,
        report: &mut GroupReport,
    ) -> Result<bool, GroupError> {
        let found = Grouper::new(self.normalizer, self.grouping_options(false)).group(files, self.next_id);
        if let Some(next) = found.next_id() {
            self.next_id = next;
        }
        self.report.renames.extend(found.renames);

        for part in found.orphans {
            self.send_away(part)?;
        }

        let mut complete = true;
        let mut content: Vec<PathBuf> = found.plain.into_iter().map(|e| e.path).collect();
        for nested in found.groups {
            if nested.primary.archive_type == ArchiveType::Auto
                && !nested.is_multipart()
                && !self.codec.is_valid_archive(&nested.primary.path)
            {
                content.push(nested.primary.path);
                continue;
            }
            let relative = nested
                .source_dir
                .strip_prefix(staging)
                .map(Path::to_path_buf)
                .unwrap_or_default();
            let members = nested.member_paths();
            match self.process(nested, depth + 1, &dest.join(relative), known) {
                Resolution::Extracted { complete: nested_complete } => complete &= nested_complete,
                Resolution::Passthrough => content.extend(members),
                Resolution::Failed => {
                    complete = false;
                    content.extend(members);
                }
                Resolution::Cancelled => return Err(GroupError::Cancelled),
            }
        }

        for path in content {
            if !path.exists() {
                continue;
            }
            let relative = match path.strip_prefix(staging) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => PathBuf::from(path.file_name().unwrap_or_default()),
            };
            let target = non_clobbering_path(&dest.join(relative))?;
            move_path(&path, &target)?;
            debug!("Delivered {}", target.display());
            report.delivered += 1;
        }
        Ok(complete)
    }

    /// Moves a continuation part found in nested output to the waiting
    /// group that owns it, or into the holding area.
    fn send_away(&mut self, part: FileEntry) -> Result<(), GroupError> {
        if let Some(index) = pick_owner(self.pending.make_contiguous(), &part) {
            let owner = &mut self.pending[index];
            if claim(owner, &part)? {
                info!("Moved {} next to {}", part.file_name(), owner.display_name());
                return Ok(());
            }
            warn!(
                "{} already exists next to {}",
                part.file_name(),
                owner.display_name()
            );
        }
        let target = non_clobbering_path(&self.holding_dir.join(&part.base_name).join(part.file_name()))?;
        move_path(&part.path, &target)?;
        info!("Holding {} in {}", part.file_name(), target.display());
        self.report.held.push(target);
        Ok(())
    }

    fn discard_staging(&self, staging: &Path) {
        if let Err(e) = self.guard.remove(staging) {
            warn!("Could not remove staging {}: {}", staging.display(), e);
        }
    }
}

/// Moves continuation parts that live elsewhere next to the primary.
fn colocate(group: &mut ArchiveGroup) -> Result<Vec<Move>, GroupError> {
    let mut moves = Vec::new();
    let source_dir = group.source_dir.clone();
    for index in 0..group.continuations.len() {
        let part = &group.continuations[index];
        if part.parent() == source_dir {
            continue;
        }
        let target = source_dir.join(part.file_name());
        let from = part.path.clone();
        if let Err(e) = move_path(&from, &target) {
            undo_colocation(group, &moves);
            return Err(e.into());
        }
        debug!("Co-located {} with {}", from.display(), group.display_name());
        group.continuations[index] = group.continuations[index].relocated(target.clone());
        moves.push((from, target));
    }
    Ok(moves)
}

/// Puts co-located parts back where they were found.
fn undo_colocation(group: &mut ArchiveGroup, moves: &[Move]) {
    for (from, to) in moves.iter().rev() {
        if let Err(e) = move_path(to, from) {
            warn!("Could not move {} back: {}", to.display(), e);
            continue;
        }
        for part in group.continuations.iter_mut().filter(|p| &p.path == to) {
            *part = part.relocated(from.clone());
        }
    }
}

/// Empties a staging directory between attempts.
fn clear_dir(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        delete_permanently(&entry?.path())?;
    }
    Ok(())
}

/// The most telling line of a failed codec run.
fn headline(output: &CodecOutput) -> String {
    let text = output.text();
    let line = text
        .lines()
        .find(|l| l.to_ascii_uppercase().contains("ERROR"))
        .or_else(|| text.lines().find(|l| !l.trim().is_empty()))
        .unwrap_or("no diagnostic");
    line.trim().to_string()
}
