//! Rule-driven recovery of cloaked archive names.
//!
//! Cloaked files carry junk text inside their extension or part number
//! (`data.7z删除.001`, `set.zip.z0隐藏1`). [`CloakNormalizer::normalize`] is a
//! pure name transform; [`apply_rename`] performs the rename on disk.

use crate::error::{RenameError, RuleError};
use crate::naming::{classify_name, is_proper_name};
use crate::types::ArchiveType;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const BUILTIN_RULES: &str = include_str!("cloak_rules.json");

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\w+)(?::(\d+))?\}").expect("valid built-in pattern"));

/// Default zero-padding width of `{part}` in a template.
const DEFAULT_PART_WIDTH: usize = 3;

/// A single normalization rule as written in a rules file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloakRule {
    pub name: String,
    /// Regular expression matched against the whole file name. Named groups
    /// feed the template.
    pub pattern: String,
    /// Output name. `{base}` and other `{group}` placeholders take the
    /// captured text; `{part}` keeps only the digits of the capture and pads
    /// them to 3 places, `{part:N}` to `N` places (`{part:0}` for none).
    pub template: String,
    #[serde(default)]
    pub priority: i32,
    /// When set, the rewritten name must classify as this archive type.
    #[serde(default)]
    pub archive_type: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    rules: Vec<CloakRule>,
}

#[derive(Debug)]
struct CompiledRule {
    rule: CloakRule,
    regex: Regex,
    archive_type: Option<ArchiveType>,
}

/// Ordered, compiled rule set.
#[derive(Debug)]
pub struct CloakNormalizer {
    rules: Vec<CompiledRule>,
}

impl CloakNormalizer {
    /// Compiles `rules`, dropping disabled ones.
    ///
    /// Rules are ordered by descending priority; rules with equal priority
    /// keep their declaration order.
    pub fn from_rules(rules: Vec<CloakRule>) -> Result<Self, RuleError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules.into_iter().filter(|r| r.enabled) {
            let regex = Regex::new(&rule.pattern).map_err(|source| RuleError::Pattern {
                name: rule.name.clone(),
                source,
            })?;
            let archive_type = rule.archive_type.as_deref().and_then(ArchiveType::from_hint);
            compiled.push(CompiledRule {
                rule,
                regex,
                archive_type,
            });
        }
        // sort_by_key is stable
        compiled.sort_by_key(|c| std::cmp::Reverse(c.rule.priority));
        Ok(Self { rules: compiled })
    }

    /// Parses a `{"rules": [...]}` document.
    pub fn from_json(text: &str) -> Result<Self, RuleError> {
        let file: RuleFile = serde_json::from_str(text)?;
        Self::from_rules(file.rules)
    }

    pub fn load(path: &Path) -> Result<Self, RuleError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// The rule set shipped with the crate.
    pub fn builtin() -> Result<Self, RuleError> {
        Self::from_json(BUILTIN_RULES)
    }

    /// Active rules in evaluation order.
    pub fn rules(&self) -> impl Iterator<Item = &CloakRule> {
        self.rules.iter().map(|c| &c.rule)
    }

    /// Returns the uncloaked form of `name`, or `name` unchanged.
    ///
    /// Names that already carry a proper archive suffix are never touched,
    /// and a rewrite is only accepted when the result itself is a proper
    /// archive name. Both rules together make the transform idempotent.
    pub fn normalize(&self, name: &str) -> String {
        if is_proper_name(name) {
            return name.to_string();
        }
        for compiled in &self.rules {
            let Some(caps) = compiled.regex.captures(name) else {
                continue;
            };
            let Some(candidate) = render(&compiled.rule.template, &caps) else {
                continue;
            };
            if candidate == name {
                continue;
            }
            let Some(class) = classify_name(&candidate) else {
                continue;
            };
            if let Some(expected) = compiled.archive_type {
                if class.archive_type != expected {
                    continue;
                }
            }
            return candidate;
        }
        name.to_string()
    }
}

/// Fills `template` from the captures. Returns `None` if a placeholder has no
/// capture or `{part}` contains no digits.
fn render(template: &str, caps: &Captures<'_>) -> Option<String> {
    let mut complete = true;
    let rendered = PLACEHOLDER.replace_all(template, |ph: &Captures<'_>| {
        let key = &ph[1];
        let Some(value) = caps.name(key).map(|m| m.as_str()) else {
            complete = false;
            return String::new();
        };
        if key != "part" {
            return value.to_string();
        }
        let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            complete = false;
            return String::new();
        }
        let width = ph
            .get(2)
            .and_then(|w| w.as_str().parse::<usize>().ok())
            .unwrap_or(DEFAULT_PART_WIDTH);
        format!("{digits:0>width$}")
    });
    complete.then(|| rendered.into_owned())
}

/// Renames `path` to `new_name` within the same directory.
///
/// # Errors
///
/// Returns [`RenameError::Collision`] when a different file already holds
/// the target name; the original file is left untouched.
pub fn apply_rename(path: &Path, new_name: &str) -> Result<PathBuf, RenameError> {
    let target = path
        .parent()
        .map(|p| p.join(new_name))
        .unwrap_or_else(|| PathBuf::from(new_name));
    if target == path {
        return Ok(target);
    }
    if target.exists() {
        return Err(RenameError::Collision(target));
    }
    fs::rename(path, &target)?;
    Ok(target)
}
