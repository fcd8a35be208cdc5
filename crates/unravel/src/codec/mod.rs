//! Archive codecs and the classification of their output.
//!
//! A codec never decides what went wrong. It reports success plus the text
//! it printed; [`KeywordTable::classify`] turns that text into an
//! [`AttemptOutcome`]. Both the in-process codec and the external 7-Zip
//! binary go through the same table.

mod command;
mod native;
pub mod volumes;

pub use command::SevenZipCommand;
pub use native::{ExtractStats, NativeCodec};

use crate::error::ExtractError;
use crate::types::{ArchiveEntry, AttemptOutcome};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What a codec printed for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CodecOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Both streams, for matching and logging.
    pub fn text(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// Unpacks and lists archives.
///
/// Multi-part sets are always opened through their primary part; the codec
/// locates continuations next to it by name.
pub trait Codec: Send + Sync {
    fn name(&self) -> &str;

    /// Lists the entries of the archive at `path` without extracting.
    fn list_contents(&self, path: &Path) -> Result<Vec<ArchiveEntry>, ExtractError>;

    /// Unpacks `path` into `dest`, which already exists.
    fn extract(&self, path: &Path, dest: &Path, password: Option<&str>) -> CodecOutput;

    /// Whether `path` opens as an archive at all.
    fn is_valid_archive(&self, path: &Path) -> bool;
}

/// Which codec the engine drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodecKind {
    #[default]
    Native,
    #[serde(rename = "7z")]
    SevenZip,
}

/// Substrings that identify each failure class, matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordTable {
    pub password: Vec<String>,
    pub missing_volume: Vec<String>,
    pub corruption: Vec<String>,
    pub unsupported: Vec<String>,
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self {
            password: owned(&[
                "wrong password",
                "can not open encrypted archive",
                "cannot open encrypted archive",
                "data error in encrypted file",
            ]),
            missing_volume: owned(&[
                "missing volume",
                "unexpected end of archive",
                "cannot find volume",
                "next volume",
            ]),
            corruption: owned(&[
                "data error",
                "crc failed",
                "checksum error",
                "headers error",
                "unexpected end of data",
            ]),
            unsupported: owned(&[
                "can not open the file as archive",
                "cannot open the file as archive",
                "is not archive",
                "unsupported method",
                "unknown method",
                "not an archive",
            ]),
        }
    }
}

impl KeywordTable {
    /// Maps codec output to an outcome.
    ///
    /// A successful run is always [`AttemptOutcome::Ok`]. Otherwise the
    /// classes are checked in the order password, missing volume,
    /// corruption, unsupported; failure text that matches nothing counts
    /// as corruption.
    pub fn classify(&self, output: &CodecOutput) -> AttemptOutcome {
        if output.success {
            return AttemptOutcome::Ok;
        }
        self.classify_text(output.text().to_lowercase())
    }

    /// Like [`classify`](Self::classify), but first blanks out every mention
    /// of `archive` (full path, then file name) so words in the name itself
    /// never count.
    pub fn classify_for(&self, output: &CodecOutput, archive: &Path) -> AttemptOutcome {
        if output.success {
            return AttemptOutcome::Ok;
        }
        let mut text = output.text().to_lowercase();
        let mut names = vec![archive.display().to_string()];
        if let Some(name) = archive.file_name() {
            names.push(name.to_string_lossy().into_owned());
        }
        for name in names {
            let name = name.to_lowercase();
            if !name.is_empty() {
                text = text.replace(&name, "<archive>");
            }
        }
        self.classify_text(text)
    }

    fn classify_text(&self, text: String) -> AttemptOutcome {
        let hit = |words: &[String]| words.iter().any(|w| text.contains(&w.to_lowercase()));

        if hit(&self.password) {
            AttemptOutcome::WrongPassword
        } else if hit(&self.missing_volume) {
            AttemptOutcome::MissingVolume
        } else if hit(&self.corruption) {
            AttemptOutcome::Corrupted
        } else if hit(&self.unsupported) {
            AttemptOutcome::Unsupported
        } else {
            AttemptOutcome::Corrupted
        }
    }
}
