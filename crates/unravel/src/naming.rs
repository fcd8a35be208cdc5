//! File-name classification rules for archive sets, plus signature sniffing.
//!
//! Every rule is case-insensitive and anchored on the whole file name. Rules
//! are tried in table order; a rule whose captured part number is out of range
//! for its scheme falls through to the next one.

use crate::types::{ArchiveType, PartScheme};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// What a file name says about the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub archive_type: ArchiveType,
    pub scheme: PartScheme,
    pub part_index: Option<u32>,
    pub is_primary: bool,
    pub is_archive_part: bool,
    pub base_name: String,
}

#[derive(Debug, Clone, Copy)]
enum Role {
    /// `.001`-style volume: index 1 is primary.
    Volume,
    /// `.partN.rar`: index 1 is primary.
    RarPart,
    /// `.rNN` continuation of a `.rar` head, from 00.
    RarContinuation,
    /// `.zNN` continuation of a `.zip` head, from 01.
    ZipContinuation,
    /// `.rar` / `.zip` that may lead a set of old-style continuations.
    Head,
    Single,
}

struct NameRule {
    pattern: Regex,
    archive_type: ArchiveType,
    scheme: PartScheme,
    role: Role,
}

fn rule(pattern: &str, archive_type: ArchiveType, scheme: PartScheme, role: Role) -> NameRule {
    NameRule {
        pattern: Regex::new(pattern).expect("valid built-in pattern"),
        archive_type,
        scheme,
        role,
    }
}

static NAME_RULES: Lazy<Vec<NameRule>> = Lazy::new(|| {
    use ArchiveType as T;
    use PartScheme as S;
    vec![
        rule(r"(?i)^(?P<base>.+)\.part(?P<idx>\d{1,4})\.rar$", T::Rar, S::RarNew, Role::RarPart),
        rule(r"(?i)^(?P<base>.+\.7z)\.(?P<idx>\d{3})$", T::SevenZ, S::Volume, Role::Volume),
        rule(
            r"(?i)^(?P<base>.+\.tar(?:\.(?:gz|bz2|xz))?)\.(?P<idx>\d{3})$",
            T::Tar,
            S::Volume,
            Role::Volume,
        ),
        rule(r"(?i)^(?P<base>.+\.zip)\.(?P<idx>\d{3})$", T::Zip, S::Volume, Role::Volume),
        rule(r"(?i)^(?P<base>.+\.rar)\.(?P<idx>\d{3})$", T::Rar, S::Volume, Role::Volume),
        rule(r"(?i)^(?P<base>.+)\.(?P<idx>\d{3})$", T::Auto, S::Volume, Role::Volume),
        rule(r"(?i)^(?P<base>.+)\.r(?P<idx>\d{2,3})$", T::Rar, S::RarOld, Role::RarContinuation),
        rule(r"(?i)^(?P<base>.+)\.z(?P<idx>\d{2,3})$", T::Zip, S::ZipSplit, Role::ZipContinuation),
        rule(r"(?i)^(?P<base>.+)\.rar$", T::Rar, S::RarOld, Role::Head),
        rule(r"(?i)^(?P<base>.+)\.zip$", T::Zip, S::ZipSplit, Role::Head),
        rule(r"(?i)^(?P<base>.+)\.7z$", T::SevenZ, S::Single, Role::Single),
        rule(
            r"(?i)^(?P<base>.+)\.(?:tar\.gz|tgz|tar\.bz2|tbz2?|tar\.xz|txz|tar)$",
            T::Tar,
            S::Single,
            Role::Single,
        ),
        rule(r"(?i)^(?P<base>.+)\.gz$", T::Gz, S::Single, Role::Single),
        rule(r"(?i)^(?P<base>.+)\.bz2$", T::Bz2, S::Single, Role::Single),
        rule(r"(?i)^(?P<base>.+)\.xz$", T::Xz, S::Single, Role::Single),
    ]
});

/// Classifies a file name against the archive naming table.
///
/// Returns `None` when no rule matches; the caller decides whether the file
/// is an unknown archive (`Auto`) or plain content.
///
/// # Examples
///
/// ```
/// use unravel::naming::classify_name;
/// use unravel::types::{ArchiveType, PartScheme};
///
/// let c = classify_name("movie.part2.rar").unwrap();
/// assert_eq!(c.archive_type, ArchiveType::Rar);
/// assert_eq!(c.scheme, PartScheme::RarNew);
/// assert_eq!(c.part_index, Some(2));
/// assert!(!c.is_primary);
///
/// assert!(classify_name("movie.mp4").is_none());
/// ```
pub fn classify_name(name: &str) -> Option<Classification> {
    for rule in NAME_RULES.iter() {
        let Some(caps) = rule.pattern.captures(name) else {
            continue;
        };
        let base_name = caps["base"].to_string();
        let index = match caps.name("idx") {
            Some(m) => match m.as_str().parse::<u32>() {
                Ok(i) => Some(i),
                Err(_) => continue,
            },
            None => None,
        };

        let (is_primary, is_archive_part, part_index) = match (rule.role, index) {
            (Role::Volume | Role::RarPart, Some(i)) if i >= 1 => (i == 1, true, Some(i)),
            (Role::RarContinuation, Some(i)) => (false, true, Some(i)),
            (Role::ZipContinuation, Some(i)) if i >= 1 => (false, true, Some(i)),
            (Role::Head | Role::Single, None) => (true, false, None),
            _ => continue,
        };

        return Some(Classification {
            archive_type: rule.archive_type,
            scheme: rule.scheme,
            part_index,
            is_primary,
            is_archive_part,
            base_name,
        });
    }
    None
}

/// Whether `name` already carries a proper single or multi-part archive suffix.
///
/// A recognized suffix glued to junk text (`data.7z删除.001`, where the base
/// would end in `删除`) does not count.
pub fn is_proper_name(name: &str) -> bool {
    classify_name(name).is_some_and(|c| !c.base_name.ends_with(|ch: char| !ch.is_ascii()))
}

/// Extensions that commonly hide self-extracting or renamed archives.
const OPAQUE_EXTENSIONS: &[&str] = &["exe", "bin", "dat", "tmp"];

/// Whether an unmatched file should still be handed to the codec as `Auto`.
pub fn is_opaque_name(name: &str) -> bool {
    match name.rsplit_once('.') {
        None => true,
        Some((stem, ext)) => {
            stem.is_empty() || OPAQUE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        }
    }
}

/// Detects an archive type from the leading bytes of a file.
///
/// Returns `Ok(None)` for readable files without a known signature.
pub fn sniff_signature(path: &Path) -> io::Result<Option<ArchiveType>> {
    let mut header = [0u8; 512];
    let mut file = File::open(path)?;
    let mut filled = 0;
    while filled < header.len() {
        let n = file.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(signature_type(&header[..filled]))
}

/// Archive type for a buffer that starts with a known magic number.
pub fn signature_type(bytes: &[u8]) -> Option<ArchiveType> {
    const SEVENZ: &[u8] = &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];
    const RAR: &[u8] = b"Rar!\x1a\x07";
    const XZ: &[u8] = &[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];

    if bytes.starts_with(SEVENZ) {
        Some(ArchiveType::SevenZ)
    } else if bytes.starts_with(RAR) {
        Some(ArchiveType::Rar)
    } else if bytes.starts_with(b"PK\x03\x04")
        || bytes.starts_with(b"PK\x05\x06")
        || bytes.starts_with(b"PK\x07\x08")
    {
        Some(ArchiveType::Zip)
    } else if bytes.starts_with(XZ) {
        Some(ArchiveType::Xz)
    } else if bytes.starts_with(&[0x1F, 0x8B]) {
        Some(ArchiveType::Gz)
    } else if bytes.starts_with(b"BZh") {
        Some(ArchiveType::Bz2)
    } else if bytes.len() >= 262 && &bytes[257..262] == b"ustar" {
        Some(ArchiveType::Tar)
    } else {
        None
    }
}
