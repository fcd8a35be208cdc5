//! Candidate passwords and the plain-text password book they come from.

use encoding_rs::{Encoding, GB18030};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name looked up next to the inputs and in the working directory.
pub const PASSWORD_FILE_NAME: &str = "passwords.txt";

/// Supplies passwords to try and learns the ones that worked.
pub trait PasswordSource {
    /// Candidates in trial order, deduplicated, without blanks.
    fn candidates(&self) -> Vec<String>;

    /// Called once per run for each newly working non-empty password.
    fn record_success(&mut self, password: &str);
}

/// Ordered password list merged from several files, with optional write-back.
#[derive(Debug, Default, Clone)]
pub struct PasswordBook {
    passwords: Vec<String>,
    learned: Vec<String>,
    save_path: Option<PathBuf>,
}

impl PasswordBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_passwords<I, S>(passwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut book = Self::new();
        for password in passwords {
            book.push(password.as_ref());
        }
        book
    }

    /// Appends `password` unless it is blank or already known.
    pub fn push(&mut self, password: &str) -> bool {
        let password = password.trim();
        if password.is_empty() || self.passwords.iter().any(|p| p == password) {
            return false;
        }
        self.passwords.push(password.to_string());
        true
    }

    /// Merges the passwords stored at `path`. A missing file adds nothing.
    ///
    /// # Returns
    ///
    /// Number of passwords that were not already in the book.
    pub fn add_file(&mut self, path: &Path) -> io::Result<usize> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let text = decode_password_text(&bytes);
        let added = text.lines().filter(|line| self.push(line)).count();
        debug!("Loaded {} password(s) from {}", added, path.display());
        Ok(added)
    }

    /// Builds a book from every existing file in `paths`, in order. Learned
    /// passwords are written back to the first path.
    pub fn load(paths: &[PathBuf]) -> io::Result<Self> {
        let mut book = Self::new();
        for path in paths {
            book.add_file(path)?;
        }
        book.save_path = paths.first().cloned();
        Ok(book)
    }

    pub fn set_save_path(&mut self, path: PathBuf) {
        self.save_path = Some(path);
    }

    pub fn passwords(&self) -> &[String] {
        &self.passwords
    }

    /// Passwords that worked this run and were not in the book before.
    pub fn learned(&self) -> &[String] {
        &self.learned
    }

    /// Writes the whole book as UTF-8 when something new was learned.
    ///
    /// # Returns
    ///
    /// `true` if the file was written.
    pub fn save(&self) -> io::Result<bool> {
        let Some(path) = &self.save_path else {
            return Ok(false);
        };
        if self.learned.is_empty() {
            return Ok(false);
        }
        let mut text = self.passwords.join("\n");
        text.push('\n');
        fs::write(path, text)?;
        info!(
            "Saved {} new password(s) to {}",
            self.learned.len(),
            path.display()
        );
        Ok(true)
    }
}

impl PasswordSource for PasswordBook {
    fn candidates(&self) -> Vec<String> {
        self.passwords.clone()
    }

    fn record_success(&mut self, password: &str) {
        if self.push(password) {
            self.learned.push(password.trim().to_string());
        }
    }
}

/// Default lookup order: next to the input, then the working directory.
pub fn default_password_files(input_root: &Path) -> Vec<PathBuf> {
    let mut paths = vec![input_root.join(PASSWORD_FILE_NAME)];
    match std::env::current_dir() {
        Ok(cwd) => {
            let candidate = cwd.join(PASSWORD_FILE_NAME);
            if !paths.contains(&candidate) {
                paths.push(candidate);
            }
        }
        Err(e) => warn!("Cannot resolve working directory: {}", e),
    }
    paths
}

/// Decodes a password file: BOM-marked UTF-8/UTF-16 first, then plain UTF-8,
/// then GB18030 for legacy Chinese files.
pub fn decode_password_text(bytes: &[u8]) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (text, _, _) = GB18030.decode(bytes);
            text.into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_push_dedupes_and_skips_blanks() {
        let mut book = PasswordBook::new();
        assert!(book.push("alpha"));
        assert!(!book.push("alpha"));
        assert!(!book.push("   "));
        assert!(book.push(" beta "));
        assert_eq!(book.passwords(), ["alpha", "beta"]);
    }

    #[test]
    fn test_load_merges_files_in_order() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a.txt");
        let second = dir.path().join("b.txt");
        fs::write(&first, "one\n\ntwo\r\n").unwrap();
        fs::write(&second, "two\nthree\n").unwrap();

        let book = PasswordBook::load(&[first, dir.path().join("missing.txt"), second]).unwrap();
        assert_eq!(book.passwords(), ["one", "two", "three"]);
    }

    #[test]
    fn test_decode_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("密码\nsecret".as_bytes());
        assert_eq!(decode_password_text(&bytes), "密码\nsecret");
    }

    #[test]
    fn test_decode_utf16_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "pw1\npw2".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_password_text(&bytes), "pw1\npw2");
    }

    #[test]
    fn test_decode_gb18030_fallback() {
        let (encoded, _, _) = GB18030.encode("解压密码");
        assert_eq!(decode_password_text(&encoded), "解压密码");
    }

    #[test]
    fn test_record_success_only_learns_new() {
        let mut book = PasswordBook::with_passwords(["known"]);
        book.record_success("known");
        assert!(book.learned().is_empty());

        book.record_success("fresh");
        assert_eq!(book.learned(), ["fresh"]);
        assert_eq!(book.candidates(), vec!["known".to_string(), "fresh".to_string()]);
    }

    #[test]
    fn test_save_only_when_learned() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PASSWORD_FILE_NAME);
        fs::write(&path, "old\n").unwrap();

        let mut book = PasswordBook::load(&[path.clone()]).unwrap();
        assert!(!book.save().unwrap());

        book.record_success("new");
        assert!(book.save().unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\nnew\n");
    }
}
