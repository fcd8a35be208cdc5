//! Codec backed by an external 7-Zip console binary (`7z`, `7zz`, `7z.exe`).

use super::{Codec, CodecOutput};
use crate::error::ExtractError;
use crate::types::ArchiveEntry;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SevenZipCommand {
    program: PathBuf,
}

impl SevenZipCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run(&self, args: &[OsString]) -> io::Result<Output> {
        debug!("Running {} {:?}", self.program.display(), args);
        Command::new(&self.program).args(args).output()
    }
}

impl Default for SevenZipCommand {
    fn default() -> Self {
        #[cfg(target_os = "windows")]
        let program = "7z.exe";
        #[cfg(not(target_os = "windows"))]
        let program = "7z";
        Self::new(program)
    }
}

/// `-p` is always passed so that 7-Zip never prompts on stdin.
fn password_switch(password: Option<&str>) -> OsString {
    OsString::from(format!("-p{}", password.unwrap_or_default()))
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl Codec for SevenZipCommand {
    fn name(&self) -> &str {
        "7z"
    }

    fn list_contents(&self, path: &Path) -> Result<Vec<ArchiveEntry>, ExtractError> {
        if !path.exists() {
            return Err(ExtractError::NotFound(path.to_path_buf()));
        }
        let args = vec![
            OsString::from("l"),
            OsString::from("-slt"),
            password_switch(None),
            path.as_os_str().to_os_string(),
        ];
        let output = self.run(&args)?;
        let stdout = decode(&output.stdout);
        if !output.status.success() {
            let stderr = decode(&output.stderr);
            let lower = stderr.to_lowercase();
            return Err(if lower.contains("password") {
                ExtractError::PasswordRequired
            } else if lower.contains("open the file as archive") {
                ExtractError::UnsupportedFormat(stderr.trim().to_string())
            } else {
                ExtractError::Corrupted(stderr.trim().to_string())
            });
        }
        Ok(parse_slt_listing(&stdout))
    }

    fn extract(&self, path: &Path, dest: &Path, password: Option<&str>) -> CodecOutput {
        let mut out_switch = OsString::from("-o");
        out_switch.push(dest.as_os_str());
        let args = vec![
            OsString::from("x"),
            path.as_os_str().to_os_string(),
            out_switch,
            password_switch(password),
            OsString::from("-y"),
        ];
        match self.run(&args) {
            Ok(output) => CodecOutput {
                success: output.status.success(),
                stdout: decode(&output.stdout),
                stderr: decode(&output.stderr),
            },
            // Launch failures are not about the archive; report them as such.
            Err(e) => CodecOutput::failed(format!(
                "ERROR: cannot run {} : {}",
                self.program.display(),
                e
            )),
        }
    }

    fn is_valid_archive(&self, path: &Path) -> bool {
        self.list_contents(path).is_ok()
    }
}

/// Parses the technical listing printed by `7z l -slt`.
///
/// Entries follow the `----------` separator as blocks of `Key = Value`
/// lines separated by blank lines.
pub(crate) fn parse_slt_listing(stdout: &str) -> Vec<ArchiveEntry> {
    let Some((_, body)) = stdout.split_once("----------") else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for block in body.split("\n\n") {
        let mut path = None;
        let mut size = 0;
        let mut packed = None;
        let mut is_directory = false;
        for line in block.lines() {
            let Some((key, value)) = line.split_once(" = ") else {
                continue;
            };
            match key.trim() {
                "Path" => path = Some(value.trim().to_string()),
                "Size" => size = value.trim().parse().unwrap_or(0),
                "Packed Size" => packed = value.trim().parse().ok(),
                "Folder" => is_directory = value.trim() == "+",
                "Attributes" => is_directory |= value.trim_start().starts_with('D'),
                _ => {}
            }
        }
        if let Some(path) = path {
            entries.push(ArchiveEntry {
                path,
                is_directory,
                size,
                compressed_size: packed,
            });
        }
    }
    entries
}
