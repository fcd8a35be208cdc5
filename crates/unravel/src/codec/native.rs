//! In-process codec built on the pure-Rust format crates.
//!
//! Formats are recognized by signature, not by name, so renamed and cloaked
//! archives open the same way as properly named ones. Failures are rendered
//! as 7-Zip style diagnostics for the shared keyword table.

use super::volumes::{volume_paths, MultiVolumeReader};
use super::{Codec, CodecOutput};
use crate::error::ExtractError;
use crate::naming::{classify_name, signature_type};
use crate::safety::{check_size_limits, is_safe_entry_type, validate_entry_path, EntryType};
use crate::types::{ArchiveEntry, ArchiveType, ExtractOptions};
use crate::ProgressCallback;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Counters for one extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub files_extracted: u64,
    pub bytes_written: u64,
}

/// Codec that unpacks 7z, ZIP, RAR, TAR and gz/bz2/xz streams without any
/// external program.
pub struct NativeCodec {
    options: ExtractOptions,
    cancel_flag: Arc<AtomicBool>,
    progress: Option<Arc<ProgressCallback>>,
}

impl Default for NativeCodec {
    fn default() -> Self {
        Self::new(ExtractOptions::default())
    }
}

impl NativeCodec {
    pub fn new(options: ExtractOptions) -> Self {
        Self {
            options,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    /// Shares a cancellation flag with the caller. Setting it stops the
    /// current extraction at the next entry.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = flag;
        self
    }

    /// Per-entry progress. Returning `false` from the callback cancels.
    pub fn with_progress(mut self, progress: Arc<ProgressCallback>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn check_cancel(&self) -> Result<(), ExtractError> {
        if self.cancel_flag.load(Ordering::Relaxed) {
            return Err(ExtractError::Cancelled);
        }
        Ok(())
    }

    fn report(&self, entry: &str, stats: &ExtractStats, size: Option<u64>) -> Result<(), ExtractError> {
        if let Some(progress) = &self.progress {
            if !progress(entry, stats.bytes_written, size) {
                return Err(ExtractError::Cancelled);
            }
        }
        Ok(())
    }

    /// Unpacks `path` into `dest`.
    ///
    /// # Errors
    ///
    /// Returns an [`ExtractError`] describing the first failure. Entries
    /// written before the failure stay in `dest`.
    pub fn extract_archive(
        &self,
        path: &Path,
        dest: &Path,
        password: Option<&str>,
    ) -> Result<ExtractStats, ExtractError> {
        let mut source = Source::open(path)?;
        fs::create_dir_all(dest)?;
        let mut stats = ExtractStats::default();

        match source.format(path)? {
            ArchiveType::SevenZ => {
                source.ensure_sevenz_complete()?;
                self.extract_sevenz(source, dest, password, &mut stats)?;
            }
            ArchiveType::Zip => {
                reject_spanned_zip(path)?;
                self.extract_zip(source, dest, password, &mut stats)?;
            }
            ArchiveType::Rar => self.extract_rar(path, &mut source, dest, password, &mut stats)?,
            ArchiveType::Tar => self.extract_tar(source, dest, &mut stats)?,
            kind @ (ArchiveType::Gz | ArchiveType::Bz2 | ArchiveType::Xz) => {
                self.extract_stream(kind, path, source, dest, &mut stats)?
            }
            ArchiveType::Auto | ArchiveType::None => {
                return Err(ExtractError::UnsupportedFormat("no known signature".into()));
            }
        }

        self.check_cancel()?;
        Ok(stats)
    }

    fn extract_sevenz(
        &self,
        source: Source,
        dest: &Path,
        password: Option<&str>,
        stats: &mut ExtractStats,
    ) -> Result<(), ExtractError> {
        let pw = password
            .map(sevenz_rust2::Password::from)
            .unwrap_or_else(sevenz_rust2::Password::empty);
        let mut reader = sevenz_rust2::ArchiveReader::new(BufReader::new(source), pw)
            .map_err(|e| map_sevenz_error(e, password, false))?;
        let encrypted = sevenz_has_encrypted_blocks(reader.archive());

        let mut failure: Option<ExtractError> = None;
        let result = reader.for_each_entries(|entry, data| {
            match self.write_sevenz_entry(entry, data, dest, stats) {
                Ok(()) => Ok(true),
                Err(ExtractError::Io(e)) => Err(e.into()),
                Err(e) => {
                    failure = Some(e);
                    Ok(false)
                }
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }
        result.map_err(|e| map_sevenz_error(e, password, encrypted))
    }

    fn write_sevenz_entry(
        &self,
        entry: &sevenz_rust2::ArchiveEntry,
        data: &mut dyn Read,
        dest: &Path,
        stats: &mut ExtractStats,
    ) -> Result<(), ExtractError> {
        self.check_cancel()?;
        let entry_type = if entry.is_directory() {
            EntryType::Directory
        } else {
            EntryType::File
        };
        let Some(relative) = self.checked_path(&entry.name, entry_type) else {
            io::copy(data, &mut io::sink())?;
            return Ok(());
        };
        let out_path = dest.join(&relative);
        if entry_type == EntryType::Directory {
            fs::create_dir_all(&out_path)?;
            return Ok(());
        }
        self.write_file(data, &out_path, entry.size, stats)?;
        self.report(&entry.name, stats, Some(entry.size))
    }

    fn extract_zip(
        &self,
        source: Source,
        dest: &Path,
        password: Option<&str>,
        stats: &mut ExtractStats,
    ) -> Result<(), ExtractError> {
        // The end record lives in the last volume.
        let missing = source.is_volume_set().then(|| source.truncated());
        let mut archive = zip::ZipArchive::new(source).map_err(|e| match missing {
            Some(missing) => missing,
            None => map_zip_error(e, password),
        })?;

        for i in 0..archive.len() {
            self.check_cancel()?;
            let mut file = match password {
                Some(pw) => archive.by_index_decrypt(i, pw.as_bytes()),
                None => archive.by_index(i),
            }
            .map_err(|e| map_zip_error(e, password))?;

            let name = file.name().to_string();
            let entry_type = zip_entry_type(file.is_dir(), file.unix_mode());
            let Some(relative) = self.checked_path(&name, entry_type) else {
                continue;
            };
            let out_path = dest.join(&relative);
            if entry_type == EntryType::Directory {
                fs::create_dir_all(&out_path)?;
                continue;
            }

            let size = file.size();
            let encrypted = file.encrypted();
            match self.write_file(&mut file, &out_path, size, stats) {
                Ok(()) => {}
                // ZipCrypto only detects a wrong key through the checksum.
                Err(ExtractError::Io(_)) if encrypted && password.is_some() => {
                    return Err(ExtractError::InvalidPassword);
                }
                Err(ExtractError::Io(e)) => return Err(ExtractError::Corrupted(e.to_string())),
                Err(e) => return Err(e),
            }
            self.report(&name, stats, Some(size))?;
        }
        Ok(())
    }

    fn extract_rar(
        &self,
        path: &Path,
        source: &mut Source,
        dest: &Path,
        password: Option<&str>,
        stats: &mut ExtractStats,
    ) -> Result<(), ExtractError> {
        use unrar::Archive;

        // unrar finds `.partN.rar` and `.rNN` siblings itself; numbered
        // `.rar.001` sets are joined into one temporary file first.
        let joined = if source.is_volume_set() {
            Some(join_to_temp(source, ".rar")?)
        } else {
            None
        };
        let archive_path = joined.as_ref().map(|t| t.path()).unwrap_or(path);

        let archive = match password {
            Some(pw) => Archive::with_password(archive_path, pw.as_bytes()),
            None => Archive::new(archive_path),
        };
        let mut current = Some(
            archive
                .as_first_part()
                .open_for_processing()
                .map_err(|e| map_rar_error(&e.to_string(), password))?,
        );

        while let Some(open) = current {
            self.check_cancel()?;
            let Some(header) = open
                .read_header()
                .map_err(|e| map_rar_error(&e.to_string(), password))?
            else {
                break;
            };

            let entry = header.entry();
            let name = entry.filename.to_string_lossy().to_string();
            let size = entry.unpacked_size;
            let entry_type = if entry.is_directory() {
                EntryType::Directory
            } else {
                EntryType::File
            };

            let target = self.checked_path(&name, entry_type).map(|p| dest.join(p));
            current = Some(match target {
                Some(out_path) if entry_type == EntryType::File => {
                    let new_total = stats.bytes_written.saturating_add(size);
                    check_size_limits(new_total, self.options.size_limit_bytes)?;
                    if let Some(parent) = out_path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    let next = header
                        .extract_to(&out_path)
                        .map_err(|e| map_rar_error(&e.to_string(), password))?;
                    stats.files_extracted += 1;
                    stats.bytes_written = new_total;
                    self.report(&name, stats, Some(size))?;
                    next
                }
                Some(out_path) => {
                    fs::create_dir_all(&out_path)?;
                    header
                        .skip()
                        .map_err(|e| map_rar_error(&e.to_string(), password))?
                }
                None => header
                    .skip()
                    .map_err(|e| map_rar_error(&e.to_string(), password))?,
            });
        }
        Ok(())
    }

    fn extract_tar<R: Read>(
        &self,
        reader: R,
        dest: &Path,
        stats: &mut ExtractStats,
    ) -> Result<(), ExtractError> {
        let mut archive = tar::Archive::new(reader);
        for entry in archive.entries().map_err(corrupted)? {
            self.check_cancel()?;
            let mut entry = entry.map_err(corrupted)?;
            let name = entry.path().map_err(corrupted)?.to_string_lossy().to_string();
            let kind = entry.header().entry_type();
            let entry_type = if kind.is_dir() {
                EntryType::Directory
            } else if kind.is_symlink() {
                EntryType::Symlink
            } else if kind.is_hard_link() {
                EntryType::Hardlink
            } else if kind.is_file() {
                EntryType::File
            } else {
                EntryType::Other
            };

            let Some(relative) = self.checked_path(&name, entry_type) else {
                continue;
            };
            let out_path = dest.join(&relative);
            if entry_type == EntryType::Directory {
                fs::create_dir_all(&out_path)?;
                continue;
            }

            let size = entry.size();
            let new_total = stats.bytes_written.saturating_add(size);
            check_size_limits(new_total, self.options.size_limit_bytes)?;
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            entry.unpack(&out_path).map_err(corrupted)?;
            stats.files_extracted += 1;
            stats.bytes_written = new_total;
            self.report(&name, stats, Some(size))?;
        }
        Ok(())
    }

    /// Single compressed stream: a tarball is unpacked, anything else is
    /// written as one file named after the archive.
    fn extract_stream(
        &self,
        kind: ArchiveType,
        path: &Path,
        source: Source,
        dest: &Path,
        stats: &mut ExtractStats,
    ) -> Result<(), ExtractError> {
        let mut plain = self.decompress_to_temp(kind, source)?;
        let mut head = [0u8; 512];
        let filled = read_up_to(&mut plain, &mut head)?;
        plain.seek(SeekFrom::Start(0))?;

        if signature_type(&head[..filled]) == Some(ArchiveType::Tar) {
            return self.extract_tar(plain, dest, stats);
        }

        let name = stream_output_name(path);
        let out_path = dest.join(&name);
        let size = plain.metadata()?.len();
        self.write_file(&mut plain, &out_path, size, stats)?;
        self.report(&name, stats, Some(size))
    }

    fn decompress_to_temp(&self, kind: ArchiveType, source: Source) -> Result<File, ExtractError> {
        let mut out = tempfile::tempfile()?;
        let input = BufReader::new(source);
        let result = match kind {
            ArchiveType::Gz => self.copy_limited(&mut flate2::read::MultiGzDecoder::new(input), &mut out),
            ArchiveType::Bz2 => self.copy_limited(&mut bzip2::read::BzDecoder::new(input), &mut out),
            _ => {
                let mut input = input;
                lzma_rs::xz_decompress(&mut input, &mut out)
                    .map_err(|e| ExtractError::Corrupted(format!("xz: {:?}", e)))?;
                let size = out.metadata()?.len();
                check_size_limits(size, self.options.size_limit_bytes)
                    .map(|()| size)
                    .map_err(ExtractError::from)
            }
        };
        match result {
            Ok(_) => {}
            Err(ExtractError::Io(e)) => return Err(corrupted(e)),
            Err(e) => return Err(e),
        }
        out.seek(SeekFrom::Start(0))?;
        Ok(out)
    }

    /// Copies at most the configured size limit.
    fn copy_limited<R: Read + ?Sized, W: Write>(
        &self,
        reader: &mut R,
        writer: &mut W,
    ) -> Result<u64, ExtractError> {
        let Some(limit) = self.options.size_limit_bytes else {
            return Ok(io::copy(reader, writer)?);
        };
        let copied = io::copy(&mut reader.take(limit.saturating_add(1)), writer)?;
        check_size_limits(copied, Some(limit))?;
        Ok(copied)
    }

    /// Validated relative output path, or `None` when the entry is skipped.
    fn checked_path(&self, name: &str, entry_type: EntryType) -> Option<PathBuf> {
        if !is_safe_entry_type(entry_type, &self.options) {
            warn!("Skipping {:?} entry: {}", entry_type, name);
            return None;
        }
        match validate_entry_path(Path::new(name)) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Skipping entry {}: {}", name, e);
                None
            }
        }
    }

    fn write_file<R: Read + ?Sized>(
        &self,
        reader: &mut R,
        out_path: &Path,
        declared_size: u64,
        stats: &mut ExtractStats,
    ) -> Result<(), ExtractError> {
        check_size_limits(
            stats.bytes_written.saturating_add(declared_size),
            self.options.size_limit_bytes,
        )?;
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(out_path)?;
        let written = io::copy(reader, &mut out)?;
        stats.bytes_written += written;
        stats.files_extracted += 1;
        check_size_limits(stats.bytes_written, self.options.size_limit_bytes)?;
        Ok(())
    }

    /// Lists entries without writing anything.
    pub fn list_archive(&self, path: &Path) -> Result<Vec<ArchiveEntry>, ExtractError> {
        let mut source = Source::open(path)?;
        match source.format(path)? {
            ArchiveType::SevenZ => {
                source.ensure_sevenz_complete()?;
                let reader =
                    sevenz_rust2::ArchiveReader::new(BufReader::new(source), sevenz_rust2::Password::empty())
                        .map_err(|e| map_sevenz_error(e, None, false))?;
                Ok(reader
                    .archive()
                    .files
                    .iter()
                    .map(|e| ArchiveEntry {
                        path: e.name.clone(),
                        is_directory: e.is_directory(),
                        size: e.size,
                        compressed_size: None,
                    })
                    .collect())
            }
            ArchiveType::Zip => {
                reject_spanned_zip(path)?;
                let mut archive = zip::ZipArchive::new(source).map_err(|e| map_zip_error(e, None))?;
                let mut entries = Vec::with_capacity(archive.len());
                for i in 0..archive.len() {
                    let file = archive.by_index_raw(i).map_err(|e| map_zip_error(e, None))?;
                    entries.push(ArchiveEntry {
                        path: file.name().to_string(),
                        is_directory: file.is_dir(),
                        size: file.size(),
                        compressed_size: Some(file.compressed_size()),
                    });
                }
                Ok(entries)
            }
            ArchiveType::Rar => list_rar(path, &mut source),
            ArchiveType::Tar => list_tar(source),
            kind @ (ArchiveType::Gz | ArchiveType::Bz2 | ArchiveType::Xz) => {
                let mut plain = self.decompress_to_temp(kind, source)?;
                let mut head = [0u8; 512];
                let filled = read_up_to(&mut plain, &mut head)?;
                plain.seek(SeekFrom::Start(0))?;
                if signature_type(&head[..filled]) == Some(ArchiveType::Tar) {
                    return list_tar(plain);
                }
                let size = plain.metadata()?.len();
                Ok(vec![ArchiveEntry {
                    path: stream_output_name(path),
                    is_directory: false,
                    size,
                    compressed_size: None,
                }])
            }
            ArchiveType::Auto | ArchiveType::None => {
                Err(ExtractError::UnsupportedFormat("no known signature".into()))
            }
        }
    }
}

impl Codec for NativeCodec {
    fn name(&self) -> &str {
        "native"
    }

    fn list_contents(&self, path: &Path) -> Result<Vec<ArchiveEntry>, ExtractError> {
        self.list_archive(path)
    }

    fn extract(&self, path: &Path, dest: &Path, password: Option<&str>) -> CodecOutput {
        match self.extract_archive(path, dest, password) {
            Ok(stats) => CodecOutput::ok(format!(
                "Everything is Ok\n\nFiles: {}\nSize:       {}",
                stats.files_extracted, stats.bytes_written
            )),
            Err(e) => {
                debug!("Native extraction of {} failed: {}", path.display(), e);
                let label = path.file_name().map(Path::new).unwrap_or(path);
                CodecOutput::failed(e.diagnostic(label))
            }
        }
    }

    fn is_valid_archive(&self, path: &Path) -> bool {
        match self.list_archive(path) {
            Ok(_) => true,
            Err(ExtractError::PasswordRequired | ExtractError::InvalidPassword) => true,
            Err(_) => false,
        }
    }
}

/// The file or volume set being read.
enum Source {
    File(File),
    Volumes(MultiVolumeReader, Vec<PathBuf>),
}

impl Source {
    fn open(path: &Path) -> Result<Self, ExtractError> {
        if !path.is_file() {
            return Err(ExtractError::NotFound(path.to_path_buf()));
        }
        match volume_paths(path) {
            Some(paths) => Ok(Source::Volumes(MultiVolumeReader::open(&paths)?, paths)),
            None => Ok(Source::File(File::open(path)?)),
        }
    }

    fn is_volume_set(&self) -> bool {
        matches!(self, Source::Volumes(..))
    }

    fn len(&self) -> io::Result<u64> {
        match self {
            Source::File(file) => Ok(file.metadata()?.len()),
            Source::Volumes(reader, _) => Ok(reader.len()),
        }
    }

    /// Archive type from the leading bytes, falling back to the name.
    fn format(&mut self, path: &Path) -> Result<ArchiveType, ExtractError> {
        let mut head = [0u8; 512];
        self.seek(SeekFrom::Start(0))?;
        let filled = read_up_to(self, &mut head)?;
        self.seek(SeekFrom::Start(0))?;

        if let Some(kind) = signature_type(&head[..filled]) {
            return Ok(kind);
        }
        let by_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(classify_name)
            .map(|c| c.archive_type);
        match by_name {
            // Pre-POSIX tarballs carry no magic.
            Some(ArchiveType::Tar) => Ok(ArchiveType::Tar),
            _ => Err(ExtractError::UnsupportedFormat("no known signature".into())),
        }
    }

    /// A 7z start header records where the end header lives. When that lies
    /// past the end of the data, later volumes are missing.
    fn ensure_sevenz_complete(&mut self) -> Result<(), ExtractError> {
        let len = self.len()?;
        let mut header = [0u8; 32];
        self.seek(SeekFrom::Start(0))?;
        if read_up_to(self, &mut header)? < header.len() {
            return Err(self.truncated());
        }
        self.seek(SeekFrom::Start(0))?;

        let mut offset = [0u8; 8];
        offset.copy_from_slice(&header[12..20]);
        let mut size = [0u8; 8];
        size.copy_from_slice(&header[20..28]);
        let needed = 32u64
            .saturating_add(u64::from_le_bytes(offset))
            .saturating_add(u64::from_le_bytes(size));
        if needed > len {
            return Err(self.truncated());
        }
        Ok(())
    }

    fn truncated(&self) -> ExtractError {
        let last = match self {
            Source::Volumes(_, paths) => paths.last(),
            Source::File(_) => None,
        };
        match last.and_then(|p| next_volume_name(p)) {
            Some(next) => ExtractError::MissingVolume(next),
            None => ExtractError::Corrupted("unexpected end of data".into()),
        }
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::File(file) => file.read(buf),
            Source::Volumes(reader, _) => reader.read(buf),
        }
    }
}

impl Seek for Source {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Source::File(file) => file.seek(pos),
            Source::Volumes(reader, _) => reader.seek(pos),
        }
    }
}

/// Name of the volume that should follow `last` (`a.7z.001` -> `a.7z.002`).
fn next_volume_name(last: &Path) -> Option<String> {
    let name = last.file_name()?.to_str()?;
    let (stem, number) = name.rsplit_once('.')?;
    if number.len() != 3 || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let next = number.parse::<u32>().ok()? + 1;
    Some(format!("{stem}.{next:03}"))
}

/// Spanned ZIP sets keep per-disk offsets that the zip crate cannot follow.
fn reject_spanned_zip(path: &Path) -> Result<(), ExtractError> {
    let Some(stem) = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(".zip").or_else(|| n.strip_suffix(".ZIP")))
    else {
        return Ok(());
    };
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let spanned = ["z01", "Z01"]
        .iter()
        .any(|ext| dir.join(format!("{stem}.{ext}")).exists());
    if spanned {
        return Err(ExtractError::Corrupted(
            "spanned ZIP set (.z01 parts) needs the 7z codec".into(),
        ));
    }
    Ok(())
}

fn join_to_temp(source: &mut Source, suffix: &str) -> Result<tempfile::NamedTempFile, ExtractError> {
    let mut joined = tempfile::Builder::new()
        .prefix(".unravel-join-")
        .suffix(suffix)
        .tempfile()?;
    source.seek(SeekFrom::Start(0))?;
    io::copy(source, joined.as_file_mut())?;
    joined.as_file_mut().flush()?;
    Ok(joined)
}

fn read_up_to<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn corrupted(e: io::Error) -> ExtractError {
    ExtractError::Corrupted(e.to_string())
}

/// `data.gz` -> `data`, `data.tgz` -> `data.tar`, `x.bin.gz.001` -> `x.bin`.
fn stream_output_name(path: &Path) -> String {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data".to_string());
    if let Some((stem, number)) = name.rsplit_once('.') {
        if number.len() == 3 && number.bytes().all(|b| b.is_ascii_digit()) {
            name = stem.to_string();
        }
    }
    let lower = name.to_lowercase();
    for (ext, replacement) in [
        (".tgz", ".tar"),
        (".tbz2", ".tar"),
        (".tbz", ".tar"),
        (".txz", ".tar"),
        (".gz", ""),
        (".bz2", ""),
        (".xz", ""),
    ] {
        if lower.ends_with(ext) && name.len() > ext.len() {
            return format!("{}{}", &name[..name.len() - ext.len()], replacement);
        }
    }
    format!("{name}.out")
}

fn zip_entry_type(is_dir: bool, unix_mode: Option<u32>) -> EntryType {
    const S_IFMT: u32 = 0o170000;
    const S_IFLNK: u32 = 0o120000;
    if is_dir {
        EntryType::Directory
    } else if unix_mode.is_some_and(|mode| mode & S_IFMT == S_IFLNK) {
        EntryType::Symlink
    } else {
        EntryType::File
    }
}

fn sevenz_has_encrypted_blocks(archive: &sevenz_rust2::Archive) -> bool {
    archive.blocks.iter().any(|block| {
        block
            .coders
            .iter()
            .any(|coder| coder.encoder_method_id() == sevenz_rust2::EncoderMethod::ID_AES256_SHA256)
    })
}

fn map_sevenz_error(e: sevenz_rust2::Error, password: Option<&str>, encrypted: bool) -> ExtractError {
    let message = e.to_string();
    let lower = message.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") || (encrypted && password.is_some()) {
        return match password {
            None => ExtractError::PasswordRequired,
            Some(_) => ExtractError::InvalidPassword,
        };
    }
    if encrypted {
        return ExtractError::PasswordRequired;
    }
    if lower.contains("unsupported") || lower.contains("not a 7z") || lower.contains("bad signature") {
        return ExtractError::UnsupportedFormat(message);
    }
    ExtractError::Corrupted(message)
}

fn map_zip_error(e: zip::result::ZipError, password: Option<&str>) -> ExtractError {
    use zip::result::ZipError;
    match e {
        ZipError::InvalidPassword => ExtractError::InvalidPassword,
        ZipError::UnsupportedArchive(ref msg) if msg.to_lowercase().contains("password") => {
            match password {
                None => ExtractError::PasswordRequired,
                Some(_) => ExtractError::InvalidPassword,
            }
        }
        ZipError::Io(io) => ExtractError::Corrupted(io.to_string()),
        other => ExtractError::Corrupted(other.to_string()),
    }
}

fn map_rar_error(message: &str, password: Option<&str>) -> ExtractError {
    let lower = message.to_lowercase();
    if lower.contains("password") {
        match password {
            None => ExtractError::PasswordRequired,
            Some(_) => ExtractError::InvalidPassword,
        }
    } else if lower.contains("eopen") || lower.contains("volume") {
        ExtractError::MissingVolume(message.to_string())
    } else if lower.contains("unknownformat") || lower.contains("unknown format") {
        ExtractError::UnsupportedFormat(message.to_string())
    } else {
        ExtractError::Corrupted(message.to_string())
    }
}

fn list_rar(path: &Path, source: &mut Source) -> Result<Vec<ArchiveEntry>, ExtractError> {
    use unrar::Archive;

    let joined = if source.is_volume_set() {
        Some(join_to_temp(source, ".rar")?)
    } else {
        None
    };
    let archive_path = joined.as_ref().map(|t| t.path()).unwrap_or(path);
    let archive = Archive::new(archive_path)
        .open_for_listing()
        .map_err(|e| map_rar_error(&e.to_string(), None))?;

    let mut entries = Vec::new();
    for header in archive {
        let header = header.map_err(|e| map_rar_error(&e.to_string(), None))?;
        entries.push(ArchiveEntry {
            path: header.filename.to_string_lossy().to_string(),
            is_directory: header.is_directory(),
            size: header.unpacked_size,
            compressed_size: None,
        });
    }
    Ok(entries)
}

fn list_tar<R: Read>(reader: R) -> Result<Vec<ArchiveEntry>, ExtractError> {
    let mut archive = tar::Archive::new(reader);
    let mut entries = Vec::new();
    for entry in archive.entries().map_err(corrupted)? {
        let entry = entry.map_err(corrupted)?;
        entries.push(ArchiveEntry {
            path: entry.path().map_err(corrupted)?.to_string_lossy().to_string(),
            is_directory: entry.header().entry_type().is_dir(),
            size: entry.size(),
            compressed_size: None,
        });
    }
    Ok(entries)
}
