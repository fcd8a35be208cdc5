//! Reading a numbered volume set (`name.001`, `name.002`, ...) as one stream.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Returns the volumes of the set that `first` opens, in order.
///
/// `first` must end in `.001`. Volumes are collected while the next number
/// exists on disk, so a gap ends the set. Returns `None` for any other name.
pub fn volume_paths(first: &Path) -> Option<Vec<PathBuf>> {
    let name = first.file_name()?.to_str()?;
    let stem = name.strip_suffix(".001")?;
    let dir = first.parent().unwrap_or_else(|| Path::new(""));

    let mut paths = vec![first.to_path_buf()];
    for index in 2..=999u32 {
        let next = dir.join(format!("{stem}.{index:03}"));
        if !next.is_file() {
            break;
        }
        paths.push(next);
    }
    Some(paths)
}

struct Volume {
    path: PathBuf,
    start: u64,
    len: u64,
}

/// Concatenation of volume files exposed as a single seekable reader.
pub struct MultiVolumeReader {
    volumes: Vec<Volume>,
    total_len: u64,
    position: u64,
    current: Option<(usize, File)>,
}

impl MultiVolumeReader {
    pub fn open(paths: &[PathBuf]) -> io::Result<Self> {
        if paths.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "no volumes"));
        }
        let mut volumes = Vec::with_capacity(paths.len());
        let mut start = 0;
        for path in paths {
            let len = std::fs::metadata(path)?.len();
            volumes.push(Volume {
                path: path.clone(),
                start,
                len,
            });
            start += len;
        }
        Ok(Self {
            volumes,
            total_len: start,
            position: 0,
            current: None,
        })
    }

    pub fn volume_count(&self) -> usize {
        self.volumes.len()
    }

    /// Combined length of all volumes.
    pub fn len(&self) -> u64 {
        self.total_len
    }

    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }

    fn volume_at(&self, position: u64) -> Option<usize> {
        self.volumes
            .iter()
            .position(|v| position >= v.start && position < v.start + v.len)
    }
}

impl Read for MultiVolumeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.position >= self.total_len {
            return Ok(0);
        }
        let Some(index) = self.volume_at(self.position) else {
            return Ok(0);
        };
        let volume = &self.volumes[index];
        let offset = self.position - volume.start;
        let available = volume.len - offset;

        if !matches!(self.current, Some((open, _)) if open == index) {
            self.current = Some((index, File::open(&volume.path)?));
        }
        let Some((_, file)) = self.current.as_mut() else {
            return Ok(0);
        };
        file.seek(SeekFrom::Start(offset))?;

        let remaining = available.min(buf.len() as u64) as usize;
        let n = file.read(&mut buf[..remaining])?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for MultiVolumeReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.total_len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of volume set")
        })?;
        self.position = target;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn split(dir: &Path, stem: &str, data: &[u8], chunk: usize) -> Vec<PathBuf> {
        data.chunks(chunk)
            .enumerate()
            .map(|(i, part)| {
                let path = dir.join(format!("{stem}.{:03}", i + 1));
                fs::write(&path, part).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_volume_paths_stop_at_gap() {
        let dir = TempDir::new().unwrap();
        for name in ["a.7z.001", "a.7z.002", "a.7z.004"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let paths = volume_paths(&dir.path().join("a.7z.001")).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(volume_paths(&dir.path().join("a.7z")).is_none());
    }

    #[test]
    fn test_reads_across_volume_boundaries() {
        let dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let paths = split(dir.path(), "blob", &data, 300);

        let mut reader = MultiVolumeReader::open(&paths).unwrap();
        assert_eq!(reader.volume_count(), 4);
        assert_eq!(reader.len(), 1000);

        let mut all = Vec::new();
        reader.read_to_end(&mut all).unwrap();
        assert_eq!(all, data);
    }

    #[test]
    fn test_seek_then_read() {
        let dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..100u8).collect();
        let paths = split(dir.path(), "blob", &data, 30);

        let mut reader = MultiVolumeReader::open(&paths).unwrap();
        reader.seek(SeekFrom::Start(28)).unwrap();
        let mut buf = [0u8; 5];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [28, 29, 30, 31, 32]);

        reader.seek(SeekFrom::End(-2)).unwrap();
        let mut tail = Vec::new();
        reader.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, [98, 99]);

        assert!(reader.seek(SeekFrom::Current(-500)).is_err());
    }
}
