//! Engine settings, loadable from a JSON file.

use crate::codec::{Codec, CodecKind, KeywordTable, NativeCodec, SevenZipCommand};
use crate::error::ConfigError;
use crate::types::{ExtractOptions, RemovalMode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Name of the output folder created under the input root by default.
pub const DEFAULT_OUTPUT_DIR: &str = "unzipped";

/// Default bound on archive-in-archive recursion.
pub const DEFAULT_MAX_DEPTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deepest nesting level that is still extracted.
    pub max_depth: usize,

    /// How consumed sources and temp paths are removed.
    pub removal: RemovalMode,

    /// Trust file names only: no uncloaking, no signature sniffing.
    pub strict_detection: bool,

    /// Where final content goes. `None` means `unzipped` under each input
    /// root.
    pub output_dir: Option<PathBuf>,

    /// Phrases used to classify codec failures.
    pub keywords: KeywordTable,

    /// Cap on the bytes written per archive by the native codec.
    pub size_limit_bytes: Option<u64>,

    pub codec: CodecKind,

    /// `7z` executable for the command codec.
    pub seven_zip: Option<PathBuf>,

    /// Descend into subdirectories of the inputs.
    pub recursive: bool,

    /// Group and report planned renames without touching the disk.
    pub dry_run: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            removal: RemovalMode::Recycle,
            strict_detection: false,
            output_dir: None,
            keywords: KeywordTable::default(),
            size_limit_bytes: ExtractOptions::default().size_limit_bytes,
            codec: CodecKind::Native,
            seven_zip: None,
            recursive: true,
            dry_run: false,
        }
    }
}

impl EngineConfig {
    /// Reads a JSON config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Output folder for an input located at `root`.
    pub fn output_dir_for(&self, root: &Path) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => root.join(DEFAULT_OUTPUT_DIR),
        }
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            size_limit_bytes: self.size_limit_bytes,
            ..ExtractOptions::default()
        }
    }

    /// Builds the configured codec. The native codec stops when `cancel`
    /// is raised.
    pub fn build_codec(&self, cancel: Arc<AtomicBool>) -> Box<dyn Codec> {
        match self.codec {
            CodecKind::Native => {
                Box::new(NativeCodec::new(self.extract_options()).with_cancel_flag(cancel))
            }
            CodecKind::SevenZip => match &self.seven_zip {
                Some(program) => Box::new(SevenZipCommand::new(program.clone())),
                None => Box::new(SevenZipCommand::default()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_depth, 10);
        assert_eq!(config.removal, RemovalMode::Recycle);
        assert!(config.recursive);
        assert_eq!(
            config.output_dir_for(Path::new("/data")),
            PathBuf::from("/data/unzipped")
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("unravel.json");
        fs::write(
            &path,
            r#"{"max_depth": 3, "removal": "permanent", "codec": "7z", "keywords": {"password": ["kennwort"]}}"#,
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.removal, RemovalMode::Permanent);
        assert_eq!(config.codec, CodecKind::SevenZip);
        assert_eq!(config.keywords.password, vec!["kennwort".to_string()]);
        assert!(!config.keywords.corruption.is_empty());
        assert!(!config.strict_detection);
    }

    #[test]
    fn test_bad_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = EngineConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));
        assert!(err.to_string().contains("broken.json"));

        let missing = EngineConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn test_build_codec_by_kind() {
        let flag = Arc::new(AtomicBool::new(false));
        let native = EngineConfig::default().build_codec(flag.clone());
        assert_eq!(native.name(), "native");

        let config = EngineConfig {
            codec: CodecKind::SevenZip,
            ..EngineConfig::default()
        };
        assert_eq!(config.build_codec(flag).name(), "7z");
    }
}
