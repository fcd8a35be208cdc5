//! # Unravel
//!
//! Recursive extraction of nested, multipart, password-protected and
//! cloaked archives.
//!
//! Files are grouped into logical archives (a primary plus its numbered
//! continuations), extracted with a linear password trial, and whatever
//! comes out is regrouped and extracted again until only ordinary content
//! remains. Source archives are only removed once the whole chain below
//! them succeeded.
//!
//! ## Supported Formats
//!
//! - ZIP (ZipCrypto and AES), including 7-Zip style `.zip.001` splits
//! - TAR, plain or with gzip, bzip2 and xz compression
//! - single gzip, bzip2 and xz streams
//! - 7-Zip, including AES and `.7z.001` volumes
//! - RAR, including `.partN.rar` and `.rNN` sets
//!
//! Anything else can go through an external `7z` binary
//! ([`codec::SevenZipCommand`]).
//!
//! ## Example
//!
//! ```rust,no_run
//! use unravel::{CloakNormalizer, Engine, EngineConfig, NativeCodec, PasswordBook};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default();
//! let codec = NativeCodec::new(config.extract_options());
//! let normalizer = CloakNormalizer::builtin()?;
//! let mut passwords = PasswordBook::load(&[PathBuf::from("passwords.txt")])?;
//!
//! let report = Engine::new(&config, &codec, &normalizer, &mut passwords)
//!     .run(&[PathBuf::from("downloads")]);
//!
//! println!("{}", report);
//! passwords.save()?;
//! # Ok(())
//! # }
//! ```

pub mod cleanup;
pub mod cloak;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod group;
pub mod grouping;
pub mod naming;
pub mod passwords;
pub mod reconcile;
pub mod recycle;
pub mod report;
pub mod safety;
pub mod types;
pub mod walk;

// Re-export main types
pub use cleanup::{CleanupGuard, CleanupHandle};
pub use cloak::{CloakNormalizer, CloakRule};
pub use codec::{Codec, CodecKind, CodecOutput, KeywordTable, NativeCodec, SevenZipCommand};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{ConfigError, ExtractError, GroupError, PartMismatchError, RuleError, SecurityError};
pub use group::ArchiveGroup;
pub use grouping::{Grouper, GroupingOptions, GroupingResult};
pub use passwords::{PasswordBook, PasswordSource};
pub use report::{GroupReport, RunReport};
pub use types::{
    ArchiveEntry, ArchiveType, AttemptOutcome, ExtractOptions, FileEntry, GroupStatus, PartScheme,
    RemovalMode,
};

/// Type alias for progress callback functions.
///
/// The callback receives:
/// - `name`: The entry or group currently being worked on
/// - `bytes_written`: Number of bytes written so far
/// - `total_bytes`: Optional total size of the entry
///
/// Returns `true` to continue, `false` to cancel.
pub type ProgressCallback = dyn Fn(&str, u64, Option<u64>) -> bool + Send + Sync;
