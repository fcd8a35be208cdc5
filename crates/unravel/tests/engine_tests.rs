use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use unravel::walk::{collect_files, WalkOptions};
use unravel::{
    ArchiveEntry, AttemptOutcome, CloakNormalizer, Codec, CodecOutput, Engine, EngineConfig, ExtractError,
    GroupStatus, PasswordBook, PasswordSource, RemovalMode, RunReport,
};

/// What the fake codec does for one archive name.
#[derive(Clone, Default)]
struct Script {
    password: Option<&'static str>,
    files: Vec<(&'static str, &'static str)>,
    failure: Option<&'static str>,
}

impl Script {
    fn yields(files: &[(&'static str, &'static str)]) -> Self {
        Self {
            files: files.to_vec(),
            ..Self::default()
        }
    }

    fn locked(password: &'static str, files: &[(&'static str, &'static str)]) -> Self {
        Self {
            password: Some(password),
            files: files.to_vec(),
            failure: None,
        }
    }

    fn fails(message: &'static str) -> Self {
        Self {
            failure: Some(message),
            ..Self::default()
        }
    }
}

/// Codec driven by per-name scripts. Unknown names are "not an archive".
#[derive(Default)]
struct FakeCodec {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeCodec {
    fn new() -> Self {
        Self::default()
    }

    fn script(mut self, name: &str, script: Script) -> Self {
        self.scripts.insert(name.to_string(), script);
        self
    }

    fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

impl Codec for FakeCodec {
    fn name(&self) -> &str {
        "fake"
    }

    fn list_contents(&self, path: &Path) -> Result<Vec<ArchiveEntry>, ExtractError> {
        let script = self
            .scripts
            .get(&file_name(path))
            .ok_or_else(|| ExtractError::UnsupportedFormat("unknown".into()))?;
        Ok(script
            .files
            .iter()
            .map(|(name, bytes)| ArchiveEntry {
                path: name.to_string(),
                is_directory: false,
                size: bytes.len() as u64,
                compressed_size: None,
            })
            .collect())
    }

    fn extract(&self, path: &Path, dest: &Path, password: Option<&str>) -> CodecOutput {
        let name = file_name(path);
        self.calls
            .lock()
            .unwrap()
            .push((name.clone(), password.map(String::from)));

        let Some(script) = self.scripts.get(&name) else {
            return CodecOutput::failed(format!(
                "ERROR: {} : Can not open the file as archive",
                path.display()
            ));
        };
        if let Some(failure) = script.failure {
            return CodecOutput::failed(failure);
        }
        if let Some(expected) = script.password {
            if password != Some(expected) {
                return CodecOutput::failed(format!("ERROR: Wrong password : {}", path.display()));
            }
        }
        for (relative, bytes) in &script.files {
            let out = dest.join(relative);
            fs::create_dir_all(out.parent().unwrap()).unwrap();
            fs::write(out, bytes).unwrap();
        }
        CodecOutput::ok("Everything is Ok")
    }

    fn is_valid_archive(&self, path: &Path) -> bool {
        self.scripts.contains_key(&file_name(path))
    }
}

/// Password source that remembers what it was told.
struct RecordingSource {
    candidates: Vec<String>,
    recorded: Vec<String>,
}

impl RecordingSource {
    fn new(candidates: &[&str]) -> Self {
        Self {
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
            recorded: Vec::new(),
        }
    }
}

impl PasswordSource for RecordingSource {
    fn candidates(&self) -> Vec<String> {
        self.candidates.clone()
    }

    fn record_success(&mut self, password: &str) {
        self.recorded.push(password.to_string());
    }
}

fn test_config() -> EngineConfig {
    EngineConfig {
        removal: RemovalMode::Permanent,
        ..EngineConfig::default()
    }
}

fn run_with<P: PasswordSource>(
    root: &Path,
    config: &EngineConfig,
    codec: &FakeCodec,
    passwords: &mut P,
) -> RunReport {
    let normalizer = CloakNormalizer::builtin().unwrap();
    Engine::new(config, codec, &normalizer, passwords).run(&[root.to_path_buf()])
}

fn run(root: &Path, codec: &FakeCodec) -> RunReport {
    run_with(root, &test_config(), codec, &mut RecordingSource::new(&[]))
}

fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, name.as_bytes()).unwrap();
    path
}

/// Names of every file under `dir`, including tool directories.
fn all_names(dir: &Path) -> Vec<String> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect()
}

fn no_staging_left(output: &Path) -> bool {
    match fs::read_dir(output) {
        Ok(entries) => entries.filter_map(Result::ok).all(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name == ".unravel-holding" || !name.starts_with(".unravel-")
        }),
        Err(_) => true,
    }
}

fn status_of(report: &RunReport, name: &str) -> GroupStatus {
    report
        .groups
        .iter()
        .find(|g| g.name == name)
        .unwrap_or_else(|| panic!("no group named {name}"))
        .status
}

#[test]
fn test_lone_first_volume_fails_and_is_retained() {
    let root = TempDir::new().unwrap();
    let first = touch(root.path(), "data.7z.001");
    let codec = FakeCodec::new().script("data.7z.001", Script::fails("ERROR: Missing volume : data.7z.002"));

    let report = run(root.path(), &codec);

    assert_eq!(status_of(&report, "data.7z.001"), GroupStatus::FailedMissingPart);
    assert!(first.exists());
    assert_ne!(report.exit_code(), 0);
    assert_eq!(report.groups[0].retained, vec![first]);
    assert!(no_staging_left(&root.path().join("unzipped")));
}

#[test]
fn test_gap_in_volumes_skips_codec() {
    let root = TempDir::new().unwrap();
    touch(root.path(), "data.7z.001");
    touch(root.path(), "data.7z.003");
    let codec = FakeCodec::new().script("data.7z.001", Script::yields(&[("x.txt", "x")]));

    let report = run(root.path(), &codec);

    assert_eq!(status_of(&report, "data.7z.001"), GroupStatus::FailedMissingPart);
    assert!(codec.calls().is_empty());
    assert!(report.groups[0].reason.as_deref().unwrap().contains("data.7z.002"));
    assert!(root.path().join("data.7z.003").exists());
}

#[test]
fn test_spanned_zip_with_password_file() {
    let root = TempDir::new().unwrap();
    let head = touch(root.path(), "set.zip");
    let tail = touch(root.path(), "set.z01");
    let book_path = root.path().join("passwords.txt");
    fs::write(&book_path, "nope\nsecret\n").unwrap();
    let codec = FakeCodec::new().script("set.zip", Script::locked("secret", &[("report.pdf", "pdf")]));

    let mut book = PasswordBook::load(&[book_path.clone()]).unwrap();
    let report = run_with(root.path(), &test_config(), &codec, &mut book);

    assert_eq!(status_of(&report, "set.zip"), GroupStatus::Succeeded);
    assert!(!head.exists());
    assert!(!tail.exists());
    assert!(book_path.exists());
    assert_eq!(fs::read(root.path().join("unzipped/report.pdf")).unwrap(), b"pdf");
    assert_eq!(report.exit_code(), 0);
    assert!(no_staging_left(&root.path().join("unzipped")));
}

#[test]
fn test_nested_parts_stay_out_of_output() {
    let root = TempDir::new().unwrap();
    touch(root.path(), "outer.7z");
    let codec = FakeCodec::new()
        .script(
            "outer.7z",
            Script::yields(&[("inner.rar", "head"), ("inner.part2.rar", "tail")]),
        )
        .script("inner.rar", Script::yields(&[("movie.mkv", "frames")]));

    let report = run(root.path(), &codec);

    let output = root.path().join("unzipped");
    assert_eq!(status_of(&report, "outer.7z"), GroupStatus::Succeeded);
    assert_eq!(status_of(&report, "inner.rar"), GroupStatus::Succeeded);
    assert_eq!(fs::read(output.join("movie.mkv")).unwrap(), b"frames");
    let names = all_names(&output);
    assert!(!names.iter().any(|n| n.starts_with("inner")), "{names:?}");
    assert!(!root.path().join("outer.7z").exists());
}

#[test]
fn test_non_archives_untouched() {
    let root = TempDir::new().unwrap();
    let movie = root.path().join("movie.mp4");
    fs::write(&movie, b"\x00\x00\x00\x18ftypmp42").unwrap();
    let episode = root.path().join("episode.001");
    fs::write(&episode, b"just some text").unwrap();

    let report = run(root.path(), &FakeCodec::new());

    assert!(movie.exists());
    assert!(episode.exists());
    assert_eq!(report.groups.len(), 1);
    assert!(report.groups[0].passthrough);
    assert_eq!(report.groups[0].status, GroupStatus::Succeeded);
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_working_password_recorded_once() {
    let root = TempDir::new().unwrap();
    touch(root.path(), "archive.rar.part1.rar");
    touch(root.path(), "archive.rar.part2.rar");
    touch(root.path(), "second.7z");
    let codec = FakeCodec::new()
        .script("archive.rar.part1.rar", Script::locked("gamma", &[("doc.txt", "d")]))
        .script("second.7z", Script::locked("gamma", &[("pic.png", "p")]));

    let mut source = RecordingSource::new(&["alpha", "beta", "gamma"]);
    let report = run_with(root.path(), &test_config(), &codec, &mut source);

    assert_eq!(source.recorded, vec!["gamma".to_string()]);
    assert_eq!(status_of(&report, "archive.rar.part1.rar"), GroupStatus::Succeeded);

    let tried: Vec<Option<String>> = codec
        .calls()
        .into_iter()
        .filter(|(name, _)| name == "archive.rar.part1.rar")
        .map(|(_, password)| password)
        .collect();
    assert_eq!(
        tried,
        vec![
            None,
            Some("alpha".to_string()),
            Some("beta".to_string()),
            Some("gamma".to_string())
        ]
    );
}

#[test]
fn test_exhausted_passwords_fail_without_deleting() {
    let root = TempDir::new().unwrap();
    let locked = touch(root.path(), "locked.7z");
    let codec = FakeCodec::new().script("locked.7z", Script::locked("unknown", &[("a", "a")]));

    let mut source = RecordingSource::new(&["one", "two"]);
    let report = run_with(root.path(), &test_config(), &codec, &mut source);

    assert_eq!(status_of(&report, "locked.7z"), GroupStatus::FailedPassword);
    assert_eq!(report.groups[0].attempts.len(), 3);
    assert!(locked.exists());
    assert!(source.recorded.is_empty());
}

#[test]
fn test_container_delivers_missing_part_to_waiting_set() {
    let root = TempDir::new().unwrap();
    touch(root.path(), "big.part1.rar");
    touch(root.path(), "big.part3.rar");
    touch(root.path(), "carrier.7z");
    let codec = FakeCodec::new()
        .script(
            "carrier.7z",
            Script::yields(&[("stuff/big.part2.rar", "p2"), ("notes.txt", "n")]),
        )
        .script("big.part1.rar", Script::yields(&[("film.mkv", "f")]));

    let report = run(root.path(), &codec);

    let output = root.path().join("unzipped");
    assert_eq!(report.groups[0].name, "carrier.7z");
    assert_eq!(status_of(&report, "big.part1.rar"), GroupStatus::Succeeded);
    assert!(output.join("notes.txt").exists());
    assert!(output.join("film.mkv").exists());
    assert!(!all_names(&output).iter().any(|n| n.starts_with("big")));
    for name in ["big.part1.rar", "big.part2.rar", "big.part3.rar", "carrier.7z"] {
        assert!(!root.path().join(name).exists(), "{name} should be consumed");
    }
}

#[test]
fn test_ownerless_part_goes_to_holding_area() {
    let root = TempDir::new().unwrap();
    touch(root.path(), "bundle.7z");
    let codec = FakeCodec::new().script(
        "bundle.7z",
        Script::yields(&[("lost.r00", "r"), ("readme.txt", "t")]),
    );

    let report = run(root.path(), &codec);

    let output = root.path().join("unzipped");
    let held = output.join(".unravel-holding/lost/lost.r00");
    assert!(held.exists());
    assert_eq!(report.held, vec![held]);
    assert!(output.join("readme.txt").exists());
    let delivered = collect_files(&[output.clone()], &WalkOptions::default());
    assert_eq!(delivered, vec![output.join("readme.txt")]);
}

#[test]
fn test_failed_nested_archive_keeps_sources() {
    let root = TempDir::new().unwrap();
    let outer = touch(root.path(), "outer.7z");
    let codec = FakeCodec::new()
        .script(
            "outer.7z",
            Script::yields(&[("inner/broken.7z", "?"), ("cover.jpg", "c")]),
        )
        .script("broken.7z", Script::fails("ERROR: Data Error : broken.7z"));

    let report = run(root.path(), &codec);

    let output = root.path().join("unzipped");
    assert_eq!(status_of(&report, "broken.7z"), GroupStatus::FailedCorrupt);
    assert!(outer.exists());
    assert_eq!(report.exit_code(), 1);
    assert!(output.join("inner/broken.7z").exists());
    assert!(output.join("cover.jpg").exists());
    assert!(no_staging_left(&output));
}

#[test]
fn test_nesting_limit() {
    let root = TempDir::new().unwrap();
    let top = touch(root.path(), "a.7z");
    let codec = FakeCodec::new()
        .script("a.7z", Script::yields(&[("b.7z", "b")]))
        .script("b.7z", Script::yields(&[("c.7z", "c")]))
        .script("c.7z", Script::yields(&[("deep.txt", "d")]));
    let config = EngineConfig {
        max_depth: 1,
        ..test_config()
    };

    let report = run_with(root.path(), &config, &codec, &mut RecordingSource::new(&[]));

    assert_eq!(status_of(&report, "c.7z"), GroupStatus::FailedTooDeep);
    assert!(root.path().join("unzipped/c.7z").exists());
    assert!(top.exists());
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn test_cloaked_archive_uncloaked_and_extracted() {
    let root = TempDir::new().unwrap();
    touch(root.path(), "photos.7z删");
    let codec = FakeCodec::new().script("photos.7z", Script::yields(&[("p.jpg", "j")]));

    let report = run(root.path(), &codec);

    assert_eq!(report.renames.len(), 1);
    assert_eq!(status_of(&report, "photos.7z"), GroupStatus::Succeeded);
    assert!(root.path().join("unzipped/p.jpg").exists());
    assert!(!root.path().join("photos.7z删").exists());
}

#[test]
fn test_dry_run_changes_nothing_and_repeats() {
    let root = TempDir::new().unwrap();
    let cloaked = touch(root.path(), "11111.7z删除.001");
    touch(root.path(), "11111.7z.002");
    touch(root.path(), "movie.part1.rar");
    let codec = FakeCodec::new();
    let config = EngineConfig {
        dry_run: true,
        ..test_config()
    };

    let first = run_with(root.path(), &config, &codec, &mut RecordingSource::new(&[]));
    let second = run_with(root.path(), &config, &codec, &mut RecordingSource::new(&[]));

    let names = |r: &RunReport| r.groups.iter().map(|g| g.name.clone()).collect::<Vec<_>>();
    assert_eq!(names(&first), names(&second));
    assert_eq!(names(&first), vec!["11111.7z.001".to_string(), "movie.part1.rar".to_string()]);
    assert!(cloaked.exists());
    assert!(codec.calls().is_empty());
    assert!(!root.path().join("unzipped").exists());
}

#[test]
fn test_cancel_leaves_everything_pending() {
    let root = TempDir::new().unwrap();
    let a = touch(root.path(), "a.7z");
    let b = touch(root.path(), "b.7z");
    let codec = FakeCodec::new()
        .script("a.7z", Script::yields(&[("a.txt", "a")]))
        .script("b.7z", Script::yields(&[("b.txt", "b")]));
    let config = test_config();
    let normalizer = CloakNormalizer::builtin().unwrap();
    let mut source = RecordingSource::new(&[]);

    let report = Engine::new(&config, &codec, &normalizer, &mut source)
        .with_progress(Arc::new(|_: &str, _: u64, _: Option<u64>| false))
        .run(&[root.path().to_path_buf()]);

    assert!(report.cancelled);
    assert_eq!(report.exit_code(), 130);
    assert!(report.groups.iter().all(|g| g.status == GroupStatus::Pending));
    assert!(a.exists());
    assert!(b.exists());
    assert!(codec.calls().is_empty());
    assert!(no_staging_left(&root.path().join("unzipped")));
}

#[test]
fn test_keywords_in_file_names_do_not_decide_outcome() {
    let root = TempDir::new().unwrap();
    let tool = touch(root.path(), "password_reset_tool.exe");
    let save = touch(root.path(), "corrupted_save.dat");
    let photo = touch(root.path(), "damaged wrong password.bin");
    let vault = touch(root.path(), "password vault.7z");
    let codec = FakeCodec::new().script("password vault.7z", Script::locked("k", &[("inside.txt", "x")]));
    let mut source = RecordingSource::new(&["a", "k"]);

    let report = run_with(root.path(), &test_config(), &codec, &mut source);

    for name in ["password_reset_tool.exe", "corrupted_save.dat", "damaged wrong password.bin"] {
        let group = report.groups.iter().find(|g| g.name == name).unwrap();
        assert_eq!(group.status, GroupStatus::Succeeded, "{}", name);
        assert!(group.passthrough, "{}", name);
        assert_eq!(group.attempts, vec![AttemptOutcome::Unsupported], "{}", name);
    }
    assert!(tool.exists());
    assert!(save.exists());
    assert!(photo.exists());

    let vault_report = report.groups.iter().find(|g| g.name == "password vault.7z").unwrap();
    assert_eq!(vault_report.status, GroupStatus::Succeeded);
    assert_eq!(
        vault_report.attempts,
        vec![AttemptOutcome::WrongPassword, AttemptOutcome::WrongPassword, AttemptOutcome::Ok]
    );
    assert!(!vault.exists());
    assert_eq!(source.recorded, vec!["k".to_string()]);
    assert_eq!(report.exit_code(), 0);
}
