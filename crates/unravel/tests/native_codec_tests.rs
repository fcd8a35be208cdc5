use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use unravel::{
    AttemptOutcome, CloakNormalizer, Codec, Engine, EngineConfig, GroupStatus, KeywordTable,
    NativeCodec, PasswordBook, RemovalMode, RunReport,
};
use zip::write::{SimpleFileOptions, ZipWriter};

/// Helper to build a ZIP archive in memory
fn zip_bytes(entries: &[(&str, &[u8])], password: Option<&str>) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = match password {
        Some(pw) => SimpleFileOptions::default().with_aes_encryption(zip::AesMode::Aes256, pw),
        None => SimpleFileOptions::default(),
    };
    for (name, data) in entries {
        zip.start_file(*name, options.clone()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Helper to create a TAR.GZ archive
fn create_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    let mut tar = tar::Builder::new(encoder);
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        tar.append_data(&mut header, name, *data).unwrap();
    }
    tar.into_inner().unwrap().finish().unwrap();
}

fn run(root: &Path, passwords: &mut PasswordBook) -> RunReport {
    let config = EngineConfig {
        removal: RemovalMode::Permanent,
        ..EngineConfig::default()
    };
    let codec = NativeCodec::new(config.extract_options());
    let normalizer = CloakNormalizer::builtin().unwrap();
    Engine::new(&config, &codec, &normalizer, passwords).run(&[root.to_path_buf()])
}

fn output(root: &Path) -> PathBuf {
    root.join("unzipped")
}

#[test]
fn test_aes_zip_unlocked_from_password_book() {
    let root = TempDir::new().unwrap();
    let archive = root.path().join("vault.zip");
    fs::write(&archive, zip_bytes(&[("notes/a.txt", b"alpha")], Some("letmein"))).unwrap();

    let mut book = PasswordBook::with_passwords(["wrong", "letmein"]);
    let report = run(root.path(), &mut book);

    let group = &report.groups[0];
    assert_eq!(group.status, GroupStatus::Succeeded);
    assert_eq!(
        group.attempts,
        vec![
            AttemptOutcome::WrongPassword,
            AttemptOutcome::WrongPassword,
            AttemptOutcome::Ok
        ]
    );
    assert_eq!(fs::read(output(root.path()).join("notes/a.txt")).unwrap(), b"alpha");
    assert!(!archive.exists());
}

#[test]
fn test_aes_zip_without_known_password_is_kept() {
    let root = TempDir::new().unwrap();
    let archive = root.path().join("vault.zip");
    fs::write(&archive, zip_bytes(&[("a.txt", b"alpha")], Some("letmein"))).unwrap();

    let report = run(root.path(), &mut PasswordBook::with_passwords(["guess"]));

    assert_eq!(report.groups[0].status, GroupStatus::FailedPassword);
    assert!(archive.exists());
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn test_nested_zip_fully_unpacked() {
    let root = TempDir::new().unwrap();
    let inner = zip_bytes(&[("hello.txt", b"Hello, World!")], None);
    let outer = zip_bytes(&[("inner.zip", &inner), ("top.txt", b"top")], None);
    let archive = root.path().join("outer.zip");
    fs::write(&archive, outer).unwrap();

    let report = run(root.path(), &mut PasswordBook::new());

    assert_eq!(report.groups.len(), 2);
    assert!(report.groups.iter().all(|g| g.status == GroupStatus::Succeeded));
    let out = output(root.path());
    assert_eq!(fs::read(out.join("hello.txt")).unwrap(), b"Hello, World!");
    assert_eq!(fs::read(out.join("top.txt")).unwrap(), b"top");
    assert!(!out.join("inner.zip").exists());
    assert!(!archive.exists());
}

#[test]
fn test_disguised_tar_gz_detected_by_signature() {
    let root = TempDir::new().unwrap();
    let archive = root.path().join("holiday.jpg");
    create_tar_gz(&archive, &[("pics/one.txt", b"1"), ("pics/two.txt", b"2")]);

    let report = run(root.path(), &mut PasswordBook::new());

    assert_eq!(report.groups[0].status, GroupStatus::Succeeded);
    let out = output(root.path());
    assert_eq!(fs::read(out.join("pics/one.txt")).unwrap(), b"1");
    assert_eq!(fs::read(out.join("pics/two.txt")).unwrap(), b"2");
}

#[test]
fn test_name_collision_gets_numbered() {
    let root = TempDir::new().unwrap();
    fs::write(
        root.path().join("first.zip"),
        zip_bytes(&[("same.txt", b"one")], None),
    )
    .unwrap();
    fs::write(
        root.path().join("second.zip"),
        zip_bytes(&[("same.txt", b"two")], None),
    )
    .unwrap();

    run(root.path(), &mut PasswordBook::new());

    let out = output(root.path());
    assert_eq!(fs::read(out.join("same.txt")).unwrap(), b"one");
    assert_eq!(fs::read(out.join("same (1).txt")).unwrap(), b"two");
}

/// 7z start header whose next header lies beyond the end of the file.
fn truncated_sevenz() -> Vec<u8> {
    let mut bytes = vec![0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, 0x00, 0x04];
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&4096u64.to_le_bytes());
    bytes.extend_from_slice(&64u64.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&[0u8; 100]);
    bytes
}

#[test]
fn test_truncated_first_volume_reports_missing_part() {
    let root = TempDir::new().unwrap();
    let first = root.path().join("data.7z.001");
    fs::write(&first, truncated_sevenz()).unwrap();

    let codec = NativeCodec::default();
    let dest = TempDir::new().unwrap();
    let output = codec.extract(&first, dest.path(), None);
    assert_eq!(
        KeywordTable::default().classify(&output),
        AttemptOutcome::MissingVolume
    );

    let report = run(root.path(), &mut PasswordBook::new());
    assert_eq!(report.groups[0].status, GroupStatus::FailedMissingPart);
    assert!(report.groups[0]
        .reason
        .as_deref()
        .unwrap()
        .contains("data.7z.002"));
    assert!(first.exists());
    assert_ne!(report.exit_code(), 0);
}

#[test]
fn test_listing_matches_contents() {
    let root = TempDir::new().unwrap();
    let archive = root.path().join("list.zip");
    fs::write(
        &archive,
        zip_bytes(&[("dir/a.txt", b"aa"), ("b.txt", b"bbb")], None),
    )
    .unwrap();

    let entries = NativeCodec::default().list_contents(&archive).unwrap();
    let mut names: Vec<_> = entries.iter().map(|e| (e.path.clone(), e.size)).collect();
    names.sort();
    assert_eq!(
        names,
        vec![("b.txt".to_string(), 3), ("dir/a.txt".to_string(), 2)]
    );
    assert!(NativeCodec::default().is_valid_archive(&archive));
}

#[test]
fn test_plain_files_with_alarming_names_pass_through() {
    let root = TempDir::new().unwrap();
    let tool = root.path().join("password_reset_tool.exe");
    let save = root.path().join("corrupted_save.dat");
    fs::write(&tool, b"MZ-less plain bytes, nothing to unpack").unwrap();
    fs::write(&save, b"level=3;hp=12").unwrap();

    let report = run(root.path(), &mut PasswordBook::with_passwords(["a", "b"]));

    assert_eq!(report.groups.len(), 2);
    for group in &report.groups {
        assert_eq!(group.status, GroupStatus::Succeeded, "{}", group.name);
        assert!(group.passthrough, "{}", group.name);
        assert_eq!(group.attempts, vec![AttemptOutcome::Unsupported]);
    }
    assert!(tool.exists());
    assert!(save.exists());
    assert_eq!(report.exit_code(), 0);
}
