use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::{tempdir, TempDir};

use reclaim_core::config::DEFAULT_TOMBSTONE_SUFFIX;
use reclaim_core::execution::{read_ledger, sidecar_path, FileRemover, LedgerRow, Status, TombstoneRecord};
use reclaim_core::{AppConfig, DedupeEngine, Error, SilentReporter};

fn set_mtime(path: &Path, secs_after_epoch: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs_after_epoch))
        .unwrap();
}

/// Create a tree with known duplicates and pinned modification times.
/// Layout:
///   root/
///     folder_a/
///       unique_a.txt     ("unique content a")
///       shared.txt       ("shared content xyz", newest)
///     folder_b/
///       unique_b.txt     ("unique content b")
///       shared.txt       ("shared content xyz", older)  <- deleted, older_modified_date
///     folder_c/
///       large_dup_1.bin  (4KB of 0xAA)
///       large_dup_2.bin  (4KB of 0xAA, same mtime)      <- deleted, alphabetical_tiebreaker
///     empty_1.txt, empty_2.txt                          (empty, never grouped)
fn create_test_tree(root: &Path) {
    let folder_a = root.join("folder_a");
    let folder_b = root.join("folder_b");
    let folder_c = root.join("folder_c");
    fs::create_dir_all(&folder_a).unwrap();
    fs::create_dir_all(&folder_b).unwrap();
    fs::create_dir_all(&folder_c).unwrap();

    fs::write(folder_a.join("unique_a.txt"), "unique content a").unwrap();
    fs::write(folder_b.join("unique_b.txt"), "unique content b").unwrap();

    fs::write(folder_a.join("shared.txt"), "shared content xyz").unwrap();
    fs::write(folder_b.join("shared.txt"), "shared content xyz").unwrap();
    set_mtime(&folder_a.join("shared.txt"), 1_704_412_800);
    set_mtime(&folder_b.join("shared.txt"), 1_704_067_200);

    let large_content = vec![0xAAu8; 4096];
    fs::write(folder_c.join("large_dup_1.bin"), &large_content).unwrap();
    fs::write(folder_c.join("large_dup_2.bin"), &large_content).unwrap();
    set_mtime(&folder_c.join("large_dup_1.bin"), 1_704_067_200);
    set_mtime(&folder_c.join("large_dup_2.bin"), 1_704_067_200);

    fs::write(root.join("empty_1.txt"), "").unwrap();
    fs::write(root.join("empty_2.txt"), "").unwrap();
}

struct Fixture {
    _tmp: TempDir,
    root: PathBuf,
    output_dir: PathBuf,
}

fn fixture() -> Fixture {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("scan_root");
    create_test_tree(&root);
    let root = fs::canonicalize(&root).unwrap();
    let output_dir = tmp.path().join("runs");
    Fixture {
        _tmp: tmp,
        root,
        output_dir,
    }
}

fn config(fixture: &Fixture, dry_run: bool) -> AppConfig {
    AppConfig {
        root_path: fixture.root.to_string_lossy().into_owned(),
        output_dir: fixture.output_dir.to_string_lossy().into_owned(),
        dry_run,
        ..Default::default()
    }
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

/// Ledger row without its timestamp.
fn comparable(row: &LedgerRow) -> (String, String, u64, String, String, Status, String) {
    (
        row.deleted_file.clone(),
        row.kept_file.clone(),
        row.size_bytes,
        row.reason.clone(),
        row.hash.clone(),
        row.status,
        row.message.clone(),
    )
}

#[test]
fn test_full_run_deletes_duplicates() {
    let fx = fixture();
    let engine = DedupeEngine::new(config(&fx, false)).unwrap();
    let outcome = engine.run(&SilentReporter).unwrap();

    assert_eq!(outcome.duplicate_groups, 2);
    assert_eq!(outcome.summary.deleted, 2);
    assert_eq!(outcome.summary.errors, 0);
    assert_eq!(outcome.summary.bytes_reclaimed, 18 + 4096);
    assert!(outcome.summary.is_success());

    // Keepers survive, losers are gone
    assert!(fx.root.join("folder_a/shared.txt").exists());
    assert!(!fx.root.join("folder_b/shared.txt").exists());
    assert!(fx.root.join("folder_c/large_dup_1.bin").exists());
    assert!(!fx.root.join("folder_c/large_dup_2.bin").exists());
    assert!(fx.root.join("empty_1.txt").exists());
    assert!(fx.root.join("empty_2.txt").exists());

    let rows = read_ledger(&outcome.ledger_path).unwrap();
    assert_eq!(rows.len(), 2);

    let shared = rows
        .iter()
        .find(|r| r.deleted_file == path_str(&fx.root.join("folder_b/shared.txt")))
        .unwrap();
    assert_eq!(shared.kept_file, path_str(&fx.root.join("folder_a/shared.txt")));
    assert_eq!(shared.reason, "older_modified_date");
    assert_eq!(shared.status, Status::Ok);

    let large = rows
        .iter()
        .find(|r| r.deleted_file == path_str(&fx.root.join("folder_c/large_dup_2.bin")))
        .unwrap();
    assert_eq!(large.reason, "alphabetical_tiebreaker");
    assert!(large.hash.starts_with("4096-"));

    // Tombstone left beside the deleted file
    let sidecar = sidecar_path(&fx.root.join("folder_b/shared.txt"), DEFAULT_TOMBSTONE_SUFFIX);
    let tombstone = TombstoneRecord::parse(&fs::read_to_string(sidecar).unwrap()).unwrap();
    assert_eq!(tombstone.kept_path, fx.root.join("folder_a/shared.txt"));
    assert_eq!(tombstone.size_bytes, 18);
    assert_eq!(tombstone.reason, "older_modified_date");

    let summary = fs::read_to_string(&outcome.summary_path).unwrap();
    assert!(summary.contains("files deleted: 2"));
    assert!(summary.contains("dry run: false"));
}

#[test]
fn test_dry_run_matches_real_run_and_keeps_files() {
    let fx = fixture();

    let dry = DedupeEngine::new(config(&fx, true))
        .unwrap()
        .run(&SilentReporter)
        .unwrap();
    assert!(fx.root.join("folder_b/shared.txt").exists());
    assert!(fx.root.join("folder_c/large_dup_2.bin").exists());
    let sidecar = sidecar_path(&fx.root.join("folder_b/shared.txt"), DEFAULT_TOMBSTONE_SUFFIX);
    let tombstone = TombstoneRecord::parse(&fs::read_to_string(&sidecar).unwrap()).unwrap();
    assert_eq!(tombstone.kept_path, fx.root.join("folder_a/shared.txt"));

    let real = DedupeEngine::new(config(&fx, false))
        .unwrap()
        .run(&SilentReporter)
        .unwrap();
    assert_ne!(dry.run_dir, real.run_dir);

    let dry_rows: Vec<_> = read_ledger(&dry.ledger_path).unwrap().iter().map(comparable).collect();
    let real_rows: Vec<_> = read_ledger(&real.ledger_path).unwrap().iter().map(comparable).collect();
    assert_eq!(dry_rows, real_rows);
    assert_eq!(dry.summary, real.summary);
}

#[test]
fn test_second_run_deletes_nothing() {
    let fx = fixture();
    let engine = DedupeEngine::new(config(&fx, false)).unwrap();

    let first = engine.run(&SilentReporter).unwrap();
    assert_eq!(first.summary.deleted, 2);

    let second = engine.run(&SilentReporter).unwrap();
    assert_eq!(second.duplicate_groups, 0);
    assert_eq!(second.summary.deleted, 0);
    assert!(second.rows.is_empty());
}

#[test]
fn test_run_artifacts_inside_root_are_not_candidates() {
    let fx = fixture();
    let mut cfg = config(&fx, false);
    cfg.output_dir = fx.root.join(".reclaim").to_string_lossy().into_owned();
    let engine = DedupeEngine::new(cfg).unwrap();

    let first = engine.run(&SilentReporter).unwrap();
    assert!(first.run_dir.starts_with(&fx.root));
    let second = engine.run(&SilentReporter).unwrap();

    assert_eq!(second.summary.deleted, 0);
    assert!(first.summary_path.exists());
    assert!(first.ledger_path.exists());
}

/// Fails for one file name, deletes everything else.
struct FailOn(&'static str);

impl FileRemover for FailOn {
    fn remove(&self, path: &Path) -> io::Result<()> {
        if path.file_name().is_some_and(|n| n == self.0) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "injected failure"));
        }
        fs::remove_file(path)
    }
}

#[test]
fn test_one_failed_delete_does_not_stop_the_run() {
    let fx = fixture();
    let group_dir = fx.root.join("quad");
    fs::create_dir_all(&group_dir).unwrap();
    for name in ["a_keep.dat", "b_copy.dat", "c_copy.dat", "d_copy.dat"] {
        let path = group_dir.join(name);
        fs::write(&path, "four identical copies").unwrap();
        set_mtime(&path, 1_700_000_000);
    }

    let engine = DedupeEngine::new(config(&fx, false))
        .unwrap()
        .with_remover(Arc::new(FailOn("c_copy.dat")));
    let outcome = engine.run(&SilentReporter).unwrap();

    let quad_rows: Vec<_> = outcome
        .rows
        .iter()
        .filter(|r| r.kept_file == path_str(&group_dir.join("a_keep.dat")))
        .collect();
    assert_eq!(quad_rows.len(), 3);
    assert_eq!(quad_rows.iter().filter(|r| r.status == Status::Ok).count(), 2);

    let failed = quad_rows.iter().find(|r| r.status == Status::Error).unwrap();
    assert!(failed.deleted_file.ends_with("c_copy.dat"));
    assert!(failed.message.contains("injected failure"));

    // Tombstone written, file survives
    let c_copy = group_dir.join("c_copy.dat");
    assert!(c_copy.exists());
    assert!(sidecar_path(&c_copy, DEFAULT_TOMBSTONE_SUFFIX).exists());
    assert!(!group_dir.join("b_copy.dat").exists());
    assert!(!group_dir.join("d_copy.dat").exists());

    // Unrelated groups still processed
    assert!(!fx.root.join("folder_b/shared.txt").exists());
    assert_eq!(outcome.summary.errors, 1);
    assert_eq!(outcome.summary.deleted, 4);
    assert!(!outcome.summary.is_success());
}

#[test]
fn test_exclude_patterns_protect_files() {
    let fx = fixture();
    let mut cfg = config(&fx, false);
    cfg.exclude_patterns = vec!["folder_c/**".to_string()];
    let outcome = DedupeEngine::new(cfg).unwrap().run(&SilentReporter).unwrap();

    assert_eq!(outcome.duplicate_groups, 1);
    assert!(fx.root.join("folder_c/large_dup_1.bin").exists());
    assert!(fx.root.join("folder_c/large_dup_2.bin").exists());
    assert!(!fx.root.join("folder_b/shared.txt").exists());
}

#[test]
fn test_include_patterns_limit_candidates() {
    let fx = fixture();
    let mut cfg = config(&fx, false);
    cfg.include_patterns = vec!["*.bin".to_string()];
    let outcome = DedupeEngine::new(cfg).unwrap().run(&SilentReporter).unwrap();

    assert_eq!(outcome.duplicate_groups, 1);
    assert!(fx.root.join("folder_b/shared.txt").exists());
    assert!(!fx.root.join("folder_c/large_dup_2.bin").exists());
}

#[test]
fn test_missing_root_is_a_setup_error() {
    let tmp = tempdir().unwrap();
    let cfg = AppConfig {
        root_path: tmp.path().join("does-not-exist").to_string_lossy().into_owned(),
        output_dir: tmp.path().join("runs").to_string_lossy().into_owned(),
        ..Default::default()
    };
    let result = DedupeEngine::new(cfg).unwrap().run(&SilentReporter);
    assert!(matches!(result, Err(Error::RootNotFound(_))));
    assert!(!tmp.path().join("runs").exists());
}

#[test]
fn test_empty_root_produces_empty_ledger() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("empty");
    fs::create_dir_all(&root).unwrap();
    let cfg = AppConfig {
        root_path: root.to_string_lossy().into_owned(),
        output_dir: tmp.path().join("runs").to_string_lossy().into_owned(),
        dry_run: false,
        ..Default::default()
    };

    let outcome = DedupeEngine::new(cfg).unwrap().run(&SilentReporter).unwrap();
    assert_eq!(outcome.files_enumerated, 0);
    assert!(read_ledger(&outcome.ledger_path).unwrap().is_empty());
    assert!(outcome.summary_path.exists());
}

#[cfg(unix)]
#[test]
fn test_external_grouper_cannot_widen_scope() {
    use reclaim_core::config::{GrouperConfig, GrouperKind};

    let fx = fixture();
    let outsider = fx.root.parent().unwrap().join("outsider.txt");
    fs::write(&outsider, "shared content xyz").unwrap();

    let script = format!(
        "printf 'hash,path\\nh1,%s\\nh1,%s\\nh1,%s\\n' '{}' '{}' '{}' > \"$2\"",
        outsider.display(),
        fx.root.join("folder_a/shared.txt").display(),
        fx.root.join("folder_b/shared.txt").display(),
    );
    let mut cfg = config(&fx, false);
    cfg.grouper = GrouperConfig {
        kind: GrouperKind::External,
        command: Some("sh".to_string()),
        args: vec![
            "-c".to_string(),
            script,
            "sh".to_string(),
            "{list}".to_string(),
            "{output}".to_string(),
        ],
        timeout_secs: Some(30),
    };

    let outcome = DedupeEngine::new(cfg).unwrap().run(&SilentReporter).unwrap();
    assert_eq!(outcome.duplicate_groups, 1);
    assert_eq!(outcome.summary.deleted, 1);
    assert!(outsider.exists());
    assert!(fx.root.join("folder_a/shared.txt").exists());
    assert!(!fx.root.join("folder_b/shared.txt").exists());

    let raw = outcome.grouping_output.unwrap();
    assert!(raw.starts_with(&outcome.run_dir));
    assert!(outcome.run_dir.join("candidates.txt").exists());
}
