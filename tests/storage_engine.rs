//! Storage engine integration tests.
//!
//! Sandbox containment, symlink policy, pruning and listing behavior against
//! real temporary directories.

use std::fs::{self, File};
use std::io::Cursor;
use std::path::Path;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use fsbucket::{BucketError, ConflictPolicy, StorageEngine, StorageRoot};
use tempfile::TempDir;

/// Create an engine over a fresh temporary root.
fn setup(follow_symlinks: bool) -> (TempDir, StorageEngine) {
    let temp_dir = TempDir::new().unwrap();
    let root = fs::canonicalize(temp_dir.path()).unwrap();
    let engine = StorageEngine::new(StorageRoot::new(root, follow_symlinks));
    (temp_dir, engine)
}

/// Write a file and backdate its modification time.
fn write_aged(path: &Path, content: &[u8], age: Duration) {
    fs::write(path, content).unwrap();
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() - age)
        .unwrap();
}

fn hours_ago(hours: u64) -> DateTime<Utc> {
    (SystemTime::now() - Duration::from_secs(hours * 3600)).into()
}

#[test]
fn test_traversal_never_escapes_root() {
    let (temp, engine) = setup(false);
    let root = engine.root().path().to_path_buf();
    fs::create_dir(temp.path().join("a")).unwrap();

    for raw in ["../etc", "a/../../etc", "..\\..\\windows", "/../x", "a/b/../../.."] {
        let result = engine.resolve(raw);
        assert!(
            matches!(result, Err(BucketError::InvalidPath(_))),
            "{raw:?} should be rejected, got {result:?}"
        );
    }

    for raw in ["", "a", "a/../b", "/abs/looking", "./x/./y", "a\\b"] {
        let resolved = engine.resolve(raw).unwrap();
        assert!(resolved.starts_with(&root), "{raw:?} resolved outside root");
    }
}

#[test]
fn test_null_byte_rejected_everywhere() {
    let (_temp, engine) = setup(false);

    assert!(matches!(
        engine.list("a\0b"),
        Err(BucketError::InvalidPath(_))
    ));
    assert!(matches!(
        engine.create_folder("", "bad\0name"),
        Err(BucketError::InvalidName(_))
    ));
    assert!(matches!(
        engine.upload_file("", &mut Cursor::new(b"x"), "x\0.txt", ConflictPolicy::Overwrite),
        Err(BucketError::InvalidName(_))
    ));
}

#[test]
fn test_listing_is_fresh_and_hides_staging_files() {
    let (temp, engine) = setup(false);

    let listing = engine.list("").unwrap();
    assert!(listing.path.is_root());
    assert!(listing.directories.is_empty());
    assert!(listing.files.is_empty());

    fs::write(temp.path().join(".fsbucket-upload-leftover"), b"partial").unwrap();
    fs::write(temp.path().join("b.txt"), b"bb").unwrap();
    fs::write(temp.path().join("a.txt"), b"a").unwrap();

    let listing = engine.list("").unwrap();
    let names: Vec<_> = listing.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
    assert_eq!(listing.files[1].size_bytes, 2);
    assert_eq!(listing.files[1].path.as_str(), "b.txt");
}

#[test]
fn test_list_sorts_bytewise() {
    let (temp, engine) = setup(false);
    for name in ["b", "Z", "a", "_"] {
        fs::create_dir(temp.path().join(name)).unwrap();
    }

    let listing = engine.list("").unwrap();
    let names: Vec<_> = listing.directories.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Z", "_", "a", "b"]);
}

#[test]
fn test_list_file_is_not_found() {
    let (temp, engine) = setup(false);
    fs::write(temp.path().join("file.txt"), b"x").unwrap();

    assert!(matches!(
        engine.list("file.txt"),
        Err(BucketError::NotFound(_))
    ));
}

#[test]
fn test_prune_deletes_only_old_files() {
    let (temp, engine) = setup(false);
    let logs = temp.path().join("logs");
    fs::create_dir_all(logs.join("nested")).unwrap();

    write_aged(&logs.join("old.log"), b"old", Duration::from_secs(48 * 3600));
    write_aged(&logs.join("nested/old.log"), b"old", Duration::from_secs(48 * 3600));
    write_aged(&logs.join("new.log"), b"new", Duration::from_secs(60));

    let deleted = engine.prune_older_than("logs", hours_ago(24)).unwrap();
    let deleted: Vec<_> = deleted.iter().map(|p| p.as_str()).collect();

    assert_eq!(deleted, vec!["logs/nested/old.log", "logs/old.log"]);
    assert!(logs.join("new.log").exists());
    assert!(!logs.join("old.log").exists());
    // Folders survive even when emptied.
    assert!(logs.join("nested").is_dir());
}

#[test]
fn test_prune_nothing_old_is_noop() {
    let (temp, engine) = setup(false);
    fs::write(temp.path().join("fresh.txt"), b"x").unwrap();

    let deleted = engine.prune_older_than("", hours_ago(1)).unwrap();
    assert!(deleted.is_empty());
    assert!(temp.path().join("fresh.txt").exists());
}

#[test]
fn test_prune_missing_folder() {
    let (_temp, engine) = setup(false);

    assert!(matches!(
        engine.prune_older_than("nope", hours_ago(1)),
        Err(BucketError::NotFound(_))
    ));
}

#[test]
fn test_prune_reclaims_orphaned_staging_files() {
    let (temp, engine) = setup(false);
    let orphan = temp.path().join(".fsbucket-upload-deadbeef");
    let recent = temp.path().join(".fsbucket-upload-cafebabe");
    write_aged(&orphan, b"partial", Duration::from_secs(48 * 3600));
    write_aged(&recent, b"partial", Duration::from_secs(60));
    fs::write(temp.path().join("keep.txt"), b"x").unwrap();

    let deleted = engine.prune_older_than("", hours_ago(24)).unwrap();

    // Reclaimed silently: staging files are not bucket objects.
    assert!(deleted.is_empty());
    assert!(!orphan.exists());
    assert!(recent.exists());
    assert_eq!(engine.list("").unwrap().files.len(), 1);
}

#[test]
fn test_delete_folder_then_list_not_found() {
    let (_temp, engine) = setup(false);
    engine.create_folder("", "docs").unwrap();
    engine
        .upload_file("docs", &mut Cursor::new(b"x"), "a.txt", ConflictPolicy::Overwrite)
        .unwrap();

    let deleted = engine.delete_folder("docs").unwrap();
    assert_eq!(deleted.as_str(), "docs");
    assert!(matches!(engine.list("docs"), Err(BucketError::NotFound(_))));
}

#[test]
fn test_rename_then_list() {
    let (_temp, engine) = setup(false);
    engine.create_folder("", "old").unwrap();
    engine
        .upload_file("old", &mut Cursor::new(b"x"), "keep.txt", ConflictPolicy::Overwrite)
        .unwrap();

    let entry = engine.rename_folder("old", "new").unwrap();
    assert_eq!(entry.path.as_str(), "new");

    let listing = engine.list("new").unwrap();
    assert_eq!(listing.files.len(), 1);
    assert_eq!(listing.files[0].path.as_str(), "new/keep.txt");
    assert!(matches!(engine.list("old"), Err(BucketError::NotFound(_))));
}

#[cfg(unix)]
mod symlinks {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn test_symlink_in_middle_of_path_rejected() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), b"secret").unwrap();

        let (temp, engine) = setup(false);
        fs::create_dir(temp.path().join("a")).unwrap();
        symlink(outside.path(), temp.path().join("a/escape")).unwrap();

        let err = engine.resolve("a/escape/secret.txt").unwrap_err();
        match err {
            BucketError::SymlinkRejected(link) => assert_eq!(link, "a/escape"),
            other => panic!("expected SymlinkRejected, got {other:?}"),
        }

        assert!(matches!(
            engine.list("a/escape"),
            Err(BucketError::SymlinkRejected(_))
        ));
        assert!(matches!(
            engine.upload_file(
                "a/escape",
                &mut Cursor::new(b"pwned"),
                "x.txt",
                ConflictPolicy::Overwrite
            ),
            Err(BucketError::SymlinkRejected(_))
        ));
        assert!(!outside.path().join("x.txt").exists());
    }

    #[test]
    fn test_symlinks_skipped_in_listing() {
        let (temp, engine) = setup(false);
        fs::write(temp.path().join("real.txt"), b"x").unwrap();
        fs::create_dir(temp.path().join("dir")).unwrap();
        symlink(temp.path().join("real.txt"), temp.path().join("link.txt")).unwrap();
        symlink(temp.path().join("dir"), temp.path().join("linkdir")).unwrap();

        let listing = engine.list("").unwrap();
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].name, "real.txt");
        assert_eq!(listing.directories.len(), 1);
        assert_eq!(listing.directories[0].name, "dir");
    }

    #[test]
    fn test_symlinks_followed_when_allowed() {
        let (temp, engine) = setup(true);
        fs::create_dir(temp.path().join("dir")).unwrap();
        fs::write(temp.path().join("dir/inner.txt"), b"x").unwrap();
        symlink(temp.path().join("dir"), temp.path().join("linkdir")).unwrap();
        symlink(temp.path().join("missing"), temp.path().join("dangling")).unwrap();

        let listing = engine.list("").unwrap();
        let names: Vec<_> = listing.directories.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["dir", "linkdir"]);
        assert!(listing.files.is_empty());

        let inner = engine.list("linkdir").unwrap();
        assert_eq!(inner.files[0].path.as_str(), "linkdir/inner.txt");
    }

    #[test]
    fn test_delete_linked_folder_keeps_target() {
        let (temp, engine) = setup(true);
        fs::create_dir(temp.path().join("dir")).unwrap();
        fs::write(temp.path().join("dir/keep.txt"), b"x").unwrap();
        symlink(temp.path().join("dir"), temp.path().join("linkdir")).unwrap();

        engine.delete_folder("linkdir").unwrap();

        assert!(!temp.path().join("linkdir").exists());
        assert!(temp.path().join("dir/keep.txt").exists());
    }

    #[test]
    fn test_prune_does_not_follow_linked_folders() {
        let outside = TempDir::new().unwrap();
        write_aged(
            &outside.path().join("old.txt"),
            b"old",
            Duration::from_secs(48 * 3600),
        );

        let (temp, engine) = setup(true);
        symlink(outside.path(), temp.path().join("linked")).unwrap();

        let deleted = engine.prune_older_than("", hours_ago(24)).unwrap();
        assert!(deleted.is_empty());
        assert!(outside.path().join("old.txt").exists());
    }

    #[test]
    fn test_serving_rejects_symlinked_file() {
        let (temp, engine) = setup(false);
        fs::write(temp.path().join("real.txt"), b"x").unwrap();
        symlink(temp.path().join("real.txt"), temp.path().join("alias.txt")).unwrap();

        assert!(engine.resolve_for_serving("real.txt").is_ok());
        assert!(matches!(
            engine.resolve_for_serving("alias.txt"),
            Err(BucketError::SymlinkRejected(_))
        ));
    }

    #[test]
    fn test_prune_skips_symlinks_when_disallowed() {
        let (temp, engine) = setup(false);
        write_aged(
            &temp.path().join("real.txt"),
            b"old",
            Duration::from_secs(48 * 3600),
        );
        symlink(temp.path().join("real.txt"), temp.path().join("alias.txt")).unwrap();

        let deleted = engine.prune_older_than("", hours_ago(24)).unwrap();
        let deleted: Vec<_> = deleted.iter().map(|p| p.as_str()).collect();

        assert_eq!(deleted, vec!["real.txt"]);
        assert!(fs::symlink_metadata(temp.path().join("alias.txt")).is_ok());
    }

    #[test]
    fn test_prune_removes_only_link_of_old_linked_file() {
        let outside = TempDir::new().unwrap();
        let target = outside.path().join("old.txt");
        write_aged(&target, b"old", Duration::from_secs(48 * 3600));

        let (temp, engine) = setup(true);
        symlink(&target, temp.path().join("alias.txt")).unwrap();

        let deleted = engine.prune_older_than("", hours_ago(24)).unwrap();
        let deleted: Vec<_> = deleted.iter().map(|p| p.as_str()).collect();

        assert_eq!(deleted, vec!["alias.txt"]);
        assert!(fs::symlink_metadata(temp.path().join("alias.txt")).is_err());
        assert!(target.exists());
    }
}

#[cfg(target_os = "linux")]
mod non_utf8_names {
    use super::*;
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    #[test]
    fn test_prune_reaches_non_utf8_entries() {
        let (temp, engine) = setup(false);
        let age = Duration::from_secs(48 * 3600);

        let bad_dir = temp.path().join(OsStr::from_bytes(b"bad\xffdir"));
        fs::create_dir(&bad_dir).unwrap();
        write_aged(&bad_dir.join("old.log"), b"old", age);
        let bad_file = temp.path().join(OsStr::from_bytes(b"old\xfe.log"));
        write_aged(&bad_file, b"old", age);

        let deleted = engine.prune_older_than("", hours_ago(24)).unwrap();
        let deleted: Vec<_> = deleted.iter().map(|p| p.as_str()).collect();

        assert_eq!(deleted, vec!["bad\u{FFFD}dir/old.log", "old\u{FFFD}.log"]);
        assert!(!bad_dir.join("old.log").exists());
        assert!(!bad_file.exists());
        assert!(bad_dir.is_dir());
    }

    #[test]
    fn test_list_skips_non_utf8_entries() {
        let (temp, engine) = setup(false);
        fs::write(temp.path().join(OsStr::from_bytes(b"x\xff")), b"x").unwrap();
        fs::write(temp.path().join("ok.txt"), b"x").unwrap();

        let listing = engine.list("").unwrap();
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].name, "ok.txt");
    }
}
