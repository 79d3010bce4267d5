//! Integration tests for the dispatcher and the mounted-session protocol.

use tempfile::TempDir;

use spaghettifs::error::Error;
use spaghettifs::filesystem::{errno, MOUNTED_BRANCH, WRITE_BUFFER_SIZE};
use spaghettifs::session::DEFAULT_BRANCH;
use spaghettifs::{MountedFs, Repository, Session, SpaghettiFs};

fn scratch_fs(temp: &TempDir) -> (std::path::PathBuf, SpaghettiFs) {
    let repo_path = temp.path().join("repo.sfs");
    let sess = Session::create(&repo_path).unwrap();
    (repo_path, SpaghettiFs::new(sess))
}

// FS-001: create, write, read, getattr
#[test]
fn test_file_operations() {
    let temp = TempDir::new().unwrap();
    let (_repo_path, fs) = scratch_fs(&temp);

    fs.create("/a.txt", 0o644).unwrap();
    fs.write("/a.txt", b"text file \"a\"\n", 0).unwrap();

    assert_eq!(fs.read("/a.txt", 1024, 0).unwrap(), b"text file \"a\"\n");

    let attr = fs.getattr("/a.txt").unwrap();
    assert_eq!(attr.size, 14);
    assert_eq!(attr.nlink, 1);
    assert_eq!(attr.mode & libc::S_IFMT as u32, libc::S_IFREG as u32);

    let attr = fs.getattr("/").unwrap();
    assert_eq!(attr.mode & libc::S_IFMT as u32, libc::S_IFDIR as u32);
    assert_eq!(attr.nlink, 2);
}

// FS-002: readdir includes dot entries
#[test]
fn test_readdir() {
    let temp = TempDir::new().unwrap();
    let (_repo_path, fs) = scratch_fs(&temp);

    assert_eq!(fs.readdir("/").unwrap(), vec![".", ".."]);

    fs.create("/a.txt", 0o644).unwrap();
    fs.mkdir("/b").unwrap();
    assert_eq!(fs.readdir("/").unwrap(), vec![".", "..", "a.txt", "b"]);
    assert_eq!(fs.readdir("/b").unwrap(), vec![".", ".."]);
}

// FS-003: mkdir / rmdir / unlink
#[test]
fn test_tree_operations() {
    let temp = TempDir::new().unwrap();
    let (_repo_path, fs) = scratch_fs(&temp);

    fs.mkdir("/b").unwrap();
    fs.mkdir("/b/c").unwrap();
    fs.create("/b/c/d.txt", 0o644).unwrap();
    fs.write("/b/c/d.txt", b"hello", 0).unwrap();
    fs.truncate("/b/c/d.txt", 3).unwrap();

    let attr = fs.getattr("/b/c/d.txt").unwrap();
    assert_eq!(attr.size, 3);
    assert_eq!(fs.read("/b/c/d.txt", 10, 0).unwrap(), b"hel");

    fs.unlink("/b/c/d.txt").unwrap();
    assert!(fs.lookup("/b/c/d.txt").is_err());

    fs.rmdir("/b/c").unwrap();
    assert_eq!(fs.readdir("/b").unwrap(), vec![".", ".."]);
}

// FS-004: lookup errors map to ENOENT; misuse maps to EPERM
#[test]
fn test_error_mapping() {
    let temp = TempDir::new().unwrap();
    let (_repo_path, fs) = scratch_fs(&temp);

    let err = fs.lookup("/nope").unwrap_err();
    assert_eq!(errno(&err), libc::ENOENT);

    fs.create("/f", 0o644).unwrap();
    // Components below a file do not resolve
    let err = fs.lookup("/f/x").unwrap_err();
    assert_eq!(errno(&err), libc::ENOENT);

    // Reading a directory as a file is not permitted
    let err = fs.read("/", 10, 0).unwrap_err();
    assert_eq!(errno(&err), libc::EPERM);

    // Removing the root directory is not permitted
    let err = fs.rmdir("/").unwrap_err();
    assert_eq!(errno(&err), libc::EPERM);

    let err = fs.create("/bad/name", 0o644).unwrap_err();
    assert_eq!(errno(&err), libc::ENOENT);

    let err = fs.mkdir("/").unwrap_err();
    assert_eq!(errno(&err), libc::EINVAL);
}

// FS-005: link shares data and counts
#[test]
fn test_link() {
    let temp = TempDir::new().unwrap();
    let (_repo_path, fs) = scratch_fs(&temp);

    fs.create("/a", 0o644).unwrap();
    fs.write("/a", b"abc", 0).unwrap();
    fs.link("/b", "/a").unwrap();

    fs.write("/a", b"xyz", 0).unwrap();
    assert_eq!(fs.read("/b", 3, 0).unwrap(), b"xyz");
    assert_eq!(fs.getattr("/a").unwrap().nlink, 2);

    fs.unlink("/a").unwrap();
    assert_eq!(fs.getattr("/b").unwrap().nlink, 1);
    assert_eq!(fs.read("/b", 3, 0).unwrap(), b"xyz");
}

// FS-006: rename moves files, refuses directories
#[test]
fn test_rename() {
    let temp = TempDir::new().unwrap();
    let (_repo_path, fs) = scratch_fs(&temp);

    fs.mkdir("/d").unwrap();
    fs.create("/a", 0o644).unwrap();
    fs.write("/a", b"payload", 0).unwrap();

    fs.rename("/a", "/d/b").unwrap();
    assert!(fs.lookup("/a").is_err());
    assert_eq!(fs.read("/d/b", 100, 0).unwrap(), b"payload");
    assert_eq!(fs.getattr("/d/b").unwrap().nlink, 1);

    // Renaming over an existing file replaces it
    fs.create("/c", 0o644).unwrap();
    fs.write("/c", b"old", 0).unwrap();
    fs.rename("/d/b", "/c").unwrap();
    assert_eq!(fs.read("/c", 100, 0).unwrap(), b"payload");

    // Directories cannot be renamed
    let err = fs.rename("/d", "/e").unwrap_err();
    assert!(matches!(err, Error::NotSupported(_)));
    assert_eq!(errno(&err), libc::EPERM);
}

// FS-007: the mounted branch buffers writes; unmount publishes to master
#[test]
fn test_mount_commit_protocol() {
    let temp = TempDir::new().unwrap();
    let repo_path = temp.path().join("repo.sfs");
    Session::create(&repo_path).unwrap();

    let mounted = MountedFs::open(&repo_path).unwrap();

    let repo = Repository::open(&repo_path).unwrap();
    let initial_master = repo.head_id(DEFAULT_BRANCH).unwrap().unwrap();
    let initial_mounted = repo.head_id(MOUNTED_BRANCH).unwrap().unwrap();
    assert_ne!(initial_master, initial_mounted);

    // The temporary commit is parented on master and carries the notice
    let notice = repo.read_commit(&initial_mounted).unwrap();
    assert_eq!(notice.parents(), &[initial_master]);
    assert!(notice
        .summary()
        .starts_with("[temporary commit; currently mounted, since "));

    // Push three buffers' worth of data through the dispatcher
    mounted.fs().create("/bigfile", 0o644).unwrap();
    let chunk = vec![b'a'; 64 * 1024];
    let total = WRITE_BUFFER_SIZE * 3;
    let mut offset = 0u64;
    while (offset as usize) < total {
        mounted.fs().write("/bigfile", &chunk, offset).unwrap();
        offset += chunk.len() as u64;
    }

    // master has not moved; mounted has been amended in place
    let current_master = repo.head_id(DEFAULT_BRANCH).unwrap().unwrap();
    let current_mounted = repo.head_id(MOUNTED_BRANCH).unwrap().unwrap();
    assert_eq!(initial_master, current_master);
    assert_ne!(initial_mounted, current_mounted);
    let amended = repo.read_commit(&current_mounted).unwrap();
    assert_eq!(amended.parents(), &[initial_master]);

    mounted.unmount().unwrap();

    // master advanced with the summary; the mounted ref is gone
    let final_master = repo.head_id(DEFAULT_BRANCH).unwrap().unwrap();
    assert_ne!(final_master, current_master);
    assert!(repo.head_id(MOUNTED_BRANCH).unwrap().is_none());
    let summary = repo.read_commit(&final_master).unwrap();
    assert_eq!(summary.summary(), "Mounted operations:");
    assert_eq!(summary.parents(), &[initial_master]);

    // The written data survives
    let sess = Session::open(&repo_path, true).unwrap();
    let big = sess.resolve("/bigfile").unwrap().into_file().unwrap();
    assert_eq!(big.size().unwrap(), total as u64);
}

// FS-008: an untouched mount/unmount cycle leaves master alone
#[test]
fn test_mount_no_modifications() {
    let temp = TempDir::new().unwrap();
    let repo_path = temp.path().join("repo.sfs");
    Session::create(&repo_path).unwrap();

    let repo = Repository::open(&repo_path).unwrap();
    let initial_master = repo.head_id(DEFAULT_BRANCH).unwrap().unwrap();

    let mounted = MountedFs::open(&repo_path).unwrap();
    mounted.unmount().unwrap();

    let final_master = repo.head_id(DEFAULT_BRANCH).unwrap().unwrap();
    assert_eq!(initial_master, final_master);
    assert!(repo.head_id(MOUNTED_BRANCH).unwrap().is_none());
}
