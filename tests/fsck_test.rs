//! Integration tests for consistency checking.

use tempfile::TempDir;

use spaghettifs::fsck::fsck;
use spaghettifs::Session;

fn setup(temp: &TempDir) -> std::path::PathBuf {
    let repo_path = temp.path().join("repo.sfs");
    let sess = Session::create(&repo_path).unwrap();
    {
        let root = sess.get_root().unwrap();
        root.create_file("a.txt").unwrap(); // i1
        let b = root.create_directory("b").unwrap();
        b.create_file("d.txt").unwrap(); // i2
    }
    repo_path
}

// FK-001: a healthy repository reports all ok
#[test]
fn test_ok() {
    let temp = TempDir::new().unwrap();
    let repo_path = setup(&temp);

    let mut out = Vec::new();
    let errors = fsck(&repo_path, &mut out).unwrap();
    assert_eq!(errors, 0);
    assert_eq!(String::from_utf8(out).unwrap(), "done; all ok\n");
}

// FK-002: a dangling inode reference is reported
#[test]
fn test_missing_inode() {
    let temp = TempDir::new().unwrap();
    let repo_path = setup(&temp);

    {
        let sess = Session::open(&repo_path, false).unwrap();
        sess.inode_table().remove(2).unwrap();
        sess.commit("removed inode i2").unwrap();
    }

    let mut out = Vec::new();
    let errors = fsck(&repo_path, &mut out).unwrap();
    assert_eq!(errors, 1);
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "missing inode 'i2'\ndone; 1 errors\n"
    );
}

// FK-003: multiple dangling references are all listed
#[test]
fn test_multiple_missing_inodes() {
    let temp = TempDir::new().unwrap();
    let repo_path = setup(&temp);

    {
        let sess = Session::open(&repo_path, false).unwrap();
        sess.inode_table().remove(1).unwrap();
        sess.inode_table().remove(2).unwrap();
        sess.commit("removed both inodes").unwrap();
    }

    let mut out = Vec::new();
    let errors = fsck(&repo_path, &mut out).unwrap();
    assert_eq!(errors, 2);
    let report = String::from_utf8(out).unwrap();
    assert!(report.contains("missing inode 'i1'\n"));
    assert!(report.contains("missing inode 'i2'\n"));
    assert!(report.ends_with("done; 2 errors\n"));
}
