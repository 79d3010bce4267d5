//! Integration tests for session lifecycle and commit history.

use tempfile::TempDir;

use spaghettifs::features::NEXT_INODE_NUMBER;
use spaghettifs::session::DEFAULT_BRANCH;
use spaghettifs::{Repository, Session};

// SS-001: a fresh filesystem has an empty root and inode number 1
#[test]
fn test_fresh_filesystem() {
    let temp = TempDir::new().unwrap();
    let sess = Session::create(temp.path().join("repo.sfs")).unwrap();

    let root = sess.get_root().unwrap();
    assert!(root.keys().unwrap().is_empty());
    assert_eq!(
        sess.features().unwrap().get_u64(NEXT_INODE_NUMBER).unwrap(),
        Some(1)
    );
}

// SS-002: create + write advance master linearly and read back
#[test]
fn test_create_write_read() {
    let temp = TempDir::new().unwrap();
    let repo_path = temp.path().join("repo.sfs");
    let sess = Session::create(&repo_path).unwrap();

    let before = sess.repo().head_id(DEFAULT_BRANCH).unwrap().unwrap();

    let root = sess.get_root().unwrap();
    let a = root.create_file("a.txt").unwrap();
    let after_create = sess.repo().head_id(DEFAULT_BRANCH).unwrap().unwrap();
    assert_ne!(before, after_create);
    assert_eq!(
        sess.repo().read_commit(&after_create).unwrap().parents(),
        &[before]
    );

    a.write_data(b"text file \"a\"\n", 0).unwrap();
    assert_eq!(a.read_data(0, 1024).unwrap(), b"text file \"a\"\n");
    assert_eq!(a.size().unwrap(), 14);

    let after_write = sess.repo().head_id(DEFAULT_BRANCH).unwrap().unwrap();
    assert_eq!(
        sess.repo().read_commit(&after_write).unwrap().parents(),
        &[after_create]
    );
}

// SS-003: every commit on master has the previous head as sole parent
#[test]
fn test_history_linearity() {
    let temp = TempDir::new().unwrap();
    let repo_path = temp.path().join("repo.sfs");
    {
        let sess = Session::create(&repo_path).unwrap();
        let root = sess.get_root().unwrap();
        let b = root.create_directory("b").unwrap();
        let c = b.create_directory("c").unwrap();
        let d = c.create_file("d.txt").unwrap();
        d.write_data(b"hello", 0).unwrap();
        d.truncate(3).unwrap();
    }

    let repo = Repository::open(&repo_path).unwrap();
    let head = repo.head_id(DEFAULT_BRANCH).unwrap().unwrap();
    let commits: Vec<_> = repo
        .log_from(head)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert!(commits.len() >= 6);
    for pair in commits.windows(2) {
        assert_eq!(pair[0].parents(), &[*pair[1].oid()]);
    }
    assert!(commits.last().unwrap().is_root());
    assert_eq!(
        commits.last().unwrap().summary(),
        "Created empty filesystem"
    );
}

// SS-004: a closed session's data survives a reopen
#[test]
fn test_round_trip() {
    let temp = TempDir::new().unwrap();
    let repo_path = temp.path().join("repo.sfs");
    {
        let sess = Session::create(&repo_path).unwrap();
        let root = sess.get_root().unwrap();
        let b = root.create_directory("b").unwrap();
        let c = b.create_directory("c").unwrap();
        let d = c.create_file("d.txt").unwrap();
        d.write_data(b"hello", 0).unwrap();
        d.truncate(3).unwrap();
    }

    let sess = Session::open(&repo_path, true).unwrap();
    let d = sess.resolve("/b/c/d.txt").unwrap().into_file().unwrap();
    assert_eq!(d.size().unwrap(), 3);
    assert_eq!(d.data().unwrap(), b"hel");
}

// SS-005: mkdir then rmdir restores the committed tree id
#[test]
fn test_mkdir_rmdir_restores_tree() {
    let temp = TempDir::new().unwrap();
    let repo_path = temp.path().join("repo.sfs");
    let sess = Session::create(&repo_path).unwrap();

    let root = sess.get_root().unwrap();
    root.create_file("keep.txt").unwrap();

    let repo = sess.repo();
    let head_before = repo.head_id(DEFAULT_BRANCH).unwrap().unwrap();
    let tree_before = *repo.read_commit(&head_before).unwrap().tree();

    let d = root.create_directory("d").unwrap();
    d.unlink().unwrap();

    let head_after = repo.head_id(DEFAULT_BRANCH).unwrap().unwrap();
    let tree_after = *repo.read_commit(&head_after).unwrap().tree();
    assert_eq!(tree_before, tree_after);
}

// SS-006: committing an unchanged tree does not move the branch
#[test]
fn test_empty_commit_skipped() {
    let temp = TempDir::new().unwrap();
    let sess = Session::create(temp.path().join("repo.sfs")).unwrap();

    let head = sess.repo().head_id(DEFAULT_BRANCH).unwrap().unwrap();
    let again = sess.commit("nothing happened").unwrap();
    assert_eq!(again, head);
    assert_eq!(sess.repo().head_id(DEFAULT_BRANCH).unwrap(), Some(head));
}

// SS-007: repositories read back with the standard object layout
#[test]
fn test_repository_layout() {
    let temp = TempDir::new().unwrap();
    let repo_path = temp.path().join("repo.sfs");
    Session::create(&repo_path).unwrap();

    for entry in ["objects", "refs/heads", "branches"] {
        assert!(repo_path.join(entry).is_dir(), "{} missing", entry);
    }
    assert!(repo_path.join("HEAD").is_file());
    assert!(repo_path.join("config").is_file());
    assert!(repo_path.join("refs/heads/master").is_file());

    // The top-level commit tree holds exactly the four required entries
    let repo = Repository::open(&repo_path).unwrap();
    let head = repo.head_id(DEFAULT_BRANCH).unwrap().unwrap();
    let commit = repo.read_commit(&head).unwrap();
    let tree = repo.read_tree(commit.tree()).unwrap();
    let names: Vec<&str> = tree.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["features", "inodes", "root.ls", "root.sub"]);
}
