//! Sessions: an open repository with its staged root and inode table.

use std::path::Path;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::features::{
    FeatureManifest, FORMAT_TREETREE, INODE_FORMAT, INODE_INDEX_FORMAT, NEXT_INODE_NUMBER,
};
use crate::inode::{Inode, InodeTable};
use crate::namespace::{Dir, Entry};
use crate::objects::{Commit, Oid, Signature};
use crate::repository::Repository;
use crate::staged::StagedTree;

/// Author of every commit the filesystem publishes.
pub const COMMIT_AUTHOR_NAME: &str = "Spaghetti User";
/// Author email of every commit the filesystem publishes.
pub const COMMIT_AUTHOR_EMAIL: &str = "noreply@grep.ro";
/// Fixed commit timezone: +02:00, in minutes.
pub const COMMIT_TZ_OFFSET: i32 = 120;
/// The authoritative branch.
pub const DEFAULT_BRANCH: &str = "master";

/// Writes a commit over the given tree and points `branch` at it.
pub(crate) fn publish_commit(
    repo: &Repository,
    tree: &Oid,
    parents: &[Oid],
    message: &str,
    branch: &str,
) -> Result<Oid> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let author = Signature::new(
        COMMIT_AUTHOR_NAME,
        COMMIT_AUTHOR_EMAIL,
        timestamp,
        COMMIT_TZ_OFFSET,
    );

    let content = Commit::format(tree, parents, &author, message);
    let oid = repo.write_commit(&content)?;
    repo.update_branch(branch, &oid)?;
    Ok(oid)
}

/// An open filesystem session.
///
/// Owns the staged root tree and the inode table for one open repository.
/// With autocommit on, every storage-level mutation publishes a commit on
/// `master`; with it off, changes accumulate in the staged overlay until
/// an explicit [`Session::commit`].
pub struct Session {
    repo: Rc<Repository>,
    root: StagedTree,
    autocommit_enabled: bool,
    inodes: InodeTable,
}

impl Session {
    /// Initializes an empty filesystem repository and opens a session on it.
    ///
    /// Stages the four top-level entries (`inodes`, `root.ls`, `root.sub`,
    /// `features`), seeds the feature manifest and publishes the initial
    /// commit on `master`.
    ///
    /// # Arguments
    ///
    /// * `repo_path` - Directory for the new bare repository.
    pub fn create<P: AsRef<Path>>(repo_path: P) -> Result<Session> {
        let repo = Rc::new(Repository::init_bare(&repo_path)?);
        let root = StagedTree::root(repo.clone(), None);

        root.new_tree("inodes")?;
        root.new_blob("root.ls")?;
        root.new_tree("root.sub")?;
        let features_blob = root.new_blob("features")?;
        features_blob.set_data(b"{}".to_vec());

        let features = FeatureManifest::new(features_blob);
        features.set(NEXT_INODE_NUMBER, Value::from(1))?;
        features.set(INODE_INDEX_FORMAT, Value::from(FORMAT_TREETREE))?;
        features.set(INODE_FORMAT, Value::from(FORMAT_TREETREE))?;

        let tree_id = root.commit()?;
        publish_commit(
            &repo,
            &tree_id,
            &[],
            "Created empty filesystem",
            DEFAULT_BRANCH,
        )?;

        Session::open(repo_path, true)
    }

    /// Opens a session over an existing repository.
    ///
    /// The feature manifest is checked: both `inode_format` and
    /// `inode_index_format` must be `treetree`; anything else means the
    /// repository needs `upgrade` (or a newer implementation).
    ///
    /// # Arguments
    ///
    /// * `repo_path` - The repository directory.
    /// * `autocommit` - Whether every mutation publishes a commit.
    pub fn open<P: AsRef<Path>>(repo_path: P, autocommit: bool) -> Result<Session> {
        let repo = Rc::new(Repository::open(repo_path)?);

        let head = repo.head_id(DEFAULT_BRANCH)?;
        let tree_oid = match &head {
            Some(commit_id) => Some(*repo.read_commit(commit_id)?.tree()),
            None => None,
        };
        let root = StagedTree::root(repo.clone(), tree_oid);

        let inodes = InodeTable::new(root.get("inodes")?.into_tree()?);
        let session = Session {
            repo,
            root,
            autocommit_enabled: autocommit,
            inodes,
        };

        let features = session.features()?;
        for key in [INODE_FORMAT, INODE_INDEX_FORMAT] {
            let value = features.get_str(key)?;
            if value.as_deref() != Some(FORMAT_TREETREE) {
                return Err(Error::InvalidFormat(format!(
                    "feature {} is {:?}, expected {:?}",
                    key, value, FORMAT_TREETREE
                )));
            }
        }

        debug!(
            autocommit,
            head = %head.map(|h| h.to_hex()).unwrap_or_else(|| "(unborn)".to_string()),
            "loaded storage"
        );
        Ok(session)
    }

    /// Returns the underlying repository.
    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Returns a view over the `features` manifest blob.
    pub fn features(&self) -> Result<FeatureManifest> {
        Ok(FeatureManifest::new(
            self.root.get("features")?.into_blob()?,
        ))
    }

    /// Returns the root directory.
    pub fn get_root(&self) -> Result<Dir<'_>> {
        let ls = self.root.get("root.ls")?.into_blob()?;
        let sub = self.root.get("root.sub")?.into_tree()?;
        Ok(Dir::new(self, "root", "/", ls, sub, None))
    }

    /// Resolves an absolute path to a directory or file entry.
    ///
    /// Empty components are skipped, so `/`, `//` and `/a//b` behave like
    /// their cleaned forms. A path component below a file fails with
    /// `NotFound`.
    pub fn resolve(&self, path: &str) -> Result<Entry<'_>> {
        let mut entry = Entry::Dir(self.get_root()?);
        for fragment in path.split('/') {
            if fragment.is_empty() {
                continue;
            }
            entry = match entry {
                Entry::Dir(dir) => dir.get(fragment)?,
                Entry::File(_) => {
                    return Err(Error::NotFound(format!("'{}'", path)));
                }
            };
        }
        Ok(entry)
    }

    /// Looks up an inode by number, via the session's weak inode cache.
    pub fn get_inode(&self, number: u64) -> Result<Inode> {
        self.inodes.get(number)
    }

    /// Allocates a fresh inode with default metadata.
    ///
    /// `next_inode_number` in the feature manifest is read and bumped;
    /// numbers are monotonic and never reused, even after unlink.
    pub fn create_inode(&self) -> Result<Inode> {
        let features = self.features()?;
        let next = features.get_u64(NEXT_INODE_NUMBER)?.ok_or_else(|| {
            Error::InvalidFormat(format!("feature {} is missing", NEXT_INODE_NUMBER))
        })?;
        features.set(NEXT_INODE_NUMBER, Value::from(next + 1))?;

        self.inodes.create(next)
    }

    /// Removes an inode's subtree from the table.
    pub(crate) fn remove_inode(&self, number: u64) -> Result<()> {
        self.inodes.remove(number)
    }

    /// Returns the inode table.
    pub fn inode_table(&self) -> &InodeTable {
        &self.inodes
    }

    /// Returns true if the session commits after every mutation.
    pub fn is_autocommit(&self) -> bool {
        self.autocommit_enabled
    }

    /// Publishes `Auto commit` on `master` if autocommit is on.
    pub(crate) fn autocommit(&self) -> Result<()> {
        if self.autocommit_enabled {
            self.commit("Auto commit")?;
        }
        Ok(())
    }

    /// Commits the staged root to `master`.
    ///
    /// # Arguments
    ///
    /// * `message` - The commit message.
    ///
    /// # Returns
    ///
    /// The new commit's id.
    pub fn commit(&self, message: &str) -> Result<Oid> {
        self.commit_to(message, DEFAULT_BRANCH, None)
    }

    /// Commits the staged root to an arbitrary branch.
    ///
    /// The parent list is the given `head_id`, or the branch's current
    /// head, or empty for an unborn branch.
    ///
    /// # Arguments
    ///
    /// * `message` - The commit message.
    /// * `branch` - The branch to advance (created if missing).
    /// * `head_id` - Optional explicit parent overriding the branch head.
    pub fn commit_to(&self, message: &str, branch: &str, head_id: Option<Oid>) -> Result<Oid> {
        info!(branch, "committing");

        let head = match head_id {
            Some(oid) => Some(oid),
            None => self.repo.head_id(branch)?,
        };

        let tree_id = self.root.commit()?;

        // Committing the branch head's own tree again would only add an
        // empty commit; hand back the head instead. An explicit head_id
        // is a request for a new commit (the mount notice), so it always
        // publishes.
        if head_id.is_none() {
            if let Some(branch_head) = head {
                let previous = self.repo.read_commit(&branch_head)?;
                if *previous.tree() == tree_id {
                    debug!(branch, "tree unchanged, skipping commit");
                    return Ok(branch_head);
                }
            }
        }

        let parents: Vec<Oid> = head.into_iter().collect();
        publish_commit(&self.repo, &tree_id, &parents, message, branch)
    }

    /// Replaces a branch's head commit with the current staged state.
    ///
    /// The new commit reuses the previous head's parents and message, so
    /// the branch keeps a single buffered commit during a mount.
    ///
    /// # Arguments
    ///
    /// * `branch` - The branch whose head to amend.
    pub fn amend(&self, branch: &str) -> Result<Oid> {
        info!(branch, "amending");

        let head = self
            .repo
            .head_id(branch)?
            .ok_or_else(|| Error::RefNotFound(format!("refs/heads/{}", branch)))?;
        let previous = self.repo.read_commit(&head)?;

        let tree_id = self.root.commit()?;
        publish_commit(
            &self.repo,
            &tree_id,
            previous.parents(),
            previous.message(),
            branch,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // SE-001: create seeds the four top-level entries and the manifest
    #[test]
    fn test_create() {
        let temp = TempDir::new().unwrap();
        let sess = Session::create(temp.path().join("repo.sfs")).unwrap();

        let features = sess.features().unwrap();
        assert_eq!(features.get_u64(NEXT_INODE_NUMBER).unwrap(), Some(1));
        assert_eq!(
            features.get_str(INODE_FORMAT).unwrap().as_deref(),
            Some(FORMAT_TREETREE)
        );
        assert_eq!(
            features.get_str(INODE_INDEX_FORMAT).unwrap().as_deref(),
            Some(FORMAT_TREETREE)
        );

        let head = sess.repo().head_id(DEFAULT_BRANCH).unwrap().unwrap();
        let commit = sess.repo().read_commit(&head).unwrap();
        assert_eq!(commit.summary(), "Created empty filesystem");
        assert!(commit.is_root());
        assert_eq!(commit.author().name(), COMMIT_AUTHOR_NAME);
        assert_eq!(commit.author().email(), COMMIT_AUTHOR_EMAIL);
        assert_eq!(commit.author().tz_offset(), COMMIT_TZ_OFFSET);

        assert!(sess.get_root().unwrap().keys().unwrap().is_empty());
    }

    // SE-002: open rejects repositories with wrong format flags
    #[test]
    fn test_open_rejects_wrong_format() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("repo.sfs");
        {
            let sess = Session::create(&path).unwrap();
            let features = sess.features().unwrap();
            features.set(INODE_FORMAT, Value::from("flat")).unwrap();
            sess.commit("break the format flag").unwrap();
        }

        let result = Session::open(&path, true);
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
    }

    // SE-003: inode numbers are monotonic and never reused
    #[test]
    fn test_inode_allocation_monotonic() {
        let temp = TempDir::new().unwrap();
        let sess = Session::create(temp.path().join("repo.sfs")).unwrap();

        let i1 = sess.create_inode().unwrap();
        let i2 = sess.create_inode().unwrap();
        assert_eq!(i1.number(), 1);
        assert_eq!(i2.number(), 2);

        i2.unlink(&sess).unwrap();
        let i3 = sess.create_inode().unwrap();
        assert_eq!(i3.number(), 3);
        assert_eq!(
            sess.features().unwrap().get_u64(NEXT_INODE_NUMBER).unwrap(),
            Some(4)
        );
    }

    // SE-004: commit_to with an explicit head parents the new commit on it
    #[test]
    fn test_commit_to_branch() {
        let temp = TempDir::new().unwrap();
        let sess = Session::create(temp.path().join("repo.sfs")).unwrap();
        let master_head = sess.repo().head_id(DEFAULT_BRANCH).unwrap().unwrap();

        let mounted = sess
            .commit_to("temporary commit", "mounted", Some(master_head))
            .unwrap();

        let commit = sess.repo().read_commit(&mounted).unwrap();
        assert_eq!(commit.parents(), &[master_head]);
        assert_eq!(sess.repo().head_id("mounted").unwrap(), Some(mounted));
        // master is untouched
        assert_eq!(
            sess.repo().head_id(DEFAULT_BRANCH).unwrap(),
            Some(master_head)
        );
    }

    // SE-005: amend keeps parents and message while swapping the tree
    #[test]
    fn test_amend() {
        let temp = TempDir::new().unwrap();
        let sess = Session::create(temp.path().join("repo.sfs")).unwrap();
        let master_head = sess.repo().head_id(DEFAULT_BRANCH).unwrap().unwrap();

        sess.commit_to("temporary commit", "mounted", Some(master_head))
            .unwrap();

        let root = sess.get_root().unwrap();
        root.create_file("x").unwrap();

        let amended = sess.amend("mounted").unwrap();
        let commit = sess.repo().read_commit(&amended).unwrap();
        assert_eq!(commit.parents(), &[master_head]);
        assert_eq!(commit.message(), "temporary commit");
    }
}
