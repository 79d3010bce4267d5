//! Bare repository access: object reads/writes and branch refs.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::infra::write_file_atomic;
use crate::log::LogIterator;
use crate::objects::{Commit, LooseObjectStore, ObjectType, Oid, RawObject, Tree};
use crate::refs::RefStore;

/// Initial content of the `config` file written by `init_bare`.
const BARE_CONFIG: &str = "[core]\n\
    \trepositoryformatversion = 0\n\
    \tfilemode = true\n\
    \tbare = true\n";

/// A bare object repository.
///
/// This is the storage collaborator for the filesystem: an append-only,
/// SHA-1 content-addressed store of blobs, trees and commits, plus mutable
/// branch refs. The on-disk layout follows the git object format so that
/// external `git` tooling can read the history.
#[derive(Debug)]
pub struct Repository {
    /// The repository directory (bare: objects/refs live directly inside).
    git_dir: PathBuf,
}

impl Repository {
    /// Validates that a directory holds a repository.
    ///
    /// A valid bare repository must contain at least a `HEAD` file and
    /// `objects/` and `refs/` directories.
    fn validate_git_dir(git_dir: &Path) -> Result<()> {
        if !git_dir.is_dir() {
            return Err(Error::NotARepository(git_dir.to_path_buf()));
        }

        if !git_dir.join("HEAD").is_file() {
            return Err(Error::NotARepository(git_dir.to_path_buf()));
        }

        if !git_dir.join("objects").is_dir() {
            return Err(Error::NotARepository(git_dir.to_path_buf()));
        }

        if !git_dir.join("refs").is_dir() {
            return Err(Error::NotARepository(git_dir.to_path_buf()));
        }

        Ok(())
    }

    /// Initializes a new bare repository at the given path.
    ///
    /// Creates the directory (if missing) with the standard bare layout:
    /// `objects/`, `refs/heads/`, `branches/`, `HEAD` pointing at
    /// `refs/heads/master`, and a minimal `config`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory to initialize.
    ///
    /// # Returns
    ///
    /// The opened repository, or `Error::AlreadyARepository` if the path
    /// already holds one.
    pub fn init_bare<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if Self::validate_git_dir(path).is_ok() {
            return Err(Error::AlreadyARepository(path.to_path_buf()));
        }

        fs::create_dir_all(path.join("objects"))?;
        fs::create_dir_all(path.join("refs/heads"))?;
        fs::create_dir_all(path.join("branches"))?;
        write_file_atomic(path.join("HEAD"), b"ref: refs/heads/master\n")?;
        write_file_atomic(path.join("config"), BARE_CONFIG.as_bytes())?;

        Self::open(path)
    }

    /// Opens an existing bare repository.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the repository directory.
    ///
    /// # Returns
    ///
    /// A `Repository` instance, or `Error::NotARepository` if the path is
    /// not a valid repository.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let git_dir = path
            .canonicalize()
            .map_err(|_| Error::NotARepository(path.to_path_buf()))?;

        Self::validate_git_dir(&git_dir)?;

        Ok(Repository { git_dir })
    }

    /// Returns the repository directory.
    pub fn path(&self) -> &Path {
        &self.git_dir
    }

    /// Returns a handle to the loose object store.
    fn store(&self) -> LooseObjectStore {
        LooseObjectStore::new(self.git_dir.join("objects"))
    }

    /// Returns a handle to the ref store.
    fn refs(&self) -> RefStore {
        RefStore::new(&self.git_dir)
    }

    /// Reads a raw object by id.
    pub fn read_object(&self, oid: &Oid) -> Result<RawObject> {
        self.store().read(oid)
    }

    /// Reads a blob's content by id.
    pub fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>> {
        let raw = self.read_object(oid)?;
        if raw.object_type != ObjectType::Blob {
            return Err(Error::TypeMismatch {
                expected: "blob",
                actual: raw.object_type.as_str(),
            });
        }
        Ok(raw.content)
    }

    /// Reads and parses a tree object by id.
    pub fn read_tree(&self, oid: &Oid) -> Result<Tree> {
        Tree::parse(self.read_object(oid)?)
    }

    /// Reads and parses a commit object by id.
    pub fn read_commit(&self, oid: &Oid) -> Result<Commit> {
        Commit::parse(*oid, self.read_object(oid)?)
    }

    /// Writes a blob object, returning its id.
    pub fn write_blob(&self, content: &[u8]) -> Result<Oid> {
        self.store().write(ObjectType::Blob, content)
    }

    /// Writes a tree object, returning its id.
    pub fn write_tree(&self, tree: &Tree) -> Result<Oid> {
        self.store().write(ObjectType::Tree, &tree.serialize())
    }

    /// Writes pre-formatted commit content, returning its id.
    pub fn write_commit(&self, content: &[u8]) -> Result<Oid> {
        self.store().write(ObjectType::Commit, content)
    }

    /// Returns the commit a branch points to, or `None` for an unborn branch.
    pub fn head_id(&self, branch: &str) -> Result<Option<Oid>> {
        self.refs().branch_id(branch)
    }

    /// Points a branch at a commit, creating it if needed.
    pub fn update_branch(&self, branch: &str, oid: &Oid) -> Result<()> {
        self.refs().set_branch(branch, oid)
    }

    /// Deletes a branch ref.
    pub fn delete_branch(&self, branch: &str) -> Result<()> {
        self.refs().delete_branch(branch)
    }

    /// Returns true if a branch ref exists.
    pub fn branch_exists(&self, branch: &str) -> bool {
        self.refs().branch_exists(branch)
    }

    /// Returns an iterator over the first-parent history from a commit.
    ///
    /// Commits are yielded newest first.
    pub fn log_from(&self, start: Oid) -> LogIterator<'_> {
        LogIterator::new(self, start)
    }
}
