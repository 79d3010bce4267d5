//! Branch references.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::infra::write_file_atomic;
use crate::objects::Oid;

/// The value stored in a reference file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefValue {
    /// A direct reference to an object ID.
    Direct(Oid),
    /// A symbolic reference to another ref (e.g., HEAD -> refs/heads/master).
    Symbolic(String),
}

/// A store for reading and writing branch references.
///
/// References live as individual files under the repository directory:
/// `refs/heads/<branch>` holds a commit hash, `HEAD` holds a symbolic
/// pointer to the checked-out branch.
#[derive(Debug)]
pub struct RefStore {
    /// Path to the bare repository directory.
    git_dir: PathBuf,
}

impl RefStore {
    /// Creates a new RefStore for the given repository directory.
    pub fn new<P: AsRef<Path>>(git_dir: P) -> Self {
        RefStore {
            git_dir: git_dir.as_ref().to_path_buf(),
        }
    }

    /// Reads and parses a reference file.
    ///
    /// # Arguments
    ///
    /// * `name` - The reference name (e.g., "HEAD" or "refs/heads/master").
    ///
    /// # Returns
    ///
    /// The parsed reference value, or `Error::RefNotFound` if it doesn't
    /// exist.
    pub fn read_ref_file(&self, name: &str) -> Result<RefValue> {
        let ref_path = self.git_dir.join(name);

        let content = fs::read_to_string(&ref_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::RefNotFound(name.to_string())
            } else {
                Error::Io(e)
            }
        })?;

        let content = content.trim();

        if let Some(target) = content.strip_prefix("ref: ") {
            Ok(RefValue::Symbolic(target.to_string()))
        } else {
            let oid = Oid::from_hex(content)?;
            Ok(RefValue::Direct(oid))
        }
    }

    /// Returns the commit a branch points to, or `None` for an unborn branch.
    ///
    /// # Arguments
    ///
    /// * `branch` - The branch name (without `refs/heads/` prefix).
    pub fn branch_id(&self, branch: &str) -> Result<Option<Oid>> {
        match self.read_ref_file(&format!("refs/heads/{}", branch)) {
            Ok(RefValue::Direct(oid)) => Ok(Some(oid)),
            Ok(RefValue::Symbolic(target)) => Err(Error::InvalidFormat(format!(
                "branch ref refs/heads/{} is symbolic ({})",
                branch, target
            ))),
            Err(Error::RefNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Points a branch at a commit, creating the ref file if needed.
    ///
    /// # Arguments
    ///
    /// * `branch` - The branch name (without `refs/heads/` prefix).
    /// * `oid` - The commit to point at.
    pub fn set_branch(&self, branch: &str, oid: &Oid) -> Result<()> {
        let ref_path = self.git_dir.join("refs/heads").join(branch);
        write_file_atomic(&ref_path, format!("{}\n", oid.to_hex()).as_bytes())
    }

    /// Deletes a branch reference.
    ///
    /// # Arguments
    ///
    /// * `branch` - The branch name (without `refs/heads/` prefix).
    ///
    /// # Returns
    ///
    /// `Error::RefNotFound` if the branch does not exist.
    pub fn delete_branch(&self, branch: &str) -> Result<()> {
        let ref_path = self.git_dir.join("refs/heads").join(branch);
        if !ref_path.exists() {
            return Err(Error::RefNotFound(format!("refs/heads/{}", branch)));
        }
        fs::remove_file(&ref_path)?;
        Ok(())
    }

    /// Returns true if the branch ref exists.
    pub fn branch_exists(&self, branch: &str) -> bool {
        self.git_dir.join("refs/heads").join(branch).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEST_OID: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

    fn test_oid() -> Oid {
        Oid::from_hex(TEST_OID).unwrap()
    }

    // R-001: set_branch then branch_id roundtrip
    #[test]
    fn test_set_and_read_branch() {
        let temp = TempDir::new().unwrap();
        let store = RefStore::new(temp.path());

        assert_eq!(store.branch_id("master").unwrap(), None);

        store.set_branch("master", &test_oid()).unwrap();
        assert_eq!(store.branch_id("master").unwrap(), Some(test_oid()));
        assert!(store.branch_exists("master"));
    }

    // R-002: symbolic HEAD parsing
    #[test]
    fn test_read_symbolic_head() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("HEAD"), b"ref: refs/heads/master\n").unwrap();

        let store = RefStore::new(temp.path());
        let value = store.read_ref_file("HEAD").unwrap();
        assert_eq!(
            value,
            RefValue::Symbolic("refs/heads/master".to_string())
        );
    }

    // R-003: delete_branch removes the ref file
    #[test]
    fn test_delete_branch() {
        let temp = TempDir::new().unwrap();
        let store = RefStore::new(temp.path());

        store.set_branch("mounted", &test_oid()).unwrap();
        assert!(store.branch_exists("mounted"));

        store.delete_branch("mounted").unwrap();
        assert!(!store.branch_exists("mounted"));
        assert_eq!(store.branch_id("mounted").unwrap(), None);

        let result = store.delete_branch("mounted");
        assert!(matches!(result, Err(Error::RefNotFound(_))));
    }

    // R-004: missing ref file reads as RefNotFound
    #[test]
    fn test_missing_ref() {
        let temp = TempDir::new().unwrap();
        let store = RefStore::new(temp.path());
        let result = store.read_ref_file("refs/heads/nope");
        assert!(matches!(result, Err(Error::RefNotFound(_))));
    }
}
