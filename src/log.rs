//! Commit history iteration.

use crate::error::Result;
use crate::objects::{Commit, Oid};
use crate::repository::Repository;

/// An iterator over the first-parent chain of commits.
///
/// Yields commits newest first, starting from a given commit and following
/// each commit's first parent. The filesystem's history is linear, so this
/// walks the complete history of a branch.
pub struct LogIterator<'a> {
    repo: &'a Repository,
    next: Option<Oid>,
}

impl<'a> LogIterator<'a> {
    /// Creates an iterator starting at the given commit.
    pub(crate) fn new(repo: &'a Repository, start: Oid) -> Self {
        LogIterator {
            repo,
            next: Some(start),
        }
    }
}

impl Iterator for LogIterator<'_> {
    type Item = Result<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        let oid = self.next.take()?;
        match self.repo.read_commit(&oid) {
            Ok(commit) => {
                self.next = commit.parent().copied();
                Some(Ok(commit))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Signature, Tree};
    use tempfile::TempDir;

    fn sig(ts: i64) -> Signature {
        Signature::new("Spaghetti User", "noreply@grep.ro", ts, 120)
    }

    // L-001: log walks the first-parent chain newest first
    #[test]
    fn test_log_walk() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init_bare(temp.path().join("repo.sfs")).unwrap();
        let tree_id = repo.write_tree(&Tree::new()).unwrap();

        let c1 = repo
            .write_commit(&Commit::format(&tree_id, &[], &sig(1), "first"))
            .unwrap();
        let c2 = repo
            .write_commit(&Commit::format(&tree_id, &[c1], &sig(2), "second"))
            .unwrap();
        let c3 = repo
            .write_commit(&Commit::format(&tree_id, &[c2], &sig(3), "third"))
            .unwrap();

        let summaries: Vec<String> = repo
            .log_from(c3)
            .map(|c| c.unwrap().summary().to_string())
            .collect();
        assert_eq!(summaries, vec!["third", "second", "first"]);
    }

    // L-002: a root commit terminates the iteration
    #[test]
    fn test_log_root_commit() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init_bare(temp.path().join("repo.sfs")).unwrap();
        let tree_id = repo.write_tree(&Tree::new()).unwrap();

        let c1 = repo
            .write_commit(&Commit::format(&tree_id, &[], &sig(1), "only"))
            .unwrap();

        let commits: Vec<_> = repo.log_from(c1).collect();
        assert_eq!(commits.len(), 1);
        assert!(commits[0].as_ref().unwrap().is_root());
    }
}
