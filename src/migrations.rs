//! Declarative, idempotent storage format upgrades.
//!
//! Each migration names the feature values it requires (`None` meaning the
//! key must be absent) and the values it establishes. Running a migration
//! against a repository that does not match its preconditions is a no-op,
//! so `upgrade` can always run the full list. Migrations operate below the
//! session-level format validation: they open the staged root directly.

use std::path::Path;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::Result;
use crate::features::{FeatureManifest, INODE_FORMAT, INODE_INDEX_FORMAT, NEXT_INODE_NUMBER};
use crate::inode::{parse_inode_id, Inode, BLOCK_SIZE};
use crate::repository::Repository;
use crate::session::{publish_commit, DEFAULT_BRANCH};
use crate::staged::StagedTree;
use crate::treetree::TreeTree;

/// A storage format migration.
pub struct Migration {
    /// Human-readable migration name; appears in the upgrade commit.
    pub name: &'static str,
    /// Required current feature values; `None` means "key absent".
    upgrade_from: &'static [(&'static str, Option<&'static str>)],
    /// Feature values written on completion.
    upgrade_to: &'static [(&'static str, &'static str)],
    /// The migration body, run against the staged root.
    run: fn(&StagedTree) -> Result<()>,
}

impl Migration {
    /// Runs this migration against a repository if its preconditions match.
    ///
    /// A missing `features` blob is created as `{}` first. On completion
    /// the new feature values are written and the result committed to
    /// `master` as `Update script '<name>'`.
    ///
    /// # Returns
    ///
    /// `true` if the migration ran, `false` if it was skipped.
    pub fn apply(&self, repo_path: &Path) -> Result<bool> {
        let repo = Rc::new(Repository::open(repo_path)?);

        let head = repo.head_id(DEFAULT_BRANCH)?;
        let tree_oid = match &head {
            Some(commit_id) => Some(*repo.read_commit(commit_id)?.tree()),
            None => None,
        };
        let root = StagedTree::root(repo.clone(), tree_oid);

        if !root.contains("features")? {
            info!(repo = %repo_path.display(), "creating \"features\" blob");
            root.new_blob("features")?.set_data(b"{}".to_vec());
        }
        let features = FeatureManifest::new(root.get("features")?.into_blob()?);

        for (key, required) in self.upgrade_from {
            let current = features.get(key)?;
            let matches = match required {
                None => current.is_none(),
                Some(value) => current == Some(Value::from(*value)),
            };
            if !matches {
                debug!(
                    migration = self.name,
                    feature = key,
                    "skipping migration, precondition not met"
                );
                return Ok(false);
            }
        }

        info!(migration = self.name, repo = %repo_path.display(), "starting upgrade");
        (self.run)(&root)?;

        for (key, value) in self.upgrade_to {
            features.set(key, Value::from(*value))?;
        }

        let tree_id = root.commit()?;
        let parents: Vec<_> = head.into_iter().collect();
        let message = format!("Update script '{}'", self.name);
        publish_commit(&repo, &tree_id, &parents, &message, DEFAULT_BRANCH)?;

        info!(migration = self.name, "finished upgrade");
        Ok(true)
    }
}

/// Converts inodes from flat `b<offset>` block lists to block TreeTrees.
fn convert_inode_blocks_to_treetree(root: &StagedTree) -> Result<()> {
    let inode_index = root.get("inodes")?.into_tree()?;

    for inode_name in inode_index.keys()? {
        let Some(number) = parse_inode_id(&inode_name) else {
            continue;
        };
        debug!(inode = %inode_name, "reorganizing inode blocks");

        let inode_tree = inode_index.get(&inode_name)?.into_tree()?;
        let blocks = TreeTree::new(inode_tree.clone(), "bt");

        let mut block_offsets = Vec::new();
        for child in inode_tree.keys()? {
            if let Some(digits) = child.strip_prefix('b') {
                if !child.starts_with("bt") {
                    if let Ok(offset) = digits.parse::<u64>() {
                        block_offsets.push(offset);
                    }
                }
            }
        }
        block_offsets.sort_unstable();

        let mut last_block: Option<(u64, u64)> = None;
        for offset in block_offsets {
            let old_name = format!("b{}", offset);
            let new_key = (offset / BLOCK_SIZE).to_string();
            let old_block = inode_tree.get(&old_name)?;
            let moved = blocks.attach(&old_block, &new_key)?;
            inode_tree.delete(&old_name)?;
            let length = moved.into_blob()?.data()?.len() as u64;
            last_block = Some((offset, length));
        }

        if let Some((offset, length)) = last_block {
            let inode = Inode::from_tree(number, inode_tree);
            inode.set_meta_u64("size", offset + length)?;
        }
    }

    Ok(())
}

/// Converts the flat inode directory to an inode table TreeTree.
fn convert_inode_index_to_treetree(root: &StagedTree) -> Result<()> {
    let inode_index = root.get("inodes")?.into_tree()?;
    let table = TreeTree::new(inode_index.clone(), "it");

    let mut next_number = 0u64;
    for inode_name in inode_index.keys()? {
        let Some(number) = parse_inode_id(&inode_name) else {
            continue;
        };
        debug!(inode = %inode_name, "moving inode into table");

        let subtree = inode_index.get(&inode_name)?;
        table.attach(&subtree, &number.to_string())?;
        inode_index.delete(&inode_name)?;
        next_number = next_number.max(number + 1);
    }

    let features = FeatureManifest::new(root.get("features")?.into_blob()?);
    features.set(NEXT_INODE_NUMBER, Value::from(next_number))?;

    Ok(())
}

/// All known migrations, in application order.
pub const ALL_MIGRATIONS: &[Migration] = &[
    Migration {
        name: "Convert inode blocks list to treetree",
        upgrade_from: &[(INODE_FORMAT, None)],
        upgrade_to: &[(INODE_FORMAT, "treetree")],
        run: convert_inode_blocks_to_treetree,
    },
    Migration {
        name: "Convert list of inodes to treetree",
        upgrade_from: &[(INODE_INDEX_FORMAT, None)],
        upgrade_to: &[(INODE_INDEX_FORMAT, "treetree")],
        run: convert_inode_index_to_treetree,
    },
];

/// Runs every applicable migration against a repository.
///
/// # Returns
///
/// The number of migrations that ran.
pub fn upgrade<P: AsRef<Path>>(repo_path: P) -> Result<usize> {
    let mut applied = 0;
    for migration in ALL_MIGRATIONS {
        if migration.apply(repo_path.as_ref())? {
            applied += 1;
        }
    }
    Ok(applied)
}
