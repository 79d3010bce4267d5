//! TreeTree: a digit-keyed trie of trees for sparse integer-keyed maps.
//!
//! Appending to a git tree rewrites the whole tree object, which costs
//! O(n log n) as entries accumulate. A TreeTree spreads entries over a trie
//! keyed by the decimal digits of the key, so every tree stays small (at
//! most ten children plus the per-length buckets) and a mutation rewrites a
//! number of trees proportional to the key length, not the entry count.
//!
//! A key `K` of length `L` lives at `<prefix><L>/K[0]/K[1]/…/K[L-1]` inside
//! the container tree. Leaves may be blobs or trees.

use crate::error::{Error, Result};
use crate::staged::{Node, StagedBlob, StagedTree};

/// A digit-keyed trie view over a container [`StagedTree`].
pub struct TreeTree {
    container: StagedTree,
    prefix: String,
}

impl TreeTree {
    /// Creates a TreeTree over the given container tree.
    ///
    /// # Arguments
    ///
    /// * `container` - The tree holding the trie.
    /// * `prefix` - Bucket name prefix (e.g. `bt` for block tables, `it`
    ///   for the inode table).
    pub fn new(container: StagedTree, prefix: &str) -> Self {
        TreeTree {
            container,
            prefix: prefix.to_string(),
        }
    }

    /// Splits a key into the intermediate tree names and the leaf name.
    fn key_path(&self, key: &str) -> Result<(Vec<String>, String)> {
        check_key(key)?;
        let mut steps = Vec::with_capacity(key.len());
        steps.push(format!("{}{}", self.prefix, key.len()));
        for digit in key[..key.len() - 1].chars() {
            steps.push(digit.to_string());
        }
        let leaf = key[key.len() - 1..].to_string();
        Ok((steps, leaf))
    }

    /// Walks the intermediate trees for a key, without creating anything.
    fn descend(&self, steps: &[String]) -> Result<StagedTree> {
        let mut node = self.container.clone();
        for step in steps {
            node = node.get(step)?.into_tree()?;
        }
        Ok(node)
    }

    /// Walks the intermediate trees for a key, creating missing ones.
    fn descend_create(&self, steps: &[String]) -> Result<StagedTree> {
        let mut node = self.container.clone();
        for step in steps {
            node = if node.contains(step)? {
                node.get(step)?.into_tree()?
            } else {
                node.new_tree(step)?
            };
        }
        Ok(node)
    }

    /// Looks up the entry stored at `key`.
    ///
    /// # Returns
    ///
    /// The leaf node, or `NotFound` if any step of the path is missing.
    pub fn get(&self, key: &str) -> Result<Node> {
        let (steps, leaf) = self.key_path(key)?;
        let parent = self.descend(&steps)?;
        parent.get(&leaf)
    }

    /// Returns true if `key` is present.
    pub fn contains(&self, key: &str) -> Result<bool> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Creates a new blob at `key`.
    ///
    /// Fails with `AlreadyExists` if the key is present, `InvalidName` if
    /// the key is not a non-empty digit string.
    pub fn new_blob(&self, key: &str) -> Result<StagedBlob> {
        let (steps, leaf) = self.key_path(key)?;
        let parent = self.descend_create(&steps)?;
        parent.new_blob(&leaf)
    }

    /// Creates a new empty tree at `key`.
    ///
    /// Fails with `AlreadyExists` if the key is present, `InvalidName` if
    /// the key is not a non-empty digit string.
    pub fn new_tree(&self, key: &str) -> Result<StagedTree> {
        let (steps, leaf) = self.key_path(key)?;
        let parent = self.descend_create(&steps)?;
        parent.new_tree(&leaf)
    }

    /// Attaches an existing object at `key`.
    ///
    /// Used by format migrations to move objects into the trie without
    /// rewriting their content.
    pub fn attach(&self, source: &Node, key: &str) -> Result<Node> {
        let (steps, leaf) = self.key_path(key)?;
        let parent = self.descend_create(&steps)?;
        parent.attach(&leaf, source)
    }

    /// Deletes the entry at `key`, pruning emptied intermediate trees
    /// bottom-up (including the `<prefix><L>` bucket).
    pub fn delete(&self, key: &str) -> Result<()> {
        let (steps, leaf) = self.key_path(key)?;

        // Collect the chain of trees down to the leaf's parent:
        // chain[0] is the container, chain[i] is the tree at steps[i - 1].
        let mut chain: Vec<StagedTree> = Vec::with_capacity(steps.len() + 1);
        chain.push(self.container.clone());
        for step in &steps {
            let next = chain[chain.len() - 1].get(step)?.into_tree()?;
            chain.push(next);
        }

        chain[chain.len() - 1].delete(&leaf)?;

        // Prune empty trees from the leaf's parent upward
        for i in (1..chain.len()).rev() {
            if chain[i].keys()?.is_empty() {
                chain[i - 1].delete(&steps[i - 1])?;
            } else {
                break;
            }
        }

        Ok(())
    }
}

/// Validates a trie key: non-empty, decimal digits only.
fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidName(key.to_string()));
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidName(key.to_string()));
    }
    Ok(())
}
