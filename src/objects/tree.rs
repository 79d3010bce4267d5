//! Tree object implementation.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::oid::{Oid, OID_BYTES};
use super::store::{ObjectType, RawObject};
use crate::error::{Error, Result};

/// File mode for tree entries.
///
/// The storage format uses exactly two modes: `100644` for blob entries
/// and `40000` for subtree entries. Anything else in a tree is treated as
/// an invalid entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Blob entry: 100644
    Regular,
    /// Subtree entry: 40000
    Directory,
}

impl FileMode {
    /// Parses a file mode from its octal string representation.
    pub fn from_octal(s: &str) -> Option<Self> {
        match s {
            "100644" | "644" => Some(FileMode::Regular),
            "40000" | "040000" => Some(FileMode::Directory),
            _ => None,
        }
    }

    /// Returns the octal string representation of the mode.
    pub fn as_octal(&self) -> &'static str {
        match self {
            FileMode::Regular => "100644",
            FileMode::Directory => "40000",
        }
    }

    /// Returns true if this mode represents a subtree.
    pub fn is_directory(&self) -> bool {
        matches!(self, FileMode::Directory)
    }
}

/// An entry in a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// The file mode of the entry.
    pub mode: FileMode,
    /// The object ID that this entry points to.
    pub oid: Oid,
}

/// A mutable in-memory tree object.
///
/// Trees map entry names to blobs or other trees. This representation is
/// mutated freely in memory and serialized back to the canonical binary
/// format (`<mode> <name>\0<20-byte-sha1>` per entry, in git's entry
/// order) when a new immutable object is written.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    /// The entries in this tree, keyed by name.
    entries: BTreeMap<String, TreeEntry>,
}

impl Tree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Tree {
            entries: BTreeMap::new(),
        }
    }

    /// Parses a Tree from a RawObject.
    ///
    /// # Arguments
    ///
    /// * `raw` - The raw object to parse.
    ///
    /// # Returns
    ///
    /// The parsed Tree on success, or an error if parsing fails or the
    /// object is not a tree.
    pub fn parse(raw: RawObject) -> Result<Self> {
        if raw.object_type != ObjectType::Tree {
            return Err(Error::TypeMismatch {
                expected: "tree",
                actual: raw.object_type.as_str(),
            });
        }

        let mut entries = BTreeMap::new();
        let content = &raw.content;
        let mut pos = 0;

        while pos < content.len() {
            let space_pos = content[pos..]
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| Error::InvalidObject {
                    oid: String::new(),
                    reason: "missing space in tree entry".to_string(),
                })?;

            let mode_bytes = &content[pos..pos + space_pos];
            let mode_str = std::str::from_utf8(mode_bytes).map_err(|_| Error::InvalidObject {
                oid: String::new(),
                reason: "invalid UTF-8 in mode".to_string(),
            })?;

            let mode = FileMode::from_octal(mode_str).ok_or_else(|| Error::InvalidObject {
                oid: String::new(),
                reason: format!("unknown file mode: {}", mode_str),
            })?;

            pos += space_pos + 1;

            let null_pos = content[pos..].iter().position(|&b| b == 0).ok_or_else(|| {
                Error::InvalidObject {
                    oid: String::new(),
                    reason: "missing null byte in tree entry".to_string(),
                }
            })?;

            let name_bytes = &content[pos..pos + null_pos];
            let name = std::str::from_utf8(name_bytes)
                .map_err(|_| Error::InvalidObject {
                    oid: String::new(),
                    reason: "invalid UTF-8 in entry name".to_string(),
                })?
                .to_string();

            pos += null_pos + 1;

            if pos + OID_BYTES > content.len() {
                return Err(Error::InvalidObject {
                    oid: String::new(),
                    reason: "truncated SHA-1 in tree entry".to_string(),
                });
            }

            let mut oid_bytes = [0u8; OID_BYTES];
            oid_bytes.copy_from_slice(&content[pos..pos + OID_BYTES]);
            let oid = Oid::from_bytes(oid_bytes);

            pos += OID_BYTES;

            entries.insert(name, TreeEntry { mode, oid });
        }

        Ok(Tree { entries })
    }

    /// Finds an entry by name.
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.get(name)
    }

    /// Returns true if the tree contains an entry with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Inserts or replaces an entry.
    pub fn insert(&mut self, name: impl Into<String>, mode: FileMode, oid: Oid) {
        self.entries.insert(name.into(), TreeEntry { mode, oid });
    }

    /// Removes an entry by name, returning it if present.
    pub fn remove(&mut self, name: &str) -> Option<TreeEntry> {
        self.entries.remove(name)
    }

    /// Returns the number of entries in the tree.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the tree has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an iterator over (name, entry) pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TreeEntry)> {
        self.entries.iter()
    }

    /// Serializes the tree to the canonical binary format.
    ///
    /// Entries are written in git's tree order, where subtree names are
    /// compared as if they carried a trailing `/`. Getting this wrong
    /// produces objects that `git fsck` rejects.
    pub fn serialize(&self) -> Vec<u8> {
        let mut sorted: Vec<(&String, &TreeEntry)> = self.entries.iter().collect();
        sorted.sort_by(|a, b| entry_order(a.0, a.1.mode, b.0, b.1.mode));

        let mut content = Vec::new();
        for (name, entry) in sorted {
            content.extend_from_slice(entry.mode.as_octal().as_bytes());
            content.push(b' ');
            content.extend_from_slice(name.as_bytes());
            content.push(0);
            content.extend_from_slice(entry.oid.as_bytes());
        }
        content
    }
}

/// Compares two entry names in git tree order.
fn entry_order(a_name: &str, a_mode: FileMode, b_name: &str, b_mode: FileMode) -> Ordering {
    fn byte_at(name: &[u8], idx: usize, is_dir: bool) -> Option<u8> {
        if idx < name.len() {
            Some(name[idx])
        } else if idx == name.len() && is_dir {
            Some(b'/')
        } else {
            None
        }
    }

    let a = a_name.as_bytes();
    let b = b_name.as_bytes();
    let mut i = 0;
    loop {
        let ab = byte_at(a, i, a_mode.is_directory());
        let bb = byte_at(b, i, b_mode.is_directory());
        match (ab, bb) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match x.cmp(&y) {
                Ordering::Equal => i += 1,
                other => return other,
            },
        }
    }
}
