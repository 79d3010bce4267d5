//! Inodes: per-file metadata and block storage, plus the inode table.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::session::Session;
use crate::staged::StagedTree;
use crate::treetree::TreeTree;

/// Size of a file data block in bytes.
pub const BLOCK_SIZE: u64 = 64 * 1024;

/// Default metadata for a freshly created inode.
pub const DEFAULT_META: &str = "mode: 0100644\n\
    nlink: 1\n\
    uid: 0\n\
    gid: 0\n\
    size: 0\n";

/// Meta keys holding decimal integers.
const META_NLINK: &str = "nlink";
const META_SIZE: &str = "size";
/// Meta key holding an octal integer.
const META_MODE: &str = "mode";

/// Parses an inode identifier like `i42` into its number.
pub fn parse_inode_id(id: &str) -> Option<u64> {
    let digits = id.strip_prefix('i')?;
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

struct InodeInner {
    number: u64,
    tree: StagedTree,
    blocks: TreeTree,
}

/// A file's inode: a `meta` blob plus a TreeTree of data blocks.
///
/// The inode lives in the inode table, decoupled from the directory
/// namespace; hard links are multiple ls entries naming the same inode.
/// Cloning shares the same underlying inode.
#[derive(Clone)]
pub struct Inode {
    inner: Rc<InodeInner>,
}

impl std::fmt::Debug for Inode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inode")
            .field("number", &self.inner.number)
            .finish()
    }
}

impl Inode {
    pub(crate) fn from_tree(number: u64, tree: StagedTree) -> Self {
        let blocks = TreeTree::new(tree.clone(), "bt");
        debug!(inode = number, "loaded inode");
        Inode {
            inner: Rc::new(InodeInner {
                number,
                tree,
                blocks,
            }),
        }
    }

    /// Returns the inode number.
    pub fn number(&self) -> u64 {
        self.inner.number
    }

    /// Returns the inode identifier (`i<number>`).
    pub fn id(&self) -> String {
        format!("i{}", self.inner.number)
    }

    /// Returns the inode's subtree in the inode table.
    pub(crate) fn tree(&self) -> &StagedTree {
        &self.inner.tree
    }

    /// Parses the `meta` blob into a key/value map.
    ///
    /// An inode without a `meta` blob reads as the defaults; unknown keys
    /// are carried through untouched.
    fn read_meta(&self) -> Result<BTreeMap<String, String>> {
        let raw = if self.tree().contains("meta")? {
            self.tree().get("meta")?.into_blob()?.data()?
        } else {
            DEFAULT_META.as_bytes().to_vec()
        };
        let text = String::from_utf8(raw).map_err(|_| Error::InvalidUtf8)?;

        let mut map = BTreeMap::new();
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once(": ").ok_or_else(|| {
                Error::InvalidFormat(format!("meta line {:?} in inode {}", line, self.id()))
            })?;
            map.insert(key.to_string(), value.to_string());
        }
        Ok(map)
    }

    /// Rewrites the `meta` blob from a key/value map, keys sorted.
    fn write_meta(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let mut raw = String::new();
        for (key, value) in map {
            raw.push_str(key);
            raw.push_str(": ");
            raw.push_str(value);
            raw.push('\n');
        }

        let blob = if self.tree().contains("meta")? {
            self.tree().get("meta")?.into_blob()?
        } else {
            self.tree().new_blob("meta")?
        };
        blob.set_data(raw.into_bytes());
        Ok(())
    }

    /// Returns a decimal integer meta value (`nlink`, `uid`, `gid`, `size`).
    pub fn meta_u64(&self, key: &str) -> Result<u64> {
        let map = self.read_meta()?;
        let value = map.get(key).ok_or_else(|| {
            Error::InvalidFormat(format!("missing meta key {:?} in inode {}", key, self.id()))
        })?;
        value.parse().map_err(|_| {
            Error::InvalidFormat(format!("meta {} = {:?} in inode {}", key, value, self.id()))
        })
    }

    /// Sets a decimal integer meta value.
    pub fn set_meta_u64(&self, key: &str, value: u64) -> Result<()> {
        let mut map = self.read_meta()?;
        map.insert(key.to_string(), value.to_string());
        self.write_meta(&map)
    }

    /// Returns the file mode bits (stored octal, e.g. `0100644`).
    pub fn mode(&self) -> Result<u32> {
        let map = self.read_meta()?;
        let value = map.get(META_MODE).ok_or_else(|| {
            Error::InvalidFormat(format!("missing meta key \"mode\" in inode {}", self.id()))
        })?;
        u32::from_str_radix(value, 8).map_err(|_| {
            Error::InvalidFormat(format!("meta mode = {:?} in inode {}", value, self.id()))
        })
    }

    /// Sets the file mode bits.
    pub fn set_mode(&self, mode: u32) -> Result<()> {
        let mut map = self.read_meta()?;
        map.insert(META_MODE.to_string(), format!("0{:o}", mode));
        self.write_meta(&map)
    }

    /// Returns the link count.
    pub fn nlink(&self) -> Result<u64> {
        self.meta_u64(META_NLINK)
    }

    /// Increments the link count; used when hard-linking.
    pub(crate) fn bump_nlink(&self) -> Result<()> {
        let nlink = self.nlink()?;
        self.set_meta_u64(META_NLINK, nlink + 1)
    }

    /// Returns the file size in bytes.
    pub fn size(&self) -> Result<u64> {
        self.meta_u64(META_SIZE)
    }

    /// Reads block `n`, or an empty buffer if the block does not exist.
    fn read_block(&self, n: u64) -> Result<Vec<u8>> {
        let key = n.to_string();
        if self.inner.blocks.contains(&key)? {
            self.inner.blocks.get(&key)?.into_blob()?.data()
        } else {
            Ok(Vec::new())
        }
    }

    /// Writes block `n`, creating the block blob on demand.
    fn write_block(&self, n: u64, data: Vec<u8>) -> Result<()> {
        let key = n.to_string();
        let blob = if self.inner.blocks.contains(&key)? {
            self.inner.blocks.get(&key)?.into_blob()?
        } else {
            self.inner.blocks.new_blob(&key)?
        };
        blob.set_data(data);
        Ok(())
    }

    /// Deletes block `n` if it exists.
    fn delete_block(&self, n: u64) -> Result<()> {
        let key = n.to_string();
        if self.inner.blocks.contains(&key)? {
            self.inner.blocks.delete(&key)?;
        }
        Ok(())
    }

    /// Reads up to `length` bytes starting at `offset`.
    ///
    /// The requested range is clamped to the file size; the result is
    /// assembled from the covered blocks, with missing blocks reading as
    /// empty.
    pub fn read_data(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let eof = self.size()?;
        let mut end = offset.saturating_add(length);
        if end > eof {
            end = eof;
            if end <= offset {
                return Ok(Vec::new());
            }
        }

        let first_block = offset / BLOCK_SIZE;
        let last_block = end / BLOCK_SIZE;

        let mut output = Vec::with_capacity((end - offset) as usize);
        for n in first_block..=last_block {
            let block_offset = n * BLOCK_SIZE;

            let fragment_start = if n == first_block {
                (offset - block_offset) as usize
            } else {
                0
            };
            let fragment_end = if n == last_block {
                (end - block_offset) as usize
            } else {
                BLOCK_SIZE as usize
            };

            let block = self.read_block(n)?;
            if block.len() < fragment_end {
                return Err(Error::InvalidFormat(format!(
                    "block {} of inode {} is shorter than expected",
                    n,
                    self.id()
                )));
            }
            output.extend_from_slice(&block[fragment_start..fragment_end]);
        }

        Ok(output)
    }

    /// Read-modify-write of the covered blocks. Requires `offset <= size`.
    fn write_data_inner(&self, data: &[u8], offset: u64) -> Result<()> {
        let current_size = self.size()?;
        let end = offset + data.len() as u64;
        let first_block = offset / BLOCK_SIZE;
        let last_block = end / BLOCK_SIZE;

        for n in first_block..=last_block {
            let block_offset = n * BLOCK_SIZE;

            let insert_start = if n == first_block {
                (offset - block_offset) as usize
            } else {
                0
            };
            let insert_end = if n == last_block {
                (end - block_offset) as usize
            } else {
                BLOCK_SIZE as usize
            };

            let data_start = (block_offset as usize + insert_start) - offset as usize;
            let data_end = (block_offset as usize + insert_end) - offset as usize;
            if data_start == data_end {
                // A block-aligned end lands here with nothing to write;
                // touching the block would create a spurious empty blob.
                continue;
            }

            let mut buffer = self.read_block(n)?;
            let needed = insert_start + (data_end - data_start);
            if buffer.len() < needed {
                buffer.resize(needed, 0);
            }
            buffer[insert_start..needed].copy_from_slice(&data[data_start..data_end]);
            self.write_block(n, buffer)?;
        }

        if end > current_size {
            self.set_meta_u64(META_SIZE, end)?;
        }
        Ok(())
    }

    /// Writes `data` at `offset`, zero-padding first if the offset is past
    /// the end of the file.
    pub fn write_data(&self, sess: &Session, data: &[u8], offset: u64) -> Result<()> {
        if self.size()? < offset {
            self.truncate_inner(offset)?;
        }

        info!(
            inode = self.inner.number,
            bytes = data.len(),
            offset,
            "writing inode data"
        );
        self.write_data_inner(data, offset)?;
        sess.autocommit()
    }

    /// Resizes the file without committing.
    fn truncate_inner(&self, new_size: u64) -> Result<()> {
        let current_size = self.size()?;

        if current_size < new_size {
            // Extend with zeros, one block-sized chunk at a time, so a huge
            // extension never materializes a single contiguous buffer.
            let mut position = current_size;
            while position < new_size {
                let chunk = (BLOCK_SIZE - position % BLOCK_SIZE).min(new_size - position);
                self.write_data_inner(&vec![0u8; chunk as usize], position)?;
                position += chunk;
            }
        } else if current_size > new_size {
            let first_block = new_size / BLOCK_SIZE;
            let last_block = current_size / BLOCK_SIZE;
            let truncate_offset = (new_size % BLOCK_SIZE) as usize;

            for n in first_block..=last_block {
                if n == first_block && truncate_offset > 0 {
                    let old_data = self.read_block(n)?;
                    let keep = old_data[..truncate_offset.min(old_data.len())].to_vec();
                    self.write_block(n, keep)?;
                } else {
                    self.delete_block(n)?;
                }
            }
        }

        self.set_meta_u64(META_SIZE, new_size)
    }

    /// Resizes the file to `new_size`, zero-filling on growth and dropping
    /// out-of-range blocks on shrink.
    pub fn truncate(&self, sess: &Session, new_size: u64) -> Result<()> {
        info!(inode = self.inner.number, new_size, "truncating inode");
        self.truncate_inner(new_size)?;
        sess.autocommit()
    }

    /// Drops one link to this inode.
    ///
    /// Decrements `nlink`; at zero the whole inode subtree is removed from
    /// the inode table and the session's inode cache.
    pub fn unlink(&self, sess: &Session) -> Result<()> {
        info!(inode = self.inner.number, "unlinking inode");

        let nlink = self.nlink()?.saturating_sub(1);
        if nlink > 0 {
            debug!(inode = self.inner.number, nlink, "links remaining");
            self.set_meta_u64(META_NLINK, nlink)?;
        } else {
            debug!(inode = self.inner.number, "no links remaining, removing");
            sess.remove_inode(self.inner.number)?;
        }

        sess.autocommit()
    }
}

/// The inode table: inode number → inode subtree, stored as a TreeTree
/// with prefix `it` keyed by the decimal inode number.
///
/// A weakly-held cache guarantees that two lookups of a live inode yield
/// the same [`Inode`] object, so link-count updates stay consistent.
pub struct InodeTable {
    tt: TreeTree,
    cache: RefCell<HashMap<u64, Weak<InodeInner>>>,
}

impl InodeTable {
    /// Creates the table view over the `inodes` container tree.
    pub fn new(container: StagedTree) -> Self {
        InodeTable {
            tt: TreeTree::new(container, "it"),
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Looks up an inode by number.
    ///
    /// # Returns
    ///
    /// The cached inode while one is live, otherwise a fresh handle over
    /// the stored subtree; `NotFound` if the number is not in the table.
    pub fn get(&self, number: u64) -> Result<Inode> {
        if let Some(weak) = self.cache.borrow().get(&number) {
            if let Some(inner) = weak.upgrade() {
                return Ok(Inode { inner });
            }
        }

        let tree = match self.tt.get(&number.to_string()) {
            Ok(node) => node.into_tree()?,
            Err(Error::NotFound(_)) => {
                return Err(Error::NotFound(format!("inode 'i{}'", number)))
            }
            Err(e) => return Err(e),
        };
        let inode = Inode::from_tree(number, tree);
        self.cache
            .borrow_mut()
            .insert(number, Rc::downgrade(&inode.inner));
        Ok(inode)
    }

    /// Creates the subtree for a new inode with default metadata.
    pub fn create(&self, number: u64) -> Result<Inode> {
        let tree = self.tt.new_tree(&number.to_string())?;
        tree.new_blob("meta")?
            .set_data(DEFAULT_META.as_bytes().to_vec());
        self.get(number)
    }

    /// Returns true if the table holds an inode with this number.
    pub fn contains(&self, number: u64) -> Result<bool> {
        self.tt.contains(&number.to_string())
    }

    /// Removes an inode subtree from the table and evicts the cache entry.
    pub fn remove(&self, number: u64) -> Result<()> {
        self.cache.borrow_mut().remove(&number);
        self.tt.delete(&number.to_string())
    }
}
