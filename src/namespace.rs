//! The directory namespace: path entries over ls-blobs and sub-trees.
//!
//! A directory is a pair of objects. Its ls-blob lists the entries, one
//! line per entry: `QUOTED_NAME SPACE TARGET`, where TARGET is `/` for a
//! subdirectory or an inode id (`i<number>`) for a file. Its sub-tree
//! holds, for each child directory N, the entries `Q(N).ls` and `Q(N).sub`.
//! The root directory's pair lives at the top of the commit tree as
//! `root.ls` / `root.sub`.

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::inode::{parse_inode_id, Inode};
use crate::quoting::{quote, unquote};
use crate::session::Session;
use crate::staged::{StagedBlob, StagedTree};

/// Validates a file or directory name.
///
/// Names must not be empty, `.` or `..`, must not contain `/`, and are
/// limited to 255 bytes.
pub fn check_filename(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.len() > 255 {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Parses ls-blob data into (decoded name, target) pairs.
///
/// Quoted names contain no spaces, so each line splits on its last space.
fn iter_entries(ls_data: &[u8]) -> Result<Vec<(String, String)>> {
    let text = std::str::from_utf8(ls_data).map_err(|_| Error::InvalidUtf8)?;

    let mut entries = Vec::new();
    for line in text.split('\n') {
        if line.is_empty() {
            continue;
        }
        let (qname, target) = line
            .rsplit_once(' ')
            .ok_or_else(|| Error::InvalidFormat(format!("ls line {:?}", line)))?;
        entries.push((unquote(qname)?, target.to_string()));
    }
    Ok(entries)
}

/// A directory entry: either a subdirectory or a file.
pub enum Entry<'s> {
    Dir(Dir<'s>),
    File(File<'s>),
}

impl<'s> Entry<'s> {
    /// Returns true if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, Entry::Dir(_))
    }

    /// Returns a reference to the directory, if this is one.
    pub fn as_dir(&self) -> Option<&Dir<'s>> {
        match self {
            Entry::Dir(d) => Some(d),
            _ => None,
        }
    }

    /// Returns a reference to the file, if this is one.
    pub fn as_file(&self) -> Option<&File<'s>> {
        match self {
            Entry::File(f) => Some(f),
            _ => None,
        }
    }

    /// Consumes the entry, returning the directory or `TypeMismatch`.
    pub fn into_dir(self) -> Result<Dir<'s>> {
        match self {
            Entry::Dir(d) => Ok(d),
            Entry::File(_) => Err(Error::TypeMismatch {
                expected: "directory",
                actual: "file",
            }),
        }
    }

    /// Consumes the entry, returning the file or `TypeMismatch`.
    pub fn into_file(self) -> Result<File<'s>> {
        match self {
            Entry::File(f) => Ok(f),
            Entry::Dir(_) => Err(Error::TypeMismatch {
                expected: "file",
                actual: "directory",
            }),
        }
    }

    /// Returns the entry's path.
    pub fn path(&self) -> String {
        match self {
            Entry::Dir(d) => d.path().to_string(),
            Entry::File(f) => f.path(),
        }
    }
}

/// A directory handle.
///
/// Handles are transient views assembled during path resolution; the
/// underlying staged objects are shared, so concurrently held handles of
/// the same directory observe each other's changes.
#[derive(Clone)]
pub struct Dir<'s> {
    sess: &'s Session,
    name: String,
    path: String,
    ls: StagedBlob,
    sub: StagedTree,
    parent: Option<Box<Dir<'s>>>,
}

impl<'s> Dir<'s> {
    pub(crate) fn new(
        sess: &'s Session,
        name: &str,
        path: &str,
        ls: StagedBlob,
        sub: StagedTree,
        parent: Option<Box<Dir<'s>>>,
    ) -> Self {
        debug!(name, "loaded folder");
        Dir {
            sess,
            name: name.to_string(),
            path: path.to_string(),
            ls,
            sub,
            parent,
        }
    }

    /// Returns the directory's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the directory's path (always `/`-terminated).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the (name, target) pairs from the ls-blob.
    pub fn entries(&self) -> Result<Vec<(String, String)>> {
        iter_entries(&self.ls.data()?)
    }

    /// Returns the entry names in this directory.
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries()?.into_iter().map(|(name, _)| name).collect())
    }

    /// Looks up a child entry by name.
    ///
    /// For a subdirectory, opens its ls-blob and sub-tree under this
    /// directory's sub-tree; a missing sub-tree (repositories written
    /// before nested directories existed) is created on demand and
    /// committed. For a file, resolves the inode through the inode table.
    pub fn get(&self, name: &str) -> Result<Entry<'s>> {
        let target = self
            .entries()?
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, target)| target)
            .ok_or_else(|| Error::NotFound(format!("folder entry {:?}", name)))?;

        if target == "/" {
            let qname = quote(name);
            let child_ls = self.sub.get(&format!("{}.ls", qname))?.into_blob()?;
            let child_sub = match self.sub.get(&format!("{}.sub", qname)) {
                Ok(node) => node.into_tree()?,
                Err(Error::NotFound(_)) => {
                    let tree = self.sub.new_tree(&format!("{}.sub", qname))?;
                    self.sess.autocommit()?;
                    tree
                }
                Err(e) => return Err(e),
            };
            Ok(Entry::Dir(Dir::new(
                self.sess,
                name,
                &format!("{}{}/", self.path, name),
                child_ls,
                child_sub,
                Some(Box::new(self.clone())),
            )))
        } else if let Some(number) = parse_inode_id(&target) {
            let inode = self.sess.get_inode(number)?;
            Ok(Entry::File(File {
                name: name.to_string(),
                inode,
                parent: self.clone(),
            }))
        } else {
            Err(Error::InvalidFormat(format!(
                "ls target {:?} for entry {:?}",
                target, name
            )))
        }
    }

    /// Appends one line to the ls-blob.
    fn append_ls_entry(&self, qname: &str, target: &str) -> Result<()> {
        let mut data = self.ls.data()?;
        data.extend_from_slice(format!("{} {}\n", qname, target).as_bytes());
        self.ls.set_data(data);
        Ok(())
    }

    /// Rewrites the ls-blob without the named entry. Exactly one line must
    /// match.
    fn remove_ls_entry_inner(&self, rm_name: &str) -> Result<()> {
        let mut ls_data = String::new();
        let mut removed_count = 0;
        for (name, target) in self.entries()? {
            if name == rm_name {
                debug!(name = rm_name, path = %self.path, "removing ls entry");
                removed_count += 1;
            } else {
                ls_data.push_str(&format!("{} {}\n", quote(&name), target));
            }
        }

        match removed_count {
            0 => return Err(Error::NotFound(format!("folder entry {:?}", rm_name))),
            1 => {}
            n => {
                return Err(Error::InvalidFormat(format!(
                    "{} ls entries named {:?} in {}",
                    n, rm_name, self.path
                )))
            }
        }

        self.ls.set_data(ls_data.into_bytes());
        Ok(())
    }

    /// Removes the named entry from the ls-blob and commits.
    pub fn remove_ls_entry(&self, rm_name: &str) -> Result<()> {
        self.remove_ls_entry_inner(rm_name)?;
        self.sess.autocommit()
    }

    /// Creates a file named `name` backed by a fresh inode.
    pub fn create_file(&self, name: &str) -> Result<File<'s>> {
        check_filename(name)?;
        info!(name, path = %self.path, "creating file");

        let inode = self.sess.create_inode()?;
        self.append_ls_entry(&quote(name), &inode.id())?;
        self.sess.autocommit()?;

        self.get(name)?.into_file()
    }

    /// Creates a file named `name` hard-linked to `src_file`'s inode.
    pub fn link_file(&self, name: &str, src_file: &File<'_>) -> Result<File<'s>> {
        check_filename(name)?;
        info!(
            name,
            path = %self.path,
            inode = %src_file.inode.id(),
            "linking file to existing inode"
        );

        let inode = src_file.inode.clone();
        inode.bump_nlink()?;
        self.append_ls_entry(&quote(name), &inode.id())?;
        self.sess.autocommit()?;

        self.get(name)?.into_file()
    }

    /// Creates a subdirectory named `name`.
    ///
    /// The child's ls-blob is created empty; its sub-tree is created lazily
    /// at the first nested mkdir.
    pub fn create_directory(&self, name: &str) -> Result<Dir<'s>> {
        check_filename(name)?;
        info!(name, path = %self.path, "creating directory");

        let qname = quote(name);
        self.sub.new_blob(&format!("{}.ls", qname))?;
        self.append_ls_entry(&qname, "/")?;
        self.sess.autocommit()?;

        self.get(name)?.into_dir()
    }

    /// Removes this directory: its ls-blob and sub-tree are deleted from
    /// the parent's sub-tree and its ls entry removed.
    ///
    /// Fails with `NotSupported` on the root directory.
    pub fn unlink(&self) -> Result<()> {
        let parent = self
            .parent
            .as_ref()
            .ok_or_else(|| Error::NotSupported("removing the root directory".to_string()))?;

        info!(path = %self.path, "removing folder");

        self.ls.remove_self()?;
        self.sub.remove_self()?;
        parent.remove_ls_entry_inner(&self.name)?;

        self.sess.autocommit()
    }
}

/// A file handle: a name in a directory bound to an inode.
#[derive(Clone)]
pub struct File<'s> {
    name: String,
    inode: Inode,
    parent: Dir<'s>,
}

impl File<'_> {
    /// Returns the file's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the file's path.
    pub fn path(&self) -> String {
        format!("{}{}", self.parent.path, self.name)
    }

    /// Returns the backing inode.
    pub fn inode(&self) -> &Inode {
        &self.inode
    }

    /// Returns the file size in bytes.
    pub fn size(&self) -> Result<u64> {
        self.inode.size()
    }

    /// Reads up to `length` bytes at `offset`, clamped to the file size.
    pub fn read_data(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        self.inode.read_data(offset, length)
    }

    /// Reads the whole file.
    pub fn data(&self) -> Result<Vec<u8>> {
        self.read_data(0, self.size()?)
    }

    /// Writes `data` at `offset`.
    pub fn write_data(&self, data: &[u8], offset: u64) -> Result<()> {
        self.inode.write_data(self.parent.sess, data, offset)
    }

    /// Resizes the file to `new_size`.
    pub fn truncate(&self, new_size: u64) -> Result<()> {
        self.inode.truncate(self.parent.sess, new_size)
    }

    /// Removes this file's directory entry and drops its inode link.
    pub fn unlink(&self) -> Result<()> {
        info!(path = %self.path(), "unlinking file");
        self.parent.remove_ls_entry_inner(&self.name)?;
        self.inode.unlink(self.parent.sess)
    }
}
