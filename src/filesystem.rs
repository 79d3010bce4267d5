//! The filesystem dispatcher: core operations behind one process-wide lock,
//! plus the mounted-session commit protocol.
//!
//! A kernel shim (FUSE or otherwise) drives these path-based operations;
//! every call holds the dispatcher lock for its full duration, so observers
//! see reads and writes strictly serialized. Errors are translated to POSIX
//! errnos at this boundary.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::namespace::Entry;
use crate::session::{Session, DEFAULT_BRANCH};

/// Bytes of buffered writes that trigger an amended commit on `mounted`.
///
/// A commit per kernel write would dominate the cost of small writes; the
/// buffer bounds how much the live branch can lag the in-memory state.
pub const WRITE_BUFFER_SIZE: usize = 3 * 1024 * 1024;

/// The temporary branch carrying buffered commits while mounted.
pub const MOUNTED_BRANCH: &str = "mounted";

/// Timestamp format used in mount commit messages.
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Attributes returned by [`SpaghettiFs::getattr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttr {
    /// File type and permission bits.
    pub mode: u32,
    /// Link count.
    pub nlink: u32,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Access time; always "now".
    pub atime: SystemTime,
    /// Modification time; always "now".
    pub mtime: SystemTime,
    /// Change time; always "now".
    pub ctime: SystemTime,
}

/// Translates an error into the POSIX errno the dispatcher reports.
pub fn errno(err: &Error) -> i32 {
    match err {
        Error::NotFound(_)
        | Error::ObjectNotFound(_)
        | Error::PathNotFound(_)
        | Error::RefNotFound(_) => libc::ENOENT,
        Error::NotSupported(_) | Error::TypeMismatch { .. } => libc::EPERM,
        Error::InvalidName(_) => libc::EINVAL,
        Error::AlreadyExists(_) => libc::EEXIST,
        _ => libc::EIO,
    }
}

/// Splits a path into its parent path and final component.
fn split_parent(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => ("/", &trimmed[1..]),
        Some(i) => (&trimmed[..i], &trimmed[i + 1..]),
        None => ("/", trimmed),
    }
}

struct FsState {
    sess: Session,
    write_count: usize,
}

/// The dispatcher core.
///
/// The session and staged overlay are not thread-safe, so a single mutex
/// serializes every request; fine-grained locking would buy nothing for a
/// single mount and multiply the complexity.
pub struct SpaghettiFs {
    state: Mutex<FsState>,
}

impl SpaghettiFs {
    /// Wraps an open session.
    pub fn new(sess: Session) -> Self {
        SpaghettiFs {
            state: Mutex::new(FsState {
                sess,
                write_count: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FsState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Checks that a path resolves.
    pub fn lookup(&self, path: &str) -> Result<()> {
        let state = self.lock();
        state.sess.resolve(path)?;
        Ok(())
    }

    /// Returns the attributes of the object at `path`.
    ///
    /// Directories report `S_IFDIR | 0755` with two links; files report
    /// `S_IFREG | 0444` with the inode's link count and size. All
    /// timestamps are the current time.
    pub fn getattr(&self, path: &str) -> Result<FileAttr> {
        let state = self.lock();
        let now = SystemTime::now();

        let attr = match state.sess.resolve(path)? {
            Entry::Dir(_) => FileAttr {
                mode: libc::S_IFDIR as u32 | 0o755,
                nlink: 2,
                size: 0,
                atime: now,
                mtime: now,
                ctime: now,
            },
            Entry::File(file) => FileAttr {
                mode: libc::S_IFREG as u32 | 0o444,
                nlink: file.inode().nlink()? as u32,
                size: file.size()?,
                atime: now,
                mtime: now,
                ctime: now,
            },
        };
        Ok(attr)
    }

    /// Lists a directory, including the `.` and `..` entries.
    pub fn readdir(&self, path: &str) -> Result<Vec<String>> {
        let state = self.lock();
        let dir = state.sess.resolve(path)?.into_dir()?;

        let mut names = vec![".".to_string(), "..".to_string()];
        names.extend(dir.keys()?);
        Ok(names)
    }

    /// Reads up to `size` bytes at `offset` from the file at `path`.
    pub fn read(&self, path: &str, size: u64, offset: u64) -> Result<Vec<u8>> {
        let state = self.lock();
        let file = state.sess.resolve(path)?.into_file()?;
        file.read_data(offset, size)
    }

    /// Writes `data` at `offset` into the file at `path`.
    ///
    /// In a buffered (non-autocommit) session, every `WRITE_BUFFER_SIZE`
    /// bytes of accumulated writes amend the `mounted` branch so the live
    /// branch keeps tracking the visible namespace.
    ///
    /// # Returns
    ///
    /// The number of bytes written.
    pub fn write(&self, path: &str, data: &[u8], offset: u64) -> Result<usize> {
        let mut state = self.lock();
        {
            let file = state.sess.resolve(path)?.into_file()?;
            file.write_data(data, offset)?;
        }

        if !state.sess.is_autocommit() {
            state.write_count += data.len();
            if state.write_count > WRITE_BUFFER_SIZE {
                debug!(
                    buffered = state.write_count,
                    "write buffer full, amending mounted branch"
                );
                state.sess.amend(MOUNTED_BRANCH)?;
                state.write_count = 0;
            }
        }

        Ok(data.len())
    }

    /// Resizes the file at `path` to `length` bytes.
    pub fn truncate(&self, path: &str, length: u64) -> Result<()> {
        let state = self.lock();
        let file = state.sess.resolve(path)?.into_file()?;
        file.truncate(length)
    }

    /// Creates a file. The mode is accepted for the dispatcher contract
    /// but new inodes always start with the default metadata.
    pub fn create(&self, path: &str, _mode: u32) -> Result<()> {
        let state = self.lock();
        let (parent_path, name) = split_parent(path);
        let parent = state.sess.resolve(parent_path)?.into_dir()?;
        parent.create_file(name)?;
        Ok(())
    }

    /// Creates a directory.
    pub fn mkdir(&self, path: &str) -> Result<()> {
        let state = self.lock();
        let (parent_path, name) = split_parent(path);
        let parent = state.sess.resolve(parent_path)?.into_dir()?;
        parent.create_directory(name)?;
        Ok(())
    }

    /// Removes the file at `path`.
    pub fn unlink(&self, path: &str) -> Result<()> {
        let state = self.lock();
        let file = state.sess.resolve(path)?.into_file()?;
        file.unlink()
    }

    /// Removes the directory at `path`.
    pub fn rmdir(&self, path: &str) -> Result<()> {
        let state = self.lock();
        let dir = state.sess.resolve(path)?.into_dir()?;
        dir.unlink()
    }

    /// Creates `target` as a hard link to the file at `source`.
    pub fn link(&self, target: &str, source: &str) -> Result<()> {
        let state = self.lock();
        let source_file = state.sess.resolve(source)?.into_file()?;
        let (parent_path, name) = split_parent(target);
        let parent = state.sess.resolve(parent_path)?.into_dir()?;
        parent.link_file(name, &source_file)?;
        Ok(())
    }

    /// Renames a file, as a hard link to the new name followed by an
    /// unlink of the old one. Directory renames are not supported.
    pub fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        let state = self.lock();
        if old_path == new_path {
            return Ok(());
        }

        let file = match state.sess.resolve(old_path)? {
            Entry::File(f) => f,
            Entry::Dir(_) => {
                return Err(Error::NotSupported("renaming a directory".to_string()));
            }
        };

        let (parent_path, name) = split_parent(new_path);
        let parent = state.sess.resolve(parent_path)?.into_dir()?;

        // An existing destination is replaced, as POSIX rename does
        match parent.get(name) {
            Ok(Entry::File(existing)) => existing.unlink()?,
            Ok(Entry::Dir(_)) => {
                return Err(Error::NotSupported(
                    "renaming over a directory".to_string(),
                ));
            }
            Err(Error::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        parent.link_file(name, &file)?;
        file.unlink()
    }
}

/// A mounted session: the buffered-commit protocol around a dispatcher.
///
/// On mount, a temporary commit is published on the `mounted` branch,
/// parented on `master`'s head. While mounted, write flushes amend that
/// commit. On unmount, a summary commit advances `master` and the
/// `mounted` ref is deleted.
pub struct MountedFs {
    fs: SpaghettiFs,
    mounted_at: DateTime<Local>,
}

impl MountedFs {
    /// Opens a repository for a mount.
    ///
    /// # Arguments
    ///
    /// * `repo_path` - The repository directory.
    pub fn open<P: AsRef<Path>>(repo_path: P) -> Result<MountedFs> {
        let sess = Session::open(repo_path, false)?;
        let mounted_at = Local::now();

        let master_head = sess.repo().head_id(DEFAULT_BRANCH)?;
        let message = format!(
            "[temporary commit; currently mounted, since {}]",
            mounted_at.format(DATE_FORMAT)
        );
        sess.commit_to(&message, MOUNTED_BRANCH, master_head)?;

        info!(mounted_at = %mounted_at.format(DATE_FORMAT), "mounted");
        Ok(MountedFs {
            fs: SpaghettiFs::new(sess),
            mounted_at,
        })
    }

    /// Returns the dispatcher.
    pub fn fs(&self) -> &SpaghettiFs {
        &self.fs
    }

    /// Finishes the mounted session.
    ///
    /// Publishes the summary commit on `master` and deletes the `mounted`
    /// branch ref.
    pub fn unmount(self) -> Result<()> {
        let unmounted_at = Local::now();
        let message = format!(
            "Mounted operations:\n  mounted at {}\n  unmounted at {}\n",
            self.mounted_at.format(DATE_FORMAT),
            unmounted_at.format(DATE_FORMAT)
        );

        let state = self
            .fs
            .state
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.sess.commit(&message)?;
        state.sess.repo().delete_branch(MOUNTED_BRANCH)?;

        info!(unmounted_at = %unmounted_at.format(DATE_FORMAT), "unmounted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // D-001: split_parent handles roots, nesting and trailing slashes
    #[test]
    fn test_split_parent() {
        assert_eq!(split_parent("/a.txt"), ("/", "a.txt"));
        assert_eq!(split_parent("/b/c/d.txt"), ("/b/c", "d.txt"));
        assert_eq!(split_parent("/b/c/"), ("/b", "c"));
        assert_eq!(split_parent("/"), ("/", ""));
    }

    // D-002: errno mapping follows the dispatcher contract
    #[test]
    fn test_errno() {
        assert_eq!(errno(&Error::NotFound("x".into())), libc::ENOENT);
        assert_eq!(
            errno(&Error::NotSupported("rename directory".into())),
            libc::EPERM
        );
        assert_eq!(errno(&Error::InvalidName("..".into())), libc::EINVAL);
        assert_eq!(errno(&Error::AlreadyExists("x".into())), libc::EEXIST);
        assert_eq!(errno(&Error::InvalidUtf8), libc::EIO);
        assert_eq!(
            errno(&Error::TypeMismatch {
                expected: "file",
                actual: "directory"
            }),
            libc::EPERM
        );
    }
}
