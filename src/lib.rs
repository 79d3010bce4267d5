//! # spaghettifs
//!
//! A POSIX filesystem whose backing store is a bare Git-style repository.
//!
//! Every mutation publishes a new root tree, so the filesystem's history is
//! a linear sequence of commits on a branch that external `git` tooling can
//! read. File contents live in 64 KiB block blobs indexed per inode by a
//! digit-keyed trie of trees; directories are (listing blob, sub-tree)
//! pairs; an inode table decoupled from the namespace supports hard links.
//!
//! ## Quick Start
//!
//! ```no_run
//! use spaghettifs::{Result, Session};
//!
//! fn main() -> Result<()> {
//!     // Initialize an empty filesystem repository
//!     let sess = Session::create("path/to/repo.sfs")?;
//!
//!     // Create and write a file; autocommit publishes each step
//!     let root = sess.get_root()?;
//!     let file = root.create_file("hello.txt")?;
//!     file.write_data(b"hello git!", 0)?;
//!
//!     // Read it back
//!     assert_eq!(file.data()?, b"hello git!");
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`error`] - Error types and Result alias
//! - [`repository`] - Bare repository: objects and branch refs
//! - [`objects`] - Object types (blob, tree, commit)
//! - [`staged`] - Mutable overlays over immutable objects
//! - [`treetree`] - Digit-keyed trie for sparse integer-keyed maps
//! - [`namespace`] - Directories and files over ls-blobs and sub-trees
//! - [`inode`] - Per-file metadata and block storage
//! - [`session`] - Open repository sessions and commit batching
//! - [`filesystem`] - Dispatcher core operations and the mount protocol
//! - [`migrations`] - Storage format upgrades
//! - [`fsck`] - Consistency checking

pub mod error;
pub mod features;
pub mod filesystem;
pub mod fsck;
pub mod inode;
pub mod log;
pub mod migrations;
pub mod namespace;
pub mod objects;
pub mod quoting;
pub mod refs;
pub mod repository;
pub mod session;
pub mod staged;
pub mod treetree;

// Internal modules (not part of public API)
pub(crate) mod infra;

// Re-export primary types for convenient access
pub use error::{Error, Result};
pub use filesystem::{MountedFs, SpaghettiFs};
pub use repository::Repository;
pub use session::Session;

// Re-export object types
pub use objects::{Commit, FileMode, Oid, Signature, Tree};

// Re-export storage-layer types
pub use inode::{Inode, InodeTable, BLOCK_SIZE};
pub use namespace::{Dir, Entry, File};
pub use staged::{Node, StagedBlob, StagedTree};
pub use treetree::TreeTree;
