//! Object types (blob, tree, commit) and the loose object store.

pub mod commit;
pub mod oid;
pub mod store;
pub mod tree;

pub use commit::{Commit, Signature};
pub use oid::Oid;
pub use store::{LooseObjectStore, ObjectType, RawObject};
pub use tree::{FileMode, Tree, TreeEntry};
