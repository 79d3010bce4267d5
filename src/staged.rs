//! Staged objects: mutable in-memory overlays over immutable store objects.
//!
//! A staged tree wraps a committed tree object and accumulates changes in a
//! dirty map; a staged blob owns a lazily-loaded byte buffer. Nothing is
//! written to the object store until [`StagedTree::commit`] materializes the
//! dirty spines into new immutable objects.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::mem;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::error::{Error, Result};
use crate::objects::{FileMode, ObjectType, Oid, Tree};
use crate::repository::Repository;

type TreeHandle = Rc<RefCell<TreeInner>>;
type BlobHandle = Rc<RefCell<BlobInner>>;

/// A staged child entry: either a live staged object or the removal sentinel.
enum DirtyEntry {
    Staged(Node),
    Removed,
}

/// Weak reference to a staged child, held by the parent's cache.
enum WeakNode {
    Tree(Weak<RefCell<TreeInner>>),
    Blob(Weak<RefCell<BlobInner>>),
}

impl WeakNode {
    fn upgrade(&self) -> Option<Node> {
        match self {
            WeakNode::Tree(w) => w.upgrade().map(|inner| Node::Tree(StagedTree { inner })),
            WeakNode::Blob(w) => w.upgrade().map(|inner| Node::Blob(StagedBlob { inner })),
        }
    }
}

struct TreeInner {
    repo: Rc<Repository>,
    name: String,
    /// Committed object id; `None` for a freshly created tree.
    oid: Option<Oid>,
    /// Weak back-pointer; owning the parent would create a cycle.
    parent: Option<Weak<RefCell<TreeInner>>>,
    /// The committed tree object, loaded lazily from the store.
    committed: Option<Tree>,
    dirty: BTreeMap<String, DirtyEntry>,
    /// Weakly-held children, so two lookups of a live name yield the same
    /// object identity.
    cache: HashMap<String, WeakNode>,
    /// Set when this node is on a dirty spine and must be rewritten.
    needs_commit: bool,
    ctx_depth: u32,
}

struct BlobInner {
    repo: Rc<Repository>,
    name: String,
    oid: Option<Oid>,
    parent: Option<Weak<RefCell<TreeInner>>>,
    /// The byte buffer, loaded lazily from the store.
    data: Option<Vec<u8>>,
    dirty: bool,
    ctx_depth: u32,
}

/// A staged (mutable, in-memory) tree.
///
/// Cloning is cheap: clones share the same underlying staged node.
#[derive(Clone)]
pub struct StagedTree {
    inner: TreeHandle,
}

/// A staged (mutable, in-memory) blob.
#[derive(Clone)]
pub struct StagedBlob {
    inner: BlobHandle,
}

/// A staged child: trees and blobs are the two kinds of entry a tree holds.
#[derive(Clone)]
pub enum Node {
    Tree(StagedTree),
    Blob(StagedBlob),
}

impl Node {
    /// Returns the object type of this node.
    pub fn kind(&self) -> ObjectType {
        match self {
            Node::Tree(_) => ObjectType::Tree,
            Node::Blob(_) => ObjectType::Blob,
        }
    }

    /// Returns a reference to the inner tree, if this is a tree.
    pub fn as_tree(&self) -> Option<&StagedTree> {
        match self {
            Node::Tree(t) => Some(t),
            _ => None,
        }
    }

    /// Returns a reference to the inner blob, if this is a blob.
    pub fn as_blob(&self) -> Option<&StagedBlob> {
        match self {
            Node::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Consumes the node, returning the tree or a `TypeMismatch` error.
    pub fn into_tree(self) -> Result<StagedTree> {
        match self {
            Node::Tree(t) => Ok(t),
            Node::Blob(_) => Err(Error::TypeMismatch {
                expected: "tree",
                actual: "blob",
            }),
        }
    }

    /// Consumes the node, returning the blob or a `TypeMismatch` error.
    pub fn into_blob(self) -> Result<StagedBlob> {
        match self {
            Node::Blob(b) => Ok(b),
            Node::Tree(_) => Err(Error::TypeMismatch {
                expected: "blob",
                actual: "tree",
            }),
        }
    }

    /// Returns the committed object id, if this node has one.
    pub fn object_id(&self) -> Option<Oid> {
        match self {
            Node::Tree(t) => t.object_id(),
            Node::Blob(b) => b.object_id(),
        }
    }

    fn downgrade(&self) -> WeakNode {
        match self {
            Node::Tree(t) => WeakNode::Tree(Rc::downgrade(&t.inner)),
            Node::Blob(b) => WeakNode::Blob(Rc::downgrade(&b.inner)),
        }
    }

    pub(crate) fn commit(&self) -> Result<Oid> {
        match self {
            Node::Tree(t) => t.commit(),
            Node::Blob(b) => b.commit(),
        }
    }
}

/// Guard for a nested mutation scope; the depth counter is decremented on
/// every exit path when the guard drops.
pub struct Scope {
    node: ScopeNode,
}

enum ScopeNode {
    Tree(TreeHandle),
    Blob(BlobHandle),
}

impl Drop for Scope {
    fn drop(&mut self) {
        match &self.node {
            ScopeNode::Tree(h) => {
                let mut inner = h.borrow_mut();
                debug_assert!(inner.ctx_depth > 0, "unbalanced scope exit");
                inner.ctx_depth = inner.ctx_depth.saturating_sub(1);
            }
            ScopeNode::Blob(h) => {
                let mut inner = h.borrow_mut();
                debug_assert!(inner.ctx_depth > 0, "unbalanced scope exit");
                inner.ctx_depth = inner.ctx_depth.saturating_sub(1);
            }
        }
    }
}

/// Marks a tree and its ancestors as needing a rewrite, wiring each node
/// into its parent's dirty map. Stops at the first node already marked this
/// commit cycle, so repeated mutations propagate only once.
fn propagate_dirty(tree: &TreeHandle) {
    let mut current = tree.clone();
    loop {
        {
            let mut inner = current.borrow_mut();
            if inner.needs_commit {
                break;
            }
            inner.needs_commit = true;
        }

        let parent = current.borrow().parent.as_ref().and_then(|w| w.upgrade());
        let Some(parent) = parent else { break };

        let name = current.borrow().name.clone();
        parent
            .borrow_mut()
            .dirty
            .entry(name)
            .or_insert_with(|| {
                DirtyEntry::Staged(Node::Tree(StagedTree {
                    inner: current.clone(),
                }))
            });
        current = parent;
    }
}

impl StagedTree {
    /// Creates the root staged tree over a committed tree object.
    ///
    /// # Arguments
    ///
    /// * `repo` - The backing object store.
    /// * `oid` - The committed root tree id, or `None` for a fresh root.
    pub fn root(repo: Rc<Repository>, oid: Option<Oid>) -> Self {
        StagedTree {
            inner: Rc::new(RefCell::new(TreeInner {
                repo,
                name: String::new(),
                oid,
                parent: None,
                committed: None,
                dirty: BTreeMap::new(),
                cache: HashMap::new(),
                needs_commit: false,
                ctx_depth: 0,
            })),
        }
    }

    fn attached(
        repo: Rc<Repository>,
        name: &str,
        oid: Option<Oid>,
        parent: &TreeHandle,
    ) -> Self {
        StagedTree {
            inner: Rc::new(RefCell::new(TreeInner {
                repo,
                name: name.to_string(),
                oid,
                parent: Some(Rc::downgrade(parent)),
                committed: None,
                dirty: BTreeMap::new(),
                cache: HashMap::new(),
                needs_commit: false,
                ctx_depth: 0,
            })),
        }
    }

    /// Returns this node's entry name in its parent.
    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    /// Returns the committed object id, or `None` if never committed.
    pub fn object_id(&self) -> Option<Oid> {
        self.inner.borrow().oid
    }

    /// Returns true if the two handles refer to the same staged node.
    pub fn ptr_eq(&self, other: &StagedTree) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Enters a nested mutation scope.
    ///
    /// Scopes may nest freely; independent of depth, nothing is flushed to
    /// the object store until [`StagedTree::commit`].
    pub fn scope(&self) -> Scope {
        self.inner.borrow_mut().ctx_depth += 1;
        Scope {
            node: ScopeNode::Tree(self.inner.clone()),
        }
    }

    /// Returns the current scope nesting depth.
    pub fn scope_depth(&self) -> u32 {
        self.inner.borrow().ctx_depth
    }

    /// Ensures the committed tree object is loaded.
    fn load_committed(&self) -> Result<()> {
        let oid = {
            let inner = self.inner.borrow();
            if inner.committed.is_some() {
                return Ok(());
            }
            inner.oid
        };

        let tree = match oid {
            Some(oid) => {
                trace!(name = %self.name(), oid = %oid.short(), "loading committed tree");
                self.inner.borrow().repo.read_tree(&oid)?
            }
            None => Tree::new(),
        };
        self.inner.borrow_mut().committed = Some(tree);
        Ok(())
    }

    /// Returns true if `name` resolves in the staged view (dirty additions
    /// shadow the committed tree; removals hide it).
    pub fn contains(&self, name: &str) -> Result<bool> {
        {
            let inner = self.inner.borrow();
            match inner.dirty.get(name) {
                Some(DirtyEntry::Staged(_)) => return Ok(true),
                Some(DirtyEntry::Removed) => return Ok(false),
                None => {}
            }
        }
        self.load_committed()?;
        let inner = self.inner.borrow();
        Ok(inner
            .committed
            .as_ref()
            .map(|t| t.contains(name))
            .unwrap_or(false))
    }

    fn ensure_absent(&self, name: &str) -> Result<()> {
        if self.contains(name)? {
            return Err(Error::AlreadyExists(format!("'{}'", name)));
        }
        Ok(())
    }

    /// Looks up a child by name.
    ///
    /// Removed names and absent names fail with `NotFound`. While a child
    /// handle is live, repeated lookups return the same object identity.
    pub fn get(&self, name: &str) -> Result<Node> {
        {
            let inner = self.inner.borrow();
            match inner.dirty.get(name) {
                Some(DirtyEntry::Removed) => {
                    return Err(Error::NotFound(format!("'{}'", name)));
                }
                Some(DirtyEntry::Staged(node)) => return Ok(node.clone()),
                None => {}
            }
            if let Some(weak) = inner.cache.get(name) {
                if let Some(node) = weak.upgrade() {
                    return Ok(node);
                }
            }
        }

        self.load_committed()?;
        let entry = {
            let inner = self.inner.borrow();
            inner.committed.as_ref().and_then(|t| t.get(name).cloned())
        };
        let entry = entry.ok_or_else(|| Error::NotFound(format!("'{}'", name)))?;

        let repo = self.inner.borrow().repo.clone();
        let node = match entry.mode {
            FileMode::Regular => Node::Blob(StagedBlob::attached(
                repo,
                name,
                Some(entry.oid),
                &self.inner,
            )),
            FileMode::Directory => {
                Node::Tree(StagedTree::attached(repo, name, Some(entry.oid), &self.inner))
            }
        };

        self.inner
            .borrow_mut()
            .cache
            .insert(name.to_string(), node.downgrade());
        Ok(node)
    }

    /// Creates and stages an empty subtree.
    ///
    /// # Arguments
    ///
    /// * `name` - The entry name; fails with `AlreadyExists` on collision.
    pub fn new_tree(&self, name: &str) -> Result<StagedTree> {
        self.ensure_absent(name)?;

        let repo = self.inner.borrow().repo.clone();
        let child = StagedTree::attached(repo, name, None, &self.inner);
        let node = Node::Tree(child.clone());

        {
            let mut inner = self.inner.borrow_mut();
            inner.cache.insert(name.to_string(), node.downgrade());
            inner.dirty.insert(name.to_string(), DirtyEntry::Staged(node));
        }
        propagate_dirty(&self.inner);

        Ok(child)
    }

    /// Creates and stages an empty blob.
    ///
    /// # Arguments
    ///
    /// * `name` - The entry name; fails with `AlreadyExists` on collision.
    pub fn new_blob(&self, name: &str) -> Result<StagedBlob> {
        self.ensure_absent(name)?;

        let repo = self.inner.borrow().repo.clone();
        let child = StagedBlob::fresh(repo, name, &self.inner);
        let node = Node::Blob(child.clone());

        {
            let mut inner = self.inner.borrow_mut();
            inner.cache.insert(name.to_string(), node.downgrade());
            inner.dirty.insert(name.to_string(), DirtyEntry::Staged(node));
        }
        propagate_dirty(&self.inner);

        Ok(child)
    }

    /// Stages an existing object under a new name.
    ///
    /// Blobs are attached by copying their bytes; trees by their committed
    /// object id (attaching a never-committed tree is not supported).
    ///
    /// # Arguments
    ///
    /// * `name` - The entry name; fails with `AlreadyExists` on collision.
    /// * `source` - The object to attach.
    pub fn attach(&self, name: &str, source: &Node) -> Result<Node> {
        self.ensure_absent(name)?;

        let repo = self.inner.borrow().repo.clone();
        let node = match source {
            Node::Blob(blob) => {
                let data = blob.data()?;
                let child = StagedBlob::fresh(repo, name, &self.inner);
                child.set_data(data);
                Node::Blob(child)
            }
            Node::Tree(tree) => {
                let oid = tree.object_id().ok_or_else(|| {
                    Error::NotSupported("attaching an uncommitted tree".to_string())
                })?;
                Node::Tree(StagedTree::attached(repo, name, Some(oid), &self.inner))
            }
        };

        {
            let mut inner = self.inner.borrow_mut();
            inner.cache.insert(name.to_string(), node.downgrade());
            inner
                .dirty
                .insert(name.to_string(), DirtyEntry::Staged(node.clone()));
        }
        propagate_dirty(&self.inner);

        Ok(node)
    }

    /// Marks a child as removed.
    ///
    /// # Arguments
    ///
    /// * `name` - The entry name; fails with `NotFound` if absent.
    pub fn delete(&self, name: &str) -> Result<()> {
        if !self.contains(name)? {
            return Err(Error::NotFound(format!("'{}'", name)));
        }

        {
            let mut inner = self.inner.borrow_mut();
            inner.dirty.insert(name.to_string(), DirtyEntry::Removed);
            inner.cache.remove(name);
        }
        propagate_dirty(&self.inner);

        Ok(())
    }

    /// Removes this node from its parent.
    pub fn remove_self(&self) -> Result<()> {
        let (parent, name) = {
            let inner = self.inner.borrow();
            (
                inner.parent.as_ref().and_then(|w| w.upgrade()),
                inner.name.clone(),
            )
        };
        let parent = parent
            .ok_or_else(|| Error::NotSupported("removing the root tree".to_string()))?;
        StagedTree { inner: parent }.delete(&name)
    }

    /// Returns the visible entry names: committed entries plus dirty
    /// additions, minus dirty removals.
    pub fn keys(&self) -> Result<Vec<String>> {
        self.load_committed()?;
        let inner = self.inner.borrow();

        let mut names = BTreeSet::new();
        if let Some(committed) = &inner.committed {
            for (name, _) in committed.iter() {
                names.insert(name.clone());
            }
        }
        for (name, entry) in &inner.dirty {
            match entry {
                DirtyEntry::Staged(_) => {
                    names.insert(name.clone());
                }
                DirtyEntry::Removed => {
                    names.remove(name);
                }
            }
        }
        Ok(names.into_iter().collect())
    }

    /// Writes dirty spines to the object store and returns this tree's new
    /// object id.
    ///
    /// Depth-first over the dirty map: each dirty child is committed to get
    /// its new id, the in-memory tree object is updated (removed entries
    /// deleted), then the tree itself is written. Clean subtrees are never
    /// rewritten.
    pub fn commit(&self) -> Result<Oid> {
        {
            let inner = self.inner.borrow();
            if !inner.needs_commit {
                if let Some(oid) = inner.oid {
                    return Ok(oid);
                }
            }
        }

        self.load_committed()?;
        let mut tree = {
            let mut inner = self.inner.borrow_mut();
            inner.committed.take().unwrap_or_default()
        };
        let dirty = {
            let mut inner = self.inner.borrow_mut();
            mem::take(&mut inner.dirty)
        };

        for (name, entry) in dirty {
            match entry {
                DirtyEntry::Removed => {
                    tree.remove(&name);
                }
                DirtyEntry::Staged(node) => {
                    let child_oid = node.commit()?;
                    let mode = match node.kind() {
                        ObjectType::Blob => FileMode::Regular,
                        _ => FileMode::Directory,
                    };
                    tree.insert(name, mode, child_oid);
                }
            }
        }

        let repo = self.inner.borrow().repo.clone();
        let oid = repo.write_tree(&tree)?;

        let mut inner = self.inner.borrow_mut();
        inner.committed = Some(tree);
        inner.oid = Some(oid);
        inner.needs_commit = false;

        Ok(oid)
    }
}

impl StagedBlob {
    fn fresh(repo: Rc<Repository>, name: &str, parent: &TreeHandle) -> Self {
        StagedBlob {
            inner: Rc::new(RefCell::new(BlobInner {
                repo,
                name: name.to_string(),
                oid: None,
                parent: Some(Rc::downgrade(parent)),
                data: Some(Vec::new()),
                dirty: true,
                ctx_depth: 0,
            })),
        }
    }

    fn attached(
        repo: Rc<Repository>,
        name: &str,
        oid: Option<Oid>,
        parent: &TreeHandle,
    ) -> Self {
        StagedBlob {
            inner: Rc::new(RefCell::new(BlobInner {
                repo,
                name: name.to_string(),
                oid,
                parent: Some(Rc::downgrade(parent)),
                data: None,
                dirty: false,
                ctx_depth: 0,
            })),
        }
    }

    /// Returns this node's entry name in its parent.
    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    /// Returns the committed object id, or `None` if never committed.
    pub fn object_id(&self) -> Option<Oid> {
        self.inner.borrow().oid
    }

    /// Returns true if the two handles refer to the same staged node.
    pub fn ptr_eq(&self, other: &StagedBlob) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Enters a nested mutation scope.
    pub fn scope(&self) -> Scope {
        self.inner.borrow_mut().ctx_depth += 1;
        Scope {
            node: ScopeNode::Blob(self.inner.clone()),
        }
    }

    /// Returns the current scope nesting depth.
    pub fn scope_depth(&self) -> u32 {
        self.inner.borrow().ctx_depth
    }

    /// Returns the blob's current byte buffer, loading it from the store on
    /// first access.
    pub fn data(&self) -> Result<Vec<u8>> {
        {
            let inner = self.inner.borrow();
            if let Some(data) = &inner.data {
                return Ok(data.clone());
            }
        }

        let (repo, oid) = {
            let inner = self.inner.borrow();
            (inner.repo.clone(), inner.oid)
        };
        let data = match oid {
            Some(oid) => repo.read_blob(&oid)?,
            None => Vec::new(),
        };
        self.inner.borrow_mut().data = Some(data.clone());
        Ok(data)
    }

    /// Replaces the blob's byte buffer, marking it dirty.
    pub fn set_data(&self, data: Vec<u8>) {
        let was_dirty = {
            let mut inner = self.inner.borrow_mut();
            let was = inner.dirty;
            inner.data = Some(data);
            inner.dirty = true;
            was
        };

        if !was_dirty {
            let parent = self.inner.borrow().parent.as_ref().and_then(|w| w.upgrade());
            if let Some(parent) = parent {
                let name = self.inner.borrow().name.clone();
                parent.borrow_mut().dirty.entry(name).or_insert_with(|| {
                    DirtyEntry::Staged(Node::Blob(self.clone()))
                });
                propagate_dirty(&parent);
            }
        }
    }

    /// Removes this node from its parent.
    pub fn remove_self(&self) -> Result<()> {
        let (parent, name) = {
            let inner = self.inner.borrow();
            (
                inner.parent.as_ref().and_then(|w| w.upgrade()),
                inner.name.clone(),
            )
        };
        let parent = parent
            .ok_or_else(|| Error::NotSupported("removing a detached blob".to_string()))?;
        StagedTree { inner: parent }.delete(&name)
    }

    /// Writes the buffer as a new blob object if dirty; returns the id.
    pub(crate) fn commit(&self) -> Result<Oid> {
        {
            let inner = self.inner.borrow();
            if !inner.dirty {
                if let Some(oid) = inner.oid {
                    return Ok(oid);
                }
            }
        }

        let data = self.data()?;
        let repo = self.inner.borrow().repo.clone();
        let oid = repo.write_blob(&data)?;

        let mut inner = self.inner.borrow_mut();
        inner.oid = Some(oid);
        inner.dirty = false;
        Ok(oid)
    }
}
