//! # Copy-on-Write Tree Operations
//!
//! This module implements the tree itself: lookup, insert, and delete
//! over nodes held in a [`PageStore`].
//!
//! ## Mutation Shape
//!
//! Both mutations follow the same recursive pattern. The recursion
//! descends to the slot the key belongs to, rebuilds that node into a
//! fresh buffer, and hands the result back up; each parent then splices
//! fresh links to the rebuilt child into its own fresh copy. Page
//! traffic is strictly ordered: replacement pages are allocated before
//! the pages they replace are freed, leaf to root, so an interrupted
//! walk of the old root never observes a freed page.
//!
//! ```text
//! insert:  descend -> rebuild leaf (may grow) -> split3 -> relink
//! delete:  descend -> rebuild leaf (shrinks)  -> merge? -> relink
//! ```
//!
//! ## Root Transitions
//!
//! - First insert materializes a leaf root seeded with the empty
//!   sentinel key, so later lookups always land in a containing slot.
//! - An insert that splits the root grows the tree by one level: the
//!   new root is an internal node with one link per split part.
//! - A delete that leaves the root with a single child shrinks the
//!   tree by one level, and a delete that removes the last real key
//!   empties it entirely (`root = 0`, no live pages). The empty-key
//!   sentinel is bookkeeping, not data; a root holding only the
//!   sentinel is an empty tree, not a one-entry tree.

use eyre::{ensure, Result};

use crate::config::{HEADER_SIZE, MAX_KEY_SIZE, MAX_VAL_SIZE, MERGE_THRESHOLD, PAGE_SIZE};
use crate::storage::{PageId, PageStore, NO_PAGE};

use super::node::{Node, NodeBuf, NodeKind};
use super::split::split3;

/// B+tree over a borrowed page store.
///
/// The tree's only state is the root page id; callers persist it across
/// sessions however they persist everything else. `root == 0` is the
/// empty tree.
#[derive(Debug)]
pub struct BTree<'s, S: PageStore> {
    store: &'s mut S,
    root: PageId,
}

enum MergeSide {
    Left,
    Right,
}

impl<'s, S: PageStore> BTree<'s, S> {
    pub fn new(store: &'s mut S, root: PageId) -> Self {
        Self { store, root }
    }

    pub fn root(&self) -> PageId {
        self.root
    }

    /// Returns the value stored under `key`, if any.
    pub fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        ensure!(!key.is_empty(), "key must not be empty");
        if self.root == NO_PAGE {
            return Ok(None);
        }

        let mut current = self.root;
        loop {
            let node = Node::new(self.store.get(current)?)?;
            let idx = node.lookup_le(key)?;
            match node.kind()? {
                NodeKind::Leaf => {
                    return if node.key(idx)? == key {
                        Ok(Some(node.value(idx)?.to_vec()))
                    } else {
                        Ok(None)
                    };
                }
                NodeKind::Internal => current = node.ptr(idx)?,
            }
        }
    }

    /// Inserts a key-value pair, replacing the value if the key is
    /// already present.
    pub fn insert(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        ensure!(!key.is_empty(), "key must not be empty");
        ensure!(
            key.len() <= MAX_KEY_SIZE,
            "key of {} bytes exceeds limit {}",
            key.len(),
            MAX_KEY_SIZE
        );
        ensure!(
            val.len() <= MAX_VAL_SIZE,
            "value of {} bytes exceeds limit {}",
            val.len(),
            MAX_VAL_SIZE
        );

        if self.root == NO_PAGE {
            // First key. Slot 0 is the empty sentinel, which makes the
            // tree cover the whole key space.
            let mut root = NodeBuf::page_sized();
            root.set_header(NodeKind::Leaf, 2);
            root.append_kv(0, NO_PAGE, b"", b"")?;
            root.append_kv(1, NO_PAGE, key, val)?;
            self.root = self.store.alloc(root.as_page()?)?;
            return Ok(());
        }

        let root_page = self.store.get(self.root)?.to_vec();
        let grown = self.insert_into_node(Node::new(&root_page)?, key, val)?;
        let parts = split3(grown)?;

        let old_root = self.root;
        if parts.len() == 1 {
            self.root = self.store.alloc(parts[0].as_page()?)?;
        } else {
            // The root itself split; grow the tree by one level.
            let mut root = NodeBuf::page_sized();
            root.set_header(NodeKind::Internal, parts.len());
            for (i, part) in parts.iter().enumerate() {
                let id = self.store.alloc(part.as_page()?)?;
                root.append_kv(i, id, part.as_node().key(0)?, b"")?;
            }
            self.root = self.store.alloc(root.as_page()?)?;
        }
        self.store.free(old_root)?;
        Ok(())
    }

    /// Removes a key. Returns whether it was present; an absent key
    /// leaves the tree and the store untouched.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        ensure!(!key.is_empty(), "key must not be empty");
        ensure!(
            key.len() <= MAX_KEY_SIZE,
            "key of {} bytes exceeds limit {}",
            key.len(),
            MAX_KEY_SIZE
        );
        if self.root == NO_PAGE {
            return Ok(false);
        }

        let root_page = self.store.get(self.root)?.to_vec();
        let Some(updated) = self.delete_from_node(Node::new(&root_page)?, key)? else {
            return Ok(false);
        };

        let old_root = self.root;
        let view = updated.as_node();
        if view.kind()? == NodeKind::Internal && view.nkeys() == 1 {
            // Single-child root: adopt the child directly, unless the
            // whole tree just emptied down to the sentinel.
            let child = view.ptr(0)?;
            if self.is_vacant_leaf(child)? {
                self.store.free(child)?;
                self.root = NO_PAGE;
            } else {
                self.root = child;
            }
        } else if view.nkeys() == 0
            || (view.kind()? == NodeKind::Leaf && view.nkeys() == 1 && view.key(0)?.is_empty())
        {
            self.root = NO_PAGE;
        } else {
            self.root = self.store.alloc(updated.as_page()?)?;
        }
        self.store.free(old_root)?;
        Ok(true)
    }

    /// Walks the whole tree checking structural invariants and returns
    /// the number of reachable pages.
    ///
    /// Checked per node: encoded size within a page, strictly ascending
    /// keys, empty values and live pointers in internal slots, null
    /// pointers in leaf slots, and each separator equal to the smallest
    /// key of its subtree. The root must lead with the empty sentinel.
    pub fn verify(&self) -> Result<usize> {
        if self.root == NO_PAGE {
            return Ok(0);
        }
        let root = Node::new(self.store.get(self.root)?)?;
        ensure!(root.nkeys() > 0, "non-empty tree has a root without keys");
        ensure!(
            root.key(0)?.is_empty(),
            "root does not lead with the sentinel key"
        );
        self.verify_subtree(self.root, None)
    }

    fn verify_subtree(&self, id: PageId, separator: Option<&[u8]>) -> Result<usize> {
        let node = Node::new(self.store.get(id)?)?;
        ensure!(
            node.nbytes()? <= PAGE_SIZE,
            "node {} of {} bytes exceeds page size",
            id,
            node.nbytes()?
        );
        ensure!(node.nkeys() > 0, "persisted node {} has no keys", id);
        for i in 1..node.nkeys() {
            ensure!(
                node.key(i - 1)? < node.key(i)?,
                "keys out of order in node {} at slot {}",
                id,
                i
            );
        }
        if let Some(expected) = separator {
            ensure!(
                node.key(0)? == expected,
                "smallest key of node {} does not match its separator",
                id
            );
        }
        match node.kind()? {
            NodeKind::Leaf => {
                for i in 0..node.nkeys() {
                    ensure!(
                        node.ptr(i)? == NO_PAGE,
                        "leaf node {} carries a child pointer at slot {}",
                        id,
                        i
                    );
                }
                Ok(1)
            }
            NodeKind::Internal => {
                let mut pages = 1;
                for i in 0..node.nkeys() {
                    ensure!(
                        node.value(i)?.is_empty(),
                        "separator slot {} of node {} carries a value",
                        i,
                        id
                    );
                    pages += self.verify_subtree(node.ptr(i)?, Some(node.key(i)?))?;
                }
                Ok(pages)
            }
        }
    }

    fn is_vacant_leaf(&self, id: PageId) -> Result<bool> {
        let node = Node::new(self.store.get(id)?)?;
        Ok(node.kind()? == NodeKind::Leaf && node.nkeys() == 1 && node.key(0)?.is_empty())
    }

    /// Rebuilds `node` with the key inserted or updated. The result may
    /// be overfull; the caller splits and allocates it.
    fn insert_into_node(&mut self, node: Node<'_>, key: &[u8], val: &[u8]) -> Result<NodeBuf> {
        let idx = node.lookup_le(key)?;
        match node.kind()? {
            NodeKind::Leaf => {
                if node.key(idx)? == key {
                    leaf_update(node, idx, key, val)
                } else {
                    leaf_insert(node, idx + 1, key, val)
                }
            }
            NodeKind::Internal => self.insert_into_child(node, idx, key, val),
        }
    }

    fn insert_into_child(
        &mut self,
        node: Node<'_>,
        idx: usize,
        key: &[u8],
        val: &[u8],
    ) -> Result<NodeBuf> {
        let child_id = node.ptr(idx)?;
        let child_page = self.store.get(child_id)?.to_vec();
        let grown = self.insert_into_node(Node::new(&child_page)?, key, val)?;
        let parts = split3(grown)?;
        let new = self.replace_child(node, idx, &parts)?;
        self.store.free(child_id)?;
        Ok(new)
    }

    /// Rebuilds an internal node with the link at `idx` replaced by one
    /// link per part. Allocates the parts; their smallest keys become
    /// the new separators.
    fn replace_child(&mut self, old: Node<'_>, idx: usize, parts: &[NodeBuf]) -> Result<NodeBuf> {
        ensure!(
            (1..=3).contains(&parts.len()),
            "replacing a link with {} parts",
            parts.len()
        );
        let mut new = NodeBuf::oversize();
        new.set_header(NodeKind::Internal, old.nkeys() + parts.len() - 1);
        new.append_range(old, 0, 0, idx)?;
        for (i, part) in parts.iter().enumerate() {
            let id = self.store.alloc(part.as_page()?)?;
            new.append_kv(idx + i, id, part.as_node().key(0)?, b"")?;
        }
        new.append_range(old, idx + parts.len(), idx + 1, old.nkeys() - (idx + 1))?;
        Ok(new)
    }

    /// Rebuilds `node` with the key removed, or returns `None` if the
    /// key is absent anywhere below it.
    fn delete_from_node(&mut self, node: Node<'_>, key: &[u8]) -> Result<Option<NodeBuf>> {
        let idx = node.lookup_le(key)?;
        match node.kind()? {
            NodeKind::Leaf => {
                if node.key(idx)? != key {
                    return Ok(None);
                }
                Ok(Some(leaf_delete(node, idx)?))
            }
            NodeKind::Internal => self.delete_from_child(node, idx, key),
        }
    }

    fn delete_from_child(
        &mut self,
        node: Node<'_>,
        idx: usize,
        key: &[u8],
    ) -> Result<Option<NodeBuf>> {
        let child_id = node.ptr(idx)?;
        let child_page = self.store.get(child_id)?.to_vec();
        let Some(updated) = self.delete_from_node(Node::new(&child_page)?, key)? else {
            return Ok(None);
        };

        let new = match self.merge_candidate(node, idx, &updated)? {
            Some((MergeSide::Left, sibling_id, sibling_page)) => {
                let merged = merge(Node::new(&sibling_page)?, updated.as_node())?;
                let merged_id = self.store.alloc(merged.as_page()?)?;
                let new =
                    replace_merged_children(node, idx - 1, merged_id, merged.as_node().key(0)?)?;
                self.store.free(sibling_id)?;
                new
            }
            Some((MergeSide::Right, sibling_id, sibling_page)) => {
                let merged = merge(updated.as_node(), Node::new(&sibling_page)?)?;
                let merged_id = self.store.alloc(merged.as_page()?)?;
                let new = replace_merged_children(node, idx, merged_id, merged.as_node().key(0)?)?;
                self.store.free(sibling_id)?;
                new
            }
            None if updated.as_node().nkeys() == 0 => {
                // The child emptied and no sibling can absorb it. Only
                // possible for an only child, so this node empties too
                // and the root handling above unwinds the level.
                ensure!(
                    node.nkeys() == 1 && idx == 0,
                    "child emptied with siblings present (nkeys={}, idx={})",
                    node.nkeys(),
                    idx
                );
                let mut empty = NodeBuf::page_sized();
                empty.set_header(NodeKind::Internal, 0);
                empty
            }
            None => self.replace_child(node, idx, std::slice::from_ref(&updated))?,
        };
        self.store.free(child_id)?;
        Ok(Some(new))
    }

    /// Decides whether the freshly rebuilt child should merge with a
    /// sibling, and with which. Left is preferred; either direction
    /// requires the combined node to fit a page.
    fn merge_candidate(
        &self,
        node: Node<'_>,
        idx: usize,
        updated: &NodeBuf,
    ) -> Result<Option<(MergeSide, PageId, Vec<u8>)>> {
        if updated.nbytes()? > MERGE_THRESHOLD {
            return Ok(None);
        }

        if idx > 0 {
            let sibling_id = node.ptr(idx - 1)?;
            let sibling = self.store.get(sibling_id)?;
            let combined = Node::new(sibling)?.nbytes()? + updated.nbytes()? - HEADER_SIZE;
            if combined <= PAGE_SIZE {
                return Ok(Some((MergeSide::Left, sibling_id, sibling.to_vec())));
            }
        }
        if idx + 1 < node.nkeys() {
            let sibling_id = node.ptr(idx + 1)?;
            let sibling = self.store.get(sibling_id)?;
            let combined = Node::new(sibling)?.nbytes()? + updated.nbytes()? - HEADER_SIZE;
            if combined <= PAGE_SIZE {
                return Ok(Some((MergeSide::Right, sibling_id, sibling.to_vec())));
            }
        }
        Ok(None)
    }
}

fn leaf_insert(old: Node<'_>, idx: usize, key: &[u8], val: &[u8]) -> Result<NodeBuf> {
    let mut new = NodeBuf::oversize();
    new.set_header(NodeKind::Leaf, old.nkeys() + 1);
    new.append_range(old, 0, 0, idx)?;
    new.append_kv(idx, NO_PAGE, key, val)?;
    new.append_range(old, idx + 1, idx, old.nkeys() - idx)?;
    Ok(new)
}

fn leaf_update(old: Node<'_>, idx: usize, key: &[u8], val: &[u8]) -> Result<NodeBuf> {
    let mut new = NodeBuf::oversize();
    new.set_header(NodeKind::Leaf, old.nkeys());
    new.append_range(old, 0, 0, idx)?;
    new.append_kv(idx, NO_PAGE, key, val)?;
    new.append_range(old, idx + 1, idx + 1, old.nkeys() - idx - 1)?;
    Ok(new)
}

fn leaf_delete(old: Node<'_>, idx: usize) -> Result<NodeBuf> {
    let mut new = NodeBuf::page_sized();
    new.set_header(NodeKind::Leaf, old.nkeys() - 1);
    new.append_range(old, 0, 0, idx)?;
    new.append_range(old, idx, idx + 1, old.nkeys() - idx - 1)?;
    Ok(new)
}

/// Concatenates two same-kind siblings. The caller has already proven
/// the result fits a page.
fn merge(left: Node<'_>, right: Node<'_>) -> Result<NodeBuf> {
    let kind = left.kind()?;
    ensure!(
        kind == right.kind()?,
        "merging nodes of different kinds"
    );
    let mut merged = NodeBuf::page_sized();
    merged.set_header(kind, left.nkeys() + right.nkeys());
    merged.append_range(left, 0, 0, left.nkeys())?;
    merged.append_range(right, left.nkeys(), 0, right.nkeys())?;
    Ok(merged)
}

/// Rebuilds an internal node with the two adjacent links at `idx` and
/// `idx + 1` replaced by a single link to their merged node.
fn replace_merged_children(
    old: Node<'_>,
    idx: usize,
    ptr: PageId,
    key: &[u8],
) -> Result<NodeBuf> {
    let mut new = NodeBuf::page_sized();
    new.set_header(NodeKind::Internal, old.nkeys() - 1);
    new.append_range(old, 0, 0, idx)?;
    new.append_kv(idx, ptr, key, b"")?;
    new.append_range(old, idx + 1, idx + 2, old.nkeys() - (idx + 2))?;
    Ok(new)
}
