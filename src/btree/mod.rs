//! # B+Tree Index Implementation
//!
//! This module implements LarchDB's copy-on-write B+tree. The tree maps
//! byte-string keys to byte-string values and persists every node in
//! exactly one fixed-size page obtained from a [`PageStore`]
//! (`crate::storage::PageStore`).
//!
//! ## Copy-on-Write Discipline
//!
//! No page is ever modified after it has been allocated. A mutation
//! rebuilds the path from the touched leaf up to the root into fresh
//! in-memory buffers, allocates the surviving pieces as new pages, and
//! only then frees the pages they replace. The visible effect is that
//! the old tree remains intact under its old root id until the moment
//! the caller adopts the new root id.
//!
//! ## Node Layout
//!
//! Both node kinds share one layout (all integers little-endian):
//!
//! ```text
//! | kind | nkeys |  pointers  |  offsets   | key-values | unused |
//! |  2B  |  2B   | nkeys * 8B | nkeys * 2B |    ...     |        |
//! ```
//!
//! Each slot in the key-value region is:
//!
//! ```text
//! | klen | vlen | key | val |
//! |  2B  |  2B  | ... | ... |
//! ```
//!
//! `offsets[i]` records where slot `i + 1` begins, relative to the
//! start of the key-value region; slot 0 implicitly begins at 0. This
//! gives O(1) access to any slot and to the node's total encoded size.
//!
//! Internal nodes store separator keys with empty values; the pointer
//! of slot `i` leads to the subtree whose smallest key equals that
//! separator. Leaf nodes store the actual values and keep `0` in every
//! pointer word.
//!
//! ## The Sentinel Key
//!
//! Slot 0 of a non-empty tree's left spine holds the empty key `""`.
//! Every possible search key compares greater than or equal to it, so
//! the lookup-LE primitive always lands in a containing slot and the
//! mutation paths need no "before the first key" special case.
//!
//! ## Rebalancing
//!
//! Inserts grow a node in a double-size transient buffer and cut it
//! back to 1-3 page-sized nodes (`split` module). Deletes shrink a
//! node and merge it with an adjacent sibling when the result fits a
//! page, collapsing the root when it is left with a single child.

mod node;
mod split;
mod tree;

pub use node::{Node, NodeBuf, NodeKind};
pub use tree::BTree;
