//! # LarchDB - Copy-on-Write B+Tree Index Core
//!
//! LarchDB is the index primitive of a key-value store: a persistent
//! B+tree over arbitrary byte-string keys and values, stored in fixed
//! 4KB pages. The tree never mutates a page in place. Every insert or
//! delete produces freshly written pages and releases the ones they
//! replace, which is what lets an enclosing storage layer build
//! durability (write-ahead logging, atomic root swaps) on top of it
//! without the tree's cooperation.
//!
//! ## Quick Start
//!
//! ```
//! use larchdb::{BTree, MemPageStore};
//!
//! let mut store = MemPageStore::new();
//! let mut tree = BTree::new(&mut store, 0);
//!
//! tree.insert(b"grove", b"larch").unwrap();
//! assert_eq!(tree.lookup(b"grove").unwrap(), Some(b"larch".to_vec()));
//!
//! assert!(tree.delete(b"grove").unwrap());
//! assert_eq!(tree.root(), 0);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │    BTree (insert / delete / lookup) │
//! ├─────────────────────────────────────┤
//! │  Split & merge engines (rebalance)  │
//! ├─────────────────────────────────────┤
//! │   Node codec (on-page byte layout)  │
//! ├─────────────────────────────────────┤
//! │     PageStore (get / alloc / free)  │
//! └─────────────────────────────────────┘
//! ```
//!
//! The tree is parameterized over [`storage::PageStore`], a three-method
//! capability that hides where pages actually live. The bundled
//! [`MemPageStore`] keeps them in a hash map; a real deployment plugs in
//! a persistent allocator with a free list instead.
//!
//! ## Scope
//!
//! Durability, concurrency control, range scans, and the record layer
//! are the caller's problem. The tree is single-threaded, holds no
//! state beyond a root page id, and borrows its page store only for the
//! duration of each call.
//!
//! ## Module Overview
//!
//! - [`btree`]: node codec, split/merge engines, and the tree itself
//! - [`storage`]: the page-manager contract and the in-memory backend
//! - [`config`]: page geometry and size-limit constants

pub mod btree;
pub mod config;
pub mod storage;

pub use btree::{BTree, Node, NodeBuf, NodeKind};
pub use config::{MAX_KEY_SIZE, MAX_VAL_SIZE, PAGE_SIZE};
pub use storage::{MemPageStore, PageId, PageStore, NO_PAGE};
