//! # Storage Contract
//!
//! This module defines the page-manager contract the tree is built
//! against, and ships an in-memory implementation of it.
//!
//! ## The Capability Triple
//!
//! The tree needs exactly three things from its storage backend:
//!
//! - `get(id)`: read the bytes of a live page
//! - `alloc(page)`: persist a freshly built page under a new id
//! - `free(id)`: release a page that has been replaced
//!
//! [`PageStore`] packages the triple as a trait so the tree can be
//! driven by anything from a test hash map to a persistent allocator
//! with a free list. The tree borrows the store mutably for the
//! duration of each call and holds no reference to it in between.
//!
//! ## Page Lifecycle
//!
//! Pages are immutable once allocated. A mutation allocates the
//! replacement pages first and frees the replaced ones afterwards, so
//! a store never sees a dangling reference to a freed page from a live
//! one. Id `0` is reserved: it is the empty-tree root sentinel and the
//! pointer stored in leaf slots, and is never passed to the store.

mod mem;

pub use mem::MemPageStore;

use eyre::Result;

/// Identifier of a persisted page. `0` ([`NO_PAGE`]) means "no page".
pub type PageId = u64;

/// The reserved null page id.
pub const NO_PAGE: PageId = 0;

/// Storage capability the tree is parameterized over.
pub trait PageStore {
    /// Returns the bytes of a live page. The slice stays valid until
    /// the page is freed.
    fn get(&self, id: PageId) -> Result<&[u8]>;

    /// Persists a freshly built page (at most `PAGE_SIZE` bytes, padded
    /// to a full page by the store) and returns its new non-zero id.
    fn alloc(&mut self, page: &[u8]) -> Result<PageId>;

    /// Releases a live page. Freeing an id that is not live is an
    /// error.
    fn free(&mut self, id: PageId) -> Result<()>;
}
