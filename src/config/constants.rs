//! # LarchDB Configuration Constants
//!
//! This module centralizes the constants that define the on-page node
//! layout and the key/value size limits. The two groups depend on each
//! other: the size limits are chosen so that a single maximal slot is
//! always storable, which the split engine relies on to terminate after
//! at most two cuts. The relationships are enforced by compile-time
//! assertions below.
//!
//! ## Layout Budget
//!
//! A node holding one maximal slot occupies:
//!
//! ```text
//! HEADER_SIZE        4   node header (kind + nkeys)
//! PTR_SIZE           8   one child pointer
//! OFFSET_SIZE        2   one kv-end offset
//! KV_HEADER_SIZE     4   klen + vlen
//! MAX_KEY_SIZE    1000
//! MAX_VAL_SIZE    3000
//! ------------------------
//!                 4018  <= PAGE_SIZE (4096)
//! ```
//!
//! Raising either size limit without raising `PAGE_SIZE` breaks the
//! guarantee and the build.

/// Size of each tree page in bytes (4KB).
/// Every persisted node occupies exactly one page; transient nodes
/// built during a mutation may use up to twice this before splitting.
pub const PAGE_SIZE: usize = 4096;

/// Size of the node header in bytes: u16 kind + u16 key count.
pub const HEADER_SIZE: usize = 4;

/// Width of one child page pointer (u64).
pub const PTR_SIZE: usize = 8;

/// Width of one entry in the kv-end offset array (u16).
pub const OFFSET_SIZE: usize = 2;

/// Width of the per-slot length header: u16 klen + u16 vlen.
pub const KV_HEADER_SIZE: usize = 4;

/// Maximum key length in bytes.
pub const MAX_KEY_SIZE: usize = 1000;

/// Maximum value length in bytes.
pub const MAX_VAL_SIZE: usize = 3000;

/// Nodes at or below this encoded size are candidates for merging with
/// a sibling after a delete.
pub const MERGE_THRESHOLD: usize = PAGE_SIZE / 4;

const _: () = assert!(
    HEADER_SIZE + PTR_SIZE + OFFSET_SIZE + KV_HEADER_SIZE + MAX_KEY_SIZE + MAX_VAL_SIZE
        <= PAGE_SIZE,
    "a single maximal kv slot must fit in one page"
);

// Offsets are stored as u16 and must be able to address the tail of a
// double-size transient node.
const _: () = assert!(
    2 * PAGE_SIZE <= u16::MAX as usize,
    "kv offsets must cover the oversize transient buffer"
);

const _: () = assert!(
    MERGE_THRESHOLD < PAGE_SIZE,
    "merge threshold must leave room for a page-sized merge result"
);
