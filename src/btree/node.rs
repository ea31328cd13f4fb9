//! # Node Codec and Builders
//!
//! This module implements the on-page node format: a read-only view
//! over a borrowed byte slice, and an owning builder for assembling new
//! nodes during mutations.
//!
//! ## View / Builder Split
//!
//! [`Node`] borrows a page immutably and only reads it. [`NodeBuf`]
//! owns its buffer and is the only way to write node bytes. Pages
//! returned by a store can therefore never be mutated through this
//! module, which is what the copy-on-write discipline rests on.
//!
//! ```text
//! Node<'a>   { data: &'a [u8] }   decode: kind, nkeys, ptr, key, ...
//! NodeBuf    { data: Vec<u8>  }   encode: set_header, append_kv, ...
//! ```
//!
//! A `NodeBuf` is either page-sized (for nodes known to fit) or
//! double-size (the transient used while a node is temporarily
//! overfull). Only the first `PAGE_SIZE` bytes ever reach a store, via
//! [`NodeBuf::as_page`], which refuses to hand out an overfull node.
//!
//! ## Append Protocol
//!
//! A builder is filled front to back: the header first, then slots in
//! ascending index order. `append_kv` derives where slot `i` starts
//! from the offset written by the append of slot `i - 1`, so appending
//! out of order corrupts the offsets array. The tree's mutation paths
//! all follow this protocol; it is not enforced at runtime beyond
//! bounds checks.
//!
//! ## Bounds
//!
//! Every accessor validates its index against the key count and every
//! byte range against the buffer, returning an error rather than
//! clamping. An index error here means a bug in the tree, not bad
//! caller input.

use eyre::{bail, ensure, Result};
use zerocopy::byteorder::{LittleEndian, U16, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{HEADER_SIZE, KV_HEADER_SIZE, OFFSET_SIZE, PAGE_SIZE, PTR_SIZE};
use crate::storage::PageId;

/// Discriminates the two node kinds stored in the header.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Internal = 1,
    Leaf = 2,
}

impl NodeKind {
    pub fn from_raw(raw: u16) -> Result<Self> {
        match raw {
            1 => Ok(NodeKind::Internal),
            2 => Ok(NodeKind::Leaf),
            other => bail!("invalid node kind: {}", other),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct NodeHeader {
    kind: U16<LittleEndian>,
    nkeys: U16<LittleEndian>,
}

/// Read-only view of an encoded node.
#[derive(Debug, Clone, Copy)]
pub struct Node<'a> {
    data: &'a [u8],
}

impl<'a> Node<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        ensure!(
            data.len() >= HEADER_SIZE,
            "buffer of {} bytes too small for a node header",
            data.len()
        );
        Ok(Self { data })
    }

    fn header(&self) -> &NodeHeader {
        // INVARIANT: length validated in the constructor
        NodeHeader::ref_from_bytes(&self.data[..HEADER_SIZE]).unwrap()
    }

    pub fn kind(&self) -> Result<NodeKind> {
        NodeKind::from_raw(self.header().kind.get())
    }

    pub fn nkeys(&self) -> usize {
        self.header().nkeys.get() as usize
    }

    /// Child pointer of slot `idx`. Always `0` in leaf slots.
    pub fn ptr(&self, idx: usize) -> Result<PageId> {
        ensure!(
            idx < self.nkeys(),
            "pointer index {} out of bounds (nkeys={})",
            idx,
            self.nkeys()
        );
        let pos = HEADER_SIZE + idx * PTR_SIZE;
        let raw = U64::<LittleEndian>::ref_from_bytes(&self.data[pos..pos + PTR_SIZE])
            .map_err(|e| eyre::eyre!("failed to read pointer {}: {:?}", idx, e))?;
        Ok(raw.get())
    }

    /// End offset of slot `idx - 1` relative to the kv region; 0 for
    /// `idx == 0`.
    pub fn offset(&self, idx: usize) -> Result<usize> {
        if idx == 0 {
            return Ok(0);
        }
        ensure!(
            idx <= self.nkeys(),
            "offset index {} out of bounds (nkeys={})",
            idx,
            self.nkeys()
        );
        let pos = HEADER_SIZE + self.nkeys() * PTR_SIZE + (idx - 1) * OFFSET_SIZE;
        ensure!(
            pos + OFFSET_SIZE <= self.data.len(),
            "offset entry {} extends beyond the buffer",
            idx
        );
        let raw = U16::<LittleEndian>::ref_from_bytes(&self.data[pos..pos + OFFSET_SIZE])
            .map_err(|e| eyre::eyre!("failed to read offset {}: {:?}", idx, e))?;
        Ok(raw.get() as usize)
    }

    /// Byte position of slot `idx`, or of the end of data for
    /// `idx == nkeys`.
    pub fn kv_pos(&self, idx: usize) -> Result<usize> {
        ensure!(
            idx <= self.nkeys(),
            "kv index {} out of bounds (nkeys={})",
            idx,
            self.nkeys()
        );
        let kv_start = HEADER_SIZE + self.nkeys() * (PTR_SIZE + OFFSET_SIZE);
        Ok(kv_start + self.offset(idx)?)
    }

    pub fn key(&self, idx: usize) -> Result<&'a [u8]> {
        ensure!(
            idx < self.nkeys(),
            "key index {} out of bounds (nkeys={})",
            idx,
            self.nkeys()
        );
        let pos = self.kv_pos(idx)?;
        ensure!(
            pos + KV_HEADER_SIZE <= self.data.len(),
            "kv header of slot {} extends beyond the buffer",
            idx
        );
        let klen = read_u16(self.data, pos) as usize;
        ensure!(
            pos + KV_HEADER_SIZE + klen <= self.data.len(),
            "key of slot {} extends beyond the buffer: klen={}",
            idx,
            klen
        );
        Ok(&self.data[pos + KV_HEADER_SIZE..pos + KV_HEADER_SIZE + klen])
    }

    pub fn value(&self, idx: usize) -> Result<&'a [u8]> {
        ensure!(
            idx < self.nkeys(),
            "value index {} out of bounds (nkeys={})",
            idx,
            self.nkeys()
        );
        let pos = self.kv_pos(idx)?;
        ensure!(
            pos + KV_HEADER_SIZE <= self.data.len(),
            "kv header of slot {} extends beyond the buffer",
            idx
        );
        let klen = read_u16(self.data, pos) as usize;
        let vlen = read_u16(self.data, pos + 2) as usize;
        let start = pos + KV_HEADER_SIZE + klen;
        ensure!(
            start + vlen <= self.data.len(),
            "value of slot {} extends beyond the buffer: vlen={}",
            idx,
            vlen
        );
        Ok(&self.data[start..start + vlen])
    }

    /// Total encoded length of the node.
    pub fn nbytes(&self) -> Result<usize> {
        self.kv_pos(self.nkeys())
    }

    /// Index of the last slot whose key is `<=` the target.
    ///
    /// Slot 0 always qualifies on the left spine because it holds the
    /// empty sentinel key, so the result is a containing slot for any
    /// target. Linear scan; short-circuits on the first greater key.
    pub fn lookup_le(&self, key: &[u8]) -> Result<usize> {
        let mut found = 0;
        for i in 1..self.nkeys() {
            match self.key(i)?.cmp(key) {
                std::cmp::Ordering::Less => found = i,
                std::cmp::Ordering::Equal => return Ok(i),
                std::cmp::Ordering::Greater => break,
            }
        }
        Ok(found)
    }

    /// Binary-search variant of [`Node::lookup_le`]; same result on
    /// every input.
    pub fn lookup_le_bsearch(&self, key: &[u8]) -> Result<usize> {
        let mut found = 0;
        let mut left = 1;
        let mut right = self.nkeys();
        while left < right {
            let mid = left + (right - left) / 2;
            if self.key(mid)? <= key {
                found = mid;
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        Ok(found)
    }
}

/// Owning builder for a node being assembled.
pub struct NodeBuf {
    data: Vec<u8>,
}

impl NodeBuf {
    /// A buffer for a node known to fit in one page.
    pub fn page_sized() -> Self {
        Self {
            data: vec![0; PAGE_SIZE],
        }
    }

    /// A double-size transient buffer for a node that may be overfull
    /// until the split engine cuts it down. Never reaches a page store.
    pub fn oversize() -> Self {
        Self {
            data: vec![0; 2 * PAGE_SIZE],
        }
    }

    pub fn as_node(&self) -> Node<'_> {
        Node { data: &self.data }
    }

    pub fn nbytes(&self) -> Result<usize> {
        self.as_node().nbytes()
    }

    /// The first page's worth of bytes, for handing to a store. Errors
    /// if the encoded node does not fit a page.
    pub fn as_page(&self) -> Result<&[u8]> {
        let used = self.nbytes()?;
        ensure!(
            used <= PAGE_SIZE,
            "node of {} bytes exceeds page size {}",
            used,
            PAGE_SIZE
        );
        Ok(&self.data[..PAGE_SIZE])
    }

    /// Must be called before any slot is appended.
    pub fn set_header(&mut self, kind: NodeKind, nkeys: usize) {
        let header = NodeHeader {
            kind: U16::new(kind as u16),
            nkeys: U16::new(nkeys as u16),
        };
        self.data[..HEADER_SIZE].copy_from_slice(header.as_bytes());
    }

    pub fn set_ptr(&mut self, idx: usize, ptr: PageId) -> Result<()> {
        ensure!(
            idx < self.as_node().nkeys(),
            "pointer index {} out of bounds (nkeys={})",
            idx,
            self.as_node().nkeys()
        );
        let pos = HEADER_SIZE + idx * PTR_SIZE;
        self.data[pos..pos + PTR_SIZE].copy_from_slice(U64::<LittleEndian>::new(ptr).as_bytes());
        Ok(())
    }

    fn set_offset(&mut self, idx: usize, value: usize) -> Result<()> {
        let nkeys = self.as_node().nkeys();
        ensure!(
            (1..=nkeys).contains(&idx),
            "offset index {} out of bounds (nkeys={})",
            idx,
            nkeys
        );
        let pos = HEADER_SIZE + nkeys * PTR_SIZE + (idx - 1) * OFFSET_SIZE;
        self.data[pos..pos + OFFSET_SIZE]
            .copy_from_slice(U16::<LittleEndian>::new(value as u16).as_bytes());
        Ok(())
    }

    /// Writes slot `idx`: pointer word, kv header, key and value bytes,
    /// and the end offset that positions slot `idx + 1`. Slots must be
    /// appended in ascending index order after `set_header`.
    pub fn append_kv(&mut self, idx: usize, ptr: PageId, key: &[u8], val: &[u8]) -> Result<()> {
        ensure!(
            key.len() <= u16::MAX as usize && val.len() <= u16::MAX as usize,
            "kv slot {} too large to encode: klen={}, vlen={}",
            idx,
            key.len(),
            val.len()
        );
        self.set_ptr(idx, ptr)?;

        let pos = self.as_node().kv_pos(idx)?;
        let end = pos + KV_HEADER_SIZE + key.len() + val.len();
        ensure!(
            end <= self.data.len(),
            "kv slot {} overflows the node buffer: end={}, capacity={}",
            idx,
            end,
            self.data.len()
        );

        self.data[pos..pos + 2].copy_from_slice(U16::<LittleEndian>::new(key.len() as u16).as_bytes());
        self.data[pos + 2..pos + 4]
            .copy_from_slice(U16::<LittleEndian>::new(val.len() as u16).as_bytes());
        self.data[pos + 4..pos + 4 + key.len()].copy_from_slice(key);
        self.data[pos + 4 + key.len()..end].copy_from_slice(val);

        let next = self.as_node().offset(idx)? + KV_HEADER_SIZE + key.len() + val.len();
        self.set_offset(idx + 1, next)
    }

    /// Re-encodes `n` contiguous slots of `src` starting at
    /// `src_start` into this builder starting at `dst_start`.
    pub fn append_range(
        &mut self,
        src: Node<'_>,
        dst_start: usize,
        src_start: usize,
        n: usize,
    ) -> Result<()> {
        ensure!(
            src_start + n <= src.nkeys(),
            "source range {}..{} out of bounds (nkeys={})",
            src_start,
            src_start + n,
            src.nkeys()
        );
        ensure!(
            dst_start + n <= self.as_node().nkeys(),
            "destination range {}..{} out of bounds (nkeys={})",
            dst_start,
            dst_start + n,
            self.as_node().nkeys()
        );
        for i in 0..n {
            self.append_kv(
                dst_start + i,
                src.ptr(src_start + i)?,
                src.key(src_start + i)?,
                src.value(src_start + i)?,
            )?;
        }
        Ok(())
    }
}

fn read_u16(data: &[u8], pos: usize) -> u16 {
    // INVARIANT: callers bounds-check pos + 2 against the buffer
    U16::<LittleEndian>::ref_from_bytes(&data[pos..pos + 2])
        .unwrap()
        .get()
}
