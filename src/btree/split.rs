//! # Split Engine
//!
//! After an insert a node may be overfull: up to twice the page size,
//! held in a transient [`NodeBuf`]. This module cuts such a node into
//! 1-3 page-sized nodes.
//!
//! Two cuts always suffice. A single slot encodes to at most
//! `HEADER_SIZE + 10 + 4 + MAX_KEY_SIZE + MAX_VAL_SIZE` bytes, which
//! the config asserts fits one page, so the right half of a cut always
//! fits and only the left half can remain overfull; after a second cut
//! of that left half every piece fits.
//!
//! The cut point is the smallest start index whose suffix fits a page,
//! found by binary search over [`fits_from`]. This packs the right node
//! as full as possible, which keeps the left spine short when keys
//! arrive in ascending order.

use eyre::{ensure, Result};
use smallvec::{smallvec, SmallVec};

use crate::config::{HEADER_SIZE, OFFSET_SIZE, PAGE_SIZE, PTR_SIZE};

use super::node::{Node, NodeBuf};

/// Whether slots `idx..nkeys` re-encoded as their own node would fit in
/// one page.
fn fits_from(node: Node<'_>, idx: usize) -> Result<bool> {
    ensure!(
        idx < node.nkeys(),
        "split index {} out of bounds (nkeys={})",
        idx,
        node.nkeys()
    );
    let nkeys = node.nkeys() - idx;
    let kv_size = node.nbytes()? - node.kv_pos(idx)?;
    Ok(HEADER_SIZE + nkeys * (PTR_SIZE + OFFSET_SIZE) + kv_size <= PAGE_SIZE)
}

/// Cuts an overfull node in two. The right node is guaranteed to fit a
/// page; the left may still be overfull and need a second cut.
fn split2(old: Node<'_>) -> Result<(NodeBuf, NodeBuf)> {
    ensure!(
        old.nkeys() >= 2,
        "cannot split a node with {} keys",
        old.nkeys()
    );

    // Smallest start index whose suffix fits a page.
    let mut lo = 0;
    let mut hi = old.nkeys() - 1;
    while lo + 1 < hi {
        let mid = (lo + hi) / 2;
        if fits_from(old, mid)? {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    let start = if fits_from(old, lo)? { lo } else { hi };
    ensure!(
        fits_from(old, start)?,
        "no suffix of the overfull node fits a page"
    );

    let kind = old.kind()?;

    let mut left = NodeBuf::oversize();
    left.set_header(kind, start);
    left.append_range(old, 0, 0, start)?;

    let mut right = NodeBuf::page_sized();
    right.set_header(kind, old.nkeys() - start);
    right.append_range(old, 0, start, old.nkeys() - start)?;

    Ok((left, right))
}

/// Normalizes a possibly overfull node into 1-3 page-sized nodes, in
/// key order.
pub(super) fn split3(old: NodeBuf) -> Result<SmallVec<[NodeBuf; 3]>> {
    if old.nbytes()? <= PAGE_SIZE {
        return Ok(smallvec![old]);
    }

    let (left, right) = split2(old.as_node())?;
    if left.nbytes()? <= PAGE_SIZE {
        return Ok(smallvec![left, right]);
    }

    let (leftmost, middle) = split2(left.as_node())?;
    ensure!(
        leftmost.nbytes()? <= PAGE_SIZE,
        "node still overfull after two splits: {} bytes",
        leftmost.nbytes()?
    );
    Ok(smallvec![leftmost, middle, right])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::node::NodeKind;
    use crate::config::{MAX_KEY_SIZE, MAX_VAL_SIZE};

    fn leaf_of(slots: &[(&[u8], usize)]) -> NodeBuf {
        let mut node = NodeBuf::oversize();
        node.set_header(NodeKind::Leaf, slots.len());
        for (i, (key, vlen)) in slots.iter().enumerate() {
            node.append_kv(i, 0, key, &vec![0u8; *vlen]).unwrap();
        }
        node
    }

    fn collect_keys(node: Node<'_>) -> Vec<Vec<u8>> {
        (0..node.nkeys()).map(|i| node.key(i).unwrap().to_vec()).collect()
    }

    #[test]
    fn split3_keeps_a_fitting_node_whole() {
        let node = leaf_of(&[(b"", 0), (b"a", 100), (b"b", 200)]);

        let parts = split3(node).unwrap();

        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].as_node().nkeys(), 3);
    }

    #[test]
    fn split3_cuts_a_slightly_overfull_node_in_two() {
        // Five ~1KB slots: ~5KB total, two pages worth.
        let slots: Vec<(Vec<u8>, usize)> =
            (0u8..5).map(|i| (vec![i], 1000)).collect();
        let refs: Vec<(&[u8], usize)> =
            slots.iter().map(|(k, v)| (k.as_slice(), *v)).collect();
        let node = leaf_of(&refs);
        assert!(node.nbytes().unwrap() > PAGE_SIZE);

        let parts = split3(node).unwrap();

        assert_eq!(parts.len(), 2);
        for part in &parts {
            assert!(part.nbytes().unwrap() <= PAGE_SIZE);
        }
    }

    #[test]
    fn split3_preserves_slot_order_and_content() {
        let slots: Vec<(Vec<u8>, usize)> =
            (0u8..7).map(|i| (vec![i], 900)).collect();
        let refs: Vec<(&[u8], usize)> =
            slots.iter().map(|(k, v)| (k.as_slice(), *v)).collect();
        let node = leaf_of(&refs);
        let original = collect_keys(node.as_node());

        let parts = split3(node).unwrap();

        let mut recombined = Vec::new();
        for part in &parts {
            recombined.extend(collect_keys(part.as_node()));
        }
        assert_eq!(recombined, original);
    }

    #[test]
    fn split3_produces_three_nodes_for_a_heavy_left_slot() {
        // A maximal slot followed by just enough small slots that the
        // suffix of all small slots is itself over a page: the first
        // cut then keeps the maximal slot plus one small slot on the
        // left, which is overfull and forces the second cut.
        let big_key = vec![1u8; MAX_KEY_SIZE];
        let mut slots: Vec<(Vec<u8>, usize)> = vec![(big_key, MAX_VAL_SIZE)];
        for i in 0u8..13 {
            slots.push((vec![2, i], 300));
        }
        let refs: Vec<(&[u8], usize)> =
            slots.iter().map(|(k, v)| (k.as_slice(), *v)).collect();
        let node = leaf_of(&refs);

        let parts = split3(node).unwrap();

        assert_eq!(parts.len(), 3);
        for part in &parts {
            assert!(part.nbytes().unwrap() <= PAGE_SIZE);
            assert!(part.as_node().nkeys() >= 1);
        }
    }

    #[test]
    fn fits_from_matches_whole_node_at_index_zero() {
        let node = leaf_of(&[(b"", 0), (b"a", 50)]);
        assert!(fits_from(node.as_node(), 0).unwrap());

        let slots: Vec<(Vec<u8>, usize)> =
            (0u8..5).map(|i| (vec![i], 1000)).collect();
        let refs: Vec<(&[u8], usize)> =
            slots.iter().map(|(k, v)| (k.as_slice(), *v)).collect();
        let overfull = leaf_of(&refs);
        assert!(!fits_from(overfull.as_node(), 0).unwrap());
    }

    #[test]
    fn split2_right_node_always_fits() {
        let slots: Vec<(Vec<u8>, usize)> =
            (0u8..6).map(|i| (vec![i], 1100)).collect();
        let refs: Vec<(&[u8], usize)> =
            slots.iter().map(|(k, v)| (k.as_slice(), *v)).collect();
        let node = leaf_of(&refs);

        let (_, right) = split2(node.as_node()).unwrap();

        assert!(right.nbytes().unwrap() <= PAGE_SIZE);
        assert!(right.as_node().nkeys() >= 1);
    }
}
