//! # End-to-End Tree Operation Tests
//!
//! This suite drives the tree through its public API only, against the
//! in-memory page store, and checks the properties an enclosing storage
//! layer depends on:
//!
//! 1. **Lookup laws**: last writer wins; absent keys stay absent
//! 2. **Page accounting**: after every mutation, the live pages in the
//!    store are exactly the pages reachable from the root
//! 3. **Boundary sizes**: maximal keys and values are accepted, one
//!    byte more is rejected
//! 4. **Emptying**: deleting every key, in any order, ends at
//!    `root == 0` with zero live pages
//!
//! The randomized test uses a fixed seed so failures reproduce.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use larchdb::{BTree, MemPageStore, PageId, MAX_KEY_SIZE, MAX_VAL_SIZE, NO_PAGE};

struct Harness {
    store: MemPageStore,
    root: PageId,
}

impl Harness {
    fn new() -> Self {
        Self {
            store: MemPageStore::new(),
            root: NO_PAGE,
        }
    }

    fn insert(&mut self, key: &[u8], val: &[u8]) {
        let mut tree = BTree::new(&mut self.store, self.root);
        tree.insert(key, val).unwrap();
        self.root = tree.root();
    }

    fn delete(&mut self, key: &[u8]) -> bool {
        let mut tree = BTree::new(&mut self.store, self.root);
        let removed = tree.delete(key).unwrap();
        self.root = tree.root();
        removed
    }

    fn lookup(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        BTree::new(&mut self.store, self.root).lookup(key).unwrap()
    }

    /// Structural invariants plus the reachable == live accounting law.
    fn check(&mut self) {
        let live = self.store.len();
        let reachable = BTree::new(&mut self.store, self.root).verify().unwrap();
        assert_eq!(reachable, live, "unreachable live pages after mutation");
    }
}

#[test]
fn last_writer_wins() {
    let mut h = Harness::new();

    h.insert(b"contended", b"first");
    h.insert(b"contended", b"second");
    h.insert(b"contended", b"third");

    assert_eq!(h.lookup(b"contended"), Some(b"third".to_vec()));
    h.check();
}

#[test]
fn boundary_sizes_are_exact() {
    let mut h = Harness::new();

    let max_key = vec![3u8; MAX_KEY_SIZE];
    let max_val = vec![4u8; MAX_VAL_SIZE];
    h.insert(&max_key, &max_val);
    assert_eq!(h.lookup(&max_key), Some(max_val));
    h.check();

    let mut tree = BTree::new(&mut h.store, h.root);
    assert!(tree.insert(&vec![3u8; MAX_KEY_SIZE + 1], b"").is_err());
    assert!(tree.insert(b"k", &vec![4u8; MAX_VAL_SIZE + 1]).is_err());
}

#[test]
fn absent_delete_leaves_live_pages_identical() {
    let mut h = Harness::new();
    for i in 0..40u32 {
        h.insert(format!("entry{:03}", i).as_bytes(), &[0u8; 500]);
    }
    let pages_before = h.store.len();
    let root_before = h.root;

    assert!(!h.delete(b"never-inserted"));

    assert_eq!(h.store.len(), pages_before);
    assert_eq!(h.root, root_before);
    h.check();
}

#[test]
fn deleting_every_key_in_shuffled_order_empties_the_tree() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut h = Harness::new();

    let mut keys: Vec<Vec<u8>> = (0..150u32)
        .map(|i| format!("shuffled{:04}", i).into_bytes())
        .collect();
    for key in &keys {
        h.insert(key, &[0u8; 1500]);
    }
    h.check();

    keys.shuffle(&mut rng);
    for key in &keys {
        assert!(h.delete(key), "key {:?} missing", key);
    }

    assert_eq!(h.root, NO_PAGE);
    assert!(h.store.is_empty());
}

#[test]
fn randomized_ops_agree_with_reference_model() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x1a2c);
    let mut h = Harness::new();
    let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

    // A bounded key pool so deletes and updates actually collide with
    // earlier inserts.
    let pool: Vec<Vec<u8>> = (0..220u32)
        .map(|i| {
            let len = 1 + (i as usize * 37) % 48;
            let mut key = format!("k{:04}", i).into_bytes();
            key.resize(len.max(key.len()), b'.');
            key
        })
        .collect();

    for round in 0..1200u32 {
        let key = pool[rng.gen_range(0..pool.len())].clone();
        if rng.gen_range(0..100) < 65 {
            let val = vec![rng.gen::<u8>(); rng.gen_range(0..800)];
            h.insert(&key, &val);
            model.insert(key, val);
        } else {
            let removed = h.delete(&key);
            assert_eq!(removed, model.remove(&key).is_some(), "round {}", round);
        }

        if round % 100 == 99 {
            h.check();
            for probe in model.keys().take(20) {
                assert_eq!(h.lookup(probe).as_ref(), model.get(probe));
            }
        }
    }

    // Drain to empty and confirm nothing is stranded in the store.
    let mut remaining: Vec<Vec<u8>> = model.keys().cloned().collect();
    remaining.shuffle(&mut rng);
    for key in &remaining {
        assert!(h.delete(key));
    }
    assert_eq!(h.root, NO_PAGE);
    assert!(h.store.is_empty());
}

#[test]
fn values_survive_neighboring_churn() {
    let mut h = Harness::new();

    h.insert(b"anchor", b"constant");
    for i in 0..80u32 {
        let key = format!("churn{:03}", i);
        h.insert(key.as_bytes(), &[0u8; 2500]);
    }
    for i in 0..80u32 {
        let key = format!("churn{:03}", i);
        assert!(h.delete(key.as_bytes()));
    }

    assert_eq!(h.lookup(b"anchor"), Some(b"constant".to_vec()));
    h.check();
}
