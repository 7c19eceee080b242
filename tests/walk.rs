//! End-to-end partial-visibility walks: build a trie against one store,
//! drain a second (empty) store's view of it through `HexaryTrieFog`,
//! backfilling on every `MissingNode` fault until the fog is complete.
use proptest::collection::hash_set;
use proptest::prelude::*;
use sha3::{Digest, Keccak256};

use hexary_trie_walk::{
    HexaryTrie, HexaryTrieFog, InMemoryNodeStore, NodeHash, NodeIterator, NodeStore,
    TraversalFault, TrieFrontierCache,
};
use hexary_trie_walk::Nibbles;

fn make_trie(store: &InMemoryNodeStore, keys: &[Vec<u8>]) -> NodeHash {
    let mut trie = HexaryTrie::new(store);
    let mut batch = trie.squash_changes();
    for key in keys {
        batch.set(key, b"v".to_vec()).unwrap();
    }
    batch.commit().unwrap();
    trie.root_ref().clone()
}

fn all_keys(store: &InMemoryNodeStore, root: NodeHash) -> Vec<Vec<u8>> {
    let iter = NodeIterator::new(store, root);
    let mut keys = Vec::new();
    let mut prev = Vec::new();
    while let Some(key) = iter.next(&prev).unwrap() {
        keys.push(key.clone());
        prev = key;
    }
    keys
}

/// One step of a partial-visibility walk: explore the fog's nearest unknown
/// prefix, handling both kinds of fault a caller can hit.
fn walk_step(
    trie: &HexaryTrie,
    fog: &HexaryTrieFog,
    source: &InMemoryNodeStore,
    sink: &InMemoryNodeStore,
) -> HexaryTrieFog {
    let target = fog.nearest_unknown(&Nibbles::empty()).unwrap();
    match trie.traverse(&target) {
        Ok(node) => fog.explore(&target, &node.sub_segments).unwrap(),
        Err(TraversalFault::PartialPath { node, nibbles_traversed }) => {
            fog.explore(&nibbles_traversed, &node.sub_segments).unwrap()
        }
        Err(TraversalFault::MissingNode { missing_node_hash, .. }) => {
            let bytes = source
                .get(missing_node_hash)
                .unwrap()
                .expect("source store holds every node reachable from its own root");
            sink.put(missing_node_hash, bytes).unwrap();
            fog.clone()
        }
        Err(e) => panic!("unexpected traversal fault: {e:?}"),
    }
}

fn continue_fog(
    trie: &HexaryTrie,
    mut fog: HexaryTrieFog,
    source: &InMemoryNodeStore,
    sink: &InMemoryNodeStore,
    budget: usize,
) -> HexaryTrieFog {
    let mut iterations = 0;
    while !fog.is_complete() {
        iterations += 1;
        assert!(iterations <= budget, "walk did not converge within budget");
        fog = walk_step(trie, &fog, source, sink);
    }
    fog
}

fn drain_fog(
    trie: &HexaryTrie,
    source: &InMemoryNodeStore,
    sink: &InMemoryNodeStore,
    budget: usize,
) -> HexaryTrieFog {
    continue_fog(trie, HexaryTrieFog::new(), source, sink, budget)
}

fn key_set_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    hash_set(any::<[u8; 3]>(), 0..8).prop_map(|set| set.into_iter().map(|b| b.to_vec()).collect())
}

proptest! {
    #[test]
    fn backfilling_walk_recovers_full_trie(keys in key_set_strategy()) {
        let source = InMemoryNodeStore::new();
        let root = make_trie(&source, &keys);

        let sink = InMemoryNodeStore::new();
        let trie = HexaryTrie::from_root(&sink, root.clone());
        let budget = 2 * source.len().max(1) + 16;
        let fog = drain_fog(&trie, &source, &sink, budget);

        prop_assert!(fog.is_complete());
        let mut expected = keys;
        expected.sort();
        prop_assert_eq!(all_keys(&sink, root), expected);
    }

    #[test]
    fn backfilling_walk_via_traverse_from_anchor(keys in key_set_strategy()) {
        let source = InMemoryNodeStore::new();
        let root = make_trie(&source, &keys);

        let sink = InMemoryNodeStore::new();
        let trie = HexaryTrie::from_root(&sink, root.clone());

        // Resolve the root node once, backfilling it if necessary, then walk
        // every subsequent step through `traverse_from` instead of `traverse`.
        let root_node = loop {
            match trie.root_node() {
                Ok(node) => break node,
                Err(TraversalFault::MissingNode { missing_node_hash, .. }) => {
                    let bytes = source.get(missing_node_hash).unwrap().unwrap();
                    sink.put(missing_node_hash, bytes).unwrap();
                }
                Err(e) => panic!("unexpected traversal fault: {e:?}"),
            }
        };

        let mut fog = HexaryTrieFog::new();
        let budget = 2 * source.len().max(1) + 16;
        let mut iterations = 0;
        while !fog.is_complete() {
            iterations += 1;
            prop_assert!(iterations <= budget);
            let target = fog.nearest_unknown(&Nibbles::empty()).unwrap();
            fog = match trie.traverse_from(&root_node, &target) {
                Ok(node) => fog.explore(&target, &node.sub_segments).unwrap(),
                Err(TraversalFault::PartialPath { node, nibbles_traversed }) => {
                    fog.explore(&nibbles_traversed, &node.sub_segments).unwrap()
                }
                Err(TraversalFault::MissingNode { missing_node_hash, .. }) => {
                    let bytes = source.get(missing_node_hash).unwrap().unwrap();
                    sink.put(missing_node_hash, bytes).unwrap();
                    fog
                }
                Err(e) => panic!("unexpected traversal fault: {e:?}"),
            };
        }

        prop_assert_eq!(all_keys(&sink, root), {
            let mut expected = keys;
            expected.sort();
            expected
        });
    }

    #[test]
    fn cached_traverse_from_shortcuts_repeat_walks(keys in key_set_strategy()) {
        let source = InMemoryNodeStore::new();
        let root = make_trie(&source, &keys);

        let sink = InMemoryNodeStore::new();
        let trie = HexaryTrie::from_root(&sink, root.clone());
        let mut cache = TrieFrontierCache::new();
        let mut fog = HexaryTrieFog::new();
        let budget = 2 * source.len().max(1) + 16;
        let mut iterations = 0;

        while !fog.is_complete() {
            iterations += 1;
            prop_assert!(iterations <= budget);
            let target = fog.nearest_unknown(&Nibbles::empty()).unwrap();

            let traversed = match cache.get(&target) {
                Ok((node, _suffix)) => Ok(hexary_trie_walk::HexaryTrieNode::from(&node)),
                Err(_not_cached) => trie.traverse(&target),
            };

            fog = match traversed {
                Ok(node) => {
                    cache.add(target.clone(), node.raw.clone(), node.sub_segments.clone());
                    fog.explore(&target, &node.sub_segments).unwrap()
                }
                Err(TraversalFault::PartialPath { node, nibbles_traversed }) => {
                    fog.explore(&nibbles_traversed, &node.sub_segments).unwrap()
                }
                Err(TraversalFault::MissingNode { missing_node_hash, .. }) => {
                    let bytes = source.get(missing_node_hash).unwrap().unwrap();
                    sink.put(missing_node_hash, bytes).unwrap();
                    fog
                }
                Err(e) => panic!("unexpected traversal fault: {e:?}"),
            };
        }

        prop_assert!(fog.is_complete());
        prop_assert_eq!(all_keys(&sink, root), {
            let mut expected = keys;
            expected.sort();
            expected
        });
    }
}

/// A batch of index-addressed edits applied to an existing key list:
/// `Some(value)` updates the key at that (1-based, wrapping) index in place,
/// `None` deletes it. Neither ever changes which keys exist, only whether
/// one is present and what it's worth - matching how a beam-sync peer
/// observes a root transition mid-walk.
fn apply_indexed_changes(
    store: &InMemoryNodeStore,
    root: NodeHash,
    keys: &[Vec<u8>],
    changes: &[(usize, Option<Vec<u8>>)],
) -> (NodeHash, Vec<Vec<u8>>) {
    let mut trie = HexaryTrie::from_root(store, root);
    let mut remaining = keys.to_vec();
    let mut batch = trie.squash_changes();
    for (idx, value) in changes {
        let key = keys[(*idx - 1) % keys.len()].clone();
        match value {
            Some(v) => {
                batch.set(&key, v.clone()).unwrap();
            }
            None => {
                batch.delete(&key).unwrap();
                remaining.retain(|k| k != &key);
            }
        }
    }
    batch.commit().unwrap();
    (trie.root_ref().clone(), remaining)
}

#[test]
fn root_change_mid_walk_is_absorbed_by_the_same_fog() {
    let keys: Vec<Vec<u8>> = vec![
        b"\x00\x00\x00".to_vec(),
        b"\x01\x00\x00".to_vec(),
        b"\x01\x00\x01".to_vec(),
        b"\x10\x00\x00".to_vec(),
    ];

    let source = InMemoryNodeStore::new();
    let root = make_trie(&source, &keys);

    let sink = InMemoryNodeStore::new();
    let trie = HexaryTrie::from_root(&sink, root.clone());
    let mut fog = HexaryTrieFog::new();

    // Walk partway in: enough steps to backfill the root and expand at
    // least one real fog entry before the root changes under us.
    for _ in 0..3 {
        if fog.is_complete() {
            break;
        }
        fog = walk_step(&trie, &fog, &source, &sink);
    }
    assert!(!fog.is_complete(), "test setup should leave the fog unfinished");

    // The authoritative side applies a batch of edits against the full
    // store: update key 1 ("\x00\x00\x00") in place, delete key 4
    // ("\x10\x00\x00", 1-based index wraps within the 4-key list).
    let changes = vec![(1usize, Some(vec![0u8; 7])), (4usize, None)];
    let (new_root, remaining_keys) = apply_indexed_changes(&source, root, &keys, &changes);

    // Continue the walk against the new root with the SAME fog, handling
    // `TraversedPartialPath` the same way `walk_step` already does.
    let trie = HexaryTrie::from_root(&sink, new_root.clone());
    let budget = 2 * source.len().max(1) + 32;
    let fog = continue_fog(&trie, fog, &source, &sink, budget);

    assert!(fog.is_complete());
    let mut expected = remaining_keys;
    expected.sort();
    assert_eq!(all_keys(&sink, new_root.clone()), expected);

    let full_trie = HexaryTrie::from_root(&source, new_root);
    assert_eq!(full_trie.get(b"\x00\x00\x00").unwrap(), Some(vec![0u8; 7]));
    assert_eq!(full_trie.get(b"\x10\x00\x00").unwrap(), None);
}

// --- Seed scenarios from the design notes (S1-S6) -------------------------

#[test]
fn s1_empty_trie() {
    let store = InMemoryNodeStore::new();
    let trie = HexaryTrie::new(&store);
    let expected = ethereum_types::H256::from_slice(Keccak256::new().chain_update([0x80u8]).finalize().as_slice());
    assert_eq!(trie.root_hash(), expected);

    let fog = HexaryTrieFog::new();
    assert_eq!(fog.unknown_prefixes(), &[Nibbles::empty()]);
    assert_eq!(fog.nearest_unknown(&Nibbles::empty()).unwrap(), Nibbles::empty());

    let fog = fog.explore(&Nibbles::empty(), &[]).unwrap();
    assert!(fog.is_complete());
}

#[test]
fn s2_single_leaf_root() {
    let store = InMemoryNodeStore::new();
    let mut trie = HexaryTrie::new(&store);
    trie.set(b"\x00\x00\x00", b"\x00\x00\x00".to_vec()).unwrap();

    let root = trie.traverse(&Nibbles::empty()).unwrap();
    assert_eq!(root.kind, hexary_trie_walk::NodeKind::Leaf);
    assert_eq!(root.sub_segments, Vec::<Nibbles>::new());
    assert_eq!(root.value, Some(b"\x00\x00\x00".to_vec()));
}

#[test]
fn s3_branch_root_with_partial_path_fault() {
    let store = InMemoryNodeStore::new();
    let mut trie = HexaryTrie::new(&store);
    for key in [b"\x00\x00\x00", b"\x01\x00\x00", b"\x01\x00\x01", b"\x10\x00\x00"] {
        trie.set(key, b"v".to_vec()).unwrap();
    }

    let root = trie.traverse(&Nibbles::empty()).unwrap();
    assert_eq!(root.kind, hexary_trie_walk::NodeKind::Branch);

    let internal = trie.traverse(&Nibbles::from_nibbles([0])).unwrap();
    assert!(matches!(internal.kind, hexary_trie_walk::NodeKind::Leaf | hexary_trie_walk::NodeKind::Extension));

    let err = trie.traverse(&Nibbles::from_nibbles([0, 0])).unwrap_err();
    match err {
        TraversalFault::PartialPath { nibbles_traversed, .. } => {
            assert_eq!(nibbles_traversed, Nibbles::from_nibbles([0, 0]));
        }
        other => panic!("expected PartialPath, got {other:?}"),
    }
}

#[test]
fn s4_delete_then_rewalk_with_fresh_fog() {
    let keys: Vec<Vec<u8>> = vec![
        b"\x00\x00\x00".to_vec(),
        b"\x01\x00\x00".to_vec(),
        b"\x01\x00\x01".to_vec(),
        b"\x10\x00\x00".to_vec(),
    ];
    let store = InMemoryNodeStore::new();
    let root_before = make_trie(&store, &keys);

    let mut trie = HexaryTrie::from_root(&store, root_before);
    let hash_before = trie.root_hash();
    // index 4, 1-based, wraps to keys[3] = "\x10\x00\x00".
    trie.delete(&keys[3]).unwrap();
    let root_after = trie.root_ref().clone();
    assert_ne!(trie.root_hash(), hash_before);

    let fog = HexaryTrieFog::new();
    assert!(!fog.is_complete());
    assert_eq!(
        all_keys(&store, root_after),
        vec![b"\x00\x00\x00".to_vec(), b"\x01\x00\x00".to_vec(), b"\x01\x00\x01".to_vec()]
    );
}

#[test]
fn s5_full_backfill_after_dropping_every_node() {
    let keys: Vec<Vec<u8>> = vec![
        b"\x00\x00\x00".to_vec(),
        b"\x01\x00\x00".to_vec(),
        b"\x01\x00\x01".to_vec(),
        b"\x10\x00\x00".to_vec(),
    ];
    let source = InMemoryNodeStore::new();
    let root = make_trie(&source, &keys);
    let node_count = source.len();

    let sink = InMemoryNodeStore::new();
    let trie = HexaryTrie::from_root(&sink, root.clone());
    let fog = drain_fog(&trie, &source, &sink, 2 * node_count + 4);

    assert!(fog.is_complete());
    assert_eq!(sink.len(), node_count);
    assert_eq!(all_keys(&sink, root), keys);
}

#[test]
fn s6_root_change_with_update_and_delete() {
    root_change_mid_walk_is_absorbed_by_the_same_fog();
}
