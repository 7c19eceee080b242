pub mod cache;
pub mod codec;
pub mod db;
pub mod error;
pub mod fog;
pub mod iter;
mod nibbles;
mod node;
mod node_hash;

pub use cache::TrieFrontierCache;
pub use db::{InMemoryNodeStore, NodeStore};
pub use error::{CodecError, MutationFault, NotCached, NotUnknown, PerfectVisibility, TraversalFault};
pub use fog::HexaryTrieFog;
pub use iter::NodeIterator;
pub use nibbles::{Nibble, Nibbles};
pub use node::{BranchNode, ExtensionNode, HexaryTrieNode, LeafNode, Node, NodeKind};
pub use node_hash::NodeHash;

use node_hash::{NodeWriter, StoreWriter};

/// A persistent, content-addressed Merkle-Patricia trie whose backing store
/// may not hold every node reachable from the current root.
pub struct HexaryTrie<'s> {
    store: &'s dyn NodeStore,
    root: NodeHash,
}

impl<'s> HexaryTrie<'s> {
    /// Opens an empty trie backed by `store`.
    pub fn new(store: &'s dyn NodeStore) -> Self {
        Self { store, root: Node::Blank.commit_root(&mut StoreWriter(store)).expect("blank never faults") }
    }

    /// Opens a trie at a known root hash. The store need not yet contain the
    /// nodes reachable from it - traversal will report what's missing.
    pub fn from_root(store: &'s dyn NodeStore, root: NodeHash) -> Self {
        Self { store, root }
    }

    /// The 256-bit hash of the current root. Always a proper hash, even
    /// when the root's own encoding would otherwise be small enough to
    /// inline - the root is never embedded in anything else.
    pub fn root_hash(&self) -> ethereum_types::H256 {
        match &self.root {
            NodeHash::Hashed(h) => *h,
            NodeHash::Inline(raw) => node_hash::keccak(raw),
        }
    }

    pub fn root_ref(&self) -> &NodeHash {
        &self.root
    }

    /// The decoded root node.
    pub fn root_node(&self) -> Result<HexaryTrieNode, TraversalFault> {
        let node = resolve_traversal(&self.root, self.store, &Nibbles::empty())?;
        Ok(HexaryTrieNode::from(&node))
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, MutationFault> {
        let path = Nibbles::from_bytes(key);
        let root = resolve_mutation(&self.root, self.store, &path, &Nibbles::empty())?;
        root.get(self.store, &path, &path, &Nibbles::empty())
    }

    /// Rejects `value = []` - callers use `delete` for that.
    pub fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), MutationFault> {
        if value.is_empty() {
            return Err(MutationFault::EmptyValue);
        }
        let path = Nibbles::from_bytes(key);
        let mut writer = StoreWriter(self.store);
        let root = resolve_mutation(&self.root, self.store, &path, &Nibbles::empty())?;
        let new_root = root.insert(self.store, &mut writer, &path, value, &path, &Nibbles::empty())?;
        self.root = new_root.commit_root(&mut writer)?;
        Ok(())
    }

    /// A no-op if `key` is absent.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), MutationFault> {
        let path = Nibbles::from_bytes(key);
        let mut writer = StoreWriter(self.store);
        let root = resolve_mutation(&self.root, self.store, &path, &Nibbles::empty())?;
        let (new_root, _) = root.remove(self.store, &mut writer, &path, &path, &Nibbles::empty())?;
        self.root = match new_root {
            Some(n) => n.commit_root(&mut writer)?,
            None => Node::Blank.commit_root(&mut writer)?,
        };
        Ok(())
    }

    /// Navigates from the root along `path`, returning the node located at
    /// exactly that path.
    pub fn traverse(&self, path: &Nibbles) -> Result<HexaryTrieNode, TraversalFault> {
        let root = resolve_traversal(&self.root, self.store, &Nibbles::empty())?;
        traverse_core(root, path, self.store)
    }

    /// Like `traverse`, but starts from a previously returned node instead
    /// of the root - no store lookup for the anchor itself.
    pub fn traverse_from(
        &self,
        anchor: &HexaryTrieNode,
        sub_path: &Nibbles,
    ) -> Result<HexaryTrieNode, TraversalFault> {
        let anchor_node = Node::decode_raw(&anchor.raw)?;
        traverse_core(anchor_node, sub_path, self.store)
    }

    /// Opens a scoped batch: multiple `set`/`delete` calls that become one
    /// durable root transition on `commit`, or vanish entirely on `abort`
    /// (or on drop without a commit).
    pub fn squash_changes(&mut self) -> TrieBatch<'_, 's> {
        TrieBatch {
            trie: self,
            root: None,
            staged: Vec::new(),
            committed: false,
        }
    }
}

fn traverse_core(
    mut node: Node,
    path: &Nibbles,
    store: &dyn NodeStore,
) -> Result<HexaryTrieNode, TraversalFault> {
    let mut consumed = Nibbles::empty();
    let mut remaining = path.clone();

    loop {
        match node {
            Node::Blank => return Ok(HexaryTrieNode::from(&Node::Blank)),
            Node::Leaf(leaf) => {
                if remaining.len() >= leaf.path.len() && remaining.compare_prefix(&leaf.path).is_eq()
                {
                    if remaining.len() == leaf.path.len() {
                        return Ok(HexaryTrieNode::from(&Node::Leaf(leaf)));
                    }
                    // remaining longer than the leaf's own path: no such node
                    return Ok(HexaryTrieNode::from(&Node::Blank));
                }
                if leaf.path.compare_prefix(&remaining).is_eq() && remaining.len() < leaf.path.len() {
                    consumed = consumed.concat(&remaining);
                    return Err(TraversalFault::PartialPath {
                        node: HexaryTrieNode::from(&Node::Leaf(leaf)),
                        nibbles_traversed: consumed,
                    });
                }
                return Ok(HexaryTrieNode::from(&Node::Blank));
            }
            Node::Extension(ext) => {
                if remaining.len() < ext.path.len() {
                    if ext.path.compare_prefix(&remaining).is_eq() {
                        consumed = consumed.concat(&remaining);
                        return Err(TraversalFault::PartialPath {
                            node: HexaryTrieNode::from(&Node::Extension(ext)),
                            nibbles_traversed: consumed,
                        });
                    }
                    return Ok(HexaryTrieNode::from(&Node::Blank));
                }
                if !ext.path.is_prefix_of(&remaining) {
                    return Ok(HexaryTrieNode::from(&Node::Blank));
                }
                consumed = consumed.concat(&ext.path);
                remaining = remaining.tail(ext.path.len());
                node = resolve_traversal(&ext.child, store, &consumed)?;
            }
            Node::Branch(branch) => {
                if remaining.is_empty() {
                    return Ok(HexaryTrieNode::from(&Node::Branch(branch)));
                }
                let nibble = remaining.get(0).expect("checked non-empty");
                match &branch.children[nibble as usize] {
                    None => return Ok(HexaryTrieNode::from(&Node::Blank)),
                    Some(child_ref) => {
                        consumed = consumed.concat(&Nibbles::single(nibble));
                        remaining = remaining.tail(1);
                        node = resolve_traversal(child_ref, store, &consumed)?;
                    }
                }
            }
        }
    }
}

pub(crate) fn resolve_traversal(
    hash: &NodeHash,
    store: &dyn NodeStore,
    path_traversed: &Nibbles,
) -> Result<Node, TraversalFault> {
    hash.resolve(store)
        .map_err(|e| e.into_traversal(path_traversed.clone()))?
        .ok_or_else(|| match hash.as_hash() {
            Some(h) => TraversalFault::MissingNode {
                missing_node_hash: h,
                path_traversed: path_traversed.clone(),
            },
            None => unreachable!("inline references are never missing"),
        })
}

fn resolve_mutation(
    hash: &NodeHash,
    store: &dyn NodeStore,
    key: &Nibbles,
    prefix_traversed: &Nibbles,
) -> Result<Node, MutationFault> {
    hash.resolve(store)
        .map_err(|e| e.into_mutation(key.clone(), prefix_traversed.clone()))?
        .ok_or_else(|| match hash.as_hash() {
            Some(h) => MutationFault::MissingNode {
                missing_node_hash: h,
                key: key.clone(),
                prefix_traversed: prefix_traversed.clone(),
            },
            None => unreachable!("inline references are never missing"),
        })
}

/// A staged batch of mutations against a [`HexaryTrie`]. New node bodies are
/// accumulated in memory and only written through to the store - and the
/// trie's root swapped - on [`TrieBatch::commit`]. Dropping the batch
/// without committing discards every staged mutation.
pub struct TrieBatch<'t, 's> {
    trie: &'t mut HexaryTrie<'s>,
    root: Option<NodeHash>,
    staged: Vec<(ethereum_types::H256, Vec<u8>)>,
    committed: bool,
}

impl<'t, 's> TrieBatch<'t, 's> {
    fn current_root(&self) -> NodeHash {
        self.root.clone().unwrap_or_else(|| self.trie.root.clone())
    }

    pub fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), MutationFault> {
        if value.is_empty() {
            return Err(MutationFault::EmptyValue);
        }
        let path = Nibbles::from_bytes(key);
        let root_ref = self.current_root();
        let root = resolve_mutation(&root_ref, self.trie.store, &path, &Nibbles::empty())?;
        let mut writer = StagingWriter { staged: &mut self.staged };
        let new_root =
            root.insert(self.trie.store, &mut writer, &path, value, &path, &Nibbles::empty())?;
        self.root = Some(new_root.commit_root(&mut writer)?);
        Ok(())
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<(), MutationFault> {
        let path = Nibbles::from_bytes(key);
        let root_ref = self.current_root();
        let root = resolve_mutation(&root_ref, self.trie.store, &path, &Nibbles::empty())?;
        let mut writer = StagingWriter { staged: &mut self.staged };
        let (new_root, _) =
            root.remove(self.trie.store, &mut writer, &path, &path, &Nibbles::empty())?;
        self.root = Some(match new_root {
            Some(n) => n.commit_root(&mut writer)?,
            None => Node::Blank.commit_root(&mut writer)?,
        });
        Ok(())
    }

    /// Flushes every staged node body to the store and swaps the trie's
    /// root in a single step. No-op (empty write set, unchanged root) if
    /// nothing was ever staged.
    pub fn commit(mut self) -> Result<(), MutationFault> {
        for (hash, bytes) in self.staged.drain(..) {
            self.trie.store.put(hash, bytes).map_err(MutationFault::Store)?;
        }
        if let Some(root) = self.root.take() {
            self.trie.root = root;
        }
        self.committed = true;
        Ok(())
    }

    /// Discards every staged mutation; the trie is left exactly as it was.
    pub fn abort(mut self) {
        self.staged.clear();
        self.committed = true;
    }
}

impl<'t, 's> Drop for TrieBatch<'t, 's> {
    fn drop(&mut self) {
        if !self.committed {
            self.staged.clear();
        }
    }
}

struct StagingWriter<'a> {
    staged: &'a mut Vec<(ethereum_types::H256, Vec<u8>)>,
}

impl<'a> NodeWriter for StagingWriter<'a> {
    fn write(&mut self, hash: ethereum_types::H256, bytes: Vec<u8>) -> Result<(), anyhow::Error> {
        self.staged.push((hash, bytes));
        Ok(())
    }
}
