mod branch;
mod extension;
mod leaf;

pub use branch::BranchNode;
pub use extension::ExtensionNode;
pub use leaf::LeafNode;

use crate::codec;
use crate::db::NodeStore;
use crate::error::{CodecError, MutationFault};
use crate::nibbles::Nibbles;
use crate::node_hash::{keccak, NodeHash, NodeWriter};

/// A decoded Merkle-Patricia trie node.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// The canonical empty trie root.
    Blank,
    Leaf(LeafNode),
    Extension(ExtensionNode),
    Branch(Box<BranchNode>),
}

impl From<LeafNode> for Node {
    fn from(n: LeafNode) -> Self {
        Node::Leaf(n)
    }
}

impl From<ExtensionNode> for Node {
    fn from(n: ExtensionNode) -> Self {
        Node::Extension(n)
    }
}

impl From<BranchNode> for Node {
    fn from(n: BranchNode) -> Self {
        Node::Branch(Box::new(n))
    }
}

impl Node {
    pub fn encode_raw(&self) -> Vec<u8> {
        codec::encode_node(self)
    }

    pub fn decode_raw(bytes: &[u8]) -> Result<Self, CodecError> {
        codec::decode_node(bytes)
    }

    /// Hashes (or inlines) this node's canonical encoding. A `Hashed` result
    /// is also written out through `writer`; an `Inline` body is embedded in
    /// the parent's own encoding and never stored standalone.
    pub fn commit(&self, writer: &mut dyn NodeWriter) -> Result<NodeHash, MutationFault> {
        let raw = self.encode_raw();
        let hash = NodeHash::from_encoded(&raw);
        if let NodeHash::Hashed(h) = hash {
            writer.write(h, raw).map_err(MutationFault::Store)?;
        }
        Ok(hash)
    }

    /// Commits a trie root. Unlike `commit`, this never inlines: a root is
    /// addressed standalone by peers doing partial-visibility sync, so its
    /// encoding is always hashed and written to the store even when it would
    /// otherwise be small enough to embed in a parent.
    pub fn commit_root(&self, writer: &mut dyn NodeWriter) -> Result<NodeHash, MutationFault> {
        let raw = self.encode_raw();
        let hash = keccak(&raw);
        writer.write(hash, raw).map_err(MutationFault::Store)?;
        Ok(NodeHash::Hashed(hash))
    }

    /// The tag used by `HexaryTrieNode::kind`.
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Blank => NodeKind::Blank,
            Node::Leaf(_) => NodeKind::Leaf,
            Node::Extension(_) => NodeKind::Extension,
            Node::Branch(_) => NodeKind::Branch,
        }
    }

    /// One path per live outbound edge: for `Branch`, the single-nibble
    /// labels of populated children; for `Extension`, its own path as a
    /// single element; `Leaf`/`Blank` have none.
    pub fn sub_segments(&self) -> Vec<Nibbles> {
        match self {
            Node::Blank | Node::Leaf(_) => Vec::new(),
            Node::Extension(e) => vec![e.path.clone()],
            Node::Branch(b) => b
                .children
                .iter()
                .enumerate()
                .filter_map(|(i, child)| child.as_ref().map(|_| Nibbles::single(i as u8)))
                .collect(),
        }
    }

    pub fn value(&self) -> Option<&[u8]> {
        match self {
            Node::Leaf(l) => Some(&l.value),
            Node::Branch(b) => b.value.as_deref(),
            Node::Extension(_) | Node::Blank => None,
        }
    }

    /// Looks up `path` (relative to this node) under `key`/`prefix_so_far`
    /// tracked for fault reporting.
    pub fn get(
        &self,
        store: &dyn NodeStore,
        path: &Nibbles,
        key: &Nibbles,
        prefix_so_far: &Nibbles,
    ) -> Result<Option<Vec<u8>>, MutationFault> {
        match self {
            Node::Blank => Ok(None),
            Node::Leaf(l) => Ok(l.get(path)),
            Node::Extension(e) => e.get(store, path, key, prefix_so_far),
            Node::Branch(b) => b.get(store, path, key, prefix_so_far),
        }
    }

    pub fn insert(
        self,
        store: &dyn NodeStore,
        writer: &mut dyn NodeWriter,
        path: &Nibbles,
        value: Vec<u8>,
        key: &Nibbles,
        prefix_so_far: &Nibbles,
    ) -> Result<Node, MutationFault> {
        match self {
            Node::Blank => Ok(LeafNode { path: path.clone(), value }.into()),
            Node::Leaf(l) => l.insert(writer, path, value),
            Node::Extension(e) => e.insert(store, writer, path, value, key, prefix_so_far),
            Node::Branch(b) => b.insert(store, writer, path, value, key, prefix_so_far),
        }
    }

    /// Returns `(None, _)` when this node is fully consumed by the removal
    /// (the caller should drop the edge pointing at it).
    pub fn remove(
        self,
        store: &dyn NodeStore,
        writer: &mut dyn NodeWriter,
        path: &Nibbles,
        key: &Nibbles,
        prefix_so_far: &Nibbles,
    ) -> Result<(Option<Node>, Option<Vec<u8>>), MutationFault> {
        match self {
            Node::Blank => Ok((None, None)),
            Node::Leaf(l) => Ok(l.remove(path)),
            Node::Extension(e) => e.remove(store, writer, path, key, prefix_so_far),
            Node::Branch(b) => b.remove(store, writer, path, key, prefix_so_far),
        }
    }
}

/// Tag distinguishing the four node variants, as exposed on `HexaryTrieNode`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Blank,
    Leaf,
    Extension,
    Branch,
}

/// The node returned by `traverse`/`traverse_from`: the decoded node at the
/// requested path, together with everything a walker needs to keep exploring
/// without decoding it again.
#[derive(Clone, Debug, PartialEq)]
pub struct HexaryTrieNode {
    pub kind: NodeKind,
    pub value: Option<Vec<u8>>,
    pub sub_segments: Vec<Nibbles>,
    pub raw: Vec<u8>,
}

impl From<&Node> for HexaryTrieNode {
    fn from(node: &Node) -> Self {
        HexaryTrieNode {
            kind: node.kind(),
            value: node.value().map(|v| v.to_vec()),
            sub_segments: node.sub_segments(),
            raw: node.encode_raw(),
        }
    }
}
