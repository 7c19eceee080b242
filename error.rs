use ethereum_types::H256;
use thiserror::Error;

use crate::node::HexaryTrieNode;
use crate::nibbles::Nibbles;

/// Failure decoding a node body read back from the store.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("rlp decode error: {0}")]
    Rlp(#[from] alloy_rlp::Error),
    #[error("malformed node encoding: {0}")]
    Malformed(&'static str),
}

/// Recoverable fault raised by `traverse`/`traverse_from`/`NodeIterator::next`.
///
/// `MissingNode` is the only variant that calls for a retry: fetch
/// `missing_node_hash` from wherever the caller gets node bodies, write it to
/// the `NodeStore`, and call the same operation again.
#[derive(Debug, Error)]
pub enum TraversalFault {
    #[error("node {missing_node_hash:#x} is not in the store (reached {path_traversed:?})")]
    MissingNode {
        missing_node_hash: H256,
        path_traversed: Nibbles,
    },
    #[error("traversal ran out of requested path {nibbles_traversed:?} nibbles into a node")]
    PartialPath {
        node: HexaryTrieNode,
        nibbles_traversed: Nibbles,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("node store error: {0}")]
    Store(anyhow::Error),
}

/// Recoverable fault raised by `get`/`set`/`delete`/`squash_changes` mutations.
#[derive(Debug, Error)]
pub enum MutationFault {
    #[error("node {missing_node_hash:#x} is not in the store (reached {prefix_traversed:?} of key {key:?})")]
    MissingNode {
        missing_node_hash: H256,
        key: Nibbles,
        prefix_traversed: Nibbles,
    },
    #[error("cannot store an empty-bytes value; use delete instead")]
    EmptyValue,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("node store error: {0}")]
    Store(anyhow::Error),
}

/// Raised by `HexaryTrieFog::nearest_unknown` when the fog is empty: every
/// prefix of the key space has been explored.
#[derive(Debug, Error)]
#[error("fog has no unknown prefixes left")]
pub struct PerfectVisibility;

/// Raised by `HexaryTrieFog::explore`/`mark_all_complete` when asked to act
/// on a prefix that is not (or no longer) in the unknown set. A contract
/// violation: the fog is left unchanged.
#[derive(Debug, Error)]
#[error("prefix {0:?} is not in the fog's unknown set")]
pub struct NotUnknown(pub Nibbles);

/// Raised by `TrieFrontierCache::get` when no cached prefix covers the
/// requested path.
#[derive(Debug, Error)]
#[error("no cached node covers this path")]
pub struct NotCached;

/// Internal result of resolving a `NodeHash` against a `NodeStore`, before
/// it is turned into the caller-facing `TraversalFault`/`MutationFault`.
#[derive(Debug, Error)]
pub(crate) enum LoadError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("node store error: {0}")]
    Store(anyhow::Error),
}

impl LoadError {
    pub(crate) fn into_traversal(self, path_traversed: Nibbles) -> TraversalFault {
        match self {
            LoadError::Codec(e) => TraversalFault::Codec(e),
            LoadError::Store(e) => {
                let _ = &path_traversed;
                TraversalFault::Store(e)
            }
        }
    }

    pub(crate) fn into_mutation(self, key: Nibbles, prefix_traversed: Nibbles) -> MutationFault {
        match self {
            LoadError::Codec(e) => MutationFault::Codec(e),
            LoadError::Store(e) => {
                let _ = (&key, &prefix_traversed);
                MutationFault::Store(e)
            }
        }
    }
}
