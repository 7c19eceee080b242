use ethereum_types::H256;
use sha3::{Digest, Keccak256};
use smallvec::SmallVec;

use crate::db::NodeStore;
use crate::error::LoadError;
use crate::node::Node;

/// A reference to a child node: either its 256-bit hash, or (for small
/// nodes whose encoded body is under 32 bytes) the raw encoded body itself,
/// inlined in place of the hash. An inlined child is never missing - there
/// is no store lookup to fault on.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeHash {
    Hashed(H256),
    Inline(SmallVec<[u8; 32]>),
}

/// Sink for node bodies produced by a mutation. Direct `set`/`delete` calls
/// write straight through to the `NodeStore`; a `squash_changes` batch
/// collects them in memory and flushes only on commit.
pub trait NodeWriter {
    fn write(&mut self, hash: H256, bytes: Vec<u8>) -> Result<(), anyhow::Error>;
}

/// Writes straight through to a `NodeStore`, used outside of a batch scope.
pub struct StoreWriter<'s>(pub &'s dyn NodeStore);

impl<'s> NodeWriter for StoreWriter<'s> {
    fn write(&mut self, hash: H256, bytes: Vec<u8>) -> Result<(), anyhow::Error> {
        self.0.put(hash, bytes)
    }
}

impl NodeHash {
    /// Hashes or inlines an encoded node body: bodies shorter
    /// than 32 bytes are inlined rather than hashed.
    pub fn from_encoded(body: &[u8]) -> NodeHash {
        if body.len() < 32 {
            NodeHash::Inline(SmallVec::from_slice(body))
        } else {
            NodeHash::Hashed(keccak(body))
        }
    }

    pub fn as_hash(&self) -> Option<H256> {
        match self {
            NodeHash::Hashed(h) => Some(*h),
            NodeHash::Inline(_) => None,
        }
    }

    /// Resolves this reference to a decoded node. `Ok(None)` means the
    /// reference points at a hash the store doesn't have - the caller's
    /// signal to backfill and retry. An inline reference is never missing.
    pub fn resolve(&self, store: &dyn NodeStore) -> Result<Option<Node>, LoadError> {
        match self {
            NodeHash::Inline(raw) => Ok(Some(Node::decode_raw(raw)?)),
            NodeHash::Hashed(hash) => match store.get(*hash).map_err(LoadError::Store)? {
                Some(raw) => Ok(Some(Node::decode_raw(&raw)?)),
                None => Ok(None),
            },
        }
    }
}

pub fn keccak(bytes: &[u8]) -> H256 {
    H256::from_slice(Keccak256::new().chain_update(bytes).finalize().as_slice())
}
