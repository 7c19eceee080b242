use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ethereum_types::H256;

/// Backing key-value store for node bodies, keyed by content hash.
///
/// This is the only shared resource the core touches. The core never holds
/// state about outstanding fetches: a caller observing a missing hash is
/// free to retrieve it however it likes (network, disk, a peer) and `put` it
/// back before retrying the failed call.
pub trait NodeStore {
    fn get(&self, hash: H256) -> Result<Option<Vec<u8>>, anyhow::Error>;
    fn put(&self, hash: H256, bytes: Vec<u8>) -> Result<(), anyhow::Error>;
    fn contains(&self, hash: H256) -> Result<bool, anyhow::Error> {
        Ok(self.get(hash)?.is_some())
    }
}

/// In-memory `NodeStore`, used by the test suite and as a reference for how
/// a real backing database plugs into `HexaryTrie`. Puts are idempotent
/// since the hash determines the bytes.
#[derive(Clone, Default)]
pub struct InMemoryNodeStore {
    inner: Arc<Mutex<HashMap<H256, Vec<u8>>>>,
}

impl InMemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes a node, simulating a peer that hasn't delivered it yet.
    /// Used by tests that drop the whole store and backfill on demand.
    pub fn drop_node(&self, hash: H256) -> Option<Vec<u8>> {
        self.inner.lock().expect("lock poisoned").remove(&hash)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NodeStore for InMemoryNodeStore {
    fn get(&self, hash: H256) -> Result<Option<Vec<u8>>, anyhow::Error> {
        Ok(self.inner.lock().expect("lock poisoned").get(&hash).cloned())
    }

    fn put(&self, hash: H256, bytes: Vec<u8>) -> Result<(), anyhow::Error> {
        self.inner.lock().expect("lock poisoned").insert(hash, bytes);
        Ok(())
    }
}
