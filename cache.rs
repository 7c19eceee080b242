//! A prefix -> (raw node body, sub-segments) cache used to shortcut
//! repeated root-down walks. Strictly a latency optimisation: every call
//! site must tolerate [`NotCached`] and fall back to root-anchored
//! traversal.
use rustc_hash::FxHashMap;

use crate::error::{CodecError, NotCached};
use crate::nibbles::Nibbles;
use crate::node::Node;

#[derive(Clone, Debug, Default)]
pub struct TrieFrontierCache {
    entries: FxHashMap<Nibbles, (Vec<u8>, Vec<Nibbles>)>,
}

impl TrieFrontierCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores (or overwrites) the node body and sub-segments found at
    /// `prefix`.
    pub fn add(&mut self, prefix: Nibbles, raw_node: Vec<u8>, sub_segments: Vec<Nibbles>) {
        self.entries.insert(prefix, (raw_node, sub_segments));
    }

    /// The cached node whose prefix is the longest stored prefix `<= path`,
    /// decoded, together with the remaining nibbles of `path` beyond it.
    pub fn get(&self, path: &Nibbles) -> Result<(Node, Nibbles), NotCached> {
        let (prefix, (raw, _)) = self
            .entries
            .iter()
            .filter(|(prefix, _)| prefix.is_prefix_of(path))
            .max_by_key(|(prefix, _)| prefix.len())
            .ok_or(NotCached)?;

        let node = Node::decode_raw(raw).map_err(|_: CodecError| NotCached)?;
        Ok((node, path.tail(prefix.len())))
    }

    /// Removes the entry at `prefix`, typically because the node there
    /// turned out to be a leaf (nothing below it to shortcut to).
    pub fn delete(&mut self, prefix: &Nibbles) {
        self.entries.remove(prefix);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
