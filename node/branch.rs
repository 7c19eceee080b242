use crate::db::NodeStore;
use crate::error::MutationFault;
use crate::nibbles::Nibbles;
use crate::node::extension::merge_prefix;
use crate::node::{LeafNode, Node};
use crate::node_hash::{NodeHash, NodeWriter};

/// 16-way branch. `value` holds the value stored at this exact path, if any
/// (the key that ends here rather than passing through).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchNode {
    pub children: [Option<NodeHash>; 16],
    pub value: Option<Vec<u8>>,
}

impl BranchNode {
    pub fn get(
        &self,
        store: &dyn NodeStore,
        path: &Nibbles,
        key: &Nibbles,
        prefix_so_far: &Nibbles,
    ) -> Result<Option<Vec<u8>>, MutationFault> {
        match path.get(0) {
            None => Ok(self.value.clone()),
            Some(nibble) => match &self.children[nibble as usize] {
                None => Ok(None),
                Some(child_ref) => {
                    let child = load(child_ref, store, key, prefix_so_far)?;
                    let sub_prefix = prefix_so_far.concat(&Nibbles::single(nibble));
                    child.get(store, &path.tail(1), key, &sub_prefix)
                }
            },
        }
    }

    pub fn insert(
        mut self,
        store: &dyn NodeStore,
        writer: &mut dyn NodeWriter,
        path: &Nibbles,
        value: Vec<u8>,
        key: &Nibbles,
        prefix_so_far: &Nibbles,
    ) -> Result<Node, MutationFault> {
        match path.get(0) {
            None => {
                self.value = Some(value);
                Ok(self.into())
            }
            Some(nibble) => {
                let idx = nibble as usize;
                let rest = path.tail(1);
                let new_child = match &self.children[idx] {
                    None => LeafNode { path: rest, value }.into(),
                    Some(child_ref) => {
                        let sub_prefix = prefix_so_far.concat(&Nibbles::single(nibble));
                        let child = load(child_ref, store, key, prefix_so_far)?;
                        child.insert(store, writer, &rest, value, key, &sub_prefix)?
                    }
                };
                self.children[idx] = Some(new_child.commit(writer)?);
                Ok(self.into())
            }
        }
    }

    pub fn remove(
        mut self,
        store: &dyn NodeStore,
        writer: &mut dyn NodeWriter,
        path: &Nibbles,
        key: &Nibbles,
        prefix_so_far: &Nibbles,
    ) -> Result<(Option<Node>, Option<Vec<u8>>), MutationFault> {
        let removed_value;
        match path.get(0) {
            None => {
                removed_value = self.value.take();
                if removed_value.is_none() {
                    return Ok((Some(self.into()), None));
                }
            }
            Some(nibble) => {
                let idx = nibble as usize;
                let Some(child_ref) = &self.children[idx] else {
                    return Ok((Some(self.into()), None));
                };
                let sub_prefix = prefix_so_far.concat(&Nibbles::single(nibble));
                let child = load(child_ref, store, key, prefix_so_far)?;
                let (new_child, removed) =
                    child.remove(store, writer, &path.tail(1), key, &sub_prefix)?;
                removed_value = removed;
                if removed_value.is_none() {
                    return Ok((Some(self.into()), None));
                }
                self.children[idx] = match new_child {
                    None => None,
                    Some(n) => Some(n.commit(writer)?),
                };
            }
        }

        // Collapse: a branch with at most one remaining live exit cannot
        // stand on its own - fold it into a Leaf or an Extension.
        let live: Vec<usize> = self
            .children
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|_| i))
            .collect();

        match (live.len(), &self.value) {
            (0, None) => Ok((None, removed_value)),
            (0, Some(_)) => {
                let value = self.value.take().expect("checked Some");
                Ok((Some(LeafNode { path: Nibbles::empty(), value }.into()), removed_value))
            }
            (1, None) => {
                let idx = live[0];
                let child_ref = self.children[idx].take().expect("checked Some");
                let sub_prefix = prefix_so_far.concat(&Nibbles::single(idx as u8));
                let child = load(&child_ref, store, key, &sub_prefix)?;
                let merged = merge_prefix(writer, Nibbles::single(idx as u8), child)?;
                Ok((Some(merged), removed_value))
            }
            _ => Ok((Some(self.into()), removed_value)),
        }
    }
}

fn load(
    child: &NodeHash,
    store: &dyn NodeStore,
    key: &Nibbles,
    prefix_so_far: &Nibbles,
) -> Result<Node, MutationFault> {
    child
        .resolve(store)
        .map_err(|e| e.into_mutation(key.clone(), prefix_so_far.clone()))?
        .ok_or_else(|| match child.as_hash() {
            Some(hash) => MutationFault::MissingNode {
                missing_node_hash: hash,
                key: key.clone(),
                prefix_traversed: prefix_so_far.clone(),
            },
            None => unreachable!("inline references are never missing"),
        })
}
