//! Lexicographic-order key enumeration, assuming a complete backing store.
//!
//! `next(prev_key)` is stateless with respect to the iterator object: each
//! call rebuilds a stack of `(path, NodeHash)` frames from the root and
//! walks it fresh rather than resuming one held across calls. Internally
//! it's the same restartable-lazy-sequence walk every time; `next` is a
//! thin wrapper around "position to >= prev_key, then skip prev_key itself
//! if it's still there."
use std::cmp::Ordering;

use crate::db::NodeStore;
use crate::error::TraversalFault;
use crate::nibbles::Nibbles;
use crate::node::Node;
use crate::node_hash::NodeHash;
use crate::resolve_traversal;

pub struct NodeIterator<'s> {
    store: &'s dyn NodeStore,
    root: NodeHash,
}

impl<'s> NodeIterator<'s> {
    pub fn new(store: &'s dyn NodeStore, root: NodeHash) -> Self {
        Self { store, root }
    }

    /// Returns the smallest key strictly greater than `prev_key`, or the
    /// smallest key overall when `prev_key` is empty. `None` once the
    /// whole trie has been enumerated.
    pub fn next(&self, prev_key: &[u8]) -> Result<Option<Vec<u8>>, TraversalFault> {
        let mut stack = self.build_stack(prev_key)?;
        let first = Self::pop_to_value(&mut stack, self.store)?;

        let prev_nibbles = Nibbles::from_bytes(prev_key);
        match first {
            None => Ok(None),
            Some((path, _)) if !prev_key.is_empty() && path == prev_nibbles => {
                let second = Self::pop_to_value(&mut stack, self.store)?;
                Ok(second.and_then(|(p, _)| p.to_bytes()))
            }
            Some((path, _)) => Ok(path.to_bytes()),
        }
    }

    /// Descends toward `target`, pushing every sibling subtree known to
    /// sort at or after it so a subsequent pop walks them in ascending
    /// order. Stops as soon as the remaining target is exhausted or a
    /// leaf is reached.
    fn build_stack(&self, target: &[u8]) -> Result<Vec<(Nibbles, NodeHash)>, TraversalFault> {
        let root_node = resolve_traversal(&self.root, self.store, &Nibbles::empty())?;
        if matches!(root_node, Node::Blank) {
            return Ok(Vec::new());
        }

        let mut stack = vec![(Nibbles::empty(), self.root.clone())];
        let mut target_nibbles = Nibbles::from_bytes(target);
        let mut prefix = Nibbles::empty();
        let mut node_ref = self.root.clone();

        loop {
            if target_nibbles.is_empty() {
                break;
            }
            let node = resolve_traversal(&node_ref, self.store, &prefix)?;
            match node {
                Node::Blank => {
                    stack.clear();
                    break;
                }
                Node::Branch(branch) => {
                    stack.pop();
                    let choice = target_nibbles.get(0).expect("checked non-empty") as usize;
                    for i in (choice + 1..16).rev() {
                        if let Some(child) = &branch.children[i] {
                            stack.push((prefix.concat(&Nibbles::single(i as u8)), child.clone()));
                        }
                    }
                    match &branch.children[choice] {
                        Some(child) => {
                            node_ref = child.clone();
                            prefix = prefix.concat(&Nibbles::single(choice as u8));
                            target_nibbles = target_nibbles.tail(1);
                            stack.push((prefix.clone(), node_ref.clone()));
                        }
                        None => break,
                    }
                }
                Node::Extension(ext) => match target_nibbles.compare_prefix(&ext.path) {
                    Ordering::Greater => {
                        stack.pop();
                        break;
                    }
                    Ordering::Less => break,
                    Ordering::Equal if target_nibbles.len() <= ext.path.len() => break,
                    Ordering::Equal => {
                        stack.pop();
                        target_nibbles = target_nibbles.tail(ext.path.len());
                        prefix = prefix.concat(&ext.path);
                        node_ref = ext.child.clone();
                        stack.push((prefix.clone(), node_ref.clone()));
                    }
                },
                Node::Leaf(leaf) => {
                    if target_nibbles.compare_prefix(&leaf.path) == Ordering::Greater {
                        stack.pop();
                    }
                    break;
                }
            }
        }

        Ok(stack)
    }

    /// Pops frames until it finds a yieldable key (a Leaf, or a
    /// Branch-with-value), expanding every Branch's children onto the
    /// stack as it passes through.
    fn pop_to_value(
        stack: &mut Vec<(Nibbles, NodeHash)>,
        store: &dyn NodeStore,
    ) -> Result<Option<(Nibbles, Node)>, TraversalFault> {
        while let Some((mut path, node_ref)) = stack.pop() {
            let mut node = resolve_traversal(&node_ref, store, &path)?;
            loop {
                match node {
                    Node::Blank => break,
                    Node::Leaf(leaf) => {
                        path = path.concat(&leaf.path);
                        return Ok(Some((path, Node::Leaf(leaf))));
                    }
                    Node::Extension(ext) => {
                        path = path.concat(&ext.path);
                        node = resolve_traversal(&ext.child, store, &path)?;
                    }
                    Node::Branch(branch) => {
                        for (i, child) in branch.children.iter().enumerate().rev() {
                            if let Some(child_ref) = child {
                                stack.push((path.concat(&Nibbles::single(i as u8)), child_ref.clone()));
                            }
                        }
                        if branch.value.is_some() {
                            return Ok(Some((path.clone(), Node::Branch(branch))));
                        }
                        break;
                    }
                }
            }
        }
        Ok(None)
    }
}
