use crate::db::NodeStore;
use crate::error::MutationFault;
use crate::nibbles::Nibbles;
use crate::node::{BranchNode, LeafNode, Node};
use crate::node_hash::{NodeHash, NodeWriter};

/// `path` is a non-empty shared nibble prefix; `child` references a single
/// child node, always a Branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionNode {
    pub path: Nibbles,
    pub child: NodeHash,
}

impl ExtensionNode {
    pub fn get(
        &self,
        store: &dyn NodeStore,
        path: &Nibbles,
        key: &Nibbles,
        prefix_so_far: &Nibbles,
    ) -> Result<Option<Vec<u8>>, MutationFault> {
        if !self.path.is_prefix_of(path) {
            return Ok(None);
        }
        let child = load(&self.child, store, key, prefix_so_far)?;
        child.get(store, &path.tail(self.path.len()), key, &prefix_so_far.concat(&self.path))
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
        let common = path.common_prefix_len(&self.path);

        if common == self.path.len() {
            let child = load(&self.child, store, key, prefix_so_far)?;
            let new_child = child.insert(
                store,
                writer,
                &path.tail(common),
                value,
                key,
                &prefix_so_far.concat(&self.path),
            )?;
            return Ok(ExtensionNode { path: self.path, child: new_child.commit(writer)? }.into());
        }

        // The new key diverges partway through this extension's own path:
        // split it into a branch.
        let mut children: [Option<NodeHash>; 16] = std::array::from_fn(|_| None);

        let ext_branch_idx = self.path.get(common).expect("common < len");
        let ext_rest = self.path.tail(common + 1);
        let existing_child_ref = if ext_rest.is_empty() {
            self.child
        } else {
            ExtensionNode { path: ext_rest, child: self.child }.into_node().commit(writer)?
        };
        children[ext_branch_idx as usize] = Some(existing_child_ref);

        let mut branch_value = None;
        if path.len() == common {
            branch_value = Some(value);
        } else {
            let idx = path.get(common).expect("common < len");
            let rest = path.tail(common + 1);
            children[idx as usize] = Some(LeafNode { path: rest, value }.into_node().commit(writer)?);
        }

        let branch: Node = BranchNode { children, value: branch_value }.into();
        if common == 0 {
            Ok(branch)
        } else {
            Ok(ExtensionNode { path: path.slice(0, common), child: branch.commit(writer)? }.into())
        }
    }

    pub fn remove(
        self,
        store: &dyn NodeStore,
        writer: &mut dyn NodeWriter,
        path: &Nibbles,
        key: &Nibbles,
        prefix_so_far: &Nibbles,
    ) -> Result<(Option<Node>, Option<Vec<u8>>), MutationFault> {
        if !self.path.is_prefix_of(path) {
            return Ok((Some(self.into()), None));
        }
        let child = load(&self.child, store, key, prefix_so_far)?;
        let (new_child, removed) = child.remove(
            store,
            writer,
            &path.tail(self.path.len()),
            key,
            &prefix_so_far.concat(&self.path),
        )?;
        match new_child {
            None => Ok((None, removed)),
            Some(new_child) => Ok((Some(merge_prefix(writer, self.path, new_child)?), removed)),
        }
    }

    fn into_node(self) -> Node {
        self.into()
    }
}

/// Prepends `prefix` onto a (possibly already merged) child, preserving the
/// invariant that no Extension's child is itself a Leaf or an Extension.
pub(crate) fn merge_prefix(
    writer: &mut dyn NodeWriter,
    prefix: Nibbles,
    child: Node,
) -> Result<Node, MutationFault> {
    Ok(match child {
        Node::Leaf(l) => LeafNode { path: prefix.concat(&l.path), value: l.value }.into(),
        Node::Extension(e) => ExtensionNode { path: prefix.concat(&e.path), child: e.child }.into(),
        Node::Branch(b) => {
            let child_node: Node = (*b).into();
            ExtensionNode { path: prefix, child: child_node.commit(writer)? }.into()
        }
        Node::Blank => Node::Blank,
    })
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
