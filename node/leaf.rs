use crate::error::MutationFault;
use crate::nibbles::Nibbles;
use crate::node::{ExtensionNode, Node};
use crate::node_hash::NodeWriter;

/// Terminal node: `path` is the remaining nibble suffix to the key, `value`
/// is the stored bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafNode {
    pub path: Nibbles,
    pub value: Vec<u8>,
}

impl LeafNode {
    pub fn get(&self, path: &Nibbles) -> Option<Vec<u8>> {
        (path == &self.path).then(|| self.value.clone())
    }

    pub fn insert(
        self,
        writer: &mut dyn NodeWriter,
        path: &Nibbles,
        value: Vec<u8>,
    ) -> Result<Node, MutationFault> {
        if path == &self.path {
            return Ok(LeafNode { path: self.path, value }.into());
        }

        let common = path.common_prefix_len(&self.path);
        let mut children: [Option<crate::node_hash::NodeHash>; 16] = std::array::from_fn(|_| None);
        let mut branch_value = None;

        if self.path.len() == common {
            branch_value = Some(self.value);
        } else {
            let idx = self.path.get(common).expect("common < len");
            let rest = self.path.tail(common + 1);
            children[idx as usize] =
                Some(LeafNode { path: rest, value: self.value }.into_node().commit(writer)?);
        }

        if path.len() == common {
            branch_value = Some(value);
        } else {
            let idx = path.get(common).expect("common < len");
            let rest = path.tail(common + 1);
            children[idx as usize] = Some(LeafNode { path: rest, value }.into_node().commit(writer)?);
        }

        let branch: Node = crate::node::BranchNode { children, value: branch_value }.into();
        if common == 0 {
            Ok(branch)
        } else {
            Ok(ExtensionNode {
                path: path.slice(0, common),
                child: branch.commit(writer)?,
            }
            .into())
        }
    }

    pub fn remove(self, path: &Nibbles) -> (Option<Node>, Option<Vec<u8>>) {
        if path == &self.path {
            (None, Some(self.value))
        } else {
            (Some(self.into()), None)
        }
    }

    fn into_node(self) -> Node {
        self.into()
    }
}
