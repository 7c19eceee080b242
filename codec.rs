//! Node wire format: a 2-element (extension/leaf) or 17-element (branch) RLP
//! list, with paths packed hex-prefix style.
//!
//! ```text
//! node type    path length    |    prefix nibble
//! -----------------------------------------------
//! extension    even           |    0x0
//! extension    odd            |    0x1
//! leaf         even           |    0x2
//! leaf         odd            |    0x3
//! ```
use alloy_rlp::{BufMut, Decodable, Encodable, Header};
use ethereum_types::H256;
use smallvec::SmallVec;

use crate::error::CodecError;
use crate::nibbles::Nibbles;
use crate::node::{BranchNode, ExtensionNode, LeafNode, Node};
use crate::node_hash::NodeHash;

const BLANK: &[u8] = &[0x80];

pub fn encode_node(node: &Node) -> Vec<u8> {
    match node {
        Node::Blank => BLANK.to_vec(),
        Node::Leaf(leaf) => encode_leaf(leaf),
        Node::Extension(ext) => encode_extension(ext),
        Node::Branch(branch) => encode_branch(branch),
    }
}

pub fn decode_node(bytes: &[u8]) -> Result<Node, CodecError> {
    if bytes == BLANK {
        return Ok(Node::Blank);
    }
    let mut buf = bytes;
    let header = Header::decode(&mut buf).map_err(CodecError::Rlp)?;
    if !header.list {
        return Err(CodecError::Malformed("top-level node encoding must be a list"));
    }
    let body = buf;
    if body.len() != header.payload_length {
        return Err(CodecError::Malformed("trailing bytes after node list"));
    }

    let mut rest = body;
    let first = take_rlp_item(&mut rest)?.to_vec();

    if rest.is_empty() {
        return Err(CodecError::Malformed("node list has fewer than 2 fields"));
    }

    // A 17-field list (16 children + value) is a branch; the other arities
    // are the 2-field leaf/extension, disambiguated by the path's flag nibble.
    let mut fields = vec![first];
    let mut cursor = rest;
    while !cursor.is_empty() {
        fields.push(take_rlp_item(&mut cursor)?.to_vec());
    }

    match fields.len() {
        17 => decode_branch(fields),
        2 => decode_leaf_or_extension(fields),
        _ => Err(CodecError::Malformed("node list has unexpected field count")),
    }
}

fn encode_leaf(leaf: &LeafNode) -> Vec<u8> {
    let path = encode_path(&leaf.path, true);
    encode_list(&[Field::Bytes(&path), Field::Bytes(&leaf.value)])
}

fn encode_extension(ext: &ExtensionNode) -> Vec<u8> {
    let path = encode_path(&ext.path, false);
    encode_list(&[Field::Bytes(&path), Field::Ref(&ext.child)])
}

fn encode_branch(branch: &BranchNode) -> Vec<u8> {
    let mut fields: Vec<Field> = branch.children.iter().map(Field::OptRef).collect();
    fields.push(Field::Bytes(branch.value.as_deref().unwrap_or(&[])));
    encode_list(&fields)
}

enum Field<'a> {
    Bytes(&'a [u8]),
    Ref(&'a NodeHash),
    OptRef(&'a Option<NodeHash>),
}

fn node_hash_bytes(hash: &NodeHash) -> Vec<u8> {
    match hash {
        NodeHash::Hashed(h) => h.as_bytes().to_vec(),
        NodeHash::Inline(raw) => raw.to_vec(),
    }
}

fn encode_list(fields: &[Field]) -> Vec<u8> {
    let mut payload = Vec::new();
    for field in fields {
        match field {
            Field::Bytes(b) => b.encode(&mut payload),
            Field::Ref(h) => encode_child_ref(&node_hash_bytes(h), matches!(h, NodeHash::Hashed(_)), &mut payload),
            Field::OptRef(None) => [].as_slice().encode(&mut payload),
            Field::OptRef(Some(h)) => {
                encode_child_ref(&node_hash_bytes(h), matches!(h, NodeHash::Hashed(_)), &mut payload)
            }
        }
    }
    let header = Header { list: true, payload_length: payload.len() };
    let mut out = Vec::with_capacity(header.length() + payload.len());
    header.encode(&mut out);
    out.put_slice(&payload);
    out
}

/// A `Hashed` child is encoded as an RLP string (its 32-byte hash); an
/// `Inline` child's raw body is spliced in as-is - it is already valid RLP.
fn encode_child_ref(raw: &[u8], is_hash: bool, out: &mut Vec<u8>) {
    if is_hash {
        raw.encode(out);
    } else {
        out.put_slice(raw);
    }
}

/// Advances `buf` past one RLP item (string or list) and returns its full
/// raw encoding (header and payload). Unlike `Vec::<u8>::decode`, this
/// doesn't assume the item is a string - a child under the inlining
/// threshold is encoded as a nested list, not a string.
fn take_rlp_item<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], CodecError> {
    let start = *buf;
    let header = Header::decode(buf).map_err(CodecError::Rlp)?;
    if buf.len() < header.payload_length {
        return Err(CodecError::Malformed("RLP item runs past end of buffer"));
    }
    let header_len = start.len() - buf.len();
    let item = &start[..header_len + header.payload_length];
    *buf = &buf[header.payload_length..];
    Ok(item)
}

/// Classifies an already-captured field item as a child reference: a
/// 32-byte string is a hash, an empty string is no child, and a list is an
/// inlined node body spliced in as its own raw encoding.
fn child_ref_from_item(item: &[u8]) -> Result<Option<NodeHash>, CodecError> {
    if item == BLANK {
        return Ok(None);
    }
    let mut cursor = item;
    let header = Header::decode(&mut cursor).map_err(CodecError::Rlp)?;
    if header.list {
        return Ok(Some(NodeHash::Inline(SmallVec::from_slice(item))));
    }
    match header.payload_length {
        0 => Ok(None),
        32 => Ok(Some(NodeHash::Hashed(H256::from_slice(cursor)))),
        _ => Err(CodecError::Malformed("child reference is neither empty, a hash, nor inlined")),
    }
}

/// Decodes a field already known to be a plain RLP string (path or value).
fn decode_rlp_string(item: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut cursor = item;
    Vec::<u8>::decode(&mut cursor).map_err(CodecError::Rlp)
}

fn decode_leaf_or_extension(mut fields: Vec<Vec<u8>>) -> Result<Node, CodecError> {
    let second = fields.pop().expect("len == 2");
    let first = fields.pop().expect("len == 2");
    let (path, is_leaf) = decode_path(&decode_rlp_string(&first)?)?;
    if is_leaf {
        Ok(LeafNode { path, value: decode_rlp_string(&second)? }.into())
    } else {
        let child = child_ref_from_item(&second)?.expect("extension child is always present");
        Ok(ExtensionNode { path, child }.into())
    }
}

fn decode_branch(mut fields: Vec<Vec<u8>>) -> Result<Node, CodecError> {
    let value_item = fields.pop().expect("len == 17");
    let value_bytes = decode_rlp_string(&value_item)?;
    let value = (!value_bytes.is_empty()).then_some(value_bytes);

    let mut children: [Option<NodeHash>; 16] = std::array::from_fn(|_| None);
    for (i, item) in fields.into_iter().enumerate() {
        children[i] = child_ref_from_item(&item)?;
    }
    Ok(BranchNode { children, value }.into())
}

/// Hex-prefix encodes `path`: a leading flag nibble (odd-length and
/// leaf/extension bits), left-padded with a zero nibble when even, then the
/// path's own nibbles packed two to a byte.
pub fn encode_path(path: &Nibbles, is_leaf: bool) -> Vec<u8> {
    let odd = path.len() % 2 == 1;
    let flag = (if is_leaf { 0x2 } else { 0x0 }) | (if odd { 0x1 } else { 0x0 });

    let mut nibbles = Vec::with_capacity(path.len() + 1);
    nibbles.push(flag);
    if !odd {
        nibbles.push(0);
    }
    nibbles.extend(path.iter());

    nibbles
        .chunks_exact(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect()
}

/// Inverse of [`encode_path`]. Returns the decoded path and whether the
/// flag marked it a leaf path.
pub fn decode_path(encoded: &[u8]) -> Result<(Nibbles, bool), CodecError> {
    let Some(&first) = encoded.first() else {
        return Err(CodecError::Malformed("empty hex-prefix encoding"));
    };
    let flag = first >> 4;
    let is_leaf = flag & 0x2 != 0;
    let odd = flag & 0x1 != 0;

    let mut nibbles = Vec::with_capacity(encoded.len() * 2);
    for byte in encoded {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0f);
    }
    let skip = if odd { 1 } else { 2 };
    Ok((Nibbles::from_nibbles(nibbles.into_iter().skip(skip)), is_leaf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_round_trip_even_extension() {
        let path = Nibbles::from_nibbles([1, 2, 3, 4]);
        let encoded = encode_path(&path, false);
        let (decoded, is_leaf) = decode_path(&encoded).unwrap();
        assert_eq!(decoded, path);
        assert!(!is_leaf);
    }

    #[test]
    fn path_round_trip_odd_leaf() {
        let path = Nibbles::from_nibbles([1, 2, 3]);
        let encoded = encode_path(&path, true);
        let (decoded, is_leaf) = decode_path(&encoded).unwrap();
        assert_eq!(decoded, path);
        assert!(is_leaf);
    }

    #[test]
    fn path_round_trip_empty() {
        let path = Nibbles::empty();
        let encoded = encode_path(&path, true);
        let (decoded, is_leaf) = decode_path(&encoded).unwrap();
        assert_eq!(decoded, path);
        assert!(is_leaf);
    }

    #[test]
    fn blank_round_trip() {
        let encoded = encode_node(&Node::Blank);
        assert_eq!(encoded, BLANK);
        assert_eq!(decode_node(&encoded).unwrap(), Node::Blank);
    }

    #[test]
    fn leaf_round_trip() {
        let node: Node = LeafNode { path: Nibbles::from_nibbles([0xa, 0xb, 0xc]), value: b"hello".to_vec() }.into();
        let encoded = encode_node(&node);
        assert_eq!(decode_node(&encoded).unwrap(), node);
    }

    #[test]
    fn branch_round_trip() {
        let mut children: [Option<NodeHash>; 16] = std::array::from_fn(|_| None);
        let small_leaf: Node = LeafNode { path: Nibbles::from_nibbles([1]), value: b"x".to_vec() }.into();
        children[3] = Some(NodeHash::from_encoded(&small_leaf.encode_raw()));
        let node: Node = BranchNode { children, value: Some(b"v".to_vec()) }.into();
        let encoded = encode_node(&node);
        assert_eq!(decode_node(&encoded).unwrap(), node);
    }

    #[test]
    fn branch_with_inlined_child_decodes() {
        let small_leaf: Node = LeafNode { path: Nibbles::from_nibbles([2, 0]), value: b"y".to_vec() }.into();
        let inline_ref = NodeHash::from_encoded(&small_leaf.encode_raw());
        assert!(matches!(inline_ref, NodeHash::Inline(_)));

        let mut children: [Option<NodeHash>; 16] = std::array::from_fn(|_| None);
        children[7] = Some(inline_ref.clone());
        let node: Node = BranchNode { children, value: None }.into();
        let encoded = encode_node(&node);

        let Node::Branch(decoded) = decode_node(&encoded).unwrap() else {
            panic!("expected a branch");
        };
        assert_eq!(decoded.children[7], Some(inline_ref));
    }

    #[test]
    fn extension_with_inlined_branch_child_decodes() {
        let mut branch_children: [Option<NodeHash>; 16] = std::array::from_fn(|_| None);
        branch_children[0] = Some(NodeHash::from_encoded(b"\xc0"));
        let branch: Node = BranchNode { children: branch_children, value: Some(b"v".to_vec()) }.into();
        let inline_ref = NodeHash::from_encoded(&branch.encode_raw());
        assert!(matches!(inline_ref, NodeHash::Inline(_)));

        let ext: Node = ExtensionNode { path: Nibbles::from_nibbles([5, 5]), child: inline_ref.clone() }.into();
        let encoded = encode_node(&ext);
        let Node::Extension(decoded) = decode_node(&encoded).unwrap() else {
            panic!("expected an extension");
        };
        assert_eq!(decoded.child, inline_ref);
    }
}
