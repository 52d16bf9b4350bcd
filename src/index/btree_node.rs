use std::cmp::Ordering;

use crate::common::{RecordId, Result};
use crate::tuple::Value;

use super::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Leaf,
    Inner,
}

/// An in-memory B+Tree node.
///
/// Leaves carry one record locator per key in `records` and link to the
/// next leaf through `next`. Inner nodes carry `keys.len() + 1` children:
/// child `i` routes keys below `keys[i]`, the last child routes keys at or
/// above the last key.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub kind: NodeKind,
    pub keys: Vec<Value>,
    pub children: Vec<NodeId>,
    pub records: Vec<RecordId>,
    pub next: Option<NodeId>,
    pub parent: Option<NodeId>,
}

impl TreeNode {
    pub fn new_leaf() -> Self {
        Self::new(NodeKind::Leaf)
    }

    pub fn new_inner() -> Self {
        Self::new(NodeKind::Inner)
    }

    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            keys: Vec::new(),
            children: Vec::new(),
            records: Vec::new(),
            next: None,
            parent: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    pub fn num_keys(&self) -> usize {
        self.keys.len()
    }

    /// Returns the first position whose key is not less than `key`, and
    /// whether that key equals it.
    pub fn search_key(&self, key: &Value) -> Result<(usize, bool)> {
        for (i, k) in self.keys.iter().enumerate() {
            match k.compare(key)? {
                Ordering::Less => continue,
                Ordering::Equal => return Ok((i, true)),
                Ordering::Greater => return Ok((i, false)),
            }
        }
        Ok((self.keys.len(), false))
    }

    /// Picks the child to descend into: the one paired with the first key
    /// strictly greater than `key`, or the last child.
    pub fn child_index(&self, key: &Value) -> Result<usize> {
        for (i, k) in self.keys.iter().enumerate() {
            if k.compare(key)? == Ordering::Greater {
                return Ok(i);
            }
        }
        Ok(self.keys.len())
    }

    /// Position of `child` among this node's children.
    pub fn child_position(&self, child: NodeId) -> Option<usize> {
        self.children.iter().position(|&c| c == child)
    }

    pub fn insert_record(&mut self, pos: usize, key: Value, record: RecordId) {
        self.keys.insert(pos, key);
        self.records.insert(pos, record);
    }

    pub fn remove_record(&mut self, pos: usize) -> (Value, RecordId) {
        (self.keys.remove(pos), self.records.remove(pos))
    }

    /// Inserts a separator at `pos` with `child` to its right.
    pub fn insert_child(&mut self, pos: usize, key: Value, child: NodeId) {
        self.keys.insert(pos, key);
        self.children.insert(pos + 1, child);
    }

    /// Splits an overfull leaf. The left half keeps `(count + 1) / 2`
    /// entries; the returned right half takes the rest and inherits the
    /// sibling link. The caller links the left half to the new node.
    pub fn split_leaf(&mut self) -> TreeNode {
        let mid = (self.keys.len() + 1) / 2;

        let mut right = TreeNode::new_leaf();
        right.keys = self.keys.split_off(mid);
        right.records = self.records.split_off(mid);
        right.next = self.next.take();
        right.parent = self.parent;
        right
    }

    /// Splits an overfull inner node around its middle key, which is
    /// removed and returned together with the right half.
    pub fn split_inner(&mut self) -> (Value, TreeNode) {
        let mid = self.keys.len() / 2;

        let mut right = TreeNode::new_inner();
        right.keys = self.keys.split_off(mid + 1);
        right.children = self.children.split_off(mid + 1);
        right.parent = self.parent;

        // keys[mid] is now the last key on the left
        let separator = self.keys.remove(mid);
        (separator, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PageId, SlotId};

    fn rid(n: u32) -> RecordId {
        RecordId::new(PageId::new(n), SlotId::new(0))
    }

    fn leaf_with(keys: &[i32]) -> TreeNode {
        let mut node = TreeNode::new_leaf();
        for (i, &k) in keys.iter().enumerate() {
            node.insert_record(i, Value::Integer(k), rid(k as u32));
        }
        node
    }

    #[test]
    fn test_search_key() {
        let node = leaf_with(&[10, 20, 30]);
        assert_eq!(node.search_key(&Value::Integer(5)).unwrap(), (0, false));
        assert_eq!(node.search_key(&Value::Integer(20)).unwrap(), (1, true));
        assert_eq!(node.search_key(&Value::Integer(25)).unwrap(), (2, false));
        assert_eq!(node.search_key(&Value::Integer(99)).unwrap(), (3, false));
        assert!(node.search_key(&Value::from("x")).is_err());
    }

    #[test]
    fn test_child_index() {
        let mut node = TreeNode::new_inner();
        node.keys = vec![Value::Integer(10), Value::Integer(20)];
        node.children = vec![NodeId(0), NodeId(1), NodeId(2)];

        assert_eq!(node.child_index(&Value::Integer(3)).unwrap(), 0);
        // Equal keys go right
        assert_eq!(node.child_index(&Value::Integer(10)).unwrap(), 1);
        assert_eq!(node.child_index(&Value::Integer(19)).unwrap(), 1);
        assert_eq!(node.child_index(&Value::Integer(20)).unwrap(), 2);
        assert_eq!(node.child_position(NodeId(2)), Some(2));
    }

    #[test]
    fn test_split_leaf() {
        let mut node = leaf_with(&[5, 6, 10, 20]);
        node.next = Some(NodeId(9));

        let right = node.split_leaf();
        assert_eq!(node.keys, vec![Value::Integer(5), Value::Integer(6)]);
        assert_eq!(right.keys, vec![Value::Integer(10), Value::Integer(20)]);
        assert_eq!(right.records, vec![rid(10), rid(20)]);
        assert_eq!(node.next, None);
        assert_eq!(right.next, Some(NodeId(9)));

        // Odd counts keep the larger half on the left
        let mut node = leaf_with(&[1, 2, 3]);
        let right = node.split_leaf();
        assert_eq!(node.num_keys(), 2);
        assert_eq!(right.num_keys(), 1);
    }

    #[test]
    fn test_split_inner() {
        let mut node = TreeNode::new_inner();
        node.keys = (1..=4).map(|k| Value::Integer(k * 10)).collect();
        node.children = (0..5).map(NodeId).collect();

        let (separator, right) = node.split_inner();
        assert_eq!(separator, Value::Integer(30));
        assert_eq!(node.keys, vec![Value::Integer(10), Value::Integer(20)]);
        assert_eq!(node.children, vec![NodeId(0), NodeId(1), NodeId(2)]);
        assert_eq!(right.keys, vec![Value::Integer(40)]);
        assert_eq!(right.children, vec![NodeId(3), NodeId(4)]);
    }
}
