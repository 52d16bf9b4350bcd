use crate::common::{ArborError, RecordId, Result};
use crate::tuple::Value;

use super::{BTreeIndex, NodeId};

/// Forward scan over the leaf chain of a tree, in ascending key order.
///
/// The scan borrows the tree, so the tree cannot be modified while a scan
/// is open.
pub struct TreeScan<'a> {
    tree: &'a BTreeIndex,
    current_leaf: Option<NodeId>,
    current_index: usize,
}

impl<'a> TreeScan<'a> {
    pub(crate) fn new(tree: &'a BTreeIndex, start_leaf: Option<NodeId>) -> Self {
        Self {
            tree,
            current_leaf: start_leaf,
            current_index: 0,
        }
    }

    /// Returns the next record locator, or `NoMoreEntries` once the last
    /// leaf is drained.
    pub fn next_entry(&mut self) -> Result<RecordId> {
        self.next()
            .map(|(_, record)| record)
            .ok_or(ArborError::NoMoreEntries)
    }

    /// Ends the scan.
    pub fn close(self) {}
}

impl<'a> Iterator for TreeScan<'a> {
    type Item = (&'a Value, RecordId);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(leaf) = self.current_leaf {
            let node = self.tree.node(leaf);
            if self.current_index < node.num_keys() {
                let item = (&node.keys[self.current_index], node.records[self.current_index]);
                self.current_index += 1;
                return Some(item);
            }

            self.current_leaf = node.next;
            self.current_index = 0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PageId, SlotId};
    use crate::tuple::DataType;
    use tempfile::TempDir;

    #[test]
    fn test_scan_empty_tree() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan");
        BTreeIndex::create(&path, DataType::Integer, 3).unwrap();
        let index = BTreeIndex::open(&path).unwrap();

        let mut scan = index.open_scan();
        assert!(matches!(scan.next_entry(), Err(ArborError::NoMoreEntries)));
        assert!(matches!(scan.next_entry(), Err(ArborError::NoMoreEntries)));
        scan.close();
    }

    #[test]
    fn test_scan_crosses_leaves() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan");
        BTreeIndex::create(&path, DataType::Integer, 2).unwrap();
        let mut index = BTreeIndex::open(&path).unwrap();

        for k in (0..10).rev() {
            let rid = RecordId::new(PageId::new(k as u32), SlotId::new(0));
            index.insert(Value::Integer(k), rid).unwrap();
        }
        assert!(index.num_nodes() > 3);

        let keys: Vec<i32> = index
            .open_scan()
            .map(|(key, _)| match key {
                Value::Integer(k) => *k,
                other => panic!("unexpected key {}", other),
            })
            .collect();
        assert_eq!(keys, (0..10).collect::<Vec<_>>());

        let mut scan = index.open_scan();
        for k in 0..10u32 {
            assert_eq!(scan.next_entry().unwrap().page_id, PageId::new(k));
        }
        assert!(matches!(scan.next_entry(), Err(ArborError::NoMoreEntries)));
    }
}
