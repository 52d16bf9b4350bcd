//! Stable-index storage for B+Tree nodes.

use std::fmt;
use std::ops::{Index, IndexMut};

use super::TreeNode;

/// Index of a node slot in the arena. Parent, child and sibling links are
/// plain NodeIds; the arena alone owns the nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// Slot vector with a free list. Freed slots are reused by later
/// allocations, so NodeIds stay valid until their node is freed.
#[derive(Default)]
pub struct NodeArena {
    slots: Vec<Option<TreeNode>>,
    free: Vec<NodeId>,
    live: usize,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, node: TreeNode) -> NodeId {
        self.live += 1;
        match self.free.pop() {
            Some(id) => {
                self.slots[id.0] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        }
    }

    /// Removes a node, returning it. Freeing an empty slot is a no-op.
    pub fn free(&mut self, id: NodeId) -> Option<TreeNode> {
        let node = self.slots.get_mut(id.0)?.take()?;
        self.free.push(id);
        self.live -= 1;
        Some(node)
    }

    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

impl Index<NodeId> for NodeArena {
    type Output = TreeNode;

    fn index(&self, id: NodeId) -> &TreeNode {
        match self.get(id) {
            Some(node) => node,
            None => panic!("dangling {}", id),
        }
    }
}

impl IndexMut<NodeId> for NodeArena {
    fn index_mut(&mut self, id: NodeId) -> &mut TreeNode {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("dangling {}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_free() {
        let mut arena = NodeArena::new();
        let a = arena.alloc(TreeNode::new_leaf());
        let b = arena.alloc(TreeNode::new_inner());
        assert_eq!(arena.len(), 2);
        assert!(arena[a].is_leaf());
        assert!(!arena[b].is_leaf());

        assert!(arena.free(a).is_some());
        assert!(arena.free(a).is_none());
        assert_eq!(arena.len(), 1);
        assert!(arena.get(a).is_none());

        // Freed slot is reused
        let c = arena.alloc(TreeNode::new_leaf());
        assert_eq!(c, a);
        assert_eq!(arena.len(), 2);
    }
}
