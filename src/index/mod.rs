mod arena;
mod btree_index;
mod btree_iterator;
mod btree_node;
mod header;

pub use arena::{NodeArena, NodeId};
pub use btree_index::BTreeIndex;
pub use btree_iterator::TreeScan;
pub use btree_node::{NodeKind, TreeNode};
pub use header::{NodePage, TreeHeader};
