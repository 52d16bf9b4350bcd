use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::buffer::BufferPoolManager;
use crate::common::{
    ArborError, BufferPoolConfig, PageId, RecordId, Result, HEADER_PAGE_ID, PAGE_SIZE,
};
use crate::storage::disk::DiskManager;
use crate::tuple::{DataType, Value};

use super::{NodeArena, NodeId, NodePage, TreeHeader, TreeNode, TreeScan};

/// A B+Tree index over one index file.
///
/// Nodes live in an arena in memory while the index is open. `close`
/// writes the header and every node back to the file through the buffer
/// pool, and `open` rebuilds the arena from those pages.
pub struct BTreeIndex {
    path: PathBuf,
    bpm: BufferPoolManager,
    arena: NodeArena,
    root: Option<NodeId>,
    key_type: DataType,
    order: usize,
    min_leaf: usize,
    min_inner: usize,
    num_entries: usize,
}

impl BTreeIndex {
    /// Creates an index file holding an empty tree.
    pub fn create<P: AsRef<Path>>(path: P, key_type: DataType, order: usize) -> Result<()> {
        let path = path.as_ref();
        if order < 2 {
            return Err(ArborError::InvalidArgument(format!(
                "tree order must be at least 2, got {}",
                order
            )));
        }
        let order = u32::try_from(order)
            .map_err(|_| ArborError::InvalidArgument(format!("tree order {}", order)))?;
        if path.exists() {
            return Err(ArborError::DuplicateIndex(path.display().to_string()));
        }

        DiskManager::create(path)?;
        let disk_manager = DiskManager::open(path)?;
        let mut page = [0u8; PAGE_SIZE];
        TreeHeader::empty(key_type, order).encode(&mut page);
        disk_manager.write_page(HEADER_PAGE_ID, &page)?;
        disk_manager.close()?;

        info!(
            "Created index {} ({} keys, order {})",
            path.display(),
            key_type,
            order
        );
        Ok(())
    }

    /// Opens an index with the default buffer pool configuration.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, BufferPoolConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: BufferPoolConfig) -> Result<Self> {
        let path = path.as_ref();
        let bpm = match BufferPoolManager::open(path, config) {
            Ok(bpm) => bpm,
            Err(ArborError::FileNotFound(_)) => {
                return Err(ArborError::IndexNotFound(path.display().to_string()))
            }
            Err(e) => return Err(e),
        };

        let header = {
            let guard = bpm.fetch_page(HEADER_PAGE_ID)?;
            let data = guard.data();
            TreeHeader::decode(&data[..])?
        };

        let order = header.order as usize;
        let mut index = Self {
            path: path.to_path_buf(),
            bpm,
            arena: NodeArena::new(),
            root: None,
            key_type: header.key_type,
            order,
            min_leaf: (order + 1) / 2,
            min_inner: (order + 2) / 2 - 1,
            num_entries: header.num_entries as usize,
        };
        index.load_nodes(&header)?;

        info!(
            "Opened index {} ({} nodes, {} entries)",
            path.display(),
            index.num_nodes(),
            index.num_entries
        );
        Ok(index)
    }

    /// Writes the tree back to its file and shuts the buffer pool down.
    pub fn close(self) -> Result<()> {
        self.persist()?;
        self.bpm.shutdown()?;
        info!("Closed index {}", self.path.display());
        Ok(())
    }

    /// Removes an index file.
    pub fn delete_index<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ArborError::IndexNotFound(path.display().to_string()));
        }
        DiskManager::destroy(path)?;
        info!("Deleted index {}", path.display());
        Ok(())
    }

    pub fn num_nodes(&self) -> usize {
        self.arena.len()
    }

    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    pub fn key_type(&self) -> DataType {
        self.key_type
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The buffer pool backing this index.
    pub fn buffer_pool(&self) -> &BufferPoolManager {
        &self.bpm
    }

    /// Returns the record locator stored under `key`.
    pub fn search(&self, key: &Value) -> Result<RecordId> {
        self.check_key(key)?;
        let leaf = match self.root {
            Some(_) => self.find_leaf(key)?,
            None => return Err(ArborError::KeyNotFound),
        };

        let node = &self.arena[leaf];
        match node.search_key(key)? {
            (pos, true) => Ok(node.records[pos]),
            _ => Err(ArborError::KeyNotFound),
        }
    }

    pub fn insert(&mut self, key: Value, record: RecordId) -> Result<()> {
        self.check_key(&key)?;

        if self.root.is_none() {
            let mut leaf = TreeNode::new_leaf();
            leaf.insert_record(0, key, record);
            self.root = Some(self.arena.alloc(leaf));
            self.num_entries = 1;
            return Ok(());
        }

        let leaf = self.find_leaf(&key)?;
        let (pos, found) = self.arena[leaf].search_key(&key)?;
        if found {
            return Err(ArborError::KeyAlreadyExists(key.to_string()));
        }

        self.arena[leaf].insert_record(pos, key, record);
        self.num_entries += 1;

        if self.arena[leaf].num_keys() > self.order {
            self.split_leaf(leaf)?;
        }
        Ok(())
    }

    pub fn delete(&mut self, key: &Value) -> Result<()> {
        self.check_key(key)?;
        if self.root.is_none() {
            return Err(ArborError::KeyNotFound);
        }

        let leaf = self.find_leaf(key)?;
        let pos = match self.arena[leaf].search_key(key)? {
            (pos, true) => pos,
            _ => return Err(ArborError::KeyNotFound),
        };
        self.arena[leaf].remove_record(pos);
        self.num_entries -= 1;

        let parent = match self.arena[leaf].parent {
            Some(parent) => parent,
            None => {
                if self.arena[leaf].num_keys() == 0 {
                    self.arena.free(leaf);
                    self.root = None;
                    debug!("Freed empty root leaf");
                }
                return Ok(());
            }
        };

        let idx = self.position_in_parent(parent, leaf)?;
        if pos == 0 && idx > 0 {
            if let Some(first) = self.arena[leaf].keys.first().cloned() {
                self.arena[parent].keys[idx - 1] = first;
            }
        }

        if self.arena[leaf].num_keys() < self.min_leaf {
            self.rebalance_leaf(parent, leaf, idx);
        }
        Ok(())
    }

    /// Starts a scan over all entries in ascending key order.
    pub fn open_scan(&self) -> TreeScan<'_> {
        TreeScan::new(self, self.leftmost_leaf())
    }

    pub(crate) fn node(&self, id: NodeId) -> &TreeNode {
        &self.arena[id]
    }

    fn leftmost_leaf(&self) -> Option<NodeId> {
        let mut current = self.root?;
        loop {
            let node = &self.arena[current];
            if node.is_leaf() {
                return Some(current);
            }
            current = *node.children.first()?;
        }
    }

    fn check_key(&self, key: &Value) -> Result<()> {
        if key.data_type() != self.key_type {
            return Err(ArborError::InvalidArgument(format!(
                "{} key used with {} index",
                key.data_type(),
                self.key_type
            )));
        }
        Ok(())
    }

    /// Descends from the root to the leaf that owns `key`.
    /// The tree must not be empty.
    fn find_leaf(&self, key: &Value) -> Result<NodeId> {
        let mut current = self
            .root
            .ok_or_else(|| ArborError::IndexCorrupted("descent into empty tree".to_string()))?;
        loop {
            let node = &self.arena[current];
            if node.is_leaf() {
                return Ok(current);
            }
            let idx = node.child_index(key)?;
            current = node.children[idx];
        }
    }

    fn position_in_parent(&self, parent: NodeId, child: NodeId) -> Result<usize> {
        self.arena[parent].child_position(child).ok_or_else(|| {
            ArborError::IndexCorrupted(format!("{} missing from its parent {}", child, parent))
        })
    }

    fn split_leaf(&mut self, leaf: NodeId) -> Result<()> {
        let right = self.arena[leaf].split_leaf();
        let separator = right.keys[0].clone();
        let right_id = self.arena.alloc(right);
        self.arena[leaf].next = Some(right_id);

        debug!("Split leaf {} at key {}, new leaf {}", leaf, separator, right_id);
        self.insert_into_parent(leaf, separator, right_id)
    }

    fn split_inner(&mut self, node: NodeId) -> Result<()> {
        let (separator, right) = self.arena[node].split_inner();
        let right_id = self.arena.alloc(right);
        for child in self.arena[right_id].children.clone() {
            self.arena[child].parent = Some(right_id);
        }

        debug!("Split inner {} at key {}, new node {}", node, separator, right_id);
        self.insert_into_parent(node, separator, right_id)
    }

    /// Hooks a freshly split-off `right` node in after `left`, growing a
    /// new root when `left` was the root.
    fn insert_into_parent(&mut self, left: NodeId, key: Value, right: NodeId) -> Result<()> {
        let parent = match self.arena[left].parent {
            Some(parent) => parent,
            None => {
                let mut root = TreeNode::new_inner();
                root.keys.push(key);
                root.children = vec![left, right];
                let root_id = self.arena.alloc(root);
                self.arena[left].parent = Some(root_id);
                self.arena[right].parent = Some(root_id);
                self.root = Some(root_id);
                debug!("New root {}", root_id);
                return Ok(());
            }
        };

        let idx = self.position_in_parent(parent, left)?;
        self.arena[parent].insert_child(idx, key, right);
        self.arena[right].parent = Some(parent);

        if self.arena[parent].num_keys() > self.order {
            self.split_inner(parent)?;
        }
        Ok(())
    }

    /// Restores the minimum fill of `leaf` by borrowing from a sibling under
    /// the same parent (left first), or else merging with one. Inner nodes
    /// are not rebalanced.
    fn rebalance_leaf(&mut self, parent: NodeId, leaf: NodeId, idx: usize) {
        let siblings = &self.arena[parent].children;
        let left = if idx > 0 { Some(siblings[idx - 1]) } else { None };
        let right = siblings.get(idx + 1).copied();

        if let Some(left) = left {
            if self.arena[left].num_keys() > self.min_leaf {
                let last = self.arena[left].num_keys() - 1;
                let (key, record) = self.arena[left].remove_record(last);
                self.arena[leaf].insert_record(0, key.clone(), record);
                self.arena[parent].keys[idx - 1] = key;
                debug!("Moved one entry from {} into {}", left, leaf);
                return;
            }
        }

        if let Some(right) = right {
            if self.arena[right].num_keys() > self.min_leaf {
                let (key, record) = self.arena[right].remove_record(0);
                let end = self.arena[leaf].num_keys();
                self.arena[leaf].insert_record(end, key, record);
                self.arena[parent].keys[idx] = self.arena[right].keys[0].clone();
                if idx > 0 {
                    self.arena[parent].keys[idx - 1] = self.arena[leaf].keys[0].clone();
                }
                debug!("Moved one entry from {} into {}", right, leaf);
                return;
            }
        }

        if let Some(left) = left {
            self.merge_leaves(parent, left, leaf, idx - 1);
        } else if let Some(right) = right {
            self.merge_leaves(parent, leaf, right, idx);
        }
    }

    /// Moves every entry of `right` into `left`, then drops `right` and the
    /// separator at `sep` from the parent.
    fn merge_leaves(&mut self, parent: NodeId, left: NodeId, right: NodeId, sep: usize) {
        if let Some(node) = self.arena.free(right) {
            let left_node = &mut self.arena[left];
            left_node.keys.extend(node.keys);
            left_node.records.extend(node.records);
            left_node.next = node.next;
        }

        let parent_node = &mut self.arena[parent];
        parent_node.keys.remove(sep);
        parent_node.children.remove(sep + 1);
        debug!("Merged leaf {} into {}", right, left);
        if parent_node.num_keys() < self.min_inner {
            debug!(
                "{} left with {} keys after merge",
                parent,
                parent_node.num_keys()
            );
        }
    }

    fn load_nodes(&mut self, header: &TreeHeader) -> Result<()> {
        let num_nodes = header.num_nodes as usize;
        if num_nodes == 0 {
            return Ok(());
        }

        // Node on page p lands in arena slot p - 1
        let to_node = |page: PageId| -> Result<NodeId> {
            let p = page.as_u32() as usize;
            if p == 0 || p > num_nodes {
                return Err(ArborError::IndexCorrupted(format!(
                    "link to {} outside node pages",
                    page
                )));
            }
            Ok(NodeId(p - 1))
        };

        for p in 1..=num_nodes {
            let page = {
                let guard = self.bpm.fetch_page(PageId::new(p as u32))?;
                let data = guard.data();
                NodePage::decode(&data[..], self.key_type)?
            };

            let mut node = match page.kind {
                super::NodeKind::Leaf => TreeNode::new_leaf(),
                super::NodeKind::Inner => TreeNode::new_inner(),
            };
            node.keys = page.keys;
            node.records = page.records;
            node.children = page
                .children
                .into_iter()
                .map(to_node)
                .collect::<Result<Vec<_>>>()?;
            node.next = page.next.map(to_node).transpose()?;
            self.arena.alloc(node);
        }

        for p in 0..num_nodes {
            for child in self.arena[NodeId(p)].children.clone() {
                self.arena[child].parent = Some(NodeId(p));
            }
        }

        let root = header
            .root_page
            .ok_or_else(|| ArborError::IndexCorrupted("missing root page".to_string()))?;
        self.root = Some(to_node(root)?);
        Ok(())
    }

    /// Writes every node (breadth-first from the root, starting at page 1)
    /// and then the header.
    fn persist(&self) -> Result<()> {
        let order = self.bfs_order();
        let pages: HashMap<NodeId, PageId> = order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, PageId::new(i as u32 + 1)))
            .collect();
        let page_of = |id: NodeId| -> Result<PageId> {
            pages
                .get(&id)
                .copied()
                .ok_or_else(|| ArborError::IndexCorrupted(format!("{} is unreachable", id)))
        };

        // Every node is encoded before any page is touched, so a node that
        // does not fit leaves the previously saved tree intact.
        let mut images = Vec::with_capacity(order.len());
        for &id in &order {
            let node = &self.arena[id];
            let page = NodePage {
                kind: node.kind,
                keys: node.keys.clone(),
                records: node.records.clone(),
                children: node
                    .children
                    .iter()
                    .map(|&c| page_of(c))
                    .collect::<Result<Vec<_>>>()?,
                next: node.next.map(page_of).transpose()?,
            };
            let mut image = vec![0u8; PAGE_SIZE];
            page.encode(&mut image)?;
            images.push((page_of(id)?, image));
        }

        self.bpm
            .disk_manager()
            .ensure_capacity(order.len() as u32 + 1)?;

        for (page_id, image) in &images {
            let mut guard = self.bpm.fetch_page(*page_id)?;
            guard.data_mut().copy_from_slice(image);
        }

        let header = TreeHeader {
            order: self.order as u32,
            key_type: self.key_type,
            num_nodes: order.len() as u32,
            num_entries: self.num_entries as u32,
            root_page: self.root.map(page_of).transpose()?,
        };
        {
            let mut guard = self.bpm.fetch_page(HEADER_PAGE_ID)?;
            let mut data = guard.data_mut();
            header.encode(&mut data[..]);
        }

        debug!(
            "Wrote {} node pages for {}",
            order.len(),
            self.path.display()
        );
        Ok(())
    }

    fn bfs_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.arena.len());
        let mut queue: VecDeque<NodeId> = self.root.into_iter().collect();
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.arena[id].children.iter().copied());
        }
        order
    }

    /// Renders the tree one level per line, e.g.
    /// `0: (10|20)` then `1: [5,6,7] [10,12,17] [20,30]`.
    pub fn print_tree(&self) -> String {
        let mut out = String::new();
        let mut level: Vec<NodeId> = self.root.into_iter().collect();
        let mut depth = 0;

        while !level.is_empty() {
            let _ = write!(out, "{}:", depth);
            let mut next_level = Vec::new();
            for &id in &level {
                let node = &self.arena[id];
                let keys: Vec<String> = node.keys.iter().map(Value::to_string).collect();
                if node.is_leaf() {
                    let _ = write!(out, " [{}]", keys.join(","));
                } else {
                    let _ = write!(out, " ({})", keys.join("|"));
                    next_level.extend(node.children.iter().copied());
                }
            }
            out.push('\n');
            level = next_level;
            depth += 1;
        }
        out
    }

    /// Walks the whole tree and verifies its structure: key order and
    /// routing bounds, node fill, parent links, uniform leaf depth, the
    /// leaf chain and the node/entry counts.
    ///
    /// Inner nodes are only checked against the maximum fill, since
    /// underflow is repaired at the leaf level alone.
    pub fn check_invariants(&self) -> Result<()> {
        let root = match self.root {
            Some(root) => root,
            None => {
                if self.arena.len() != 0 || self.num_entries != 0 {
                    return Err(corrupt("empty tree with nodes or entries"));
                }
                return Ok(());
            }
        };
        if self.arena[root].parent.is_some() {
            return Err(corrupt("root has a parent"));
        }

        let mut leaves = Vec::new();
        let mut visited = 0;
        self.check_subtree(root, None, None, 0, &mut None, &mut leaves, &mut visited)?;

        if visited != self.arena.len() {
            return Err(corrupt(&format!(
                "{} nodes reachable, {} allocated",
                visited,
                self.arena.len()
            )));
        }

        let entries: usize = leaves.iter().map(|&l| self.arena[l].num_keys()).sum();
        if entries != self.num_entries {
            return Err(corrupt(&format!(
                "{} entries in leaves, {} counted",
                entries, self.num_entries
            )));
        }

        for pair in leaves.windows(2) {
            if self.arena[pair[0]].next != Some(pair[1]) {
                return Err(corrupt(&format!("leaf chain broken after {}", pair[0])));
            }
        }
        if let Some(&last) = leaves.last() {
            if self.arena[last].next.is_some() {
                return Err(corrupt("last leaf has a successor"));
            }
        }

        // Keys ascend across the whole chain
        let mut prev: Option<&Value> = None;
        for &leaf in &leaves {
            for key in &self.arena[leaf].keys {
                if let Some(p) = prev {
                    if p.compare(key)? != std::cmp::Ordering::Less {
                        return Err(corrupt(&format!("key {} after {}", key, p)));
                    }
                }
                prev = Some(key);
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn check_subtree(
        &self,
        id: NodeId,
        lower: Option<&Value>,
        upper: Option<&Value>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
        leaves: &mut Vec<NodeId>,
        visited: &mut usize,
    ) -> Result<()> {
        *visited += 1;
        let node = &self.arena[id];

        if node.num_keys() > self.order {
            return Err(corrupt(&format!("{} holds {} keys", id, node.num_keys())));
        }
        for key in &node.keys {
            if key.data_type() != self.key_type {
                return Err(corrupt(&format!("{} holds a {} key", id, key.data_type())));
            }
            if let Some(lo) = lower {
                if key.compare(lo)? == std::cmp::Ordering::Less {
                    return Err(corrupt(&format!("{} key {} below {}", id, key, lo)));
                }
            }
            if let Some(hi) = upper {
                if key.compare(hi)? != std::cmp::Ordering::Less {
                    return Err(corrupt(&format!("{} key {} not below {}", id, key, hi)));
                }
            }
        }
        for pair in node.keys.windows(2) {
            if pair[0].compare(&pair[1])? != std::cmp::Ordering::Less {
                return Err(corrupt(&format!("{} keys out of order", id)));
            }
        }

        if node.is_leaf() {
            if node.records.len() != node.num_keys() {
                return Err(corrupt(&format!("{} records do not match keys", id)));
            }
            if let Some(parent) = node.parent {
                let lone = self.arena[parent].children.len() == 1;
                if !lone && node.num_keys() < self.min_leaf {
                    return Err(corrupt(&format!("{} underfull", id)));
                }
            }
            match *leaf_depth {
                Some(d) if d != depth => {
                    return Err(corrupt(&format!("{} at depth {}, expected {}", id, depth, d)))
                }
                _ => *leaf_depth = Some(depth),
            }
            leaves.push(id);
            return Ok(());
        }

        if node.children.len() != node.num_keys() + 1 {
            return Err(corrupt(&format!("{} child count mismatch", id)));
        }
        for (i, &child) in node.children.iter().enumerate() {
            if self.arena.get(child).map(|c| c.parent) != Some(Some(id)) {
                return Err(corrupt(&format!("{} does not point back to {}", child, id)));
            }
            let lo = if i == 0 { lower } else { Some(&node.keys[i - 1]) };
            let hi = node.keys.get(i).or(upper);
            self.check_subtree(child, lo, hi, depth + 1, leaf_depth, leaves, visited)?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn min_fill(&self) -> (usize, usize) {
        (self.min_leaf, self.min_inner)
    }
}

fn corrupt(msg: &str) -> ArborError {
    ArborError::IndexCorrupted(msg.to_string())
}
