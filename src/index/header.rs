//! On-disk layout of an index file.
//!
//! Page 0 holds the tree header:
//! +---------------------+ 0
//! | order: u32          | 4
//! | key type tag: i32   | 8
//! | node count: u32     | 12
//! | entry count: u32    | 16
//! | root page: u32      | 20
//! +---------------------+
//!
//! Pages 1..=node count hold one node each, in breadth-first order:
//! kind (u8), key count (u16), next leaf page (u32), the keys, then either
//! one record locator per key (page u32, slot u16) or key count + 1 child
//! pages (u32). Missing links are stored as `INVALID_PAGE_ID`.

use bytes::{Buf, BufMut};

use crate::common::{
    ArborError, PageId, RecordId, Result, SlotId, INVALID_PAGE_ID, PAGE_SIZE,
};
use crate::tuple::{DataType, Value};

use super::NodeKind;

const HEADER_SIZE: usize = 20;
const NODE_HEADER_SIZE: usize = 7;
const RECORD_SIZE: usize = 6;
const CHILD_SIZE: usize = 4;

const LEAF_TAG: u8 = 1;
const INNER_TAG: u8 = 2;

/// Tree metadata persisted in the header page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHeader {
    pub order: u32,
    pub key_type: DataType,
    pub num_nodes: u32,
    pub num_entries: u32,
    pub root_page: Option<PageId>,
}

impl TreeHeader {
    /// Header of an index with no entries.
    pub fn empty(key_type: DataType, order: u32) -> Self {
        Self {
            order,
            key_type,
            num_nodes: 0,
            num_entries: 0,
            root_page: None,
        }
    }

    pub fn encode(&self, page: &mut [u8]) {
        page.fill(0);
        let mut buf = page;
        buf.put_u32_le(self.order);
        buf.put_i32_le(self.key_type.type_id());
        buf.put_u32_le(self.num_nodes);
        buf.put_u32_le(self.num_entries);
        buf.put_u32_le(self.root_page.unwrap_or(INVALID_PAGE_ID).as_u32());
    }

    pub fn decode(page: &[u8]) -> Result<Self> {
        if page.len() < HEADER_SIZE {
            return Err(ArborError::IndexCorrupted("short header page".to_string()));
        }
        let mut buf = page;
        let order = buf.get_u32_le();
        let key_type = DataType::from_type_id(buf.get_i32_le())?;
        let num_nodes = buf.get_u32_le();
        let num_entries = buf.get_u32_le();
        let root_page = decode_link(buf.get_u32_le());

        if order < 2 {
            return Err(ArborError::IndexCorrupted(format!("tree order {}", order)));
        }
        if (num_nodes == 0) != root_page.is_none() {
            return Err(ArborError::IndexCorrupted(format!(
                "{} nodes but root page {:?}",
                num_nodes, root_page
            )));
        }

        Ok(Self {
            order,
            key_type,
            num_nodes,
            num_entries,
            root_page,
        })
    }
}

/// A node as laid out on its page, with links expressed as page numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct NodePage {
    pub kind: NodeKind,
    pub keys: Vec<Value>,
    pub records: Vec<RecordId>,
    pub children: Vec<PageId>,
    pub next: Option<PageId>,
}

impl NodePage {
    pub fn encoded_len(&self) -> usize {
        let keys: usize = self.keys.iter().map(Value::encoded_len).sum();
        NODE_HEADER_SIZE
            + keys
            + self.records.len() * RECORD_SIZE
            + self.children.len() * CHILD_SIZE
    }

    /// Writes the node into a page buffer. Fails if it does not fit.
    pub fn encode(&self, page: &mut [u8]) -> Result<()> {
        let len = self.encoded_len();
        if len > page.len() || len > PAGE_SIZE {
            return Err(ArborError::InvalidArgument(format!(
                "node of {} keys needs {} bytes, page holds {}",
                self.keys.len(),
                len,
                PAGE_SIZE
            )));
        }
        let num_keys = u16::try_from(self.keys.len())
            .map_err(|_| ArborError::InvalidArgument("too many keys in node".to_string()))?;

        page.fill(0);
        let mut buf = page;
        buf.put_u8(match self.kind {
            NodeKind::Leaf => LEAF_TAG,
            NodeKind::Inner => INNER_TAG,
        });
        buf.put_u16_le(num_keys);
        buf.put_u32_le(self.next.unwrap_or(INVALID_PAGE_ID).as_u32());
        for key in &self.keys {
            key.encode(&mut buf)?;
        }
        for record in &self.records {
            buf.put_u32_le(record.page_id.as_u32());
            buf.put_u16_le(record.slot_id.as_u16());
        }
        for child in &self.children {
            buf.put_u32_le(child.as_u32());
        }
        Ok(())
    }

    pub fn decode(page: &[u8], key_type: DataType) -> Result<Self> {
        let corrupted = |what: &str| ArborError::IndexCorrupted(format!("node page: {}", what));

        let mut buf = page;
        if buf.remaining() < NODE_HEADER_SIZE {
            return Err(corrupted("short header"));
        }
        let kind = match buf.get_u8() {
            LEAF_TAG => NodeKind::Leaf,
            INNER_TAG => NodeKind::Inner,
            other => return Err(corrupted(&format!("unknown node tag {}", other))),
        };
        let num_keys = buf.get_u16_le() as usize;
        let next = decode_link(buf.get_u32_le());

        let mut keys = Vec::with_capacity(num_keys);
        for _ in 0..num_keys {
            keys.push(Value::decode(&mut buf, key_type)?);
        }

        let mut records = Vec::new();
        let mut children = Vec::new();
        match kind {
            NodeKind::Leaf => {
                if buf.remaining() < num_keys * RECORD_SIZE {
                    return Err(corrupted("truncated record locators"));
                }
                for _ in 0..num_keys {
                    let page_id = PageId::new(buf.get_u32_le());
                    let slot_id = SlotId::new(buf.get_u16_le());
                    records.push(RecordId::new(page_id, slot_id));
                }
            }
            NodeKind::Inner => {
                if buf.remaining() < (num_keys + 1) * CHILD_SIZE {
                    return Err(corrupted("truncated child pointers"));
                }
                for _ in 0..=num_keys {
                    children.push(PageId::new(buf.get_u32_le()));
                }
            }
        }

        Ok(Self {
            kind,
            keys,
            records,
            children,
            next,
        })
    }
}

fn decode_link(raw: u32) -> Option<PageId> {
    if raw == INVALID_PAGE_ID.as_u32() {
        None
    } else {
        Some(PageId::new(raw))
    }
}
