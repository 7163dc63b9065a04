//! B+Tree node types and serialization.
//!
//! Nodes are rebuilt from their block on every access; they refer to each
//! other only by block id. There are two node types:
//! - Internal nodes: N separator keys and N+1 child block ids
//! - Leaf nodes: fixed-length records, doubly-linked for range scans

// Node counts are bounded by `MAX_ORDER` and fit in u16.
#![allow(clippy::cast_possible_truncation)]

use crate::record::{Record, RecordFactory, compare_keys};
use crate::storage::block::{
    Block, BlockHeader, BlockId, BlockType, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, NO_BLOCK,
};
use crate::storage::btree::tree::TreeError;

/// Node header layout (after the block header):
/// - `count`: 2 bytes (records in a leaf, keys in an internal node)
/// - `prev_leaf`: 8 bytes (leaves only, 0 if none)
/// - `next_leaf`: 8 bytes (leaves only, 0 if none)
///
/// Total: 18 bytes
const NODE_HEADER_SIZE: usize = 18;

mod offsets {
    use super::BlockHeader;

    pub const COUNT: usize = BlockHeader::SIZE;
    pub const PREV_LEAF: usize = COUNT + 2;
    pub const NEXT_LEAF: usize = PREV_LEAF + 8;
}

/// Offset where node data starts (after block header + node header).
pub const DATA_OFFSET: usize = BlockHeader::SIZE + NODE_HEADER_SIZE;

/// Size of a child pointer in an internal node.
const POINTER_SIZE: usize = 8;

/// Largest order accepted; keeps `2 * order - 1` within the u16 count field.
pub const MAX_ORDER: usize = 1 << 15;

/// Fixed slot layout derived from block size, record shape and order.
///
/// Every non-root node holds between `order - 1` and `2 * order - 1`
/// entries (records in a leaf, separator keys in an internal node).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLayout {
    block_size: usize,
    factory: RecordFactory,
    order: usize,
    checking: bool,
}

impl NodeLayout {
    /// Compute the layout for an index.
    ///
    /// With `order` unset, the largest order the block size allows is used.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOrder` if the order is below 2 or its nodes would not
    /// fit in a block, and `InvalidLayout` for an unusable block size or an
    /// empty key.
    pub fn new(
        block_size: usize,
        factory: RecordFactory,
        order: Option<usize>,
        checking: bool,
    ) -> Result<Self, TreeError> {
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size) {
            return Err(TreeError::InvalidLayout(format!(
                "block size {block_size} outside {MIN_BLOCK_SIZE}..={MAX_BLOCK_SIZE}"
            )));
        }
        if factory.key_length() == 0 {
            return Err(TreeError::InvalidLayout("key length must be non-zero".to_string()));
        }

        let leaf_capacity = Self::leaf_capacity_for(block_size, factory);
        let internal_capacity = Self::internal_capacity_for(block_size, factory);
        let max_order = (leaf_capacity.min(internal_capacity) + 1) / 2;
        let max_order = max_order.min(MAX_ORDER);

        let order = order.unwrap_or(max_order);
        if order < 2 || order > max_order {
            return Err(TreeError::InvalidOrder { order, max_order });
        }

        Ok(Self {
            block_size,
            factory,
            order,
            checking,
        })
    }

    const fn leaf_capacity_for(block_size: usize, factory: RecordFactory) -> usize {
        (block_size - DATA_OFFSET) / factory.record_length()
    }

    const fn internal_capacity_for(block_size: usize, factory: RecordFactory) -> usize {
        (block_size - DATA_OFFSET - POINTER_SIZE) / (factory.key_length() + POINTER_SIZE)
    }

    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    #[must_use]
    pub const fn factory(&self) -> RecordFactory {
        self.factory
    }

    #[must_use]
    pub const fn order(&self) -> usize {
        self.order
    }

    /// Whether decoding also verifies that unused slots are zeroed.
    #[must_use]
    pub const fn checking(&self) -> bool {
        self.checking
    }

    /// Records that physically fit in a leaf block.
    #[must_use]
    pub const fn leaf_capacity(&self) -> usize {
        Self::leaf_capacity_for(self.block_size, self.factory)
    }

    /// Keys that physically fit in an internal block.
    #[must_use]
    pub const fn internal_capacity(&self) -> usize {
        Self::internal_capacity_for(self.block_size, self.factory)
    }

    /// Most entries a node may hold before it must split.
    #[must_use]
    pub const fn max_records(&self) -> usize {
        2 * self.order - 1
    }

    /// Fewest entries a non-root node may hold before it must rebalance.
    #[must_use]
    pub const fn min_records(&self) -> usize {
        self.order - 1
    }

    /// Decode any node.
    pub fn decode(&self, block_id: BlockId, block: &Block) -> Result<Node, NodeError> {
        match self.node_type(block_id, block)? {
            BlockType::Leaf => self.decode_leaf_body(block_id, block).map(Node::Leaf),
            BlockType::Internal => self.decode_internal_body(block_id, block).map(Node::Internal),
            other => Err(NodeError::UnknownNodeType {
                block_id,
                type_byte: other as u8,
            }),
        }
    }

    /// Decode a block that must be a leaf.
    pub fn decode_leaf(&self, block_id: BlockId, block: &Block) -> Result<LeafNode, NodeError> {
        match self.decode(block_id, block)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(_) => Err(NodeError::WrongNodeType {
                block_id,
                expected: BlockType::Leaf,
            }),
        }
    }

    /// Decode a block that must be an internal node.
    pub fn decode_internal(
        &self,
        block_id: BlockId,
        block: &Block,
    ) -> Result<InternalNode, NodeError> {
        match self.decode(block_id, block)? {
            Node::Internal(node) => Ok(node),
            Node::Leaf(_) => Err(NodeError::WrongNodeType {
                block_id,
                expected: BlockType::Internal,
            }),
        }
    }

    /// Rewrite a leaf's `prev` link in place and reseal the block.
    pub fn patch_leaf_prev(
        &self,
        block_id: BlockId,
        block: &mut Block,
        prev: BlockId,
    ) -> Result<(), NodeError> {
        if self.node_type(block_id, block)? != BlockType::Leaf {
            return Err(NodeError::WrongNodeType {
                block_id,
                expected: BlockType::Leaf,
            });
        }
        block.write_u64(offsets::PREV_LEAF, prev);
        block.seal();
        Ok(())
    }

    fn node_type(&self, block_id: BlockId, block: &Block) -> Result<BlockType, NodeError> {
        if block.len() != self.block_size {
            return Err(NodeError::WrongBlockSize {
                block_id,
                actual: block.len(),
            });
        }
        if let Err((expected, actual)) = block.verify_checksum() {
            return Err(NodeError::ChecksumMismatch {
                block_id,
                expected,
                actual,
            });
        }
        BlockType::try_from(block.read_u8(0))
            .map_err(|type_byte| NodeError::UnknownNodeType { block_id, type_byte })
    }

    fn check_count(
        block_id: BlockId,
        count: usize,
        capacity: usize,
    ) -> Result<(), NodeError> {
        if count > capacity {
            return Err(NodeError::CountExceedsCapacity {
                block_id,
                count,
                capacity,
            });
        }
        Ok(())
    }

    fn check_trailing(&self, block_id: BlockId, block: &Block, used: usize) -> Result<(), NodeError> {
        if !self.checking {
            return Ok(());
        }
        match block.as_bytes()[used..].iter().position(|&b| b != 0) {
            Some(pos) => Err(NodeError::TrailingGarbage {
                block_id,
                offset: used + pos,
            }),
            None => Ok(()),
        }
    }

    fn decode_leaf_body(&self, block_id: BlockId, block: &Block) -> Result<LeafNode, NodeError> {
        let count = block.read_u16(offsets::COUNT) as usize;
        Self::check_count(block_id, count, self.leaf_capacity())?;

        let key_length = self.factory.key_length();
        let record_length = self.factory.record_length();
        let mut records = Vec::with_capacity(count);
        let mut offset = DATA_OFFSET;
        for _ in 0..count {
            let bytes = block.read_bytes(offset, record_length);
            records.push(Record::from_slices(&bytes[..key_length], &bytes[key_length..]));
            offset += record_length;
        }
        self.check_trailing(block_id, block, offset)?;

        Ok(LeafNode {
            prev: block.read_u64(offsets::PREV_LEAF),
            next: block.read_u64(offsets::NEXT_LEAF),
            records,
        })
    }

    fn decode_internal_body(
        &self,
        block_id: BlockId,
        block: &Block,
    ) -> Result<InternalNode, NodeError> {
        let count = block.read_u16(offsets::COUNT) as usize;
        Self::check_count(block_id, count, self.internal_capacity())?;

        let key_length = self.factory.key_length();
        let mut keys = Vec::with_capacity(count);
        let mut children = Vec::with_capacity(count + 1);

        let mut offset = DATA_OFFSET;
        children.push(block.read_u64(offset));
        offset += POINTER_SIZE;
        for _ in 0..count {
            keys.push(block.read_bytes(offset, key_length).to_vec());
            offset += key_length;
            children.push(block.read_u64(offset));
            offset += POINTER_SIZE;
        }
        self.check_trailing(block_id, block, offset)?;

        Ok(InternalNode { keys, children })
    }

    /// Encode a leaf into a fresh, sealed block.
    #[must_use]
    pub fn encode_leaf(&self, node: &LeafNode) -> Block {
        let mut block = Block::new(self.block_size);
        block.write_header(BlockType::Leaf);
        block.write_u16(offsets::COUNT, node.records.len() as u16);
        block.write_u64(offsets::PREV_LEAF, node.prev);
        block.write_u64(offsets::NEXT_LEAF, node.next);

        let record_length = self.factory.record_length();
        let mut offset = DATA_OFFSET;
        for record in &node.records {
            record.write_to(&mut block.as_bytes_mut()[offset..offset + record_length]);
            offset += record_length;
        }
        block.seal();
        block
    }

    /// Encode an internal node into a fresh, sealed block.
    #[must_use]
    pub fn encode_internal(&self, node: &InternalNode) -> Block {
        let mut block = Block::new(self.block_size);
        block.write_header(BlockType::Internal);
        block.write_u16(offsets::COUNT, node.keys.len() as u16);

        let mut offset = DATA_OFFSET;
        if let Some(first) = node.children.first() {
            block.write_u64(offset, *first);
        }
        offset += POINTER_SIZE;
        for (key, child) in node.keys.iter().zip(node.children.iter().skip(1)) {
            block.write_bytes(offset, key);
            offset += key.len();
            block.write_u64(offset, *child);
            offset += POINTER_SIZE;
        }
        block.seal();
        block
    }
}

/// A decoded node.
#[derive(Debug)]
pub enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

/// An internal B+Tree node.
///
/// `children[i]` holds keys `>= keys[i - 1]` and `< keys[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode {
    pub keys: Vec<Vec<u8>>,
    pub children: Vec<BlockId>,
}

impl InternalNode {
    /// Create an internal node with two children split by `key`.
    #[must_use]
    pub fn with_children(left_child: BlockId, key: Vec<u8>, right_child: BlockId) -> Self {
        Self {
            keys: vec![key],
            children: vec![left_child, right_child],
        }
    }

    /// Find the child index to descend into for `key`.
    #[must_use]
    pub fn find_child_index(&self, key: &[u8]) -> usize {
        match self.keys.binary_search_by(|k| compare_keys(k, key)) {
            Ok(i) => i + 1, // Exact match, go right
            Err(i) => i,
        }
    }

    /// Insert a separator and the child to its right.
    ///
    /// `index` is the position of the child that was split.
    pub fn insert_at(&mut self, index: usize, key: Vec<u8>, right_child: BlockId) {
        self.keys.insert(index, key);
        self.children.insert(index + 1, right_child);
    }

    /// Split the node, returning the median key and the new right node.
    ///
    /// The median moves up; it is kept in neither half.
    #[must_use]
    pub fn split(&mut self) -> (Vec<u8>, Self) {
        let mid = self.keys.len() / 2;
        let right_keys = self.keys.split_off(mid + 1);
        let right_children = self.children.split_off(mid + 1);
        let median = self.keys.pop().unwrap_or_default();

        (
            median,
            Self {
                keys: right_keys,
                children: right_children,
            },
        )
    }
}

/// A leaf B+Tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    pub prev: BlockId,
    pub next: BlockId,
    /// Records in strictly increasing key order.
    pub records: Vec<Record>,
}

impl LeafNode {
    /// Create a new empty, unlinked leaf.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::new() in a struct literal
    pub fn new() -> Self {
        Self {
            prev: NO_BLOCK,
            next: NO_BLOCK,
            records: Vec::new(),
        }
    }

    /// Binary search for `key`.
    pub fn find_index(&self, key: &[u8]) -> Result<usize, usize> {
        self.records
            .binary_search_by(|record| compare_keys(record.key(), key))
    }

    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&Record> {
        self.find_index(key).ok().map(|i| &self.records[i])
    }

    /// Insert or replace a record, returning the replaced one.
    pub fn insert(&mut self, record: Record) -> Option<Record> {
        match self.find_index(record.key()) {
            Ok(i) => Some(std::mem::replace(&mut self.records[i], record)),
            Err(i) => {
                self.records.insert(i, record);
                None
            }
        }
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Record> {
        self.find_index(key).ok().map(|i| self.records.remove(i))
    }

    /// Move the upper half of the records into a new leaf.
    ///
    /// Sibling links are left for the caller, which knows the block ids.
    #[must_use]
    pub fn split(&mut self) -> Self {
        let mid = self.records.len() / 2;
        Self {
            prev: NO_BLOCK,
            next: NO_BLOCK,
            records: self.records.split_off(mid),
        }
    }
}

impl Default for LeafNode {
    fn default() -> Self {
        Self::new()
    }
}

/// A block that does not decode as a valid node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Block buffer has the wrong length.
    WrongBlockSize { block_id: BlockId, actual: usize },
    /// Stored checksum does not match the contents.
    ChecksumMismatch {
        block_id: BlockId,
        expected: u32,
        actual: u32,
    },
    /// Type byte is not a node type.
    UnknownNodeType { block_id: BlockId, type_byte: u8 },
    /// A leaf was found where an internal node was expected, or vice versa.
    WrongNodeType {
        block_id: BlockId,
        expected: BlockType,
    },
    /// Stored count is larger than the block can hold.
    CountExceedsCapacity {
        block_id: BlockId,
        count: usize,
        capacity: usize,
    },
    /// Non-zero bytes after the last used slot.
    TrailingGarbage { block_id: BlockId, offset: usize },
    /// A non-root node with nothing in it.
    EmptyNode { block_id: BlockId },
    /// Following leaf `next` links visited more leaves than the tree has blocks.
    SiblingCycle { block_id: BlockId, visited: u64 },
}

impl NodeError {
    /// Block the error was found in.
    #[must_use]
    pub const fn block_id(&self) -> BlockId {
        match self {
            Self::WrongBlockSize { block_id, .. }
            | Self::ChecksumMismatch { block_id, .. }
            | Self::UnknownNodeType { block_id, .. }
            | Self::WrongNodeType { block_id, .. }
            | Self::CountExceedsCapacity { block_id, .. }
            | Self::TrailingGarbage { block_id, .. }
            | Self::EmptyNode { block_id }
            | Self::SiblingCycle { block_id, .. } => *block_id,
        }
    }
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongBlockSize { block_id, actual } => {
                write!(f, "block {block_id}: wrong block size {actual}")
            }
            Self::ChecksumMismatch {
                block_id,
                expected,
                actual,
            } => write!(
                f,
                "block {block_id}: checksum mismatch: expected 0x{expected:08x}, got 0x{actual:08x}"
            ),
            Self::UnknownNodeType {
                block_id,
                type_byte,
            } => write!(f, "block {block_id}: unknown node type 0x{type_byte:02x}"),
            Self::WrongNodeType { block_id, expected } => {
                write!(f, "block {block_id}: expected a {expected:?} node")
            }
            Self::CountExceedsCapacity {
                block_id,
                count,
                capacity,
            } => write!(
                f,
                "block {block_id}: count {count} exceeds capacity {capacity}"
            ),
            Self::TrailingGarbage { block_id, offset } => {
                write!(f, "block {block_id}: non-zero byte at unused offset {offset}")
            }
            Self::EmptyNode { block_id } => write!(f, "block {block_id}: unexpectedly empty node"),
            Self::SiblingCycle { block_id, visited } => write!(
                f,
                "block {block_id}: leaf chain still going after {visited} leaves"
            ),
        }
    }
}

impl std::error::Error for NodeError {}
