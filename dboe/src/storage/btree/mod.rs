//! Disk-based B+Tree over fixed-length records.
//!
//! # Structure
//!
//! The tree consists of:
//! - Internal nodes: separator keys and child block ids
//! - Leaf nodes: records, doubly-linked for range scans
//!
//! Block 0 holds the tree metadata (root, height, record count). Nodes refer
//! to each other only by block id and are decoded afresh on every access.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use dboe::record::RecordFactory;
//! use dboe::storage::btree::{BPlusTree, NodeLayout, RangeIter, empty_tree_blocks};
//! use dboe::storage::{BlockManager, MemoryStore, Overlay};
//!
//! let layout = NodeLayout::new(4096, RecordFactory::key_only(8), None, false).unwrap();
//! let manager = BlockManager::new(Box::new(MemoryStore::new(4096)), 16, None);
//! manager.format(&empty_tree_blocks(&layout)).unwrap();
//!
//! let mut overlay = Overlay::begin(Arc::new(manager)).unwrap();
//! let mut tree = BPlusTree::new(&mut overlay, &layout);
//! let record = layout.factory().create(&7u64.to_be_bytes()).unwrap();
//! assert!(tree.insert(record).unwrap());
//!
//! let keys: Vec<_> = RangeIter::new(&overlay, layout, None, None).unwrap().collect();
//! assert_eq!(keys.len(), 1);
//! ```

mod iter;
mod node;
mod tree;

pub use iter::RangeIter;
pub use node::{DATA_OFFSET, InternalNode, LeafNode, MAX_ORDER, Node, NodeError, NodeLayout};
pub use tree::{BPlusTree, BlockAccess, BlockAccessMut, TreeError, empty_tree_blocks};
