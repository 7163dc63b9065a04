//! Lazy range scans.
//!
//! A scan descends once to the leaf holding `min`, then follows `next` links
//! one leaf at a time. Only the current leaf's records are buffered.

use crate::record::{Record, compare_keys};
use crate::storage::block::{BlockId, NO_BLOCK};
use crate::storage::btree::node::{NodeError, NodeLayout};
use crate::storage::btree::tree::{BPlusTree, BlockAccess, TreeError};

/// Records with `min <= key < max`, in key order.
///
/// Either bound may be open. The iterator stops after the first error.
pub struct RangeIter<A> {
    access: A,
    layout: NodeLayout,
    records: std::vec::IntoIter<Record>,
    next_leaf: BlockId,
    /// Leaves read so far, bounded by `leaf_limit`.
    leaves_visited: u64,
    leaf_limit: u64,
    max: Option<Vec<u8>>,
    finished: bool,
}

impl<A: BlockAccess> RangeIter<A> {
    pub fn new(
        access: A,
        layout: NodeLayout,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
    ) -> Result<Self, TreeError> {
        let leaf_limit = access.tree_meta()?.block_count;
        let (_, mut leaf) = BPlusTree::new(&access, &layout).seek_leaf(min)?;
        if let Some(min) = min {
            let start = leaf.find_index(min).unwrap_or_else(|i| i);
            leaf.records.drain(..start);
        }
        Ok(Self {
            access,
            layout,
            records: leaf.records.into_iter(),
            next_leaf: leaf.next,
            leaves_visited: 1,
            leaf_limit,
            max: max.map(<[u8]>::to_vec),
            finished: false,
        })
    }

    /// The block source this scan reads from.
    pub const fn access(&self) -> &A {
        &self.access
    }
}

impl<A: BlockAccess> Iterator for RangeIter<A> {
    type Item = Result<Record, TreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            if let Some(record) = self.records.next() {
                let past_end = self
                    .max
                    .as_deref()
                    .is_some_and(|max| compare_keys(record.key(), max).is_ge());
                if past_end {
                    self.finished = true;
                    return None;
                }
                return Some(Ok(record));
            }
            if self.next_leaf == NO_BLOCK {
                self.finished = true;
                return None;
            }
            self.leaves_visited += 1;
            if self.leaves_visited > self.leaf_limit {
                self.finished = true;
                return Some(Err(NodeError::SiblingCycle {
                    block_id: self.next_leaf,
                    visited: self.leaves_visited - 1,
                }
                .into()));
            }
            match BPlusTree::new(&self.access, &self.layout).read_leaf(self.next_leaf) {
                Ok(leaf) => {
                    self.next_leaf = leaf.next;
                    self.records = leaf.records.into_iter();
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
