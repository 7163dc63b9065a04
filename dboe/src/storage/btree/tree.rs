//! B+Tree algorithms over block-id addressed nodes.
//!
//! The tree never holds a node across operations. Each step reads the block,
//! decodes it, and writes a freshly encoded block back. Nodes store no parent
//! link; descent records the access path (block id, decoded node, child slot)
//! and splits and merges walk back up that path.
//!
//! Reads go through [`BlockAccess`], writes through [`BlockAccessMut`]. A
//! reader's snapshot ([`ReadView`]) only reads; a writer's [`Overlay`] does
//! both.

#![allow(clippy::cast_possible_truncation)]

use std::collections::HashSet;
use std::sync::Arc;

use crate::record::{Record, RecordError, compare_keys};
use crate::storage::block::{Block, BlockId, META_BLOCK, NO_BLOCK};
use crate::storage::btree::node::{InternalNode, LeafNode, Node, NodeError, NodeLayout};
use crate::storage::io::StorageError;
use crate::storage::manager::ReadView;
use crate::storage::meta::TreeMeta;
use crate::storage::overlay::Overlay;

/// Read access to a tree's blocks and metadata.
pub trait BlockAccess {
    fn tree_meta(&self) -> Result<TreeMeta, StorageError>;
    fn read_block(&self, block_id: BlockId) -> Result<Arc<Block>, StorageError>;
}

/// Write access on top of [`BlockAccess`].
pub trait BlockAccessMut: BlockAccess {
    fn tree_meta_mut(&mut self) -> &mut TreeMeta;
    fn write_block(&mut self, block_id: BlockId, block: Block);
    /// Private copy of a block for in-place edits.
    fn block_mut(&mut self, block_id: BlockId) -> Result<&mut Block, StorageError>;
    fn allocate_block(&mut self) -> Result<BlockId, StorageError>;
    fn release_block(&mut self, block_id: BlockId);
}

impl BlockAccess for Overlay {
    fn tree_meta(&self) -> Result<TreeMeta, StorageError> {
        Ok(*self.meta())
    }

    fn read_block(&self, block_id: BlockId) -> Result<Arc<Block>, StorageError> {
        self.get_read(block_id)
    }
}

impl BlockAccessMut for Overlay {
    fn tree_meta_mut(&mut self) -> &mut TreeMeta {
        self.meta_mut()
    }

    fn write_block(&mut self, block_id: BlockId, block: Block) {
        self.put(block_id, block);
    }

    fn block_mut(&mut self, block_id: BlockId) -> Result<&mut Block, StorageError> {
        self.get_write(block_id)
    }

    fn allocate_block(&mut self) -> Result<BlockId, StorageError> {
        self.allocate()
    }

    fn release_block(&mut self, block_id: BlockId) {
        self.release(block_id);
    }
}

impl BlockAccess for ReadView {
    fn tree_meta(&self) -> Result<TreeMeta, StorageError> {
        self.meta()
    }

    fn read_block(&self, block_id: BlockId) -> Result<Arc<Block>, StorageError> {
        self.read(block_id)
    }
}

impl<T: BlockAccess + ?Sized> BlockAccess for &T {
    fn tree_meta(&self) -> Result<TreeMeta, StorageError> {
        (**self).tree_meta()
    }

    fn read_block(&self, block_id: BlockId) -> Result<Arc<Block>, StorageError> {
        (**self).read_block(block_id)
    }
}

impl<T: BlockAccess + ?Sized> BlockAccess for &mut T {
    fn tree_meta(&self) -> Result<TreeMeta, StorageError> {
        (**self).tree_meta()
    }

    fn read_block(&self, block_id: BlockId) -> Result<Arc<Block>, StorageError> {
        (**self).read_block(block_id)
    }
}

impl<T: BlockAccessMut + ?Sized> BlockAccessMut for &mut T {
    fn tree_meta_mut(&mut self) -> &mut TreeMeta {
        (**self).tree_meta_mut()
    }

    fn write_block(&mut self, block_id: BlockId, block: Block) {
        (**self).write_block(block_id, block);
    }

    fn block_mut(&mut self, block_id: BlockId) -> Result<&mut Block, StorageError> {
        (**self).block_mut(block_id)
    }

    fn allocate_block(&mut self) -> Result<BlockId, StorageError> {
        (**self).allocate_block()
    }

    fn release_block(&mut self, block_id: BlockId) {
        (**self).release_block(block_id);
    }
}

/// Blocks of a freshly formatted tree: metadata and an empty root leaf.
#[must_use]
pub fn empty_tree_blocks(layout: &NodeLayout) -> Vec<(BlockId, Block)> {
    let factory = layout.factory();
    let meta = TreeMeta::fresh(
        layout.block_size(),
        factory.key_length(),
        factory.value_length(),
        layout.order(),
    );
    vec![
        (META_BLOCK, meta.to_block()),
        (meta.root, layout.encode_leaf(&LeafNode::new())),
    ]
}

/// One internal node on the way from the root to a leaf.
struct PathStep {
    block_id: BlockId,
    node: InternalNode,
    /// Slot of the child the descent followed.
    child_index: usize,
}

/// A B+Tree over some block access.
pub struct BPlusTree<'a, A> {
    access: A,
    layout: &'a NodeLayout,
}

impl<'a, A> BPlusTree<'a, A> {
    pub const fn new(access: A, layout: &'a NodeLayout) -> Self {
        Self { access, layout }
    }

    #[must_use]
    pub const fn layout(&self) -> &NodeLayout {
        self.layout
    }
}

impl<A: BlockAccess> BPlusTree<'_, A> {
    /// Number of records, maintained incrementally in the metadata.
    pub fn len(&self) -> Result<u64, TreeError> {
        Ok(self.access.tree_meta()?.record_count)
    }

    pub fn is_empty(&self) -> Result<bool, TreeError> {
        Ok(self.len()? == 0)
    }

    /// Look up the record with exactly this key.
    pub fn find(&self, key: &[u8]) -> Result<Option<Record>, TreeError> {
        self.check_key(key)?;
        let (_, _, leaf) = self.walk_down(|node| node.find_child_index(key))?;
        Ok(leaf.get(key).cloned())
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool, TreeError> {
        Ok(self.find(key)?.is_some())
    }

    /// Record with the smallest key.
    pub fn min_record(&self) -> Result<Option<Record>, TreeError> {
        let (_, _, leaf) = self.walk_down(|_| 0)?;
        Ok(leaf.records.first().cloned())
    }

    /// Record with the largest key.
    pub fn max_record(&self) -> Result<Option<Record>, TreeError> {
        let (_, _, leaf) = self.walk_down(|node| node.keys.len())?;
        Ok(leaf.records.last().cloned())
    }

    /// The leaf where a scan starting at `min` begins (leftmost leaf if `None`).
    pub fn seek_leaf(&self, min: Option<&[u8]>) -> Result<(BlockId, LeafNode), TreeError> {
        let (_, block_id, leaf) = match min {
            Some(key) => self.walk_down(|node| node.find_child_index(key))?,
            None => self.walk_down(|_| 0)?,
        };
        Ok((block_id, leaf))
    }

    pub fn read_leaf(&self, block_id: BlockId) -> Result<LeafNode, TreeError> {
        let block = self.access.read_block(block_id)?;
        Ok(self.layout.decode_leaf(block_id, &block)?)
    }

    fn read_internal(&self, block_id: BlockId) -> Result<InternalNode, TreeError> {
        let block = self.access.read_block(block_id)?;
        Ok(self.layout.decode_internal(block_id, &block)?)
    }

    fn check_key(&self, key: &[u8]) -> Result<(), TreeError> {
        let key_length = self.layout.factory().key_length();
        if key.len() != key_length {
            return Err(TreeError::Record(RecordError::InvalidRecordLength {
                expected: key_length,
                actual: key.len(),
            }));
        }
        Ok(())
    }

    /// Descend from the root, choosing a child slot at each internal level.
    ///
    /// The metadata height decides where leaves must be, so a corrupt child
    /// link cannot send the descent around a cycle.
    fn walk_down(
        &self,
        choose: impl Fn(&InternalNode) -> usize,
    ) -> Result<(Vec<PathStep>, BlockId, LeafNode), TreeError> {
        let meta = self.access.tree_meta()?;
        let mut path = Vec::with_capacity(meta.height as usize);
        let mut block_id = meta.root;
        for _ in 1..meta.height {
            let node = self.read_internal(block_id)?;
            let child_index = choose(&node).min(node.keys.len());
            let child = node.children[child_index];
            path.push(PathStep {
                block_id,
                node,
                child_index,
            });
            block_id = child;
        }
        let leaf = self.read_leaf(block_id)?;
        Ok((path, block_id, leaf))
    }

    /// Full structural validation.
    ///
    /// Verifies key ordering and separator bounds, node occupancy, that every
    /// leaf sits at the same depth, the leaf sibling chain, and the stored
    /// record count.
    pub fn check(&self) -> Result<(), TreeError> {
        let meta = self.access.tree_meta()?;
        let mut checker = Checker {
            tree: self,
            height: meta.height,
            visited: HashSet::new(),
            leaves: Vec::new(),
            records: 0,
        };
        let result = checker.run(&meta);
        if let Err(TreeError::CheckFailed(reason)) = &result {
            tracing::error!(root = meta.root, height = meta.height, %reason, "tree check failed");
        }
        result
    }
}

impl<A: BlockAccessMut> BPlusTree<'_, A> {
    fn write_leaf(&mut self, block_id: BlockId, leaf: &LeafNode) {
        let block = self.layout.encode_leaf(leaf);
        self.access.write_block(block_id, block);
    }

    fn write_internal(&mut self, block_id: BlockId, node: &InternalNode) {
        let block = self.layout.encode_internal(node);
        self.access.write_block(block_id, block);
    }

    fn set_prev_link(&mut self, block_id: BlockId, prev: BlockId) -> Result<(), TreeError> {
        if block_id != NO_BLOCK {
            let block = self.access.block_mut(block_id)?;
            self.layout.patch_leaf_prev(block_id, block, prev)?;
        }
        Ok(())
    }

    /// Insert a record, replacing the value of an existing record with the
    /// same key.
    ///
    /// Returns `true` if the key was new.
    pub fn insert(&mut self, record: Record) -> Result<bool, TreeError> {
        let factory = self.layout.factory();
        if record.key().len() != factory.key_length()
            || record.value().len() != factory.value_length()
        {
            return Err(TreeError::Record(RecordError::InvalidRecordLength {
                expected: factory.record_length(),
                actual: record.len(),
            }));
        }

        let key = record.key().to_vec();
        let (path, leaf_id, mut leaf) = self.walk_down(|node| node.find_child_index(&key))?;
        if leaf.insert(record).is_some() {
            self.write_leaf(leaf_id, &leaf);
            return Ok(false);
        }
        self.access.tree_meta_mut().record_count += 1;

        if leaf.records.len() <= self.layout.max_records() {
            self.write_leaf(leaf_id, &leaf);
            return Ok(true);
        }

        let mut right = leaf.split();
        let right_id = self.access.allocate_block()?;
        right.prev = leaf_id;
        right.next = leaf.next;
        leaf.next = right_id;
        self.set_prev_link(right.next, right_id)?;

        let separator = right
            .records
            .first()
            .map(|r| r.key().to_vec())
            .ok_or(NodeError::EmptyNode { block_id: right_id })?;
        self.write_leaf(leaf_id, &leaf);
        self.write_leaf(right_id, &right);

        self.insert_into_parent(path, leaf_id, separator, right_id)?;
        Ok(true)
    }

    /// Push a separator up the access path after a split, splitting internal
    /// nodes as needed and growing a new root at the top.
    fn insert_into_parent(
        &mut self,
        mut path: Vec<PathStep>,
        mut left_id: BlockId,
        mut key: Vec<u8>,
        mut right_id: BlockId,
    ) -> Result<(), TreeError> {
        while let Some(step) = path.pop() {
            let mut node = step.node;
            node.insert_at(step.child_index, key, right_id);
            if node.keys.len() <= self.layout.max_records() {
                self.write_internal(step.block_id, &node);
                return Ok(());
            }

            let (median, right_node) = node.split();
            let new_id = self.access.allocate_block()?;
            self.write_internal(step.block_id, &node);
            self.write_internal(new_id, &right_node);

            left_id = step.block_id;
            key = median;
            right_id = new_id;
        }

        let root = InternalNode::with_children(left_id, key, right_id);
        let root_id = self.access.allocate_block()?;
        self.write_internal(root_id, &root);
        let meta = self.access.tree_meta_mut();
        meta.root = root_id;
        meta.height += 1;
        tracing::trace!(root = root_id, height = meta.height, "tree grew");
        Ok(())
    }

    /// Remove the record with this key.
    ///
    /// Returns `false`, writing nothing, if the key was absent.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool, TreeError> {
        self.check_key(key)?;
        let (mut path, leaf_id, mut leaf) = self.walk_down(|node| node.find_child_index(key))?;
        if leaf.remove(key).is_none() {
            return Ok(false);
        }
        let meta = self.access.tree_meta_mut();
        meta.record_count = meta.record_count.saturating_sub(1);

        let Some(parent) = path.pop() else {
            // The root leaf may hold any number of records.
            self.write_leaf(leaf_id, &leaf);
            return Ok(true);
        };
        if leaf.records.len() >= self.layout.min_records() {
            self.write_leaf(leaf_id, &leaf);
            return Ok(true);
        }

        let parent = self.rebalance_leaf(parent, leaf_id, leaf)?;
        self.rebalance_internal(path, parent)?;
        Ok(true)
    }

    /// Fix an underfull leaf by borrowing from or merging with a sibling.
    ///
    /// Returns the parent, modified but not yet written.
    fn rebalance_leaf(
        &mut self,
        mut parent: PathStep,
        leaf_id: BlockId,
        mut leaf: LeafNode,
    ) -> Result<PathStep, TreeError> {
        let min = self.layout.min_records();
        let index = parent.child_index;
        let node = &mut parent.node;

        let mut left = None;
        if index > 0 {
            let left_id = node.children[index - 1];
            let mut left_leaf = self.read_leaf(left_id)?;
            if left_leaf.records.len() > min {
                let record = left_leaf
                    .records
                    .pop()
                    .ok_or(NodeError::EmptyNode { block_id: left_id })?;
                node.keys[index - 1] = record.key().to_vec();
                leaf.records.insert(0, record);
                self.write_leaf(left_id, &left_leaf);
                self.write_leaf(leaf_id, &leaf);
                return Ok(parent);
            }
            left = Some((left_id, left_leaf));
        }

        let mut right = None;
        if index + 1 < node.children.len() {
            let right_id = node.children[index + 1];
            let mut right_leaf = self.read_leaf(right_id)?;
            if right_leaf.records.len() > min {
                leaf.records.push(right_leaf.records.remove(0));
                node.keys[index] = right_leaf
                    .records
                    .first()
                    .map(|r| r.key().to_vec())
                    .ok_or(NodeError::EmptyNode { block_id: right_id })?;
                self.write_leaf(right_id, &right_leaf);
                self.write_leaf(leaf_id, &leaf);
                return Ok(parent);
            }
            right = Some((right_id, right_leaf));
        }

        if let Some((left_id, mut left_leaf)) = left {
            left_leaf.records.append(&mut leaf.records);
            left_leaf.next = leaf.next;
            self.set_prev_link(leaf.next, left_id)?;
            self.write_leaf(left_id, &left_leaf);
            self.access.release_block(leaf_id);
            node.keys.remove(index - 1);
            node.children.remove(index);
        } else if let Some((right_id, mut right_leaf)) = right {
            leaf.records.append(&mut right_leaf.records);
            leaf.next = right_leaf.next;
            self.set_prev_link(right_leaf.next, leaf_id)?;
            self.write_leaf(leaf_id, &leaf);
            self.access.release_block(right_id);
            node.keys.remove(index);
            node.children.remove(index + 1);
        } else {
            return Err(NodeError::EmptyNode {
                block_id: parent.block_id,
            }
            .into());
        }
        Ok(parent)
    }

    /// Walk back up the access path fixing underfull internal nodes, then
    /// collapse the root if it was left with a single child.
    fn rebalance_internal(
        &mut self,
        mut path: Vec<PathStep>,
        mut current: PathStep,
    ) -> Result<(), TreeError> {
        let min = self.layout.min_records();
        loop {
            let Some(mut parent) = path.pop() else {
                return self.finish_root(current);
            };
            if current.node.keys.len() >= min {
                self.write_internal(current.block_id, &current.node);
                return Ok(());
            }

            let index = parent.child_index;
            let separators = &mut parent.node;
            let node = &mut current.node;

            let mut left = None;
            if index > 0 {
                let left_id = separators.children[index - 1];
                let mut left_node = self.read_internal(left_id)?;
                if left_node.keys.len() > min {
                    // Rotate right through the parent separator.
                    let (Some(key), Some(child)) = (left_node.keys.pop(), left_node.children.pop())
                    else {
                        return Err(NodeError::EmptyNode { block_id: left_id }.into());
                    };
                    let separator = std::mem::replace(&mut separators.keys[index - 1], key);
                    node.keys.insert(0, separator);
                    node.children.insert(0, child);
                    self.write_internal(left_id, &left_node);
                    self.write_internal(current.block_id, node);
                    self.write_internal(parent.block_id, separators);
                    return Ok(());
                }
                left = Some((left_id, left_node));
            }

            let mut right = None;
            if index + 1 < separators.children.len() {
                let right_id = separators.children[index + 1];
                let mut right_node = self.read_internal(right_id)?;
                if right_node.keys.len() > min {
                    // Rotate left through the parent separator.
                    if right_node.keys.is_empty() {
                        return Err(NodeError::EmptyNode { block_id: right_id }.into());
                    }
                    let key = right_node.keys.remove(0);
                    let child = right_node.children.remove(0);
                    let separator = std::mem::replace(&mut separators.keys[index], key);
                    node.keys.push(separator);
                    node.children.push(child);
                    self.write_internal(right_id, &right_node);
                    self.write_internal(current.block_id, node);
                    self.write_internal(parent.block_id, separators);
                    return Ok(());
                }
                right = Some((right_id, right_node));
            }

            if let Some((left_id, mut left_node)) = left {
                left_node.keys.push(separators.keys.remove(index - 1));
                left_node.keys.append(&mut node.keys);
                left_node.children.append(&mut node.children);
                separators.children.remove(index);
                self.write_internal(left_id, &left_node);
                self.access.release_block(current.block_id);
            } else if let Some((right_id, mut right_node)) = right {
                node.keys.push(separators.keys.remove(index));
                node.keys.append(&mut right_node.keys);
                node.children.append(&mut right_node.children);
                separators.children.remove(index + 1);
                self.write_internal(current.block_id, node);
                self.access.release_block(right_id);
            } else {
                return Err(NodeError::EmptyNode {
                    block_id: parent.block_id,
                }
                .into());
            }
            current = parent;
        }
    }

    /// Write the root back, or drop a level if it has a single child left.
    fn finish_root(&mut self, root: PathStep) -> Result<(), TreeError> {
        if !root.node.keys.is_empty() {
            self.write_internal(root.block_id, &root.node);
            return Ok(());
        }
        let child = root
            .node
            .children
            .first()
            .copied()
            .ok_or(NodeError::EmptyNode {
                block_id: root.block_id,
            })?;
        self.access.release_block(root.block_id);
        let meta = self.access.tree_meta_mut();
        meta.root = child;
        meta.height = meta.height.saturating_sub(1).max(1);
        tracing::trace!(root = child, height = meta.height, "tree shrank");
        Ok(())
    }

    /// Remove every record, releasing all nodes except the root, which
    /// becomes an empty leaf.
    pub fn clear(&mut self) -> Result<(), TreeError> {
        let meta = self.access.tree_meta()?;
        let mut released = 0usize;
        let mut level = vec![meta.root];
        for _ in 1..meta.height {
            let mut next_level = Vec::new();
            for block_id in level {
                let node = self.read_internal(block_id)?;
                next_level.extend_from_slice(&node.children);
            }
            for &block_id in &next_level {
                self.access.release_block(block_id);
                released += 1;
            }
            level = next_level;
        }

        self.write_leaf(meta.root, &LeafNode::new());
        let meta = self.access.tree_meta_mut();
        meta.height = 1;
        meta.record_count = 0;
        tracing::debug!(released, "tree cleared");
        Ok(())
    }
}

/// Leaf position recorded during a check, for the sibling-chain pass.
struct LeafLinks {
    block_id: BlockId,
    prev: BlockId,
    next: BlockId,
}

struct Checker<'t, 'a, A> {
    tree: &'t BPlusTree<'a, A>,
    height: u32,
    visited: HashSet<BlockId>,
    leaves: Vec<LeafLinks>,
    records: u64,
}

impl<A: BlockAccess> Checker<'_, '_, A> {
    fn run(&mut self, meta: &TreeMeta) -> Result<(), TreeError> {
        if self.height == 0 {
            return fail(format!("height is 0 (root {})", meta.root));
        }
        self.node(meta.root, 0, None, None)?;

        if let Some(first) = self.leaves.first().filter(|leaf| leaf.prev != NO_BLOCK) {
            return fail(format!("first leaf {} has prev {}", first.block_id, first.prev));
        }
        if let Some(last) = self.leaves.last().filter(|leaf| leaf.next != NO_BLOCK) {
            return fail(format!("last leaf {} has next {}", last.block_id, last.next));
        }
        for pair in self.leaves.windows(2) {
            let (left, right) = (&pair[0], &pair[1]);
            if left.next != right.block_id || right.prev != left.block_id {
                return fail(format!(
                    "leaves {} and {} are not linked to each other",
                    left.block_id, right.block_id
                ));
            }
        }

        if self.records != meta.record_count {
            return fail(format!(
                "found {} records, metadata says {}",
                self.records, meta.record_count
            ));
        }
        Ok(())
    }

    fn node(
        &mut self,
        block_id: BlockId,
        depth: u32,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
    ) -> Result<(), TreeError> {
        if block_id == META_BLOCK || !self.visited.insert(block_id) {
            return fail(format!("block {block_id} reached twice or is reserved"));
        }
        let layout = self.tree.layout;
        let is_root = depth == 0;
        let block = self.tree.access.read_block(block_id)?;

        match layout.decode(block_id, &block)? {
            Node::Leaf(leaf) => {
                if depth + 1 != self.height {
                    return fail(format!(
                        "leaf {block_id} at depth {depth}, tree height {}",
                        self.height
                    ));
                }
                let keys: Vec<&[u8]> = leaf.records.iter().map(Record::key).collect();
                check_keys(block_id, &keys, lower, upper)?;
                check_occupancy(block_id, keys.len(), is_root, layout, 0)?;
                self.records += keys.len() as u64;
                self.leaves.push(LeafLinks {
                    block_id,
                    prev: leaf.prev,
                    next: leaf.next,
                });
            }
            Node::Internal(node) => {
                if depth + 1 >= self.height {
                    return fail(format!(
                        "internal node {block_id} at depth {depth}, tree height {}",
                        self.height
                    ));
                }
                let keys: Vec<&[u8]> = node.keys.iter().map(Vec::as_slice).collect();
                check_keys(block_id, &keys, lower, upper)?;
                check_occupancy(block_id, keys.len(), is_root, layout, 1)?;
                for (i, &child) in node.children.iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { Some(keys[i - 1]) };
                    let child_upper = keys.get(i).copied().or(upper);
                    self.node(child, depth + 1, child_lower, child_upper)?;
                }
            }
        }
        Ok(())
    }
}

fn fail(reason: String) -> Result<(), TreeError> {
    Err(TreeError::CheckFailed(reason))
}

/// Keys strictly increasing and within `[lower, upper)`.
fn check_keys(
    block_id: BlockId,
    keys: &[&[u8]],
    lower: Option<&[u8]>,
    upper: Option<&[u8]>,
) -> Result<(), TreeError> {
    for pair in keys.windows(2) {
        if compare_keys(pair[0], pair[1]).is_ge() {
            return fail(format!("block {block_id}: keys out of order"));
        }
    }
    if let (Some(lower), Some(first)) = (lower, keys.first()) {
        if compare_keys(first, lower).is_lt() {
            return fail(format!("block {block_id}: key below separator"));
        }
    }
    if let (Some(upper), Some(last)) = (upper, keys.last()) {
        if compare_keys(last, upper).is_ge() {
            return fail(format!("block {block_id}: key not below separator"));
        }
    }
    Ok(())
}

fn check_occupancy(
    block_id: BlockId,
    count: usize,
    is_root: bool,
    layout: &NodeLayout,
    root_min: usize,
) -> Result<(), TreeError> {
    let min = if is_root { root_min } else { layout.min_records() };
    if count < min || count > layout.max_records() {
        return fail(format!(
            "block {block_id}: {count} entries outside {min}..={}",
            layout.max_records()
        ));
    }
    Ok(())
}

/// Errors that can occur during B+Tree operations.
#[derive(Debug)]
pub enum TreeError {
    /// Order below 2, or too large for the block size.
    InvalidOrder { order: usize, max_order: usize },
    /// Block size or record shape cannot hold a tree.
    InvalidLayout(String),
    /// A node block failed to decode.
    CorruptNode(NodeError),
    /// Structural validation failed.
    CheckFailed(String),
    Storage(StorageError),
    Record(RecordError),
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidOrder { order, max_order } => {
                write!(f, "invalid order {order}: must be between 2 and {max_order}")
            }
            Self::InvalidLayout(msg) => write!(f, "invalid layout: {msg}"),
            Self::CorruptNode(e) => write!(f, "corrupt node: {e}"),
            Self::CheckFailed(msg) => write!(f, "tree check failed: {msg}"),
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Record(e) => write!(f, "record error: {e}"),
        }
    }
}

impl std::error::Error for TreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CorruptNode(e) => Some(e),
            Self::Storage(e) => Some(e),
            Self::Record(e) => Some(e),
            Self::InvalidOrder { .. } | Self::InvalidLayout(_) | Self::CheckFailed(_) => None,
        }
    }
}

impl From<NodeError> for TreeError {
    fn from(e: NodeError) -> Self {
        Self::CorruptNode(e)
    }
}

impl From<StorageError> for TreeError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<RecordError> for TreeError {
    fn from(e: RecordError) -> Self {
        Self::Record(e)
    }
}
