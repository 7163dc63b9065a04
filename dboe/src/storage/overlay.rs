//! Copy-on-write overlay for one write transaction.
//!
//! The overlay maps block ids to the transaction's private block images and
//! falls through to the committed store for everything else. Nothing reaches
//! the [`BlockManager`] until the transaction commits, so dirty blocks cannot
//! be evicted or seen by readers before they are journaled.
//!
//! Allocation pops the committed free list or extends the file. Releases are
//! deferred: freed blocks are linked into the free list only in [`Overlay::prepare`],
//! so the free-list change is journaled with the rest of the transaction and an
//! abort leaves the list untouched.

use std::collections::HashMap;
use std::sync::Arc;

use crate::storage::block::{
    Block, BlockHeader, BlockId, BlockType, FREE_NEXT_OFFSET, META_BLOCK, NO_BLOCK,
    write_free_block,
};
use crate::storage::io::StorageError;
use crate::storage::manager::BlockManager;
use crate::storage::meta::TreeMeta;

/// A write transaction's private block images and working metadata.
pub struct Overlay {
    manager: Arc<BlockManager>,
    blocks: HashMap<BlockId, Arc<Block>>,
    meta: TreeMeta,
    base_meta: TreeMeta,
    pending_free: Vec<BlockId>,
    /// Bumped on every mutation; lets iterators detect concurrent changes.
    changes: u64,
}

impl Overlay {
    /// Start an overlay on top of the latest committed state.
    pub fn begin(manager: Arc<BlockManager>) -> Result<Self, StorageError> {
        let meta = manager.current_meta()?;
        Ok(Self {
            manager,
            blocks: HashMap::new(),
            meta,
            base_meta: meta,
            pending_free: Vec::new(),
            changes: 0,
        })
    }

    #[must_use]
    pub const fn meta(&self) -> &TreeMeta {
        &self.meta
    }

    pub const fn meta_mut(&mut self) -> &mut TreeMeta {
        self.changes += 1;
        &mut self.meta
    }

    /// Number of mutations made through this overlay so far.
    #[must_use]
    pub const fn changes(&self) -> u64 {
        self.changes
    }

    /// True once anything has been written, allocated or released.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.blocks.is_empty() || !self.pending_free.is_empty() || self.meta != self.base_meta
    }

    /// Number of blocks held privately.
    #[must_use]
    pub fn dirty_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Read a block, preferring this transaction's copy.
    #[allow(clippy::disallowed_methods)] // Arc::clone is required for shared ownership
    pub fn get_read(&self, block_id: BlockId) -> Result<Arc<Block>, StorageError> {
        match self.blocks.get(&block_id) {
            Some(block) => Ok(Arc::clone(block)),
            None => self.manager.read_current(block_id),
        }
    }

    /// Mutable access to a block, copying the committed image into the overlay first.
    pub fn get_write(&mut self, block_id: BlockId) -> Result<&mut Block, StorageError> {
        self.changes += 1;
        if !self.blocks.contains_key(&block_id) {
            let committed = self.manager.read_current(block_id)?;
            self.blocks.insert(block_id, committed);
        }
        let entry = self
            .blocks
            .get_mut(&block_id)
            .ok_or_else(|| StorageError::Corruption(format!("overlay lost block {block_id}")))?;
        Ok(Arc::make_mut(entry))
    }

    /// Replace a block's contents in the overlay.
    pub fn put(&mut self, block_id: BlockId, block: Block) {
        self.changes += 1;
        self.blocks.insert(block_id, Arc::new(block));
    }

    /// Allocate a zero-filled block.
    pub fn allocate(&mut self) -> Result<BlockId, StorageError> {
        let block_id = if self.meta.free_list_head == NO_BLOCK {
            let block_id = self.meta.block_count;
            let limit = self.manager.max_blocks().unwrap_or(u64::MAX);
            if block_id >= limit {
                return Err(StorageError::OutOfSpace {
                    block_count: block_id,
                });
            }
            self.meta.block_count = block_id + 1;
            block_id
        } else {
            let block_id = self.meta.free_list_head;
            let free = self.get_read(block_id)?;
            match BlockHeader::from_block(&free) {
                Ok(header) if header.block_type == BlockType::Free => {}
                _ => {
                    return Err(StorageError::Corruption(format!(
                        "free list head {block_id} is not a free block"
                    )));
                }
            }
            self.meta.free_list_head = free.read_u64(FREE_NEXT_OFFSET);
            block_id
        };

        self.put(block_id, Block::new(self.manager.block_size()));
        Ok(block_id)
    }

    /// Release a block; it joins the free list when the transaction prepares.
    pub fn release(&mut self, block_id: BlockId) {
        debug_assert_ne!(block_id, META_BLOCK, "the metadata block is never released");
        self.changes += 1;
        self.pending_free.push(block_id);
    }

    /// Finish the transaction's changes and return every block to journal.
    ///
    /// Links released blocks into the free list and writes the metadata block.
    /// Returns nothing if the transaction changed nothing.
    #[must_use]
    pub fn prepare(&mut self) -> Vec<(BlockId, Block)> {
        if !self.is_dirty() {
            return Vec::new();
        }

        let block_size = self.manager.block_size();
        for block_id in std::mem::take(&mut self.pending_free) {
            let mut free = Block::new(block_size);
            write_free_block(&mut free, self.meta.free_list_head);
            self.meta.free_list_head = block_id;
            self.put(block_id, free);
        }
        let meta_block = self.meta.to_block();
        self.put(META_BLOCK, meta_block);

        let mut blocks: Vec<(BlockId, Block)> = self
            .blocks
            .iter()
            .map(|(id, block)| (*id, Block::clone(block)))
            .collect();
        blocks.sort_by_key(|(id, _)| *id);
        blocks
    }
}
