//! In-memory block store.
//!
//! Used for in-memory datasets and for tests. Every operation passes through
//! a [`FaultInjector`] so failure paths can be exercised deterministically.

use std::sync::{Arc, Mutex};

use crate::storage::block::{Block, BlockId};
use crate::storage::fault::{FaultInjector, FaultPoint};
use crate::storage::io::{BlockStore, StorageError, check_block_size};

/// Block store kept entirely in memory.
///
/// Clones share the same blocks, so a test can drop the index that owns one
/// handle and open a new index over another, as after a crash.
#[derive(Clone)]
pub struct MemoryStore {
    blocks: Arc<Mutex<Vec<Block>>>,
    block_size: usize,
    faults: FaultInjector,
}

impl MemoryStore {
    /// Create an empty store that never injects faults.
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        Self::with_faults(block_size, FaultInjector::disabled())
    }

    /// Create an empty store guarded by `faults`.
    #[must_use]
    pub fn with_faults(block_size: usize, faults: FaultInjector) -> Self {
        Self {
            blocks: Arc::new(Mutex::new(Vec::new())),
            block_size,
            faults,
        }
    }

    /// A second handle on the same blocks.
    #[must_use]
    #[allow(clippy::disallowed_methods)] // Arc::clone is required for shared ownership
    pub fn reopen(&self) -> Self {
        Self {
            blocks: Arc::clone(&self.blocks),
            block_size: self.block_size,
            faults: self.faults.clone(),
        }
    }

    fn inject(&self, point: FaultPoint, what: &str) -> Result<(), StorageError> {
        match self.faults.check(point, what) {
            Some(msg) => Err(StorageError::InjectedFault(msg)),
            None => Ok(()),
        }
    }
}

impl BlockStore for MemoryStore {
    fn block_size(&self) -> usize {
        self.block_size
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn block_count(&self) -> u64 {
        self.blocks.lock().expect("lock poisoned").len() as u64
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn read_block(&mut self, block_id: BlockId) -> Result<Block, StorageError> {
        let block = {
            let blocks = self.blocks.lock().expect("lock poisoned");
            usize::try_from(block_id)
                .ok()
                .and_then(|idx| blocks.get(idx))
                .cloned()
                .ok_or(StorageError::BlockOutOfBounds {
                    block_id,
                    block_count: blocks.len() as u64,
                })?
        };
        self.inject(FaultPoint::Read, &format!("block {block_id}"))?;
        Ok(block)
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn write_block(&mut self, block_id: BlockId, block: &Block) -> Result<(), StorageError> {
        check_block_size(self.block_size, block)?;
        self.inject(FaultPoint::Write, &format!("block {block_id}"))?;

        let mut blocks = self.blocks.lock().expect("lock poisoned");
        let idx = usize::try_from(block_id).map_err(|_| StorageError::OutOfSpace {
            block_count: blocks.len() as u64,
        })?;
        if idx >= blocks.len() {
            blocks.resize(idx + 1, Block::new(self.block_size));
        }
        blocks[idx] = block.clone();
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.inject(FaultPoint::Sync, "memory store")
    }
}
