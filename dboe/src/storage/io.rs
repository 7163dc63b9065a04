//! Block store abstraction.
//!
//! This module provides a `BlockStore` trait over fixed-size block I/O so an
//! index can run on a real file in production and on an in-memory store (with
//! fault injection) in tests.
//!
//! # Implementation Notes
//!
//! Implementations must ensure:
//! - `read_block` returns the last written content for a block
//! - `write_block` at `block_count()` extends the store by one block
//! - `sync` makes all previous writes durable

use crate::storage::block::{Block, BlockId};
use crate::storage::meta::MetaError;

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error.
    Io(std::io::Error),
    /// Block out of bounds.
    BlockOutOfBounds { block_id: BlockId, block_count: u64 },
    /// A block buffer had the wrong size for this store.
    BlockSizeMismatch { expected: usize, actual: usize },
    /// No block can be allocated.
    OutOfSpace { block_count: u64 },
    /// Injected fault for simulation.
    InjectedFault(String),
    /// Corruption detected.
    Corruption(String),
    /// Metadata block could not be read.
    Meta(MetaError),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::BlockOutOfBounds {
                block_id,
                block_count,
            } => write!(
                f,
                "block {block_id} out of bounds (block count: {block_count})"
            ),
            Self::BlockSizeMismatch { expected, actual } => {
                write!(f, "block size mismatch: expected {expected}, got {actual}")
            }
            Self::OutOfSpace { block_count } => {
                write!(f, "out of space: cannot allocate beyond {block_count} blocks")
            }
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
            Self::Corruption(msg) => write!(f, "corruption: {msg}"),
            Self::Meta(e) => write!(f, "metadata error: {e}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Meta(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<MetaError> for StorageError {
    fn from(e: MetaError) -> Self {
        Self::Meta(e)
    }
}

/// Abstraction over block-based storage operations.
pub trait BlockStore: Send {
    /// Size of every block in this store.
    fn block_size(&self) -> usize;

    /// Number of blocks currently in the store.
    fn block_count(&self) -> u64;

    /// Read a block from storage.
    fn read_block(&mut self, block_id: BlockId) -> Result<Block, StorageError>;

    /// Write a block to storage.
    ///
    /// Writing past the end extends the store; any gap is zero-filled.
    /// The write may be buffered until `sync` is called.
    fn write_block(&mut self, block_id: BlockId, block: &Block) -> Result<(), StorageError>;

    /// Sync all pending writes to durable storage.
    fn sync(&mut self) -> Result<(), StorageError>;
}

/// Reject buffers that do not match the store's block size.
pub(crate) const fn check_block_size(expected: usize, block: &Block) -> Result<(), StorageError> {
    if block.len() == expected {
        Ok(())
    } else {
        Err(StorageError::BlockSizeMismatch {
            expected,
            actual: block.len(),
        })
    }
}
