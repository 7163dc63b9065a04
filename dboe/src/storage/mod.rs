//! Block storage layer.
//!
//! Each index lives in its own store of fixed-size blocks:
//!
//! - Block 0: tree metadata (root, height, record count, free list head)
//! - Remaining blocks: B+Tree nodes and free-list entries
//!
//! # Usage
//!
//! ```ignore
//! use dboe::storage::{BlockManager, FileStore, Overlay};
//!
//! let store = FileStore::open(path, 8192)?;
//! let manager = Arc::new(BlockManager::new(Box::new(store), 1024, None));
//!
//! // A write transaction works in a private overlay...
//! let mut overlay = Overlay::begin(Arc::clone(&manager))?;
//! let block_id = overlay.allocate()?;
//! overlay.get_write(block_id)?.write_bytes(16, b"hello");
//!
//! // ...and publishes it at commit.
//! manager.apply(&overlay.prepare())?;
//! ```

pub mod btree;

mod block;
mod fault;
mod file;
mod io;
mod manager;
mod memory;
mod meta;
mod overlay;

pub use block::{
    Block, BlockHeader, BlockId, BlockType, DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE, META_BLOCK,
    MIN_BLOCK_SIZE, NO_BLOCK,
};
pub use fault::{FaultConfig, FaultInjector, FaultPoint, FaultStats};
pub use file::FileStore;
pub use io::{BlockStore, StorageError};
pub use manager::{BlockManager, CacheStats, ReadView};
pub use memory::MemoryStore;
pub use meta::{MetaError, TreeMeta};
pub use overlay::Overlay;
