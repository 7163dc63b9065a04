//! Block manager: committed block images, the block cache, and reader snapshots.
//!
//! The manager owns one block store. It only ever holds committed data; a
//! write transaction keeps its changes in an [`Overlay`] and hands the
//! finished images to [`BlockManager::apply`] at commit.
//!
//! # Snapshots
//!
//! Every commit advances a version counter. A reader registers at the current
//! version and reads through [`ReadView`]. When a commit overwrites a block
//! that an older reader may still need, the pre-image is kept in a history map
//! tagged with the version that superseded it. A reader at version `v` uses
//! the earliest retained image superseded after `v`, or the store otherwise.
//! History is pruned as readers finish.
//!
//! # Lock order
//!
//! `history` -> `readers` -> `store` -> `cache`. Readers hold the history
//! read lock across lookup and store read, so a commit is never observed
//! half-applied.
//!
//! [`Overlay`]: crate::storage::Overlay

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use lru::LruCache;

use crate::storage::block::{Block, BlockId, META_BLOCK};
use crate::storage::io::{BlockStore, StorageError};
use crate::storage::meta::TreeMeta;

/// A block image kept alive for readers with older snapshots.
struct RetainedBlock {
    /// Version of the commit that overwrote this image.
    superseded_at: u64,
    block: Arc<Block>,
}

/// Cache counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Shared, committed view of one block store.
pub struct BlockManager {
    store: Mutex<Box<dyn BlockStore>>,
    block_size: usize,
    max_blocks: Option<u64>,
    cache: Mutex<LruCache<BlockId, Arc<Block>>>,
    history: RwLock<HashMap<BlockId, Vec<RetainedBlock>>>,
    /// Active reader snapshots: version -> number of readers.
    readers: Mutex<BTreeMap<u64, usize>>,
    version: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl BlockManager {
    /// Wrap a store with an LRU cache of `cache_blocks` committed blocks.
    #[must_use]
    pub fn new(store: Box<dyn BlockStore>, cache_blocks: usize, max_blocks: Option<u64>) -> Self {
        let block_size = store.block_size();
        let capacity = NonZeroUsize::new(cache_blocks).unwrap_or(NonZeroUsize::MIN);
        Self {
            store: Mutex::new(store),
            block_size,
            max_blocks,
            cache: Mutex::new(LruCache::new(capacity)),
            history: RwLock::new(HashMap::new()),
            readers: Mutex::new(BTreeMap::new()),
            version: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Upper bound on blocks, if the index was configured with one.
    #[must_use]
    pub const fn max_blocks(&self) -> Option<u64> {
        self.max_blocks
    }

    /// Latest committed version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Number of blocks in the backing store.
    #[must_use]
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn store_block_count(&self) -> u64 {
        self.store.lock().expect("lock poisoned").block_count()
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.cache_hits.load(Ordering::Relaxed),
            misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }

    /// Number of retained pre-images across all blocks.
    #[must_use]
    #[allow(clippy::expect_used)] // Lock poisoning indicates unrecoverable state
    pub fn retained_blocks(&self) -> usize {
        self.history
            .read()
            .expect("lock poisoned")
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Write the initial blocks of a new tree straight to the store.
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn format(&self, blocks: &[(BlockId, Block)]) -> Result<(), StorageError> {
        let mut store = self.store.lock().expect("lock poisoned");
        for (block_id, block) in blocks {
            store.write_block(*block_id, block)?;
        }
        store.sync()
    }

    /// Committed image of a block. Caller must hold the history lock.
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    #[allow(clippy::disallowed_methods)] // Arc::clone is required for shared ownership
    fn load(&self, block_id: BlockId) -> Result<Arc<Block>, StorageError> {
        if let Some(block) = self.cache.lock().expect("lock poisoned").get(&block_id) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(block));
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);

        let block = Arc::new(self.store.lock().expect("lock poisoned").read_block(block_id)?);
        self.cache
            .lock()
            .expect("lock poisoned")
            .put(block_id, Arc::clone(&block));
        Ok(block)
    }

    /// Latest committed image of a block.
    #[allow(clippy::expect_used)] // Lock poisoning indicates unrecoverable state
    pub fn read_current(&self, block_id: BlockId) -> Result<Arc<Block>, StorageError> {
        let _history = self.history.read().expect("lock poisoned");
        self.load(block_id)
    }

    /// Image of a block as of committed version `version`.
    #[allow(clippy::expect_used)] // Lock poisoning indicates unrecoverable state
    #[allow(clippy::disallowed_methods)] // Arc::clone is required for shared ownership
    pub fn read_at(&self, block_id: BlockId, version: u64) -> Result<Arc<Block>, StorageError> {
        let history = self.history.read().expect("lock poisoned");
        if let Some(retained) = history
            .get(&block_id)
            .and_then(|entries| entries.iter().find(|e| e.superseded_at > version))
        {
            return Ok(Arc::clone(&retained.block));
        }
        self.load(block_id)
    }

    /// Tree metadata as of the latest commit.
    pub fn current_meta(&self) -> Result<TreeMeta, StorageError> {
        let block = self.read_current(META_BLOCK)?;
        Ok(TreeMeta::from_block(&block)?)
    }

    /// Pin the current version for a new reader.
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn register_reader(&self) -> u64 {
        let mut readers = self.readers.lock().expect("lock poisoned");
        let version = self.version.load(Ordering::Acquire);
        *readers.entry(version).or_insert(0) += 1;
        version
    }

    /// Release a reader's snapshot and drop history no one needs.
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn unregister_reader(&self, version: u64) {
        {
            let mut readers = self.readers.lock().expect("lock poisoned");
            match readers.get_mut(&version) {
                Some(count) if *count > 1 => *count -= 1,
                Some(_) => {
                    readers.remove(&version);
                }
                None => {
                    tracing::warn!("unregistering unknown reader snapshot {version}");
                    return;
                }
            }
        }
        self.prune_history();
    }

    #[allow(clippy::expect_used)] // Lock poisoning indicates unrecoverable state
    fn prune_history(&self) {
        let mut history = self.history.write().expect("lock poisoned");
        let oldest = self
            .readers
            .lock()
            .expect("lock poisoned")
            .keys()
            .next()
            .copied();
        match oldest {
            None => history.clear(),
            Some(oldest) => history.retain(|_, entries| {
                entries.retain(|e| e.superseded_at > oldest);
                !entries.is_empty()
            }),
        }
    }

    /// Publish a committed transaction's blocks and advance the version.
    ///
    /// # Pre-conditions
    ///
    /// - The blocks have been durably journaled.
    ///
    /// # Post-conditions
    ///
    /// - New readers see every block in `blocks`.
    /// - Readers registered before the call keep seeing their snapshot.
    #[allow(clippy::expect_used)] // Lock poisoning indicates unrecoverable state
    pub fn apply(&self, blocks: &[(BlockId, Block)]) -> Result<u64, StorageError> {
        let next = self.version.load(Ordering::Acquire) + 1;

        // Captured unconditionally: readers can still pin the current
        // version until `next` is published below.
        {
            let mut history = self.history.write().expect("lock poisoned");
            let stored = self.store_block_count();
            for (block_id, _) in blocks.iter().filter(|(id, _)| *id < stored) {
                let previous = self.load(*block_id)?;
                history.entry(*block_id).or_default().push(RetainedBlock {
                    superseded_at: next,
                    block: previous,
                });
            }
        }

        for (block_id, block) in blocks {
            self.store
                .lock()
                .expect("lock poisoned")
                .write_block(*block_id, block)?;
            self.cache
                .lock()
                .expect("lock poisoned")
                .put(*block_id, Arc::new(block.clone()));
        }
        self.store.lock().expect("lock poisoned").sync()?;

        {
            let _readers = self.readers.lock().expect("lock poisoned");
            self.version.store(next, Ordering::Release);
        }
        self.prune_history();
        tracing::debug!(
            "applied {} blocks at version {next}, {} retained",
            blocks.len(),
            self.retained_blocks()
        );
        Ok(next)
    }

    /// Write a block image replayed from the journal.
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn recover_block(&self, block_id: BlockId, block: &Block) -> Result<(), StorageError> {
        self.store
            .lock()
            .expect("lock poisoned")
            .write_block(block_id, block)?;
        self.cache.lock().expect("lock poisoned").pop(&block_id);
        Ok(())
    }

    /// Make replayed blocks durable and forget anything cached before replay.
    #[allow(clippy::expect_used)] // Lock poisoning indicates unrecoverable state
    pub fn finish_recovery(&self) -> Result<(), StorageError> {
        self.store.lock().expect("lock poisoned").sync()?;
        self.cache.lock().expect("lock poisoned").clear();
        self.history.write().expect("lock poisoned").clear();
        Ok(())
    }
}

/// A reader's snapshot of one index.
pub struct ReadView {
    manager: Arc<BlockManager>,
    version: u64,
}

impl ReadView {
    #[must_use]
    pub const fn new(manager: Arc<BlockManager>, version: u64) -> Self {
        Self { manager, version }
    }

    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Block image as of this snapshot.
    pub fn read(&self, block_id: BlockId) -> Result<Arc<Block>, StorageError> {
        self.manager.read_at(block_id, self.version)
    }

    /// Tree metadata as of this snapshot.
    pub fn meta(&self) -> Result<TreeMeta, StorageError> {
        let block = self.read(META_BLOCK)?;
        Ok(TreeMeta::from_block(&block)?)
    }
}
