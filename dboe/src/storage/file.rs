//! Block file I/O.
//!
//! One index is stored in one file of fixed-size blocks. Block `n` lives at
//! byte offset `n * block_size`.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::block::{Block, BlockId};
use crate::storage::io::{BlockStore, StorageError, check_block_size};

/// A block file handle.
pub struct FileStore {
    file: File,
    path: PathBuf,
    block_size: usize,
    block_count: u64,
}

impl FileStore {
    /// Open the block file at `path`, creating an empty one if it does not exist.
    pub fn open(path: &Path, block_size: usize) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();
        let block_size_u64 = block_size as u64;
        let remainder = len % block_size_u64;
        if remainder != 0 {
            // A torn extension; the journal replays the block if it was committed.
            tracing::warn!(
                "block file {} has {remainder} trailing bytes past the last whole block",
                path.display()
            );
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            block_size,
            block_count: len / block_size_u64,
        })
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    const fn offset_of(&self, block_id: BlockId) -> u64 {
        block_id * self.block_size as u64
    }

    fn read_once(&mut self, block_id: BlockId, block: &mut Block) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(self.offset_of(block_id)))?;
        self.file.read_exact(block.as_bytes_mut())
    }
}

impl BlockStore for FileStore {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn read_block(&mut self, block_id: BlockId) -> Result<Block, StorageError> {
        if block_id >= self.block_count {
            return Err(StorageError::BlockOutOfBounds {
                block_id,
                block_count: self.block_count,
            });
        }

        let mut block = Block::new(self.block_size);
        match self.read_once(block_id, &mut block) {
            Ok(()) => Ok(block),
            Err(e) if matches!(e.kind(), ErrorKind::UnexpectedEof | ErrorKind::Interrupted) => {
                tracing::warn!("short read of block {block_id}, retrying: {e}");
                self.read_once(block_id, &mut block)?;
                Ok(block)
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn write_block(&mut self, block_id: BlockId, block: &Block) -> Result<(), StorageError> {
        check_block_size(self.block_size, block)?;

        self.file.seek(SeekFrom::Start(self.offset_of(block_id)))?;
        self.file.write_all(block.as_bytes())?;

        if block_id >= self.block_count {
            self.block_count = block_id + 1;
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.file.sync_data()?;
        Ok(())
    }
}
