//! Tree metadata block.
//!
//! Block 0 of every index file records the shape of the tree and where it
//! lives. It is only rewritten as part of a committed transaction, so the
//! copy on disk always describes a consistent tree.

// Block sizes, lengths, order and height are validated to fit in u32.
#![allow(clippy::cast_possible_truncation)]

use crate::storage::block::{Block, BlockHeader, BlockId, BlockType, META_BLOCK};

/// Magic number identifying an index file: "DBOEBPT+"
pub const MAGIC: [u8; 8] = *b"DBOEBPT+";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Metadata field offsets (after the block header).
mod offsets {
    use super::BlockHeader;

    pub const MAGIC: usize = BlockHeader::SIZE;
    pub const FORMAT_VERSION: usize = MAGIC + 8;
    pub const BLOCK_SIZE: usize = FORMAT_VERSION + 4;
    pub const KEY_LENGTH: usize = BLOCK_SIZE + 4;
    pub const VALUE_LENGTH: usize = KEY_LENGTH + 4;
    pub const ORDER: usize = VALUE_LENGTH + 4;
    pub const HEIGHT: usize = ORDER + 4;
    pub const ROOT: usize = HEIGHT + 4;
    pub const RECORD_COUNT: usize = ROOT + 8;
    pub const FREE_LIST_HEAD: usize = RECORD_COUNT + 8;
    pub const BLOCK_COUNT: usize = FREE_LIST_HEAD + 8;
}

/// Tree metadata as stored in block 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeMeta {
    pub block_size: usize,
    pub key_length: usize,
    pub value_length: usize,
    /// Tree order: non-root nodes hold between `order - 1` and `2 * order - 1` keys.
    pub order: usize,
    /// Number of levels; 1 means the root is a leaf.
    pub height: u32,
    pub root: BlockId,
    pub record_count: u64,
    /// First block on the free list, or `NO_BLOCK`.
    pub free_list_head: BlockId,
    /// Blocks in use or on the free list (block 0 included).
    pub block_count: u64,
}

impl TreeMeta {
    /// Metadata for a freshly formatted tree whose empty root leaf is block 1.
    #[must_use]
    pub const fn fresh(block_size: usize, key_length: usize, value_length: usize, order: usize) -> Self {
        Self {
            block_size,
            key_length,
            value_length,
            order,
            height: 1,
            root: META_BLOCK + 1,
            record_count: 0,
            free_list_head: 0,
            block_count: 2,
        }
    }

    /// Serialize into a sealed block of `block_size` bytes.
    #[must_use]
    pub fn to_block(&self) -> Block {
        let mut block = Block::new(self.block_size);
        block.write_header(BlockType::Meta);
        block.write_bytes(offsets::MAGIC, &MAGIC);
        block.write_u32(offsets::FORMAT_VERSION, FORMAT_VERSION);
        block.write_u32(offsets::BLOCK_SIZE, self.block_size as u32);
        block.write_u32(offsets::KEY_LENGTH, self.key_length as u32);
        block.write_u32(offsets::VALUE_LENGTH, self.value_length as u32);
        block.write_u32(offsets::ORDER, self.order as u32);
        block.write_u32(offsets::HEIGHT, self.height);
        block.write_u64(offsets::ROOT, self.root);
        block.write_u64(offsets::RECORD_COUNT, self.record_count);
        block.write_u64(offsets::FREE_LIST_HEAD, self.free_list_head);
        block.write_u64(offsets::BLOCK_COUNT, self.block_count);
        block.seal();
        block
    }

    /// Deserialize metadata from block 0.
    pub fn from_block(block: &Block) -> Result<Self, MetaError> {
        if block.len() < offsets::BLOCK_COUNT + 8 {
            return Err(MetaError::Truncated(block.len()));
        }
        if let Err((expected, actual)) = block.verify_checksum() {
            return Err(MetaError::ChecksumMismatch { expected, actual });
        }
        match BlockHeader::from_block(block) {
            Ok(header) if header.block_type == BlockType::Meta => {}
            Ok(header) => return Err(MetaError::WrongBlockType(header.block_type as u8)),
            Err(byte) => return Err(MetaError::WrongBlockType(byte)),
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(block.read_bytes(offsets::MAGIC, 8));
        if magic != MAGIC {
            return Err(MetaError::InvalidMagic(magic));
        }

        let format_version = block.read_u32(offsets::FORMAT_VERSION);
        if format_version != FORMAT_VERSION {
            return Err(MetaError::UnsupportedVersion(format_version));
        }

        let block_size = block.read_u32(offsets::BLOCK_SIZE) as usize;
        if block_size != block.len() {
            return Err(MetaError::Mismatch {
                field: "block_size",
                stored: block_size as u64,
                expected: block.len() as u64,
            });
        }

        Ok(Self {
            block_size,
            key_length: block.read_u32(offsets::KEY_LENGTH) as usize,
            value_length: block.read_u32(offsets::VALUE_LENGTH) as usize,
            order: block.read_u32(offsets::ORDER) as usize,
            height: block.read_u32(offsets::HEIGHT),
            root: block.read_u64(offsets::ROOT),
            record_count: block.read_u64(offsets::RECORD_COUNT),
            free_list_head: block.read_u64(offsets::FREE_LIST_HEAD),
            block_count: block.read_u64(offsets::BLOCK_COUNT),
        })
    }

    /// Check that a stored tree has the shape an index was configured with.
    pub fn validate(
        &self,
        key_length: usize,
        value_length: usize,
        order: usize,
    ) -> Result<(), MetaError> {
        let checks = [
            ("key_length", self.key_length, key_length),
            ("value_length", self.value_length, value_length),
            ("order", self.order, order),
        ];
        for (field, stored, expected) in checks {
            if stored != expected {
                return Err(MetaError::Mismatch {
                    field,
                    stored: stored as u64,
                    expected: expected as u64,
                });
            }
        }
        if self.height == 0 || self.root == META_BLOCK || self.root >= self.block_count {
            return Err(MetaError::InvalidRoot {
                root: self.root,
                height: self.height,
            });
        }
        Ok(())
    }
}

/// Errors that can occur when reading tree metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaError {
    /// Block too small to hold the metadata.
    Truncated(usize),
    /// Stored checksum does not match the contents.
    ChecksumMismatch { expected: u32, actual: u32 },
    /// Block 0 is not a metadata block.
    WrongBlockType(u8),
    /// Invalid magic number.
    InvalidMagic([u8; 8]),
    /// Unsupported format version.
    UnsupportedVersion(u32),
    /// The stored tree was created with different parameters.
    Mismatch {
        field: &'static str,
        stored: u64,
        expected: u64,
    },
    /// Root pointer or height is impossible.
    InvalidRoot { root: BlockId, height: u32 },
}

impl std::fmt::Display for MetaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated(len) => write!(f, "metadata block truncated: {len} bytes"),
            Self::ChecksumMismatch { expected, actual } => write!(
                f,
                "metadata checksum mismatch: expected 0x{expected:08x}, got 0x{actual:08x}"
            ),
            Self::WrongBlockType(t) => write!(f, "block 0 is not a metadata block (type 0x{t:02x})"),
            Self::InvalidMagic(magic) => {
                write!(
                    f,
                    "invalid magic number: {:?}",
                    String::from_utf8_lossy(magic)
                )
            }
            Self::UnsupportedVersion(v) => write!(f, "unsupported format version: {v}"),
            Self::Mismatch {
                field,
                stored,
                expected,
            } => write!(
                f,
                "index {field} is {stored} on disk but {expected} was configured"
            ),
            Self::InvalidRoot { root, height } => {
                write!(f, "invalid root block {root} at height {height}")
            }
        }
    }
}

impl std::error::Error for MetaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_roundtrip() {
        let mut meta = TreeMeta::fresh(512, 8, 4, 3);
        meta.height = 3;
        meta.root = 17;
        meta.record_count = 1234;
        meta.free_list_head = 9;
        meta.block_count = 40;

        let block = meta.to_block();
        assert_eq!(block.len(), 512);
        let restored = TreeMeta::from_block(&block).expect("should parse");
        assert_eq!(restored, meta);
        assert!(restored.validate(8, 4, 3).is_ok());
    }

    #[test]
    fn test_meta_invalid_magic() {
        let mut block = TreeMeta::fresh(256, 8, 0, 2).to_block();
        block.write_bytes(offsets::MAGIC, b"BADMAGIC");
        block.seal();

        let result = TreeMeta::from_block(&block);
        assert!(matches!(result, Err(MetaError::InvalidMagic(_))));
    }

    #[test]
    fn test_meta_detects_corruption() {
        let mut block = TreeMeta::fresh(256, 8, 0, 2).to_block();
        block.write_u64(offsets::RECORD_COUNT, 99);

        let result = TreeMeta::from_block(&block);
        assert!(matches!(result, Err(MetaError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_meta_zero_block_is_rejected() {
        let block = Block::new(256);
        assert!(TreeMeta::from_block(&block).is_err());
    }

    #[test]
    fn test_validate_reports_mismatch() {
        let meta = TreeMeta::fresh(256, 8, 0, 2);
        assert_eq!(
            meta.validate(16, 0, 2),
            Err(MetaError::Mismatch {
                field: "key_length",
                stored: 8,
                expected: 16
            })
        );
    }
}
