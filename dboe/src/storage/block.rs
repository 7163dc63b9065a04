//! Block types and constants for the storage layer.
//!
//! Blocks are fixed-size byte buffers and the unit of I/O, caching and
//! journaling. The size is chosen per index when it is created and recorded
//! in the metadata block.

/// Default block size in bytes (8KB).
pub const DEFAULT_BLOCK_SIZE: usize = 8192;

/// Smallest block size an index may be created with.
pub const MIN_BLOCK_SIZE: usize = 256;

/// Largest block size an index may be created with.
pub const MAX_BLOCK_SIZE: usize = 1 << 20;

/// A block identifier (0-indexed block number within one store).
pub type BlockId = u64;

/// Block 0 holds the tree metadata; as a link target it means "no block".
pub const META_BLOCK: BlockId = 0;

/// Link value used for "no sibling" and "end of free list".
pub const NO_BLOCK: BlockId = 0;

/// Block type identifiers stored in block headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockType {
    /// Tree metadata (block 0 only)
    Meta = 0x01,
    /// B+Tree internal node
    Internal = 0x02,
    /// B+Tree leaf node
    Leaf = 0x03,
    /// Free block (on the free list)
    Free = 0x04,
}

impl TryFrom<u8> for BlockType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Meta),
            0x02 => Ok(Self::Internal),
            0x03 => Ok(Self::Leaf),
            0x04 => Ok(Self::Free),
            _ => Err(value),
        }
    }
}

/// Common header present at the start of every block.
///
/// Layout:
/// - `block_type`: 1 byte
/// - `flags`: 1 byte
/// - `checksum`: 4 bytes (CRC32)
/// - `reserved`: 2 bytes
///
/// Total: 8 bytes
#[derive(Debug, Copy, Clone)]
pub struct BlockHeader {
    pub block_type: BlockType,
    pub flags: u8,
    pub checksum: u32,
}

impl BlockHeader {
    /// Size of the block header in bytes.
    pub const SIZE: usize = 8;

    /// Serialize the header to bytes.
    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.block_type as u8;
        buf[1] = self.flags;
        buf[2..6].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Deserialize a header from the front of a block.
    pub fn from_block(block: &Block) -> Result<Self, u8> {
        let block_type = BlockType::try_from(block.read_u8(0))?;
        Ok(Self {
            block_type,
            flags: block.read_u8(1),
            checksum: block.read_u32(2),
        })
    }
}

/// A raw block buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    data: Box<[u8]>,
}

impl Block {
    /// Create a new zeroed block.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
        }
    }

    /// Create a block from raw bytes.
    #[must_use]
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            data: bytes.into_boxed_slice(),
        }
    }

    /// Block length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the raw block data.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get mutable access to the raw block data.
    pub const fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Read bytes at a specific offset.
    #[must_use]
    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    /// Write bytes at a specific offset.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    #[must_use]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    pub fn write_u8(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    /// Read a u16 (little-endian) at the given offset.
    #[must_use]
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }

    /// Write a u16 (little-endian) at the given offset.
    pub fn write_u16(&mut self, offset: usize, value: u16) {
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Read a u32 (little-endian) at the given offset.
    #[must_use]
    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.data[offset..offset + 4]);
        u32::from_le_bytes(buf)
    }

    /// Write a u32 (little-endian) at the given offset.
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Read a u64 (little-endian) at the given offset.
    #[must_use]
    pub fn read_u64(&self, offset: usize) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.data[offset..offset + 8]);
        u64::from_le_bytes(buf)
    }

    /// Write a u64 (little-endian) at the given offset.
    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Write a header with a zero checksum; call `seal` once the body is final.
    pub fn write_header(&mut self, block_type: BlockType) {
        let header = BlockHeader {
            block_type,
            flags: 0,
            checksum: 0,
        };
        self.write_bytes(0, &header.to_bytes());
    }

    /// Compute CRC32 checksum of the block, skipping the checksum field (bytes 2-5).
    #[must_use]
    pub fn compute_checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.data[0..2]);
        hasher.update(&[0u8; 4]);
        hasher.update(&self.data[6..]);
        hasher.finalize()
    }

    /// Store the checksum of the current contents in the header.
    pub fn seal(&mut self) {
        let checksum = self.compute_checksum();
        self.write_u32(2, checksum);
    }

    /// Check the stored checksum against the contents.
    pub fn verify_checksum(&self) -> Result<(), (u32, u32)> {
        let stored = self.read_u32(2);
        let actual = self.compute_checksum();
        if stored == actual {
            Ok(())
        } else {
            Err((stored, actual))
        }
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("len", &self.data.len())
            .field("first_16_bytes", &&self.data[..self.data.len().min(16)])
            .finish_non_exhaustive()
    }
}

/// Offset of the next-pointer in a free block.
pub const FREE_NEXT_OFFSET: usize = BlockHeader::SIZE;

/// Format `block` as a free-list entry pointing at `next`.
pub fn write_free_block(block: &mut Block, next: BlockId) {
    block.as_bytes_mut().fill(0);
    block.write_header(BlockType::Free);
    block.write_u64(FREE_NEXT_OFFSET, next);
    block.seal();
}
