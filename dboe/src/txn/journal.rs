//! Append-only redo journal.
//!
//! A committing write transaction appends one `Redo` entry per changed block
//! (the full new block image) followed by a `Commit` marker, and syncs. Once
//! the blocks have been applied to every index the journal is truncated.
//! Whatever is still in the journal at startup is replayed.
//!
//! # Entry Format
//!
//! ```text
//! +----------+----------------------------------------------+
//! | 0-3      | entry_length (4 bytes, includes header+crc)  |
//! | 4        | entry_type (1 byte)                          |
//! | 5-12     | transaction_id (8 bytes)                     |
//! | 13-20    | lsn (8 bytes)                                |
//! | 21-24    | component_id (4 bytes)                       |
//! | 25-32    | block_id (8 bytes)                           |
//! | 33-N     | payload (block image for Redo, else empty)   |
//! | N-N+3    | CRC32 checksum (4 bytes)                     |
//! +----------+----------------------------------------------+
//! ```
//!
//! All integers are little-endian. A torn or corrupt entry ends the readable
//! journal; everything after it is ignored.

// entry_length fits in u32: payloads are single blocks
#![allow(clippy::cast_possible_truncation)]

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use crate::storage::{BlockId, FaultInjector, FaultPoint};
use crate::txn::{ComponentId, TxnId};

/// Entry header size (before payload).
const ENTRY_HEADER_SIZE: usize = 33;

/// CRC32 checksum size at end of entry.
const CHECKSUM_SIZE: usize = 4;

/// Log sequence number, assigned in append order.
pub type Lsn = u64;

/// Journal entry types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryType {
    /// New image of one block.
    Redo = 0x01,
    /// All of the transaction's redo entries precede this marker.
    Commit = 0x02,
    /// Discard the transaction's redo entries.
    Abort = 0x03,
}

impl TryFrom<u8> for EntryType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Redo),
            0x02 => Ok(Self::Commit),
            0x03 => Ok(Self::Abort),
            _ => Err(value),
        }
    }
}

/// One journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub entry_type: EntryType,
    pub txn_id: TxnId,
    /// Set by [`Journal::append`].
    pub lsn: Lsn,
    pub component_id: ComponentId,
    pub block_id: BlockId,
    pub payload: Vec<u8>,
}

impl JournalEntry {
    #[must_use]
    pub const fn redo(
        txn_id: TxnId,
        component_id: ComponentId,
        block_id: BlockId,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            entry_type: EntryType::Redo,
            txn_id,
            lsn: 0,
            component_id,
            block_id,
            payload,
        }
    }

    #[must_use]
    pub const fn commit(txn_id: TxnId) -> Self {
        Self::marker(EntryType::Commit, txn_id)
    }

    #[must_use]
    pub const fn abort(txn_id: TxnId) -> Self {
        Self::marker(EntryType::Abort, txn_id)
    }

    const fn marker(entry_type: EntryType, txn_id: TxnId) -> Self {
        Self {
            entry_type,
            txn_id,
            lsn: 0,
            component_id: 0,
            block_id: 0,
            payload: Vec::new(),
        }
    }

    #[must_use]
    pub fn serialized_size(&self) -> usize {
        ENTRY_HEADER_SIZE + self.payload.len() + CHECKSUM_SIZE
    }

    /// Serialize this entry to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let total_len = self.serialized_size();
        let mut bytes = Vec::with_capacity(total_len);
        bytes.extend_from_slice(&(total_len as u32).to_le_bytes());
        bytes.push(self.entry_type as u8);
        bytes.extend_from_slice(&self.txn_id.to_le_bytes());
        bytes.extend_from_slice(&self.lsn.to_le_bytes());
        bytes.extend_from_slice(&self.component_id.to_le_bytes());
        bytes.extend_from_slice(&self.block_id.to_le_bytes());
        bytes.extend_from_slice(&self.payload);

        // CRC32 over everything before it
        let checksum = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&checksum.to_le_bytes());
        bytes
    }

    /// Deserialize an entry from the front of `bytes`.
    ///
    /// Returns the entry and the number of bytes consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), JournalError> {
        if bytes.len() < ENTRY_HEADER_SIZE + CHECKSUM_SIZE {
            return Err(JournalError::CorruptEntry);
        }
        let entry_len = read_u32(bytes, 0) as usize;
        if entry_len < ENTRY_HEADER_SIZE + CHECKSUM_SIZE || entry_len > bytes.len() {
            return Err(JournalError::CorruptEntry);
        }

        let body = &bytes[..entry_len - CHECKSUM_SIZE];
        let stored_checksum = read_u32(bytes, entry_len - CHECKSUM_SIZE);
        let computed_checksum = crc32fast::hash(body);
        if stored_checksum != computed_checksum {
            return Err(JournalError::ChecksumMismatch {
                expected: stored_checksum,
                actual: computed_checksum,
            });
        }

        let entry_type = EntryType::try_from(bytes[4]).map_err(JournalError::InvalidEntryType)?;
        Ok((
            Self {
                entry_type,
                txn_id: read_u64(bytes, 5),
                lsn: read_u64(bytes, 13),
                component_id: read_u32(bytes, 21),
                block_id: read_u64(bytes, 25),
                payload: body[ENTRY_HEADER_SIZE..].to_vec(),
            },
            entry_len,
        ))
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

/// Byte storage under a journal.
pub trait JournalStorage: Read + Write + Seek + Send {
    /// Discard all contents and rewind.
    fn truncate(&mut self) -> std::io::Result<()>;

    /// Make written bytes durable.
    fn sync(&mut self) -> std::io::Result<()>;
}

impl JournalStorage for File {
    fn truncate(&mut self) -> std::io::Result<()> {
        self.set_len(0)?;
        self.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    fn sync(&mut self) -> std::io::Result<()> {
        self.sync_data()
    }
}

/// In-memory journal bytes.
///
/// Clones share the same buffer, so a journal can be "reopened" after the
/// handle that wrote it is gone.
#[derive(Debug, Clone)]
pub struct MemoryJournal {
    data: Arc<Mutex<Vec<u8>>>,
    position: u64,
    faults: FaultInjector,
}

impl MemoryJournal {
    #[must_use]
    pub fn new() -> Self {
        Self::with_faults(FaultInjector::disabled())
    }

    #[must_use]
    pub fn with_faults(faults: FaultInjector) -> Self {
        Self {
            data: Arc::new(Mutex::new(Vec::new())),
            position: 0,
            faults,
        }
    }

    /// A second handle on the same bytes, positioned at the start.
    #[must_use]
    #[allow(clippy::disallowed_methods)] // Arc::clone is required for shared ownership
    pub fn reopen(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            position: 0,
            faults: self.faults.clone(),
        }
    }

    /// Current contents, for tests that damage the journal.
    #[must_use]
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().expect("lock poisoned").clone()
    }

    /// Replace the contents.
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn set_contents(&self, bytes: Vec<u8>) {
        *self.data.lock().expect("lock poisoned") = bytes;
    }

    fn inject(&self, point: FaultPoint) -> std::io::Result<()> {
        match self.faults.check(point, "journal") {
            Some(msg) => Err(std::io::Error::other(msg)),
            None => Ok(()),
        }
    }
}

impl Default for MemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for MemoryJournal {
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inject(FaultPoint::Read)?;
        let data = self.data.lock().expect("lock poisoned");
        let start = (self.position as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for MemoryJournal {
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inject(FaultPoint::Write)?;
        let mut data = self.data.lock().expect("lock poisoned");
        let start = self.position as usize;
        if data.len() < start + buf.len() {
            data.resize(start + buf.len(), 0);
        }
        data[start..start + buf.len()].copy_from_slice(buf);
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryJournal {
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let len = self.data.lock().expect("lock poisoned").len() as i64;
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(delta) => len + delta,
            SeekFrom::Current(delta) => self.position as i64 + delta,
        };
        if target < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before start of journal",
            ));
        }
        self.position = target as u64;
        Ok(self.position)
    }
}

impl JournalStorage for MemoryJournal {
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn truncate(&mut self) -> std::io::Result<()> {
        self.inject(FaultPoint::Write)?;
        self.data.lock().expect("lock poisoned").clear();
        self.position = 0;
        Ok(())
    }

    fn sync(&mut self) -> std::io::Result<()> {
        self.inject(FaultPoint::Sync)
    }
}

/// Entries read back from the journal.
#[derive(Debug, Default)]
pub struct JournalScan {
    pub entries: Vec<JournalEntry>,
    /// Bytes after the last valid entry (a torn write).
    pub torn_bytes: u64,
}

/// The redo journal.
pub struct Journal {
    storage: Box<dyn JournalStorage>,
    next_lsn: Lsn,
    sync_on_commit: bool,
    len: u64,
}

impl Journal {
    /// Wrap a storage, positioned for appending after its current contents.
    ///
    /// With `sync_on_commit` off, [`Journal::sync`] does nothing; only for
    /// scratch data that need not survive a crash.
    pub fn open(
        mut storage: Box<dyn JournalStorage>,
        sync_on_commit: bool,
    ) -> Result<Self, JournalError> {
        let len = storage.seek(SeekFrom::End(0))?;
        Ok(Self {
            storage,
            next_lsn: 1,
            sync_on_commit,
            len,
        })
    }

    /// Open a journal file, creating it if missing.
    pub fn open_file(path: &std::path::Path, sync_on_commit: bool) -> Result<Self, JournalError> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Self::open(Box::new(file), sync_on_commit)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes currently in the journal.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Append an entry, assigning its LSN.
    pub fn append(&mut self, entry: &mut JournalEntry) -> Result<Lsn, JournalError> {
        entry.lsn = self.next_lsn;
        let bytes = entry.to_bytes();
        self.storage.seek(SeekFrom::Start(self.len))?;
        self.storage.write_all(&bytes)?;
        self.len += bytes.len() as u64;
        self.next_lsn += 1;
        Ok(entry.lsn)
    }

    /// Force appended entries to stable storage. Never retried.
    pub fn sync(&mut self) -> Result<(), JournalError> {
        if self.sync_on_commit {
            self.storage.flush()?;
            self.storage.sync()?;
        }
        Ok(())
    }

    /// Drop every entry.
    pub fn truncate(&mut self) -> Result<(), JournalError> {
        self.storage.truncate()?;
        self.storage.sync()?;
        self.len = 0;
        Ok(())
    }

    /// Read every valid entry, stopping at the first torn or corrupt one.
    pub fn read_all(&mut self) -> Result<JournalScan, JournalError> {
        self.storage.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        self.storage.read_to_end(&mut bytes)?;
        self.len = bytes.len() as u64;

        let mut scan = JournalScan::default();
        let mut offset = 0;
        while offset < bytes.len() {
            match JournalEntry::from_bytes(&bytes[offset..]) {
                Ok((entry, consumed)) => {
                    self.next_lsn = self.next_lsn.max(entry.lsn + 1);
                    scan.entries.push(entry);
                    offset += consumed;
                }
                Err(e) => {
                    scan.torn_bytes = (bytes.len() - offset) as u64;
                    tracing::warn!(
                        offset,
                        torn_bytes = scan.torn_bytes,
                        "journal ends in an unreadable entry ({e}); ignoring the rest"
                    );
                    break;
                }
            }
        }
        Ok(scan)
    }
}

/// Errors that can occur during journal operations.
#[derive(Debug)]
pub enum JournalError {
    /// I/O error.
    Io(std::io::Error),
    /// Entry too short or with an impossible length.
    CorruptEntry,
    /// Invalid entry type byte.
    InvalidEntryType(u8),
    /// Checksum mismatch.
    ChecksumMismatch { expected: u32, actual: u32 },
}

impl std::fmt::Display for JournalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "journal I/O error: {e}"),
            Self::CorruptEntry => write!(f, "corrupt journal entry"),
            Self::InvalidEntryType(t) => write!(f, "invalid journal entry type: 0x{t:02x}"),
            Self::ChecksumMismatch { expected, actual } => write!(
                f,
                "journal checksum mismatch: expected 0x{expected:08x}, got 0x{actual:08x}"
            ),
        }
    }
}

impl std::error::Error for JournalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for JournalError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
