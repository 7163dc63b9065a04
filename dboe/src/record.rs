//! Fixed-length records.
//!
//! A record is a key followed by an optional value. Every record produced by
//! one [`RecordFactory`] has the same key length and the same value length,
//! which is what lets the B+Tree lay records out in fixed slots.
//!
//! Ordering and equality look at the key only. Keys compare as unsigned bytes,
//! left to right, with a shorter key sorting first when one is a prefix of the
//! other.

use std::cmp::Ordering;

/// An immutable key(+value) unit stored in a B+Tree leaf.
#[derive(Clone)]
pub struct Record {
    key: Box<[u8]>,
    value: Box<[u8]>,
}

impl Record {
    /// The key bytes.
    #[must_use]
    pub const fn key(&self) -> &[u8] {
        &self.key
    }

    /// The value bytes (empty for key-only records).
    #[must_use]
    pub const fn value(&self) -> &[u8] {
        &self.value
    }

    /// Total encoded length (key + value).
    #[must_use]
    pub const fn len(&self) -> usize {
        self.key.len() + self.value.len()
    }

    /// True when the record has no bytes at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build a record from slices whose lengths the caller has already checked.
    pub(crate) fn from_slices(key: &[u8], value: &[u8]) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Copy the record into `buf`, which must be exactly `len()` bytes.
    pub fn write_to(&self, buf: &mut [u8]) {
        let (key, value) = buf.split_at_mut(self.key.len());
        key.copy_from_slice(&self.key);
        value.copy_from_slice(&self.value);
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Record {}

impl PartialOrd for Record {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Record {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_keys(&self.key, &other.key)
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Record[")?;
        for byte in self.key.iter() {
            write!(f, "{byte:02x}")?;
        }
        if !self.value.is_empty() {
            write!(f, " => ")?;
            for byte in self.value.iter() {
                write!(f, "{byte:02x}")?;
            }
        }
        write!(f, "]")
    }
}

/// Compare two keys as unsigned byte strings.
#[must_use]
pub fn compare_keys(a: &[u8], b: &[u8]) -> Ordering {
    // Slice ordering on u8 is unsigned lexicographic with the shorter prefix first.
    a.cmp(b)
}

/// Builds records of one fixed shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFactory {
    key_length: usize,
    value_length: usize,
}

impl RecordFactory {
    /// Create a factory for records with the given key and value lengths.
    #[must_use]
    pub const fn new(key_length: usize, value_length: usize) -> Self {
        Self {
            key_length,
            value_length,
        }
    }

    /// Create a factory for key-only records.
    #[must_use]
    pub const fn key_only(key_length: usize) -> Self {
        Self::new(key_length, 0)
    }

    #[must_use]
    pub const fn key_length(&self) -> usize {
        self.key_length
    }

    #[must_use]
    pub const fn value_length(&self) -> usize {
        self.value_length
    }

    /// Length of a full record produced by this factory.
    #[must_use]
    pub const fn record_length(&self) -> usize {
        self.key_length + self.value_length
    }

    #[must_use]
    pub const fn has_value(&self) -> bool {
        self.value_length > 0
    }

    /// Build a record from its full encoding (key followed by value).
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecordLength` if `bytes` is not exactly
    /// `key_length + value_length` long.
    pub fn create(&self, bytes: &[u8]) -> Result<Record, RecordError> {
        if bytes.len() != self.record_length() {
            return Err(RecordError::InvalidRecordLength {
                expected: self.record_length(),
                actual: bytes.len(),
            });
        }
        let (key, value) = bytes.split_at(self.key_length);
        Ok(Record {
            key: key.into(),
            value: value.into(),
        })
    }

    /// Build a record from separate key and value parts.
    pub fn create_from_parts(&self, key: &[u8], value: &[u8]) -> Result<Record, RecordError> {
        if key.len() != self.key_length || value.len() != self.value_length {
            return Err(RecordError::InvalidRecordLength {
                expected: self.record_length(),
                actual: key.len() + value.len(),
            });
        }
        Ok(Record {
            key: key.into(),
            value: value.into(),
        })
    }

    /// Build a search record from a key; the value part is zero-filled.
    pub fn create_key(&self, key: &[u8]) -> Result<Record, RecordError> {
        if key.len() != self.key_length {
            return Err(RecordError::InvalidRecordLength {
                expected: self.key_length,
                actual: key.len(),
            });
        }
        Ok(Record {
            key: key.into(),
            value: vec![0u8; self.value_length].into_boxed_slice(),
        })
    }

    /// A zero-valued record of key length, used as a scan boundary.
    #[must_use]
    pub fn create_key_only(&self) -> Record {
        Record {
            key: vec![0u8; self.key_length].into_boxed_slice(),
            value: vec![0u8; self.value_length].into_boxed_slice(),
        }
    }

    /// Compare two records by key.
    #[must_use]
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        compare_keys(a.key(), b.key())
    }
}

/// Errors building records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Input length does not match the factory's key+value length.
    InvalidRecordLength { expected: usize, actual: usize },
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRecordLength { expected, actual } => {
                write!(f, "invalid record length: expected {expected} bytes, got {actual}")
            }
        }
    }
}

impl std::error::Error for RecordError {}
