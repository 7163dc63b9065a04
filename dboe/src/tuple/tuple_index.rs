//! Tuples of node ids stored as key-only records.
//!
//! A tuple of `n` node ids is stored as an `8 * n` byte key: each id
//! big-endian, in the index's column order. Byte order of the key is then
//! the numeric order of the tuple, so a pattern whose leading columns (in
//! index order) are bound becomes one contiguous key range.

use std::sync::Arc;

use crate::index::{Index, IndexStats, RangeIndex, TrackedIndex};
use crate::record::Record;
use crate::tuple::{ColumnMap, DatasetError, NodeId};
use crate::txn::Transaction;

const ID_LENGTH: usize = 8;

/// Lazy stream of tuples in natural column order.
pub type TupleIter<'a> = Box<dyn Iterator<Item = Result<Vec<NodeId>, DatasetError>> + 'a>;

/// One ordering of a tuple table.
pub struct TupleIndex {
    column_map: ColumnMap,
    index: TrackedIndex<Arc<RangeIndex>>,
}

impl TupleIndex {
    /// Wrap `index`, whose records must be key-only and `8 * arity` bytes.
    pub fn new(
        column_map: ColumnMap,
        index: Arc<RangeIndex>,
        checking: bool,
    ) -> Result<Self, DatasetError> {
        let factory = index.record_factory();
        let expected = column_map.len() * ID_LENGTH;
        if factory.key_length() != expected || factory.has_value() {
            return Err(DatasetError::InvalidColumnMap(format!(
                "index {} holds {}+{} byte records, {} tuples need {expected}+0",
                index.name(),
                factory.key_length(),
                factory.value_length(),
                column_map,
            )));
        }
        Ok(Self {
            column_map,
            index: TrackedIndex::new(index, checking),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.index.name()
    }

    #[must_use]
    pub const fn column_map(&self) -> &ColumnMap {
        &self.column_map
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        self.column_map.len()
    }

    #[must_use]
    pub fn stats(&self) -> IndexStats {
        self.index.stats()
    }

    /// The underlying record index.
    #[must_use]
    pub const fn index(&self) -> &TrackedIndex<Arc<RangeIndex>> {
        &self.index
    }

    fn check_arity(&self, len: usize) -> Result<(), DatasetError> {
        if len != self.arity() {
            return Err(DatasetError::WrongArity {
                expected: self.arity(),
                actual: len,
            });
        }
        Ok(())
    }

    /// Key for a tuple already in index order.
    fn key_for(&self, ids: &[NodeId]) -> Result<Record, DatasetError> {
        let bytes: Vec<u8> = ids.iter().flat_map(|id| id.to_be_bytes()).collect();
        Ok(self.index.record_factory().create(&bytes)?)
    }

    fn encode(&self, tuple: &[NodeId]) -> Result<Record, DatasetError> {
        self.check_arity(tuple.len())?;
        self.key_for(&self.column_map.map(tuple))
    }

    fn decode(&self, record: &Record) -> Vec<NodeId> {
        let ids: Vec<NodeId> = record
            .key()
            .chunks_exact(ID_LENGTH)
            .map(|chunk| {
                let mut id = [0u8; ID_LENGTH];
                id.copy_from_slice(chunk);
                NodeId::from_be_bytes(id)
            })
            .collect();
        self.column_map.unmap(&ids)
    }

    /// Returns `true` if the tuple was not already present.
    pub fn add(&self, txn: &Transaction, tuple: &[NodeId]) -> Result<bool, DatasetError> {
        let record = self.encode(tuple)?;
        Ok(self.index.insert(txn, record)?)
    }

    /// Returns `true` if the tuple was present.
    pub fn delete(&self, txn: &Transaction, tuple: &[NodeId]) -> Result<bool, DatasetError> {
        let record = self.encode(tuple)?;
        Ok(self.index.delete(txn, &record)?)
    }

    pub fn contains(&self, txn: &Transaction, tuple: &[NodeId]) -> Result<bool, DatasetError> {
        let record = self.encode(tuple)?;
        Ok(self.index.contains(txn, &record)?)
    }

    pub fn size(&self, txn: &Transaction) -> Result<u64, DatasetError> {
        Ok(self.index.size(txn)?)
    }

    /// Number of leading columns, in index order, bound by `pattern`.
    ///
    /// `pattern` is in natural order; `None` is a wildcard.
    #[must_use]
    pub fn bound_prefix(&self, pattern: &[Option<NodeId>]) -> usize {
        if pattern.len() != self.arity() {
            return 0;
        }
        self.column_map
            .map(pattern)
            .iter()
            .take_while(|slot| slot.is_some())
            .count()
    }

    /// Tuples matching `pattern`, in index order.
    ///
    /// The bound prefix is scanned as a key range; any other bound columns
    /// are checked on each tuple.
    pub fn find<'a>(
        &'a self,
        txn: &'a Transaction,
        pattern: &[Option<NodeId>],
    ) -> Result<TupleIter<'a>, DatasetError> {
        self.check_arity(pattern.len())?;
        let ordered = self.column_map.map(pattern);
        let prefix: Vec<NodeId> = ordered.iter().map_while(|slot| *slot).collect();

        if prefix.len() == self.arity() {
            let record = self.key_for(&prefix)?;
            let found = self.index.contains(txn, &record)?;
            let tuple = found.then(|| self.column_map.unmap(&prefix));
            return Ok(Box::new(tuple.into_iter().map(Ok)));
        }

        let (min, max) = if prefix.is_empty() {
            (None, None)
        } else {
            let min = self.key_for(&padded(&prefix, self.arity()))?;
            let max = match successor(&prefix) {
                Some(next) => Some(self.key_for(&padded(&next, self.arity()))?),
                None => None,
            };
            (Some(min), max)
        };

        let pattern = pattern.to_vec();
        let tuples = self
            .index
            .iter_range_mapped(txn, min.as_ref(), max.as_ref(), move |r| self.decode(&r))?
            .filter(move |tuple| match tuple {
                Ok(tuple) => matches_pattern(&pattern, tuple),
                Err(_) => true,
            })
            .map(|tuple| tuple.map_err(DatasetError::from));
        Ok(Box::new(tuples))
    }
}

fn padded(prefix: &[NodeId], arity: usize) -> Vec<NodeId> {
    let mut ids = prefix.to_vec();
    ids.resize(arity, 0);
    ids
}

/// The next prefix in numeric order, or `None` if every id is at its maximum.
fn successor(prefix: &[NodeId]) -> Option<Vec<NodeId>> {
    let mut next = prefix.to_vec();
    let last = next.iter().rposition(|id| *id != NodeId::MAX)?;
    next[last] += 1;
    for id in &mut next[last + 1..] {
        *id = 0;
    }
    Some(next)
}

fn matches_pattern(pattern: &[Option<NodeId>], tuple: &[NodeId]) -> bool {
    pattern
        .iter()
        .zip(tuple)
        .all(|(bound, id)| bound.is_none_or(|b| b == *id))
}
