//! Column permutations between natural tuple order and index order.

use crate::tuple::DatasetError;

/// Maps tuples between their natural column order and an index's key order.
///
/// `ColumnMap::new("SPO", "POS")` stores the triple `(s, p, o)` under the
/// key `(p, o, s)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    label: String,
    /// Natural column stored at each index position.
    to_natural: Vec<usize>,
}

impl ColumnMap {
    /// Build the map from natural column names to an index ordering of the
    /// same names, one character per column.
    ///
    /// # Errors
    ///
    /// Returns `InvalidColumnMap` unless `order` is a permutation of
    /// `natural` without repeated columns.
    pub fn new(natural: &str, order: &str) -> Result<Self, DatasetError> {
        let invalid = || {
            DatasetError::InvalidColumnMap(format!("{order} is not a permutation of {natural}"))
        };
        let natural: Vec<char> = natural.chars().collect();

        if natural.is_empty() || order.chars().count() != natural.len() {
            return Err(invalid());
        }
        let mut to_natural = Vec::with_capacity(natural.len());
        for column in order.chars() {
            let position = natural.iter().position(|c| *c == column).ok_or_else(invalid)?;
            if to_natural.contains(&position) {
                return Err(invalid());
            }
            to_natural.push(position);
        }

        Ok(Self {
            label: order.to_string(),
            to_natural,
        })
    }

    /// The index ordering, e.g. `"POS"`.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.to_natural.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_natural.is_empty()
    }

    /// Natural order to index order.
    #[must_use]
    pub fn map<T: Copy>(&self, tuple: &[T]) -> Vec<T> {
        self.to_natural.iter().map(|&i| tuple[i]).collect()
    }

    /// Index order back to natural order.
    #[must_use]
    pub fn unmap<T: Copy + Default>(&self, tuple: &[T]) -> Vec<T> {
        let mut natural = vec![T::default(); tuple.len()];
        for (slot, &i) in self.to_natural.iter().enumerate() {
            natural[i] = tuple[slot];
        }
        natural
    }
}

impl std::fmt::Display for ColumnMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label)
    }
}
