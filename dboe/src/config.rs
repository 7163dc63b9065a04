//! Index and dataset configuration.
//!
//! Configuration is plain data threaded through at construction time. A
//! [`DatasetConfig`] can also be loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `DBOE_DATABASE_DIRECTORY`: Directory holding index and journal files (default: `./data`)
//! - `DBOE_BLOCK_SIZE`: Block size in bytes (default: `8192`)
//! - `DBOE_CACHE_BLOCKS`: Committed blocks cached per index (default: `1024`)
//! - `DBOE_CHECKING`: Validate trees after every write, `true` or `false` (default: `false`)
//! - `DBOE_SYNC_JOURNAL`: Sync the journal at every prepare (default: `true`)
//!
//! # Invariants
//!
//! - `block_size` is within the supported range
//! - `cache_blocks` is at least 1

use std::path::PathBuf;

use crate::storage::{DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};

/// Shape and tuning of one range index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexConfig {
    pub block_size: usize,
    pub key_length: usize,
    /// Zero for key-only indexes.
    pub value_length: usize,
    /// Tree order; `None` picks the largest order the block size allows.
    pub order: Option<usize>,
    /// Committed blocks kept in the LRU cache.
    pub cache_blocks: usize,
    /// Hard limit on blocks in the store, if any.
    pub max_blocks: Option<u64>,
    /// Run full structural checks after every write and verify node padding
    /// on decode.
    pub checking: bool,
}

impl IndexConfig {
    pub const DEFAULT_CACHE_BLOCKS: usize = 1024;

    /// Default tuning for records of the given shape.
    #[must_use]
    pub const fn new(key_length: usize, value_length: usize) -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            key_length,
            value_length,
            order: None,
            cache_blocks: Self::DEFAULT_CACHE_BLOCKS,
            max_blocks: None,
            checking: false,
        }
    }

    #[must_use]
    pub const fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    #[must_use]
    pub const fn with_order(mut self, order: usize) -> Self {
        self.order = Some(order);
        self
    }

    #[must_use]
    pub const fn with_cache_blocks(mut self, cache_blocks: usize) -> Self {
        self.cache_blocks = cache_blocks;
        self
    }

    #[must_use]
    pub const fn with_max_blocks(mut self, max_blocks: u64) -> Self {
        self.max_blocks = Some(max_blocks);
        self
    }

    #[must_use]
    pub const fn with_checking(mut self, checking: bool) -> Self {
        self.checking = checking;
        self
    }
}

/// Configuration for a dataset: a directory of indexes sharing one journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetConfig {
    /// Each index is stored at `{directory}/{name}.idx`, the journal at
    /// `{directory}/journal.jrnl`.
    pub directory: PathBuf,
    pub block_size: usize,
    pub cache_blocks: usize,
    pub checking: bool,
    /// Sync the journal when a transaction prepares. Turning this off trades
    /// durability of the latest commits for speed.
    pub sync_journal: bool,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl DatasetConfig {
    /// Default dataset directory.
    pub const DEFAULT_DIRECTORY: &'static str = "./data";

    /// Defaults rooted at `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            block_size: DEFAULT_BLOCK_SIZE,
            cache_blocks: IndexConfig::DEFAULT_CACHE_BLOCKS,
            checking: false,
            sync_journal: true,
        }
    }

    /// Index configuration for records of the given shape under this dataset.
    #[must_use]
    pub const fn index_config(&self, key_length: usize, value_length: usize) -> IndexConfig {
        IndexConfig::new(key_length, value_length)
            .with_block_size(self.block_size)
            .with_cache_blocks(self.cache_blocks)
            .with_checking(self.checking)
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that does not parse
    /// or is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let directory = var("DBOE_DATABASE_DIRECTORY")
            .map_or_else(|| PathBuf::from(Self::DEFAULT_DIRECTORY), PathBuf::from);

        let mut config = Self::new(directory);
        if let Some(value) = var("DBOE_BLOCK_SIZE") {
            config.block_size = parse_block_size(&value)?;
        }
        if let Some(value) = var("DBOE_CACHE_BLOCKS") {
            config.cache_blocks = parse_number("DBOE_CACHE_BLOCKS", &value)?;
            if config.cache_blocks == 0 {
                return Err(ConfigError::InvalidValue {
                    name: "DBOE_CACHE_BLOCKS".to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
        }
        if let Some(value) = var("DBOE_CHECKING") {
            config.checking = parse_bool("DBOE_CHECKING", &value)?;
        }
        if let Some(value) = var("DBOE_SYNC_JOURNAL") {
            config.sync_journal = parse_bool("DBOE_SYNC_JOURNAL", &value)?;
        }
        Ok(config)
    }
}

fn parse_number(name: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        message: format!("'{value}' is not a valid number"),
    })
}

fn parse_block_size(value: &str) -> Result<usize, ConfigError> {
    let block_size = parse_number("DBOE_BLOCK_SIZE", value)?;
    if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size) {
        return Err(ConfigError::InvalidValue {
            name: "DBOE_BLOCK_SIZE".to_string(),
            message: format!("{block_size} is outside {MIN_BLOCK_SIZE}..={MAX_BLOCK_SIZE}"),
        });
    }
    Ok(block_size)
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}' is not a boolean"),
        }),
    }
}
