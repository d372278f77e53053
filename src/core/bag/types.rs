//! Core data types for the bag file format.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::messages::Message;

/// Magic bytes at start of bag file.
pub const BAG_MAGIC: [u8; 4] = *b"CBAG";

/// Current bag file format version.
pub const BAG_VERSION: u16 = 1;

/// Size of the bag file header in bytes.
pub const HEADER_SIZE: usize = 64;

/// Largest record accepted on read. A 640x480 cloud at 32 bytes per point is ~10 MB.
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// Errors raised while reading or writing bag files.
#[derive(Error, Debug)]
pub enum BagError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Postcard(#[from] postcard::Error),

    #[error("invalid bag file: {0}")]
    InvalidFormat(String),

    #[error("record of {size} bytes exceeds the {limit} byte limit")]
    RecordTooLarge { size: usize, limit: usize },
}

pub type Result<T> = std::result::Result<T, BagError>;

/// Bag file header (64 bytes fixed size, postcard encoded and zero padded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagHeader {
    /// Magic bytes: "CBAG"
    pub magic: [u8; 4],
    pub version: u16,
    pub flags: u16,
    /// Earliest record time (nanoseconds)
    pub start_time_ns: u64,
    /// Latest record time (nanoseconds)
    pub end_time_ns: u64,
    pub record_count: u64,
    pub reserved: [u8; 16],
}

impl BagHeader {
    pub fn new() -> Self {
        Self {
            magic: BAG_MAGIC,
            version: BAG_VERSION,
            flags: 0,
            start_time_ns: 0,
            end_time_ns: 0,
            record_count: 0,
            reserved: [0; 16],
        }
    }

    /// Check if magic bytes are valid.
    pub fn is_valid(&self) -> bool {
        self.magic == BAG_MAGIC
    }

    pub fn duration_ns(&self) -> u64 {
        self.end_time_ns.saturating_sub(self.start_time_ns)
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ns() as f64 / 1e9
    }
}

impl Default for BagHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// One message on one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BagRecord {
    pub topic: String,
    /// Record time used for ordering (nanoseconds)
    pub time_ns: u64,
    pub message: Message,
}

/// Borrowed form of [`BagRecord`]; serializes to identical bytes.
#[derive(Serialize)]
pub(crate) struct BagRecordRef<'a> {
    pub topic: &'a str,
    pub time_ns: u64,
    pub message: &'a Message,
}

/// Summary of a bag file.
#[derive(Debug, Clone)]
pub struct BagInfo {
    pub path: PathBuf,
    pub start_time_ns: u64,
    pub end_time_ns: u64,
    pub record_count: u64,
    pub file_size_bytes: u64,
    /// Records per topic
    pub topics: BTreeMap<String, u64>,
}

impl BagInfo {
    pub fn duration_secs(&self) -> f64 {
        self.end_time_ns.saturating_sub(self.start_time_ns) as f64 / 1e9
    }

    pub fn file_size_mb(&self) -> f64 {
        self.file_size_bytes as f64 / 1_048_576.0
    }

    pub fn topic_count(&self, topic: &str) -> u64 {
        self.topics.get(topic).copied().unwrap_or(0)
    }
}
