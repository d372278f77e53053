//! Bag files holding recorded sensor topics.
//!
//! # File Format
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ Header (64 bytes, postcard, zero padded)         │
//! │ - Magic: "CBAG"                                  │
//! │ - Version: u16                                   │
//! │ - Flags: u16                                     │
//! │ - Start time: u64 (nanoseconds)                  │
//! │ - End time: u64 (nanoseconds)                    │
//! │ - Record count: u64                              │
//! │ - Reserved: 16 bytes                             │
//! ├──────────────────────────────────────────────────┤
//! │ Record Stream                                    │
//! │ [len:u32 LE][postcard(topic, time_ns, message)]  │
//! └──────────────────────────────────────────────────┘
//! ```

mod reader;
mod types;
mod writer;

pub use reader::BagReader;
pub use types::{
    BagError, BagHeader, BagInfo, BagRecord, BAG_MAGIC, BAG_VERSION, HEADER_SIZE, MAX_RECORD_SIZE,
};
pub use writer::BagWriter;

#[cfg(test)]
pub(crate) mod test_fixtures;

#[cfg(test)]
pub use test_fixtures::BagTestFixture;
