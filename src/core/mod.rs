//! Core data types and I/O operations.

pub mod bag;
pub mod cloud;
pub mod color;
pub mod loaders;
pub mod messages;
pub mod transforms;
pub mod writers;

pub use bag::{BagError, BagInfo, BagReader, BagRecord, BagWriter};
pub use cloud::{AugmentedPoint, CloudError, RawPoint};
pub use messages::{Header, Image, Message, PointCloud2, TfMessage};
pub use writers::{write_csv_rows, write_ply, WriteError};
