//! Bag file writer.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::types::{
    BagHeader, BagInfo, BagRecord, BagRecordRef, Result, BAG_MAGIC, BAG_VERSION, HEADER_SIZE,
};
use crate::core::messages::Message;

/// Writes length-prefixed postcard records after a reserved header block.
///
/// The header is filled in by [`BagWriter::finish`]; a bag that was never
/// finished has an all-zero header and is rejected by the reader.
///
/// # Example
///
/// ```ignore
/// use cloud_augment::core::bag::BagWriter;
///
/// let mut writer = BagWriter::create("out.bag")?;
/// writer.write("/augmented_cloud", cloud.header.stamp_ns, &Message::PointCloud2(cloud))?;
/// let info = writer.finish()?;
/// println!("Wrote {} records", info.record_count);
/// ```
pub struct BagWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    record_count: u64,
    start_time_ns: Option<u64>,
    end_time_ns: u64,
    topics: BTreeMap<String, u64>,
}

impl BagWriter {
    /// Create the file (and missing parent directories) and reserve the header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&[0u8; HEADER_SIZE])?;

        Ok(Self {
            writer,
            path,
            record_count: 0,
            start_time_ns: None,
            end_time_ns: 0,
            topics: BTreeMap::new(),
        })
    }

    /// Append one message.
    pub fn write(&mut self, topic: &str, time_ns: u64, message: &Message) -> Result<()> {
        let bytes = postcard::to_allocvec(&BagRecordRef {
            topic,
            time_ns,
            message,
        })?;

        let len = bytes.len() as u32;
        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(&bytes)?;

        self.start_time_ns = Some(self.start_time_ns.map_or(time_ns, |t| t.min(time_ns)));
        self.end_time_ns = self.end_time_ns.max(time_ns);
        self.record_count += 1;
        *self.topics.entry(topic.to_string()).or_insert(0) += 1;
        Ok(())
    }

    /// Append a record read from another bag unchanged.
    pub fn write_record(&mut self, record: &BagRecord) -> Result<()> {
        self.write(&record.topic, record.time_ns, &record.message)
    }

    /// Write the final header and close the file.
    pub fn finish(mut self) -> Result<BagInfo> {
        self.writer.flush()?;
        let file_size = self.writer.stream_position()?;

        let header = BagHeader {
            magic: BAG_MAGIC,
            version: BAG_VERSION,
            flags: 0,
            start_time_ns: self.start_time_ns.unwrap_or(0),
            end_time_ns: self.end_time_ns,
            record_count: self.record_count,
            reserved: [0; 16],
        };

        let header_bytes = postcard::to_allocvec(&header)?;
        let mut header_buffer = [0u8; HEADER_SIZE];
        let copy_len = header_bytes.len().min(HEADER_SIZE);
        header_buffer[..copy_len].copy_from_slice(&header_bytes[..copy_len]);

        self.writer.seek(SeekFrom::Start(0))?;
        self.writer.write_all(&header_buffer)?;
        self.writer.flush()?;

        Ok(BagInfo {
            path: self.path,
            start_time_ns: header.start_time_ns,
            end_time_ns: header.end_time_ns,
            record_count: self.record_count,
            file_size_bytes: file_size,
            topics: self.topics,
        })
    }
}
