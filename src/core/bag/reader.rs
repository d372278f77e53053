//! Sequential bag file reader.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::debug;

use super::types::{BagError, BagHeader, BagInfo, BagRecord, Result, HEADER_SIZE, MAX_RECORD_SIZE};

/// Reads records from a bag file in the order they were written.
///
/// Topic queries rewind to the first record, so a reader can be scanned any
/// number of times.
///
/// # Example
///
/// ```ignore
/// use cloud_augment::core::bag::BagReader;
///
/// let mut reader = BagReader::open("recording.bag")?;
/// for record in reader.topic_iter("/tf") {
///     println!("tf at {} ns", record?.time_ns);
/// }
/// ```
pub struct BagReader {
    reader: BufReader<File>,
    header: BagHeader,
    path: PathBuf,
    records_read: u64,
}

impl BagReader {
    /// Open a bag file and validate its header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mut reader = BufReader::new(file);

        let mut header_buffer = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_buffer).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                BagError::InvalidFormat(format!("{} is shorter than a bag header", path.display()))
            } else {
                BagError::Io(e)
            }
        })?;

        let header: BagHeader = postcard::from_bytes(&header_buffer)
            .map_err(|e| BagError::InvalidFormat(format!("failed to parse header: {}", e)))?;

        if !header.is_valid() {
            return Err(BagError::InvalidFormat(format!(
                "{} has invalid magic bytes",
                path.display()
            )));
        }

        debug!(
            "Opened {} ({} records, {:.1}s)",
            path.display(),
            header.record_count,
            header.duration_secs()
        );

        Ok(Self {
            reader,
            header,
            path,
            records_read: 0,
        })
    }

    pub fn header(&self) -> &BagHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records read since open or the last rewind.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Read the next record, `None` at end of file.
    pub fn next_record(&mut self) -> Result<Option<BagRecord>> {
        let mut len_bytes = [0u8; 4];
        match self.reader.read_exact(&mut len_bytes) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_RECORD_SIZE {
            return Err(BagError::RecordTooLarge {
                size: len,
                limit: MAX_RECORD_SIZE,
            });
        }

        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload)?;

        let record: BagRecord = postcard::from_bytes(&payload)?;
        self.records_read += 1;

        Ok(Some(record))
    }

    /// Reset to the first record.
    pub fn rewind(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        self.records_read = 0;
        Ok(())
    }

    /// Iterate over the records of one topic, starting from the beginning of the file.
    pub fn topic_iter<'a>(
        &'a mut self,
        topic: &'a str,
    ) -> impl Iterator<Item = Result<BagRecord>> + 'a {
        let rewound = self.rewind();
        let mut pending_error = rewound.err();

        std::iter::from_fn(move || {
            if let Some(e) = pending_error.take() {
                return Some(Err(e));
            }
            loop {
                match self.next_record() {
                    Ok(Some(record)) if record.topic == topic => return Some(Ok(record)),
                    Ok(Some(_)) => continue,
                    Ok(None) => return None,
                    Err(e) => return Some(Err(e)),
                }
            }
        })
    }

    /// Records `skip..skip + take` of one topic.
    pub fn read_topic(&mut self, topic: &str, skip: usize, take: usize) -> Result<Vec<BagRecord>> {
        self.topic_iter(topic).skip(skip).take(take).collect()
    }

    /// Scan the whole file and summarise it.
    pub fn info(&mut self) -> Result<BagInfo> {
        self.rewind()?;

        let mut topics: BTreeMap<String, u64> = BTreeMap::new();
        let mut record_count = 0u64;
        let mut start_time_ns = u64::MAX;
        let mut end_time_ns = 0u64;

        while let Some(record) = self.next_record()? {
            *topics.entry(record.topic).or_insert(0) += 1;
            record_count += 1;
            start_time_ns = start_time_ns.min(record.time_ns);
            end_time_ns = end_time_ns.max(record.time_ns);
        }

        if record_count == 0 {
            start_time_ns = 0;
        }

        let file_size_bytes = std::fs::metadata(&self.path)?.len();
        self.rewind()?;

        Ok(BagInfo {
            path: self.path.clone(),
            start_time_ns,
            end_time_ns,
            record_count,
            file_size_bytes,
            topics,
        })
    }
}

/// Iterator over all remaining records.
impl Iterator for BagReader {
    type Item = Result<BagRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
