//! File exports for augmented clouds and run statistics.
//!
//! - PLY (ASCII) with the sensor color and the class id of every point
//! - CSV rows of any serializable record, used for per-frame reports

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use super::cloud::AugmentedPoint;
use super::color::{decode_rgba, LABEL_SCALE};

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

const PLY_PROPERTIES: [&str; 7] = [
    "property float x",
    "property float y",
    "property float z",
    "property uchar red",
    "property uchar green",
    "property uchar blue",
    "property uchar label",
];

/// Write augmented points to an ASCII PLY file.
///
/// Each vertex carries its sensor color and its class id. The id is
/// recovered from the label byte by dividing out the display scale, so
/// ids whose scaled value wrapped past 255 come back wrong.
///
/// # Example
///
/// ```no_run
/// use cloud_augment::core::cloud::AugmentedPoint;
/// use cloud_augment::core::writers::write_ply;
/// use std::path::Path;
///
/// let points = vec![AugmentedPoint::new(1.0, 2.0, 3.0, 0x0700_0000)];
/// write_ply(Path::new("frame.ply"), &points).unwrap();
/// ```
pub fn write_ply(path: &Path, points: &[AugmentedPoint]) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();
    let write_err = |e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    };

    writeln!(writer, "ply").map_err(write_err)?;
    writeln!(writer, "format ascii 1.0").map_err(write_err)?;
    writeln!(writer, "element vertex {}", points.len()).map_err(write_err)?;
    for property in PLY_PROPERTIES {
        writeln!(writer, "{}", property).map_err(write_err)?;
    }
    writeln!(writer, "end_header").map_err(write_err)?;

    for p in points {
        let [b, g, r, label_byte] = decode_rgba(p.rgba);
        writeln!(
            writer,
            "{:.6} {:.6} {:.6} {} {} {} {}",
            p.x,
            p.y,
            p.z,
            r,
            g,
            b,
            label_byte / LABEL_SCALE
        )
        .map_err(write_err)?;
    }

    writer.flush().map_err(write_err)?;
    Ok(())
}

/// Write serializable rows to CSV, with a header taken from the field names.
pub fn write_csv_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    ensure_parent_dirs(path)?;
    let buf_writer = create_buffered_writer(path)?;
    let mut csv_writer = csv::Writer::from_writer(buf_writer);
    let path_str = path.display().to_string();

    for row in rows {
        csv_writer
            .serialize(row)
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}
