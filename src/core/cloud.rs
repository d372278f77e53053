//! Point records decoded from, and encoded into, `PointCloud2` messages.
//!
//! Input clouds must provide float `x`, `y`, `z` fields and may provide a
//! packed `rgb`/`rgba` color. Augmented clouds always use the fixed layout:
//!
//! | field | type | offset |
//! |-------|------|--------|
//! | x     | f32  | 0      |
//! | y     | f32  | 4      |
//! | z     | f32  | 8      |
//! | rgba  | u32  | 12     |

use thiserror::Error;

use crate::core::messages::{Header, PointCloud2, PointField, PointFieldDatatype};

/// Record length of an augmented point.
pub const AUGMENTED_POINT_STEP: u32 = 16;

/// Errors that can occur while decoding a point cloud.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CloudError {
    #[error("point cloud has no '{0}' field")]
    MissingField(String),

    #[error("field '{name}' has unsupported datatype {datatype:?}")]
    UnsupportedDatatype {
        name: String,
        datatype: PointFieldDatatype,
    },

    #[error("point {index} needs {needed} bytes but the buffer holds {available}")]
    ShortBuffer {
        index: usize,
        needed: usize,
        available: usize,
    },
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// A point as recorded by a depth+color sensor, in the sensor frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Color bits `0x??RRGGBB` stored in a float
    pub rgb: f32,
}

impl RawPoint {
    pub fn new(x: f32, y: f32, z: f32, rgb: f32) -> Self {
        Self { x, y, z, rgb }
    }
}

/// A labelled point in the common drone frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentedPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// `u32::from_le_bytes([b, g, r, label * 7])`
    pub rgba: u32,
}

impl AugmentedPoint {
    pub fn new(x: f32, y: f32, z: f32, rgba: u32) -> Self {
        Self { x, y, z, rgba }
    }
}

#[derive(Debug, Clone, Copy)]
struct FieldAccess {
    offset: usize,
    datatype: PointFieldDatatype,
}

impl FieldAccess {
    fn float(cloud: &PointCloud2, name: &str) -> Result<Self> {
        let field = cloud
            .field(name)
            .ok_or_else(|| CloudError::MissingField(name.to_string()))?;
        match field.datatype {
            PointFieldDatatype::Float32 | PointFieldDatatype::Float64 => Ok(Self {
                offset: field.offset as usize,
                datatype: field.datatype,
            }),
            other => Err(CloudError::UnsupportedDatatype {
                name: name.to_string(),
                datatype: other,
            }),
        }
    }

    /// Any 32-bit field, read as raw bits.
    fn bits32(field: &PointField) -> Result<Self> {
        match field.datatype {
            PointFieldDatatype::Float32 | PointFieldDatatype::UInt32 | PointFieldDatatype::Int32 => {
                Ok(Self {
                    offset: field.offset as usize,
                    datatype: field.datatype,
                })
            }
            other => Err(CloudError::UnsupportedDatatype {
                name: field.name.clone(),
                datatype: other,
            }),
        }
    }

    fn end(&self) -> usize {
        self.offset + self.datatype.size()
    }
}

fn read_u32(bytes: &[u8], big_endian: bool) -> u32 {
    let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if big_endian {
        u32::from_be_bytes(raw)
    } else {
        u32::from_le_bytes(raw)
    }
}

fn read_f64(bytes: &[u8], big_endian: bool) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    if big_endian {
        f64::from_be_bytes(raw)
    } else {
        f64::from_le_bytes(raw)
    }
}

fn read_float(record: &[u8], access: FieldAccess, big_endian: bool) -> f32 {
    let bytes = &record[access.offset..];
    match access.datatype {
        PointFieldDatatype::Float64 => read_f64(bytes, big_endian) as f32,
        _ => f32::from_bits(read_u32(bytes, big_endian)),
    }
}

/// Byte ranges of every point record, row by row.
fn records<'a>(
    cloud: &'a PointCloud2,
    record_len: usize,
) -> impl Iterator<Item = Result<&'a [u8]>> + 'a {
    let width = cloud.width as usize;
    let row_step = cloud.row_step as usize;
    let point_step = cloud.point_step as usize;

    (0..cloud.point_count()).map(move |index| {
        let start = (index / width) * row_step + (index % width) * point_step;
        let end = start + record_len;
        cloud.data.get(start..end).ok_or(CloudError::ShortBuffer {
            index,
            needed: end,
            available: cloud.data.len(),
        })
    })
}

/// Decode every point of a depth+color cloud.
///
/// Points without a color field get color bits `0`. Non-finite points are
/// decoded as-is; the distance gate drops them later.
pub fn read_points(cloud: &PointCloud2) -> Result<Vec<RawPoint>> {
    let x = FieldAccess::float(cloud, "x")?;
    let y = FieldAccess::float(cloud, "y")?;
    let z = FieldAccess::float(cloud, "z")?;
    let color = match cloud.field("rgb").or_else(|| cloud.field("rgba")) {
        Some(field) => Some(FieldAccess::bits32(field)?),
        None => None,
    };

    let record_len = [Some(x), Some(y), Some(z), color]
        .iter()
        .flatten()
        .map(|a| a.end())
        .max()
        .unwrap_or(0);
    let big_endian = cloud.is_bigendian;

    let mut points = Vec::with_capacity(cloud.point_count());
    for record in records(cloud, record_len) {
        let record = record?;
        let rgb = color
            .map(|c| f32::from_bits(read_u32(&record[c.offset..], big_endian)))
            .unwrap_or(0.0);
        points.push(RawPoint {
            x: read_float(record, x, big_endian),
            y: read_float(record, y, big_endian),
            z: read_float(record, z, big_endian),
            rgb,
        });
    }

    Ok(points)
}

/// Decode a cloud written by [`create_cloud`].
pub fn read_augmented_points(cloud: &PointCloud2) -> Result<Vec<AugmentedPoint>> {
    let x = FieldAccess::float(cloud, "x")?;
    let y = FieldAccess::float(cloud, "y")?;
    let z = FieldAccess::float(cloud, "z")?;
    let rgba_field = cloud
        .field("rgba")
        .ok_or_else(|| CloudError::MissingField("rgba".to_string()))?;
    let rgba = FieldAccess::bits32(rgba_field)?;

    let record_len = [x.end(), y.end(), z.end(), rgba.end()]
        .into_iter()
        .max()
        .unwrap_or(0);
    let big_endian = cloud.is_bigendian;

    records(cloud, record_len)
        .map(|record| {
            let record = record?;
            Ok(AugmentedPoint {
                x: read_float(record, x, big_endian),
                y: read_float(record, y, big_endian),
                z: read_float(record, z, big_endian),
                rgba: read_u32(&record[rgba.offset..], big_endian),
            })
        })
        .collect()
}

/// Field list of an augmented cloud.
pub fn augmented_fields() -> Vec<PointField> {
    vec![
        PointField::new("x", 0, PointFieldDatatype::Float32),
        PointField::new("y", 4, PointFieldDatatype::Float32),
        PointField::new("z", 8, PointFieldDatatype::Float32),
        PointField::new("rgba", 12, PointFieldDatatype::UInt32),
    ]
}

/// Build an unorganised little-endian cloud from augmented points.
pub fn create_cloud(header: Header, points: &[AugmentedPoint]) -> PointCloud2 {
    let mut data = Vec::with_capacity(points.len() * AUGMENTED_POINT_STEP as usize);
    for p in points {
        data.extend_from_slice(&p.x.to_le_bytes());
        data.extend_from_slice(&p.y.to_le_bytes());
        data.extend_from_slice(&p.z.to_le_bytes());
        data.extend_from_slice(&p.rgba.to_le_bytes());
    }

    PointCloud2 {
        header,
        height: 1,
        width: points.len() as u32,
        fields: augmented_fields(),
        is_bigendian: false,
        point_step: AUGMENTED_POINT_STEP,
        row_step: AUGMENTED_POINT_STEP * points.len() as u32,
        data,
        is_dense: false,
    }
}

/// Build an unorganised depth+color cloud with `x, y, z, rgb` float fields.
pub fn create_raw_cloud(header: Header, points: &[RawPoint]) -> PointCloud2 {
    let mut data = Vec::with_capacity(points.len() * 16);
    for p in points {
        data.extend_from_slice(&p.x.to_le_bytes());
        data.extend_from_slice(&p.y.to_le_bytes());
        data.extend_from_slice(&p.z.to_le_bytes());
        data.extend_from_slice(&p.rgb.to_le_bytes());
    }

    PointCloud2 {
        header,
        height: 1,
        width: points.len() as u32,
        fields: vec![
            PointField::new("x", 0, PointFieldDatatype::Float32),
            PointField::new("y", 4, PointFieldDatatype::Float32),
            PointField::new("z", 8, PointFieldDatatype::Float32),
            PointField::new("rgb", 12, PointFieldDatatype::Float32),
        ],
        is_bigendian: false,
        point_step: 16,
        row_step: 16 * points.len() as u32,
        data,
        is_dense: true,
    }
}
