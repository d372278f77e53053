//! Sensor message types stored in bag files.
//!
//! These mirror the ROS `sensor_msgs/Image`, `sensor_msgs/PointCloud2` and
//! `tf2_msgs/TFMessage` layouts closely enough that recordings can be
//! converted field by field.

use serde::{Deserialize, Serialize};

/// Standard message header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub seq: u32,
    /// Acquisition time in nanoseconds
    pub stamp_ns: u64,
    pub frame_id: String,
}

impl Header {
    pub fn new(stamp_ns: u64, frame_id: impl Into<String>) -> Self {
        Self {
            seq: 0,
            stamp_ns,
            frame_id: frame_id.into(),
        }
    }
}

/// Uncompressed image. Segmentation images are `bgr8`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub encoding: String,
    pub is_bigendian: bool,
    /// Row length in bytes
    pub step: u32,
    pub data: Vec<u8>,
}

impl Image {
    /// A `bgr8` image with every pixel set to `bgr`.
    pub fn filled_bgr8(header: Header, width: u32, height: u32, bgr: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&bgr);
        }
        Self {
            header,
            height,
            width,
            encoding: "bgr8".to_string(),
            is_bigendian: false,
            step: width * 3,
            data,
        }
    }
}

/// Scalar type of a point field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointFieldDatatype {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl PointFieldDatatype {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }
}

/// Description of one named field inside a point record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointField {
    pub name: String,
    /// Byte offset inside the point record
    pub offset: u32,
    pub datatype: PointFieldDatatype,
    pub count: u32,
}

impl PointField {
    pub fn new(name: &str, offset: u32, datatype: PointFieldDatatype) -> Self {
        Self {
            name: name.to_string(),
            offset,
            datatype,
            count: 1,
        }
    }
}

/// Packed point cloud with a self-describing record layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloud2 {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub fields: Vec<PointField>,
    pub is_bigendian: bool,
    /// Record length in bytes
    pub point_step: u32,
    /// Row length in bytes
    pub row_step: u32,
    pub data: Vec<u8>,
    pub is_dense: bool,
}

impl PointCloud2 {
    /// Number of points described by the header.
    pub fn point_count(&self) -> usize {
        self.height as usize * self.width as usize
    }

    pub fn field(&self, name: &str) -> Option<&PointField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Single stamped transform between two frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStamped {
    pub header: Header,
    pub child_frame_id: String,
    pub translation: [f64; 3],
    /// Quaternion `[x, y, z, w]`
    pub rotation: [f64; 4],
}

/// Batch of transforms published together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TfMessage {
    pub transforms: Vec<TransformStamped>,
}

/// Any message a bag record can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Image(Image),
    PointCloud2(PointCloud2),
    Tf(TfMessage),
}

impl Message {
    /// Short type name used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Image(_) => "Image",
            Message::PointCloud2(_) => "PointCloud2",
            Message::Tf(_) => "TfMessage",
        }
    }

    /// Header stamp of the message. A transform batch uses its first
    /// transform and has no stamp when empty.
    pub fn stamp_ns(&self) -> Option<u64> {
        match self {
            Message::Image(img) => Some(img.header.stamp_ns),
            Message::PointCloud2(cloud) => Some(cloud.header.stamp_ns),
            Message::Tf(tf) => tf.transforms.first().map(|t| t.header.stamp_ns),
        }
    }

    pub fn into_image(self) -> Option<Image> {
        match self {
            Message::Image(img) => Some(img),
            _ => None,
        }
    }

    pub fn into_point_cloud(self) -> Option<PointCloud2> {
        match self {
            Message::PointCloud2(cloud) => Some(cloud),
            _ => None,
        }
    }
}
