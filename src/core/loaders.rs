//! Typed window loaders on top of [`BagReader`].
//!
//! A window is the slice `index..index + count` of one topic, counted in
//! messages on that topic.

use thiserror::Error;

use crate::core::bag::{BagError, BagReader};
use crate::core::messages::{Image, PointCloud2};

/// Errors that can occur while loading a topic window.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error(transparent)]
    Bag(#[from] BagError),

    #[error("topic '{topic}' carries {found} messages, expected {expected}")]
    UnexpectedMessage {
        topic: String,
        expected: &'static str,
        found: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, LoaderError>;

/// Load up to `count` segmentation images starting at message `index`.
pub fn load_image_window(
    reader: &mut BagReader,
    topic: &str,
    index: usize,
    count: usize,
) -> Result<Vec<Image>> {
    reader
        .read_topic(topic, index, count)?
        .into_iter()
        .map(|record| {
            let kind = record.message.kind();
            record
                .message
                .into_image()
                .ok_or_else(|| LoaderError::UnexpectedMessage {
                    topic: topic.to_string(),
                    expected: "Image",
                    found: kind,
                })
        })
        .collect()
}

/// Load up to `count` point clouds starting at message `index`.
pub fn load_cloud_window(
    reader: &mut BagReader,
    topic: &str,
    index: usize,
    count: usize,
) -> Result<Vec<PointCloud2>> {
    reader
        .read_topic(topic, index, count)?
        .into_iter()
        .map(|record| {
            let kind = record.message.kind();
            record
                .message
                .into_point_cloud()
                .ok_or_else(|| LoaderError::UnexpectedMessage {
                    topic: topic.to_string(),
                    expected: "PointCloud2",
                    found: kind,
                })
        })
        .collect()
}
