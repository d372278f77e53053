//! Semantic label augmentation for multi-rig depth point clouds.
//!
//! This crate provides tools for:
//! - Reading and writing bag recordings of images, point clouds and transforms
//! - Projecting depth points into segmentation images and decoding class ids
//! - Thinning clouds to a fixed set of scan rows
//! - Merging synchronized rigs into one labeled cloud per frame
//!
//! # Example
//!
//! ```no_run
//! use cloud_augment::{Pipeline, PipelineConfig};
//! use std::path::Path;
//!
//! let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
//! let summary = pipeline
//!     .run(Path::new("input.bag"), Path::new("augmented.bag"), |_| {})
//!     .unwrap();
//! println!("{} frames written", summary.frames_written);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{CameraConfig, PipelineConfig, RigConfig};
pub use crate::core::cloud::{AugmentedPoint, RawPoint};
pub use processors::{Pipeline, PipelineError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
