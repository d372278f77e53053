//! Augmentation stages, from label lookup to the windowed run loop.

pub mod augment;
pub mod labels;
pub mod merge;
pub mod pipeline;
pub mod subsample;

// Re-export key types for convenience
pub use augment::{
    AugmentError, AugmentedFrame, FrameStats, ImageAssociator, RigAugmenter, RigWindow,
};
pub use labels::SegmentationColorTable;
pub use merge::{merge_windows, MergeError, MergedFrame};
pub use pipeline::{FrameReport, Pipeline, PipelineError, PipelineSummary, WindowResult, Windows};
pub use subsample::SubsampleMask;
