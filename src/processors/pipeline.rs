//! Windowed augmentation of a whole recording.
//!
//! The input is read in windows of `window_size` clouds per rig. Every window
//! is augmented per rig, merged across rigs and written to the output bag.
//! The loop ends after the first window that yields fewer frames than
//! requested; the transform stream is then copied over.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::config::{ConfigError, PipelineConfig};
use crate::core::bag::{BagError, BagInfo, BagReader, BagWriter};
use crate::core::cloud::create_cloud;
use crate::core::messages::{Header, Message};
use crate::core::writers::WriteError;

use super::augment::{AugmentError, RigAugmenter, RigWindow};
use super::labels::SegmentationColorTable;
use super::merge::{common_frame_count, merge_windows, MergeError, MergedFrame};
use super::subsample::SubsampleMask;

/// Errors that can occur while running the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("bag error: {0}")]
    Bag(#[from] BagError),

    #[error("window {index}: {source}")]
    Augment {
        index: usize,
        #[source]
        source: AugmentError,
    },

    #[error("window {index}: {source}")]
    Merge {
        index: usize,
        #[source]
        source: MergeError,
    },

    #[error(transparent)]
    Write(#[from] WriteError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// One row of the per-frame statistics report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameReport {
    pub window: usize,
    pub frame: usize,
    pub rig: String,
    pub stamp_ns: u64,
    pub input_points: usize,
    pub rejected_distance: usize,
    pub rejected_bounds: usize,
    pub rejected_mask: usize,
    pub kept_points: usize,
    pub labeled_points: usize,
}

/// Immutable result of one processed window.
#[derive(Debug, Clone)]
pub struct WindowResult {
    /// First cloud index of the window
    pub index: usize,
    /// Frames asked of every rig
    pub requested: usize,
    pub frames: Vec<MergedFrame>,
    pub reports: Vec<FrameReport>,
}

impl WindowResult {
    /// A short window means at least one rig ran out of frames.
    pub fn is_last(&self) -> bool {
        self.frames.len() < self.requested
    }

    pub fn point_count(&self) -> usize {
        self.frames.iter().map(|f| f.points.len()).sum()
    }
}

/// Totals of a completed run.
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub input: PathBuf,
    pub windows: usize,
    pub frames_written: usize,
    pub points_written: usize,
    pub labeled_points: usize,
    pub tf_messages: usize,
    pub output: BagInfo,
    pub reports: Vec<FrameReport>,
}

/// The augmentation pipeline for one configuration.
pub struct Pipeline {
    config: PipelineConfig,
    table: SegmentationColorTable,
    mask: SubsampleMask,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let table = SegmentationColorTable::from_entries(&config.labels);
        let mask = SubsampleMask::from_config(config.camera.height, &config.subsample);
        info!(
            "Pipeline ready: {} rigs, {} label colors, {} sampled rows, window {}",
            config.rigs.len(),
            table.len(),
            mask.sampled_rows().len(),
            config.window_size
        );

        Ok(Self {
            config,
            table,
            mask,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn augmenters(&self) -> Vec<RigAugmenter<'_>> {
        self.config
            .rigs
            .iter()
            .map(|rig| RigAugmenter::new(&self.config, rig, &self.table, &self.mask))
            .collect()
    }

    /// Augment and merge the window starting at cloud `index`.
    pub fn process_window(&self, reader: &mut BagReader, index: usize) -> Result<WindowResult> {
        let requested = self.config.window_size;

        let mut rig_windows = Vec::with_capacity(self.config.rigs.len());
        for augmenter in self.augmenters() {
            let window = augmenter
                .extract_window(reader, index, requested)
                .map_err(|source| PipelineError::Augment { index, source })?;
            rig_windows.push(window);
        }

        let frames = merge_windows(
            &rig_windows,
            self.config.sync.tolerance_ns(),
            self.config.sync.count_mismatch,
        )
        .map_err(|source| PipelineError::Merge { index, source })?;

        let reports = frame_reports(index, &rig_windows);
        debug!(
            "Window {}: {} of {} frames merged",
            index,
            frames.len(),
            requested
        );

        Ok(WindowResult {
            index,
            requested,
            frames,
            reports,
        })
    }

    /// Iterate over windows until one comes back short or an error occurs.
    pub fn windows<'a>(&'a self, reader: &'a mut BagReader) -> Windows<'a> {
        Windows {
            pipeline: self,
            reader,
            next_index: 0,
            finished: false,
        }
    }

    /// Process `input` into `output`, calling `observer` after every window.
    pub fn run<F>(&self, input: &Path, output: &Path, mut observer: F) -> Result<PipelineSummary>
    where
        F: FnMut(&WindowResult),
    {
        let mut reader = BagReader::open(input)?;
        let mut writer = BagWriter::create(output)?;
        let output_config = &self.config.output;

        let mut windows = 0;
        let mut frames_written = 0;
        let mut points_written = 0;
        let mut labeled_points = 0;
        let mut reports = Vec::new();

        for window in self.windows(&mut reader) {
            let window = window?;
            for frame in &window.frames {
                let mut header = Header::new(frame.stamp_ns, output_config.frame_id.as_str());
                header.seq = frames_written as u32;
                let cloud = create_cloud(header, &frame.points);
                writer.write(
                    &output_config.output_topic,
                    frame.stamp_ns,
                    &Message::PointCloud2(cloud),
                )?;
                frames_written += 1;
                points_written += frame.points.len();
            }

            observer(&window);
            windows += 1;
            labeled_points += window.reports.iter().map(|r| r.labeled_points).sum::<usize>();
            reports.extend(window.reports);
        }

        let tf_messages = copy_transforms(&mut reader, &mut writer, &output_config.tf_topic)?;
        let output_info = writer.finish()?;

        info!(
            "Wrote {} frames ({} points) and {} transforms to {}",
            frames_written,
            points_written,
            tf_messages,
            output.display()
        );

        Ok(PipelineSummary {
            input: input.to_path_buf(),
            windows,
            frames_written,
            points_written,
            labeled_points,
            tf_messages,
            output: output_info,
            reports,
        })
    }
}

/// Window iterator returned by [`Pipeline::windows`].
pub struct Windows<'a> {
    pipeline: &'a Pipeline,
    reader: &'a mut BagReader,
    next_index: usize,
    finished: bool,
}

impl Iterator for Windows<'_> {
    type Item = Result<WindowResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let result = self.pipeline.process_window(self.reader, self.next_index);
        match &result {
            Ok(window) if !window.is_last() => {
                self.next_index += window.requested;
            }
            _ => self.finished = true,
        }
        Some(result)
    }
}

fn frame_reports(index: usize, rig_windows: &[RigWindow]) -> Vec<FrameReport> {
    let count = common_frame_count(rig_windows);
    let mut reports = Vec::with_capacity(count * rig_windows.len());

    for frame in 0..count {
        for window in rig_windows {
            let augmented = &window.frames[frame];
            let stats = augmented.stats;
            reports.push(FrameReport {
                window: index,
                frame: index + frame,
                rig: window.rig.clone(),
                stamp_ns: augmented.stamp_ns,
                input_points: stats.input_points,
                rejected_distance: stats.rejected_distance,
                rejected_bounds: stats.rejected_bounds,
                rejected_mask: stats.rejected_mask,
                kept_points: stats.kept_points,
                labeled_points: stats.labeled_points,
            });
        }
    }

    reports
}

/// Copy every message of `topic`, keyed by its own stamp. Transform batches
/// without transforms keep their record time.
fn copy_transforms(reader: &mut BagReader, writer: &mut BagWriter, topic: &str) -> Result<usize> {
    let mut copied = 0;
    let mut unstamped = 0;

    for record in reader.topic_iter(topic) {
        let record = record?;
        let time_ns = match record.message.stamp_ns() {
            Some(stamp) => stamp,
            None => {
                unstamped += 1;
                record.time_ns
            }
        };
        writer.write(topic, time_ns, &record.message)?;
        copied += 1;
    }

    if unstamped > 0 {
        warn!(
            "{} messages on '{}' carried no transforms and kept their record time",
            unstamped, topic
        );
    }
    Ok(copied)
}
