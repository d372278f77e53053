//! Synthetic bag files for tests.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use super::writer::BagWriter;
use crate::config::{PipelineConfig, RigConfig};
use crate::core::cloud::{create_raw_cloud, RawPoint};
use crate::core::color::pack_rgb;
use crate::core::messages::{Header, Image, Message, TfMessage, TransformStamped};

/// Stamp of the first frame.
pub const START_NS: u64 = 1_000_000_000;

/// Spacing between consecutive frames (10 Hz).
pub const FRAME_PERIOD_NS: u64 = 100_000_000;

/// Segmentation color of class 1 in `bgr8` byte order.
pub const CLASS_ONE_COLOR: [u8; 3] = [42, 174, 203];

/// Sensor color of every synthetic point.
pub const POINT_RGB: [u8; 3] = [10, 20, 30];

/// Points of the default scene, in the sensor frame.
///
/// - `(0, -5.9375, 10)` projects to pixel `(320, 50)`, the first sampled row
/// - `(0, 0, 60)` is beyond the far gate
/// - `(0, 0, 2)` is inside the near gate
pub fn default_scene_points() -> Vec<RawPoint> {
    let rgb = pack_rgb(POINT_RGB);
    vec![
        RawPoint::new(0.0, -5.9375, 10.0, rgb),
        RawPoint::new(0.0, 0.0, 60.0, rgb),
        RawPoint::new(0.0, 0.0, 2.0, rgb),
    ]
}

/// Test fixture owning a temporary bag file.
///
/// The temporary directory is removed when the fixture is dropped.
pub struct BagTestFixture {
    temp_dir: TempDir,
    bag_path: PathBuf,
}

impl BagTestFixture {
    /// Three default rigs recording `frames` synchronized frames.
    pub fn synchronized(frames: usize) -> Self {
        Self::builder().frames(frames).build()
    }

    pub fn builder() -> BagFixtureBuilder {
        BagFixtureBuilder::default()
    }

    pub fn path(&self) -> &Path {
        &self.bag_path
    }

    /// A path inside the fixture's temporary directory.
    pub fn output_path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }
}

/// Builder for customised synthetic recordings.
pub struct BagFixtureBuilder {
    rigs: Vec<RigConfig>,
    frames: usize,
    offsets_ns: Vec<i64>,
    points: Vec<RawPoint>,
    image_color: [u8; 3],
    image_size: (u32, u32),
    missing_clouds: Vec<(usize, usize)>,
    with_tf: bool,
}

impl Default for BagFixtureBuilder {
    fn default() -> Self {
        Self {
            rigs: PipelineConfig::default().rigs,
            frames: 3,
            offsets_ns: Vec::new(),
            points: default_scene_points(),
            image_color: CLASS_ONE_COLOR,
            image_size: (640, 480),
            missing_clouds: Vec::new(),
            with_tf: true,
        }
    }
}

impl BagFixtureBuilder {
    pub fn rigs(mut self, rigs: Vec<RigConfig>) -> Self {
        self.rigs = rigs;
        self
    }

    pub fn frames(mut self, frames: usize) -> Self {
        self.frames = frames;
        self
    }

    /// Shift every stamp of rig `rig` by `offset_ns`.
    pub fn rig_offset(mut self, rig: usize, offset_ns: i64) -> Self {
        if self.offsets_ns.len() <= rig {
            self.offsets_ns.resize(rig + 1, 0);
        }
        self.offsets_ns[rig] = offset_ns;
        self
    }

    pub fn points(mut self, points: Vec<RawPoint>) -> Self {
        self.points = points;
        self
    }

    pub fn image_color(mut self, bgr: [u8; 3]) -> Self {
        self.image_color = bgr;
        self
    }

    pub fn image_size(mut self, width: u32, height: u32) -> Self {
        self.image_size = (width, height);
        self
    }

    /// Leave out the cloud of rig `rig` at frame `frame`.
    pub fn missing_cloud(mut self, rig: usize, frame: usize) -> Self {
        self.missing_clouds.push((rig, frame));
        self
    }

    pub fn without_tf(mut self) -> Self {
        self.with_tf = false;
        self
    }

    fn stamp(&self, rig: usize, frame: usize) -> u64 {
        let base = START_NS + frame as u64 * FRAME_PERIOD_NS;
        let offset = self.offsets_ns.get(rig).copied().unwrap_or(0);
        (base as i64 + offset) as u64
    }

    pub fn build(self) -> BagTestFixture {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let bag_path = temp_dir.path().join("synthetic.bag");
        let mut writer = BagWriter::create(&bag_path).expect("Failed to create writer");
        let (width, height) = self.image_size;

        for frame in 0..self.frames {
            for (index, rig) in self.rigs.iter().enumerate() {
                let stamp = self.stamp(index, frame);

                let image = Image::filled_bgr8(
                    Header::new(stamp, rig.segmentation_topic.as_str()),
                    width,
                    height,
                    self.image_color,
                );
                writer
                    .write(&rig.segmentation_topic, stamp, &Message::Image(image))
                    .expect("Failed to write image");

                if self.missing_clouds.contains(&(index, frame)) {
                    continue;
                }
                let cloud =
                    create_raw_cloud(Header::new(stamp, rig.cloud_topic.as_str()), &self.points);
                writer
                    .write(&rig.cloud_topic, stamp, &Message::PointCloud2(cloud))
                    .expect("Failed to write cloud");
            }

            if self.with_tf {
                let stamp = self.stamp(0, frame);
                let tf = TfMessage {
                    transforms: vec![TransformStamped {
                        header: Header::new(stamp, "world"),
                        child_frame_id: "/airsim_drone".to_string(),
                        translation: [frame as f64, 0.0, -2.0],
                        rotation: [0.0, 0.0, 0.0, 1.0],
                    }],
                };
                // Recorded slightly late so the record time differs from the stamp.
                writer
                    .write("/tf", stamp + 1_000, &Message::Tf(tf))
                    .expect("Failed to write tf");
            }
        }

        writer.finish().expect("Failed to finish bag");

        BagTestFixture { temp_dir, bag_path }
    }
}
