//! Configuration types for the augmentation pipeline.

use std::path::{Path, PathBuf};

use nalgebra::{Matrix3x4, Matrix4};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::transforms::{intrinsic_matrix, rigid_transform};

/// Errors raised while loading or validating a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Pinhole camera shared by every rig.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Image width in pixels
    #[serde(default = "default_image_width")]
    pub width: u32,

    /// Image height in pixels
    #[serde(default = "default_image_height")]
    pub height: u32,

    #[serde(default = "default_focal")]
    pub fx: f64,

    #[serde(default = "default_focal")]
    pub fy: f64,

    #[serde(default = "default_cx")]
    pub cx: f64,

    #[serde(default = "default_cy")]
    pub cy: f64,
}

fn default_image_width() -> u32 {
    640
}

fn default_image_height() -> u32 {
    480
}

// Both focal lengths are half the image width (90 degree horizontal FOV).
fn default_focal() -> f64 {
    default_image_width() as f64 / 2.0
}

fn default_cx() -> f64 {
    default_image_width() as f64 / 2.0
}

fn default_cy() -> f64 {
    default_image_height() as f64 / 2.0
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: default_image_width(),
            height: default_image_height(),
            fx: default_focal(),
            fy: default_focal(),
            cx: default_cx(),
            cy: default_cy(),
        }
    }
}

impl CameraConfig {
    /// 3x4 projection matrix `[K | 0]`.
    pub fn intrinsic_matrix(&self) -> Matrix3x4<f64> {
        intrinsic_matrix(self.fx, self.fy, self.cx, self.cy)
    }
}

/// One camera rig: a segmentation camera paired with a depth+color cloud.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigConfig {
    /// Human readable rig name used in logs and reports
    pub name: String,

    /// Segmentation image topic
    pub segmentation_topic: String,

    /// Depth+color point cloud topic
    pub cloud_topic: String,

    /// Sensor-to-drone rotation as a quaternion `[x, y, z, w]`
    pub rotation: [f64; 4],

    /// Sensor-to-drone translation in meters
    #[serde(default)]
    pub translation: [f64; 3],
}

impl RigConfig {
    pub fn new(
        name: &str,
        segmentation_topic: &str,
        cloud_topic: &str,
        rotation: [f64; 4],
    ) -> Self {
        Self {
            name: name.to_string(),
            segmentation_topic: segmentation_topic.to_string(),
            cloud_topic: cloud_topic.to_string(),
            rotation,
            translation: [0.0; 3],
        }
    }

    /// 4x4 homogeneous transform from the sensor frame to the drone frame.
    pub fn extrinsic_matrix(&self) -> Matrix4<f64> {
        rigid_transform(self.rotation, self.translation)
    }
}

fn default_rigs() -> Vec<RigConfig> {
    vec![
        RigConfig::new(
            "front",
            "/airsim_drone/Seg_cam",
            "/airsim_drone/RGBD_cam",
            [0.5, -0.5, 0.5, -0.5],
        ),
        RigConfig::new(
            "left",
            "/airsim_drone/Left_Seg_cam",
            "/airsim_drone/RGBD3_cam",
            [-0.707, 0.0, 0.0, 0.707],
        ),
        RigConfig::new(
            "right",
            "/airsim_drone/Right_Seg_cam",
            "/airsim_drone/RGBD4_cam",
            [0.0, 0.707, -0.707, 0.0],
        ),
    ]
}

/// Squared-distance gate applied before projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Points must satisfy `d² >= distance_min` (squared meters)
    #[serde(default = "default_distance_min")]
    pub distance_min: f64,

    /// Points must satisfy `d² <= distance_max` (squared meters)
    #[serde(default = "default_distance_max")]
    pub distance_max: f64,
}

fn default_distance_min() -> f64 {
    6.0
}

fn default_distance_max() -> f64 {
    2500.0
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            distance_min: default_distance_min(),
            distance_max: default_distance_max(),
        }
    }
}

/// Row subsampling of the projected points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsampleConfig {
    /// Rows excluded at the top and bottom of the image
    #[serde(default = "default_subsample_margin")]
    pub subsample_margin: u32,

    /// Number of evenly spaced rows kept between the margins
    #[serde(default = "default_subsample_count")]
    pub subsample_count: u32,
}

fn default_subsample_margin() -> u32 {
    50
}

fn default_subsample_count() -> u32 {
    64
}

impl Default for SubsampleConfig {
    fn default() -> Self {
        Self {
            subsample_margin: default_subsample_margin(),
            subsample_count: default_subsample_count(),
        }
    }
}

/// How a point cloud frame picks its segmentation image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Association {
    /// Latest image stamped at or before the cloud.
    Preceding,
    /// First image stamped at or after the cloud.
    Following,
}

/// What to do when rigs yield different frame counts in one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountMismatchPolicy {
    Drop,
    Warn,
    Fail,
}

/// Cross-rig synchronisation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Pairwise stamp difference must be strictly below this, in milliseconds
    #[serde(default = "default_tolerance_ms")]
    pub tolerance_ms: f64,

    #[serde(default = "default_association")]
    pub association: Association,

    #[serde(default = "default_count_mismatch")]
    pub count_mismatch: CountMismatchPolicy,
}

fn default_tolerance_ms() -> f64 {
    10.0
}

fn default_association() -> Association {
    Association::Preceding
}

fn default_count_mismatch() -> CountMismatchPolicy {
    CountMismatchPolicy::Warn
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tolerance_ms: default_tolerance_ms(),
            association: default_association(),
            count_mismatch: default_count_mismatch(),
        }
    }
}

impl SyncConfig {
    pub fn tolerance_ns(&self) -> u64 {
        (self.tolerance_ms * 1_000_000.0).round() as u64
    }
}

/// Fourth homogeneous component fed to the intrinsic matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionMode {
    /// `(x, y, z, 1)`
    Homogeneous,
    /// `(x, y, z, packed_rgb)`, as the original recordings were processed.
    /// Identical to `Homogeneous` while the matrix's last column is zero.
    PackedColor,
}

/// Handling of projections that land outside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfBoundsPolicy {
    Skip,
    Clamp,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    #[serde(default = "default_projection_mode")]
    pub mode: ProjectionMode,

    #[serde(default = "default_out_of_bounds")]
    pub out_of_bounds: OutOfBoundsPolicy,
}

fn default_projection_mode() -> ProjectionMode {
    ProjectionMode::Homogeneous
}

fn default_out_of_bounds() -> OutOfBoundsPolicy {
    OutOfBoundsPolicy::Skip
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            mode: default_projection_mode(),
            out_of_bounds: default_out_of_bounds(),
        }
    }
}

/// Output log layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Topic of the merged augmented clouds
    #[serde(default = "default_output_topic", alias = "output_topic_name")]
    pub output_topic: String,

    /// `frame_id` stamped on every merged cloud
    #[serde(default = "default_frame_id")]
    pub frame_id: String,

    /// Transform topic copied verbatim from input to output
    #[serde(default = "default_tf_topic")]
    pub tf_topic: String,
}

fn default_output_topic() -> String {
    "/augmented_cloud".to_string()
}

fn default_frame_id() -> String {
    "/airsim_drone".to_string()
}

fn default_tf_topic() -> String {
    "/tf".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_topic: default_output_topic(),
            frame_id: default_frame_id(),
            tf_topic: default_tf_topic(),
        }
    }
}

/// Input and output bag locations. Either may be overridden on the command line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default)]
    pub input: Option<PathBuf>,

    #[serde(default)]
    pub output: Option<PathBuf>,
}

/// One semantic class and the segmentation color that encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEntry {
    pub id: u8,
    /// Color bytes in the order they appear in the segmentation image
    pub color: [u8; 3],
}

impl LabelEntry {
    pub const fn new(id: u8, color: [u8; 3]) -> Self {
        Self { id, color }
    }
}

/// Built-in segmentation palette. 18 and 32 share a color; 32 comes last and wins.
pub const DEFAULT_LABELS: [LabelEntry; 23] = [
    LabelEntry::new(1, [42, 174, 203]),
    LabelEntry::new(2, [224, 172, 177]),
    LabelEntry::new(3, [145, 183, 160]),
    LabelEntry::new(4, [137, 241, 224]),
    LabelEntry::new(5, [132, 224, 232]),
    LabelEntry::new(6, [105, 64, 153]),
    LabelEntry::new(7, [227, 217, 179]),
    LabelEntry::new(8, [91, 214, 208]),
    LabelEntry::new(9, [219, 213, 192]),
    LabelEntry::new(10, [229, 90, 95]),
    LabelEntry::new(11, [248, 71, 170]),
    LabelEntry::new(12, [199, 173, 249]),
    LabelEntry::new(13, [205, 228, 85]),
    LabelEntry::new(14, [208, 160, 121]),
    LabelEntry::new(15, [180, 238, 141]),
    LabelEntry::new(16, [53, 246, 59]),
    LabelEntry::new(17, [50, 96, 227]),
    LabelEntry::new(18, [190, 247, 227]),
    LabelEntry::new(19, [0, 0, 0]),
    LabelEntry::new(31, [142, 190, 77]),
    LabelEntry::new(32, [190, 247, 227]),
    LabelEntry::new(33, [216, 254, 163]),
    LabelEntry::new(34, [158, 253, 220]),
];

fn default_labels() -> Vec<LabelEntry> {
    DEFAULT_LABELS.to_vec()
}

fn default_window_size() -> usize {
    100
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Frames read per rig per iteration
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default = "default_rigs")]
    pub rigs: Vec<RigConfig>,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub subsample: SubsampleConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub projection: ProjectionConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default = "default_labels")]
    pub labels: Vec<LabelEntry>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            paths: PathsConfig::default(),
            camera: CameraConfig::default(),
            rigs: default_rigs(),
            filter: FilterConfig::default(),
            subsample: SubsampleConfig::default(),
            sync: SyncConfig::default(),
            projection: ProjectionConfig::default(),
            output: OutputConfig::default(),
            labels: default_labels(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::Invalid("window_size must be positive".into()));
        }
        if self.rigs.is_empty() {
            return Err(ConfigError::Invalid("at least one rig is required".into()));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "camera size {}x{} is empty",
                self.camera.width, self.camera.height
            )));
        }
        if !(self.filter.distance_min < self.filter.distance_max) {
            return Err(ConfigError::Invalid(format!(
                "distance_min ({}) must be below distance_max ({})",
                self.filter.distance_min, self.filter.distance_max
            )));
        }
        if 2 * self.subsample.subsample_margin >= self.camera.height {
            return Err(ConfigError::Invalid(format!(
                "subsample_margin {} leaves no rows in a {} pixel image",
                self.subsample.subsample_margin, self.camera.height
            )));
        }
        if !(self.sync.tolerance_ms > 0.0) {
            return Err(ConfigError::Invalid("sync tolerance must be positive".into()));
        }
        for rig in &self.rigs {
            let norm_sq: f64 = rig.rotation.iter().map(|v| v * v).sum();
            if norm_sq < f64::EPSILON {
                return Err(ConfigError::Invalid(format!(
                    "rig '{}' has a zero rotation quaternion",
                    rig.name
                )));
            }
        }
        Ok(())
    }
}
