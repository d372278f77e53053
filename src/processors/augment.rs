//! Per-rig frame extraction and point augmentation.
//!
//! Each depth+color point is gated by distance, projected into the rig's
//! segmentation image, thinned by the row mask, moved into the drone frame
//! and tagged with the class id of the pixel it lands on.

use log::{debug, warn};
use nalgebra::{Matrix3x4, Matrix4, Vector4};
use serde::Serialize;
use thiserror::Error;

use crate::config::{
    Association, CameraConfig, OutOfBoundsPolicy, PipelineConfig, ProjectionMode, RigConfig,
};
use crate::core::bag::BagReader;
use crate::core::cloud::{read_points, AugmentedPoint, CloudError, RawPoint};
use crate::core::color::{encode_rgba, unpack_rgb};
use crate::core::loaders::{load_cloud_window, load_image_window, LoaderError};
use crate::core::messages::{Image, PointCloud2};
use crate::core::transforms::{
    project, squared_distance, to_pixel, transform_point, DistanceFilter,
};

use super::labels::SegmentationColorTable;
use super::subsample::SubsampleMask;

/// Errors that can occur while augmenting one rig.
#[derive(Error, Debug)]
pub enum AugmentError {
    #[error("rig '{rig}' has point clouds but no images on '{topic}' in window {index}")]
    MissingImages {
        rig: String,
        topic: String,
        index: usize,
    },

    #[error("image at {stamp_ns} ns holds {len} bytes, pixel ({u}, {v}) needs {needed}")]
    ImageTooShort {
        stamp_ns: u64,
        u: i64,
        v: i64,
        needed: usize,
        len: usize,
    },

    #[error("rig '{rig}' projected a point to ({u}, {v}), outside the {width}x{height} image")]
    PixelOutOfBounds {
        rig: String,
        u: i64,
        v: i64,
        width: u32,
        height: u32,
    },

    #[error("malformed point cloud at {stamp_ns} ns: {source}")]
    Cloud {
        stamp_ns: u64,
        #[source]
        source: CloudError,
    },

    #[error(transparent)]
    Loader(#[from] LoaderError),
}

pub type Result<T> = std::result::Result<T, AugmentError>;

/// Walks forward through a window's image stamps, one cloud frame at a time.
///
/// The cursor never moves backward and never passes the last image.
#[derive(Debug, Clone)]
pub struct ImageAssociator {
    cursor: usize,
    rule: Association,
}

impl ImageAssociator {
    pub fn new(rule: Association) -> Self {
        Self { cursor: 0, rule }
    }

    /// Advance for a frame stamped `stamp_ns` and return the chosen image index.
    pub fn advance(&mut self, image_stamps: &[u64], stamp_ns: u64) -> usize {
        let last = image_stamps.len().saturating_sub(1);
        match self.rule {
            Association::Preceding => {
                while self.cursor < last && image_stamps[self.cursor + 1] <= stamp_ns {
                    self.cursor += 1;
                }
            }
            Association::Following => {
                while self.cursor < last && image_stamps[self.cursor] < stamp_ns {
                    self.cursor += 1;
                }
            }
        }
        self.cursor
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

/// Where the points of one frame went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    pub input_points: usize,
    /// Failed the distance gate or had no usable depth
    pub rejected_distance: usize,
    pub rejected_bounds: usize,
    pub rejected_mask: usize,
    pub kept_points: usize,
    /// Kept points with a nonzero class id
    pub labeled_points: usize,
}

/// One augmented depth frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedFrame {
    pub stamp_ns: u64,
    pub points: Vec<AugmentedPoint>,
    pub stats: FrameStats,
}

/// Every frame one rig produced for one window, in recording order.
#[derive(Debug, Clone, PartialEq)]
pub struct RigWindow {
    pub rig: String,
    pub frames: Vec<AugmentedFrame>,
}

impl RigWindow {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Augments the frames of a single rig.
pub struct RigAugmenter<'a> {
    rig: &'a RigConfig,
    camera: &'a CameraConfig,
    table: &'a SegmentationColorTable,
    mask: &'a SubsampleMask,
    intrinsics: Matrix3x4<f64>,
    extrinsic: Matrix4<f64>,
    filter: DistanceFilter,
    mode: ProjectionMode,
    out_of_bounds: OutOfBoundsPolicy,
    association: Association,
}

impl<'a> RigAugmenter<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        rig: &'a RigConfig,
        table: &'a SegmentationColorTable,
        mask: &'a SubsampleMask,
    ) -> Self {
        Self {
            rig,
            camera: &config.camera,
            table,
            mask,
            intrinsics: config.camera.intrinsic_matrix(),
            extrinsic: rig.extrinsic_matrix(),
            filter: DistanceFilter::new(config.filter.distance_min, config.filter.distance_max),
            mode: config.projection.mode,
            out_of_bounds: config.projection.out_of_bounds,
            association: config.sync.association,
        }
    }

    /// Augment one point against its segmentation image.
    ///
    /// Returns `Ok(None)` for points that are filtered out.
    pub fn augment_point(
        &self,
        point: &RawPoint,
        image: &Image,
        stats: &mut FrameStats,
    ) -> Result<Option<AugmentedPoint>> {
        let (x, y, z) = (point.x as f64, point.y as f64, point.z as f64);

        if !self.filter.accepts(squared_distance(x, y, z)) {
            stats.rejected_distance += 1;
            return Ok(None);
        }

        let w = match self.mode {
            ProjectionMode::Homogeneous => 1.0,
            ProjectionMode::PackedColor => point.rgb as f64,
        };
        let Some(image_coordinates) = project(&self.intrinsics, &Vector4::new(x, y, z, w)) else {
            stats.rejected_distance += 1;
            return Ok(None);
        };
        let (mut u, mut v) = to_pixel(image_coordinates);

        let width = self.camera.width as i64;
        let height = self.camera.height as i64;
        if u < 0 || u >= width || v < 0 || v >= height {
            match self.out_of_bounds {
                OutOfBoundsPolicy::Skip => {
                    stats.rejected_bounds += 1;
                    return Ok(None);
                }
                OutOfBoundsPolicy::Clamp => {
                    u = u.clamp(0, width - 1);
                    v = v.clamp(0, height - 1);
                }
                OutOfBoundsPolicy::Fail => {
                    return Err(AugmentError::PixelOutOfBounds {
                        rig: self.rig.name.clone(),
                        u,
                        v,
                        width: self.camera.width,
                        height: self.camera.height,
                    });
                }
            }
        }

        if !self.mask.contains(v) {
            stats.rejected_mask += 1;
            return Ok(None);
        }

        let [dx, dy, dz] = transform_point(&self.extrinsic, [x, y, z]);
        let rgb = unpack_rgb(point.rgb);

        let offset = 3 * (u as usize + v as usize * self.camera.width as usize);
        let pixel = image
            .data
            .get(offset..offset + 3)
            .ok_or(AugmentError::ImageTooShort {
                stamp_ns: image.header.stamp_ns,
                u,
                v,
                needed: offset + 3,
                len: image.data.len(),
            })?;
        let label = self.table.lookup([pixel[0], pixel[1], pixel[2]]);

        stats.kept_points += 1;
        if label != 0 {
            stats.labeled_points += 1;
        }

        Ok(Some(AugmentedPoint::new(
            dx as f32,
            dy as f32,
            dz as f32,
            encode_rgba(rgb, label),
        )))
    }

    /// Augment every point of a cloud against one image.
    pub fn augment_frame(&self, cloud: &PointCloud2, image: &Image) -> Result<AugmentedFrame> {
        let stamp_ns = cloud.header.stamp_ns;
        let raw = read_points(cloud).map_err(|source| AugmentError::Cloud { stamp_ns, source })?;

        let mut stats = FrameStats {
            input_points: raw.len(),
            ..FrameStats::default()
        };
        let mut points = Vec::new();
        for point in &raw {
            if let Some(augmented) = self.augment_point(point, image, &mut stats)? {
                points.push(augmented);
            }
        }

        Ok(AugmentedFrame {
            stamp_ns,
            points,
            stats,
        })
    }

    /// Read and augment up to `window_size` clouds starting at cloud `index`.
    pub fn extract_window(
        &self,
        reader: &mut BagReader,
        index: usize,
        window_size: usize,
    ) -> Result<RigWindow> {
        let clouds = load_cloud_window(reader, &self.rig.cloud_topic, index, window_size)?;
        if clouds.is_empty() {
            return Ok(RigWindow {
                rig: self.rig.name.clone(),
                frames: Vec::new(),
            });
        }

        let images = load_image_window(reader, &self.rig.segmentation_topic, index, window_size)?;
        if images.is_empty() {
            return Err(AugmentError::MissingImages {
                rig: self.rig.name.clone(),
                topic: self.rig.segmentation_topic.clone(),
                index,
            });
        }
        for problem in self.image_format_problems(&images[0]) {
            warn!("Rig '{}': {}", self.rig.name, problem);
        }

        let image_stamps: Vec<u64> = images.iter().map(|img| img.header.stamp_ns).collect();
        let mut associator = ImageAssociator::new(self.association);

        let mut frames = Vec::with_capacity(clouds.len());
        for cloud in &clouds {
            let image_index = associator.advance(&image_stamps, cloud.header.stamp_ns);
            frames.push(self.augment_frame(cloud, &images[image_index])?);
        }

        debug!(
            "Rig '{}' window {}: {} clouds, {} images, {} points kept",
            self.rig.name,
            index,
            clouds.len(),
            images.len(),
            frames.iter().map(|f| f.points.len()).sum::<usize>()
        );

        Ok(RigWindow {
            rig: self.rig.name.clone(),
            frames,
        })
    }

    /// Ways a segmentation image departs from what the lookup assumes.
    fn image_format_problems(&self, image: &Image) -> Vec<String> {
        let mut problems = Vec::new();
        if image.width != self.camera.width || image.height != self.camera.height {
            problems.push(format!(
                "images are {}x{} but the camera is configured as {}x{}",
                image.width, image.height, self.camera.width, self.camera.height
            ));
        }
        // Palette keys are bgr8 byte triples.
        if image.encoding != "bgr8" {
            problems.push(format!(
                "image encoding is '{}', labels are looked up as bgr8",
                image.encoding
            ));
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bag::test_fixtures::{CLASS_ONE_COLOR, FRAME_PERIOD_NS, POINT_RGB, START_NS};
    use crate::core::bag::BagTestFixture;
    use crate::core::cloud::create_raw_cloud;
    use crate::core::color::{decode_rgba, pack_rgb};
    use crate::core::messages::Header;

    const EPS: f32 = 1e-5;

    struct Setup {
        config: PipelineConfig,
        table: SegmentationColorTable,
        mask: SubsampleMask,
    }

    impl Setup {
        fn new(config: PipelineConfig) -> Self {
            let table = SegmentationColorTable::from_entries(&config.labels);
            let mask = SubsampleMask::from_config(config.camera.height, &config.subsample);
            Self {
                config,
                table,
                mask,
            }
        }

        fn augmenter(&self, rig: usize) -> RigAugmenter<'_> {
            RigAugmenter::new(&self.config, &self.config.rigs[rig], &self.table, &self.mask)
        }
    }

    fn class_one_image() -> Image {
        Image::filled_bgr8(Header::new(0, "seg"), 640, 480, CLASS_ONE_COLOR)
    }

    fn point(x: f32, y: f32, z: f32) -> RawPoint {
        RawPoint::new(x, y, z, pack_rgb(POINT_RGB))
    }

    #[test]
    fn test_on_mask_point_is_labeled_and_transformed() {
        let setup = Setup::new(PipelineConfig::default());
        let augmenter = setup.augmenter(0);
        let mut stats = FrameStats::default();

        let p = augmenter
            .augment_point(&point(0.0, -5.9375, 10.0), &class_one_image(), &mut stats)
            .unwrap()
            .unwrap();

        // Front rig: optical z is drone x, optical -y is drone z.
        assert!((p.x - 10.0).abs() < EPS);
        assert!(p.y.abs() < EPS);
        assert!((p.z - 5.9375).abs() < EPS);
        assert_eq!(p.rgba >> 24, 7);
        assert_eq!(decode_rgba(p.rgba), [30, 20, 10, 7]);
        assert_eq!(stats.kept_points, 1);
        assert_eq!(stats.labeled_points, 1);
    }

    #[test]
    fn test_off_mask_point_is_dropped() {
        let setup = Setup::new(PipelineConfig::default());
        let augmenter = setup.augmenter(0);
        let mut stats = FrameStats::default();

        // v = 400, between sampled rows 399 and 405.
        let kept = augmenter
            .augment_point(&point(0.0, 5.0, 10.0), &class_one_image(), &mut stats)
            .unwrap();
        assert!(kept.is_none());
        assert_eq!(stats.rejected_mask, 1);
    }

    #[test]
    fn test_distance_gate() {
        let setup = Setup::new(PipelineConfig::default());
        let augmenter = setup.augmenter(0);
        let image = class_one_image();
        let mut stats = FrameStats::default();

        for p in [
            point(0.0, 0.0, 2.0),
            point(0.0, 0.0, 60.0),
            point(f32::NAN, 0.0, 10.0),
            point(0.0, 0.0, f32::INFINITY),
        ] {
            assert!(augmenter.augment_point(&p, &image, &mut stats).unwrap().is_none());
        }
        assert_eq!(stats.rejected_distance, 4);
    }

    #[test]
    fn test_near_bound_is_inclusive() {
        let setup = Setup::new(PipelineConfig::default());
        let augmenter = setup.augmenter(0);
        let mut stats = FrameStats::default();

        // d² = 1 + 1 + 4 = 6 passes the gate and lands on row 400.
        let kept = augmenter
            .augment_point(&point(1.0, 1.0, 2.0), &class_one_image(), &mut stats)
            .unwrap();
        assert!(kept.is_none());
        assert_eq!(stats.rejected_distance, 0);
        assert_eq!(stats.rejected_mask, 1);
    }

    #[test]
    fn test_image_format_problems() {
        let setup = Setup::new(PipelineConfig::default());
        let augmenter = setup.augmenter(0);

        assert!(augmenter.image_format_problems(&class_one_image()).is_empty());

        let small = Image::filled_bgr8(Header::default(), 320, 240, CLASS_ONE_COLOR);
        let problems = augmenter.image_format_problems(&small);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("320x240"));

        let mut rgb = class_one_image();
        rgb.encoding = "rgb8".to_string();
        let problems = augmenter.image_format_problems(&rgb);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("rgb8"));
    }

    #[test]
    fn test_unmapped_pixel_gives_label_zero() {
        let setup = Setup::new(PipelineConfig::default());
        let augmenter = setup.augmenter(0);
        let image = Image::filled_bgr8(Header::default(), 640, 480, [1, 2, 3]);
        let mut stats = FrameStats::default();

        let p = augmenter
            .augment_point(&point(0.0, -5.9375, 10.0), &image, &mut stats)
            .unwrap()
            .unwrap();
        assert_eq!(p.rgba >> 24, 0);
        assert_eq!(stats.kept_points, 1);
        assert_eq!(stats.labeled_points, 0);
    }

    #[test]
    fn test_pixel_offset_uses_row_major_layout() {
        let setup = Setup::new(PipelineConfig::default());
        let augmenter = setup.augmenter(0);
        let mut image = Image::filled_bgr8(Header::default(), 640, 480, [0, 1, 0]);
        // (2, -5.9375, 10) lands on u = 384, v = 50.
        let offset = 3 * (384 + 50 * 640);
        image.data[offset..offset + 3].copy_from_slice(&[158, 253, 220]);
        let mut stats = FrameStats::default();

        let p = augmenter
            .augment_point(&point(2.0, -5.9375, 10.0), &image, &mut stats)
            .unwrap()
            .unwrap();
        assert_eq!(p.rgba >> 24, 34 * 7);
    }

    #[test]
    fn test_out_of_bounds_policies() {
        // u = 960 falls right of the image.
        let far_right = point(20.0, -5.9375, 10.0);
        let image = class_one_image();

        let setup = Setup::new(PipelineConfig::default());
        let mut stats = FrameStats::default();
        let skipped = setup.augmenter(0).augment_point(&far_right, &image, &mut stats);
        assert!(skipped.unwrap().is_none());
        assert_eq!(stats.rejected_bounds, 1);

        let mut config = PipelineConfig::default();
        config.projection.out_of_bounds = OutOfBoundsPolicy::Clamp;
        let setup = Setup::new(config);
        let clamped = setup
            .augmenter(0)
            .augment_point(&far_right, &image, &mut FrameStats::default())
            .unwrap();
        assert!(clamped.is_some());

        let mut config = PipelineConfig::default();
        config.projection.out_of_bounds = OutOfBoundsPolicy::Fail;
        let setup = Setup::new(config);
        let failed = setup
            .augmenter(0)
            .augment_point(&far_right, &image, &mut FrameStats::default());
        assert!(matches!(
            failed,
            Err(AugmentError::PixelOutOfBounds { u: 960, v: 50, .. })
        ));
    }

    #[test]
    fn test_short_image_is_reported() {
        let setup = Setup::new(PipelineConfig::default());
        let image = Image::filled_bgr8(Header::default(), 2, 2, CLASS_ONE_COLOR);
        let result = setup.augmenter(0).augment_point(
            &point(0.0, -5.9375, 10.0),
            &image,
            &mut FrameStats::default(),
        );
        assert!(matches!(result, Err(AugmentError::ImageTooShort { .. })));
    }

    #[test]
    fn test_packed_color_mode_matches_homogeneous() {
        let mut config = PipelineConfig::default();
        config.projection.mode = ProjectionMode::PackedColor;
        let setup = Setup::new(config);
        let kept = setup
            .augmenter(0)
            .augment_point(
                &point(0.0, -5.9375, 10.0),
                &class_one_image(),
                &mut FrameStats::default(),
            )
            .unwrap();
        assert!(kept.is_some());
    }

    #[test]
    fn test_augment_frame_stats() {
        let setup = Setup::new(PipelineConfig::default());
        let points = vec![
            point(0.0, -5.9375, 10.0),
            point(0.0, 5.0, 10.0),
            point(0.0, 0.0, 60.0),
        ];
        let cloud = create_raw_cloud(Header::new(77, "cam"), &points);

        let frame = setup
            .augmenter(1)
            .augment_frame(&cloud, &class_one_image())
            .unwrap();

        assert_eq!(frame.stamp_ns, 77);
        assert_eq!(frame.points.len(), 1);
        assert_eq!(
            frame.stats,
            FrameStats {
                input_points: 3,
                rejected_distance: 1,
                rejected_bounds: 0,
                rejected_mask: 1,
                kept_points: 1,
                labeled_points: 1,
            }
        );
    }

    #[test]
    fn test_malformed_cloud_is_reported() {
        let setup = Setup::new(PipelineConfig::default());
        let mut cloud = create_raw_cloud(Header::new(5, "cam"), &[point(0.0, 0.0, 10.0)]);
        cloud.fields.retain(|f| f.name != "x");

        let result = setup.augmenter(0).augment_frame(&cloud, &class_one_image());
        assert!(matches!(
            result,
            Err(AugmentError::Cloud {
                stamp_ns: 5,
                source: CloudError::MissingField(_)
            })
        ));
    }

    #[test]
    fn test_associator_preceding() {
        let stamps = [10, 20, 30];
        let mut assoc = ImageAssociator::new(Association::Preceding);
        assert_eq!(assoc.advance(&stamps, 5), 0);
        assert_eq!(assoc.advance(&stamps, 15), 0);
        assert_eq!(assoc.advance(&stamps, 20), 1);
        // Never moves backward.
        assert_eq!(assoc.advance(&stamps, 12), 1);
        assert_eq!(assoc.advance(&stamps, 1_000), 2);
    }

    #[test]
    fn test_associator_following() {
        let stamps = [10, 20, 30];
        let mut assoc = ImageAssociator::new(Association::Following);
        assert_eq!(assoc.advance(&stamps, 10), 0);
        assert_eq!(assoc.advance(&stamps, 15), 1);
        assert_eq!(assoc.advance(&stamps, 20), 1);
        assert_eq!(assoc.advance(&stamps, 25), 2);
        assert_eq!(assoc.advance(&stamps, 1_000), 2);
        assert_eq!(assoc.cursor(), 2);
    }

    #[test]
    fn test_associator_empty_and_single() {
        let mut assoc = ImageAssociator::new(Association::Preceding);
        assert_eq!(assoc.advance(&[], 100), 0);
        assert_eq!(assoc.advance(&[50], 100), 0);
    }

    #[test]
    fn test_extract_window_from_bag() {
        let fixture = BagTestFixture::synchronized(3);
        let setup = Setup::new(PipelineConfig::default());
        let augmenter = setup.augmenter(2);
        let mut reader = BagReader::open(fixture.path()).unwrap();

        let window = augmenter.extract_window(&mut reader, 0, 2).unwrap();
        assert_eq!(window.rig, "right");
        assert_eq!(window.len(), 2);
        assert_eq!(window.frames[0].stamp_ns, START_NS);
        assert_eq!(window.frames[1].stamp_ns, START_NS + FRAME_PERIOD_NS);
        assert!(window.frames.iter().all(|f| f.points.len() == 1));

        let tail = augmenter.extract_window(&mut reader, 2, 2).unwrap();
        assert_eq!(tail.len(), 1);

        let past_end = augmenter.extract_window(&mut reader, 3, 2).unwrap();
        assert!(past_end.is_empty());
    }

    #[test]
    fn test_extract_window_without_images() {
        let fixture = BagTestFixture::synchronized(2);
        let mut config = PipelineConfig::default();
        config.rigs[0].segmentation_topic = "/airsim_drone/Missing_cam".to_string();
        let setup = Setup::new(config);
        let mut reader = BagReader::open(fixture.path()).unwrap();

        let result = setup.augmenter(0).extract_window(&mut reader, 0, 2);
        assert!(matches!(result, Err(AugmentError::MissingImages { index: 0, .. })));
    }
}
