//! Geometric transforms used when projecting depth points into images.
//!
//! All math runs in `f64`; clouds store `f32` coordinates and are widened
//! on read.

use nalgebra::{Matrix3x4, Matrix4, Quaternion, UnitQuaternion, Vector3, Vector4};

/// Build the 3x4 pinhole projection matrix `[K | 0]`.
pub fn intrinsic_matrix(fx: f64, fy: f64, cx: f64, cy: f64) -> Matrix3x4<f64> {
    Matrix3x4::new(
        fx, 0.0, cx, 0.0, //
        0.0, fy, cy, 0.0, //
        0.0, 0.0, 1.0, 0.0,
    )
}

/// Build a 4x4 rigid transform from a quaternion `[x, y, z, w]` and a translation.
///
/// The quaternion is normalised first, so slightly off-unit values such as
/// `[-0.707, 0, 0, 0.707]` give a proper rotation. A (near) zero quaternion
/// yields the identity rotation.
pub fn rigid_transform(rotation_xyzw: [f64; 4], translation: [f64; 3]) -> Matrix4<f64> {
    let [x, y, z, w] = rotation_xyzw;
    let q = Quaternion::new(w, x, y, z);

    let mut m = if q.norm_squared() < f64::EPSILON {
        Matrix4::identity()
    } else {
        UnitQuaternion::from_quaternion(q).to_homogeneous()
    };

    m[(0, 3)] = translation[0];
    m[(1, 3)] = translation[1];
    m[(2, 3)] = translation[2];
    m
}

/// Squared Euclidean distance from the sensor origin.
#[inline]
pub fn squared_distance(x: f64, y: f64, z: f64) -> f64 {
    x * x + y * y + z * z
}

/// Closed squared-distance gate `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceFilter {
    pub min_sq: f64,
    pub max_sq: f64,
}

impl DistanceFilter {
    pub fn new(min_sq: f64, max_sq: f64) -> Self {
        Self { min_sq, max_sq }
    }

    /// True when `min_sq <= d2 <= max_sq`. NaN never passes.
    #[inline]
    pub fn accepts(&self, d2: f64) -> bool {
        d2 >= self.min_sq && d2 <= self.max_sq
    }
}

/// Project a homogeneous point and divide by depth.
///
/// Returns `None` when the depth component is zero or the result is not finite.
pub fn project(intrinsics: &Matrix3x4<f64>, point: &Vector4<f64>) -> Option<[f64; 2]> {
    let image_point: Vector3<f64> = intrinsics * point;
    let depth = image_point.z;
    if depth == 0.0 || !depth.is_finite() {
        return None;
    }

    let u = image_point.x / depth;
    let v = image_point.y / depth;
    if u.is_finite() && v.is_finite() {
        Some([u, v])
    } else {
        None
    }
}

/// Round image-plane coordinates to the nearest pixel, halves away from zero.
#[inline]
pub fn to_pixel(image_coordinates: [f64; 2]) -> (i64, i64) {
    (
        image_coordinates[0].round() as i64,
        image_coordinates[1].round() as i64,
    )
}

/// Apply a 4x4 transform to a point with `w = 1`.
#[inline]
pub fn transform_point(transform: &Matrix4<f64>, point: [f64; 3]) -> [f64; 3] {
    let p = transform * Vector4::new(point[0], point[1], point[2], 1.0);
    [p.x, p.y, p.z]
}
