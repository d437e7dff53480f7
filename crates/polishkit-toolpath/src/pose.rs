//! Tool orientation from surface normals

use nalgebra::{Unit, UnitQuaternion, Vector3};
use polishkit_core::{PolishError, Result};

/// Cross products shorter than this are treated as parallel to the up axis.
const PARALLEL_TOLERANCE: f64 = 1e-9;

/// Aligns the tool's working axis (+Z) with a surface normal.
///
/// The base pose approaches straight-on. An optional tilt rotates the aligned
/// pose about the tool's local X axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoseCalculator {
    tilt: f64,
}

impl PoseCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tilt the tool by `radians` about its local X axis after alignment.
    pub fn with_tilt(radians: f64) -> Self {
        Self { tilt: radians }
    }

    pub fn tilt(&self) -> f64 {
        self.tilt
    }

    /// Unit quaternion rotating +Z onto `normal`.
    ///
    /// When the normal is (anti-)parallel to +Z the rotation axis falls back
    /// to +X, so a downward normal yields a half turn about X.
    pub fn orientation_from_normal(&self, normal: &Vector3<f64>) -> Result<UnitQuaternion<f64>> {
        let norm = normal.norm();
        if !norm.is_finite() || norm == 0.0 {
            return Err(PolishError::invalid_geometry(format!(
                "cannot orient tool along normal {:?}",
                normal
            )));
        }
        let n = normal / norm;
        let up = Vector3::z();

        let cross = up.cross(&n);
        let axis = if cross.norm() < PARALLEL_TOLERANCE {
            Vector3::x_axis()
        } else {
            Unit::new_normalize(cross)
        };
        let angle = up.dot(&n).clamp(-1.0, 1.0).acos();

        let aligned = UnitQuaternion::from_axis_angle(&axis, angle);
        if self.tilt == 0.0 {
            return Ok(aligned);
        }
        Ok(aligned * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.tilt))
    }
}

/// Quaternion components in `[w, x, y, z]` order.
pub fn quaternion_components(q: &UnitQuaternion<f64>) -> [f64; 4] {
    [q.w, q.i, q.j, q.k]
}
