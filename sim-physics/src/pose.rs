//! Poses: an orientation matrix plus a position.
//!
//! The simulation is Z-up and right handed. A body's orientation matrix maps
//! BODY -> WORLD, so its columns are the body X (forward), Y (left) and Z (up)
//! axes expressed in the world frame.

use na::{Isometry3, Matrix3, Matrix4, Rotation3, Translation3, UnitQuaternion, Vector3};

/// Cross products shorter than this are treated as degenerate.
pub const DEGENERATE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Orientation BODY -> WORLD.
    pub orientation: Matrix3<f64>,
    /// Position of the body origin in the world frame.
    pub position: Vector3<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn new(orientation: Matrix3<f64>, position: Vector3<f64>) -> Self {
        Self {
            orientation,
            position,
        }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity(), Vector3::zeros())
    }

    /// Build a pose from an engine isometry.
    pub fn from_isometry(iso: &Isometry3<f64>) -> Self {
        Self {
            orientation: iso.rotation.to_rotation_matrix().into_inner(),
            position: iso.translation.vector,
        }
    }

    /// Convert to an engine isometry. The orientation is assumed orthonormal.
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.position), self.rotation())
    }

    /// Orientation as a unit quaternion (BODY -> WORLD).
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(self.orientation))
    }

    /// Homogeneous BODY -> WORLD matrix with a per-axis scale applied in the body frame.
    pub fn to_homogeneous_scaled(&self, scale: &Vector3<f64>) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        let rs = self.orientation * Matrix3::from_diagonal(scale);
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&rs);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.position);
        m
    }

    pub fn is_finite(&self) -> bool {
        self.orientation.iter().chain(self.position.iter()).all(|c| c.is_finite())
    }

    /// Whether the orientation columns are unit length and mutually orthogonal.
    pub fn is_orthonormal(&self, eps: f64) -> bool {
        let should_be_identity = self.orientation.transpose() * self.orientation;
        (should_be_identity - Matrix3::identity()).amax() <= eps
            && self.orientation.determinant() > 0.0
    }
}

/// Gram-Schmidt re-orthonormalization that keeps the direction of the X column.
///
/// Used after incremental rotations so drift never accumulates. Degenerate
/// input falls back to an arbitrary right-handed completion of whatever axis
/// survives, or to the identity.
pub fn orthonormalize(m: &Matrix3<f64>) -> Matrix3<f64> {
    let x = m.column(0).into_owned();
    let y = m.column(1).into_owned();

    let Some(x) = x.try_normalize(DEGENERATE_EPSILON) else {
        return Matrix3::identity();
    };
    let y = (y - x * x.dot(&y))
        .try_normalize(DEGENERATE_EPSILON)
        .unwrap_or_else(|| any_orthonormal_vector(&x));
    let z = x.cross(&y);
    Matrix3::from_columns(&[x, y, z])
}

/// A unit vector perpendicular to `v`, crossing with the world axis least
/// aligned with it.
pub fn any_orthonormal_vector(v: &Vector3<f64>) -> Vector3<f64> {
    let mut axis = Vector3::x_axis();
    if v.x.abs() > v.y.abs() {
        if v.y.abs() > v.z.abs() {
            axis = Vector3::z_axis();
        } else {
            axis = Vector3::y_axis();
        }
    } else if v.x.abs() > v.z.abs() {
        axis = Vector3::z_axis();
    }
    v.cross(&axis.into_inner()).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isometry_round_trip_keeps_rotation() {
        let r = Rotation3::from_euler_angles(0.3, -0.2, 1.1).into_inner();
        let pose = Pose::new(r, Vector3::new(1.0, -2.0, 3.0));
        let back = Pose::from_isometry(&pose.to_isometry());
        assert!((back.orientation - pose.orientation).amax() < 1e-12);
        assert_eq!(back.position, pose.position);
    }

    #[test]
    fn orthonormalize_repairs_drift() {
        let mut m = Rotation3::from_euler_angles(0.1, 0.2, 0.3).into_inner();
        m[(0, 1)] += 1e-3;
        m[(2, 2)] *= 1.01;
        let fixed = Pose::new(orthonormalize(&m), Vector3::zeros());
        assert!(fixed.is_orthonormal(1e-12));
    }

    #[test]
    fn orthonormalize_degenerate_columns() {
        let x = Vector3::new(0.0, 0.0, 2.0);
        let m = Matrix3::from_columns(&[x, x, x]);
        let fixed = Pose::new(orthonormalize(&m), Vector3::zeros());
        assert!(fixed.is_orthonormal(1e-12));
        assert_eq!(fixed.orientation.column(0).into_owned(), Vector3::z());

        let zero = Pose::new(orthonormalize(&Matrix3::zeros()), Vector3::zeros());
        assert_eq!(zero.orientation, Matrix3::identity());
    }

    #[test]
    fn any_orthonormal_is_perpendicular() {
        for v in [
            Vector3::x(),
            Vector3::new(0.3, -4.0, 0.1),
            Vector3::new(1.0, 1.0, 1.0).normalize(),
        ] {
            let n = any_orthonormal_vector(&v);
            assert!(n.dot(&v).abs() < 1e-12);
            assert!((n.norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn non_finite_components() {
        assert!(Pose::identity().is_finite());
        let mut pose = Pose::identity();
        pose.position.y = f64::NAN;
        assert!(!pose.is_finite());
        let mut pose = Pose::identity();
        pose.orientation[(1, 2)] = f64::INFINITY;
        assert!(!pose.is_finite());
    }

    #[test]
    fn scaled_homogeneous_matrix() {
        let pose = Pose::new(Matrix3::identity(), Vector3::new(1.0, 2.0, 3.0));
        let m = pose.to_homogeneous_scaled(&Vector3::new(2.0, 3.0, 4.0));
        assert_eq!(m[(0, 0)], 2.0);
        assert_eq!(m[(1, 1)], 3.0);
        assert_eq!(m[(2, 2)], 4.0);
        assert_eq!(m[(2, 3)], 3.0);
    }
}
