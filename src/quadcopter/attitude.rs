//! Euler angles measured from an orientation matrix.

use na::Matrix3;
use sim_physics::DEGENERATE_EPSILON;

/// Roll, pitch and yaw in radians, ZYX order: `R = Rz(yaw) * Ry(pitch) * Rx(roll)`.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Attitude {
    /// Extract the angles from a BODY -> WORLD orientation.
    ///
    /// At pitch of +/-90 degrees roll and yaw are not separable; roll is
    /// reported as zero and the whole rotation about the vertical goes to yaw.
    pub fn from_orientation(r: &Matrix3<f64>) -> Self {
        let cos_pitch = r[(2, 1)].hypot(r[(2, 2)]);
        let pitch = (-r[(2, 0)]).atan2(cos_pitch);

        if cos_pitch < DEGENERATE_EPSILON {
            return Self {
                roll: 0.0,
                pitch,
                yaw: (-r[(0, 1)]).atan2(r[(1, 1)]),
            };
        }

        Self {
            roll: r[(2, 1)].atan2(r[(2, 2)]),
            pitch,
            yaw: r[(1, 0)].atan2(r[(0, 0)]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use na::Rotation3;

    #[test]
    fn recovers_euler_angles() {
        let (roll, pitch, yaw) = (0.3, -0.4, 2.0);
        let r = Rotation3::from_euler_angles(roll, pitch, yaw).into_inner();
        let a = Attitude::from_orientation(&r);
        assert!((a.roll - roll).abs() < 1e-12);
        assert!((a.pitch - pitch).abs() < 1e-12);
        assert!((a.yaw - yaw).abs() < 1e-12);
    }

    #[test]
    fn gimbal_lock_reports_zero_roll() {
        let r = Rotation3::from_euler_angles(0.0, std::f64::consts::FRAC_PI_2, 0.7).into_inner();
        let a = Attitude::from_orientation(&r);
        assert_eq!(a.roll, 0.0);
        assert!((a.pitch - std::f64::consts::FRAC_PI_2).abs() < 1e-6);
        assert!(a.yaw.is_finite());
    }
}
