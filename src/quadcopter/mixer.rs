//! Four motors in an X layout.
//!
//! Motors sit on the diagonals of the body frame (X forward, Y left). Each
//! one turns a share of the roll/pitch/yaw command into extra rotation speed
//! on top of the hover speed, and its thrust is proportional to that speed.

use na::Vector3;

/// Sign of each motor's contribution to roll, pitch and yaw torque.
///
/// Left motors lift the left side (positive roll), rear motors lift the tail
/// (positive pitch, nose down), and the diagonals spin in opposite senses.
const MOTOR_SIGNS: [[f64; 3]; 4] = [
    // front left
    [1.0, -1.0, 1.0],
    // front right
    [-1.0, -1.0, -1.0],
    // rear right
    [-1.0, 1.0, 1.0],
    // rear left
    [1.0, 1.0, -1.0],
];

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct MotorOutput {
    /// Rotation speed of each motor, front left first, going clockwise.
    pub speeds: [f64; 4],
    /// Total thrust along body Z, N.
    pub thrust: f64,
    /// Torque in the body frame, N m.
    pub torque: Vector3<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct MotorMixer {
    rates_to_speed: f64,
    speed_to_thrust: f64,
    arm_length: f64,
}

impl MotorMixer {
    pub fn new(rates_to_speed: f64, speed_to_thrust: f64, arm_length: f64) -> Self {
        Self {
            rates_to_speed,
            speed_to_thrust,
            arm_length,
        }
    }

    /// Distribute a collective `thrust` and body `rates` command over the motors.
    ///
    /// Motor speeds never go negative, so a large command against a low
    /// thrust saturates rather than reversing a motor.
    pub fn mix(&self, thrust: f64, rates: &Vector3<f64>) -> MotorOutput {
        let hover = thrust.max(0.0) / (4.0 * self.speed_to_thrust);

        let mut out = MotorOutput::default();
        for (speed, signs) in out.speeds.iter_mut().zip(MOTOR_SIGNS.iter()) {
            let signs = Vector3::from(*signs);
            *speed = (hover + self.rates_to_speed * signs.dot(rates)).max(0.0);

            let motor_thrust = self.speed_to_thrust * *speed;
            out.thrust += motor_thrust;
            out.torque += signs * (self.arm_length * motor_thrust);
        }
        out
    }
}
