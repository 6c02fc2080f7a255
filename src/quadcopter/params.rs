//! Tuning and limits of the flight controller.

use serde::{Deserialize, Serialize};

use super::pid::PidGains;
use crate::error::ConfigError;

/// Controller parameters. Angles in radians, rates in rad/s, SI elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadcopterParams {
    pub mass: f64,

    pub max_roll: f64,
    pub max_pitch: f64,

    pub max_roll_rate: f64,
    pub max_pitch_rate: f64,
    pub max_yaw_rate: f64,

    pub max_thrust: f64,

    /// Motor rotation speed added per rad/s of rate command.
    pub control_rates_to_motor_rotation_speed: f64,
    /// Thrust per unit of motor rotation speed.
    pub motor_rotation_speed_to_thrust: f64,
    /// Lever arm of each motor about the roll and pitch axes, m.
    pub arm_length: f64,

    /// Outer loop, angle error to rate setpoint.
    pub angle_gains: PidGains,
    /// Inner loop, rate error to rate command.
    pub rate_gains: PidGains,
}

impl Default for QuadcopterParams {
    fn default() -> Self {
        Self {
            mass: 1.0,
            max_roll: 35f64.to_radians(),
            max_pitch: 35f64.to_radians(),
            max_roll_rate: 360f64.to_radians(),
            max_pitch_rate: 360f64.to_radians(),
            max_yaw_rate: 120f64.to_radians(),
            max_thrust: 15.0,
            control_rates_to_motor_rotation_speed: 150.0,
            motor_rotation_speed_to_thrust: 2.0e-3,
            arm_length: 0.18,
            angle_gains: PidGains::new(2.5, 0.0, 0.8),
            rate_gains: PidGains::new(2.0, 0.0, 0.0),
        }
    }
}

impl QuadcopterParams {
    /// Parse and validate parameters from JSON. Missing fields take the defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("mass", self.mass),
            ("max_roll", self.max_roll),
            ("max_pitch", self.max_pitch),
            ("max_roll_rate", self.max_roll_rate),
            ("max_pitch_rate", self.max_pitch_rate),
            ("max_yaw_rate", self.max_yaw_rate),
            ("max_thrust", self.max_thrust),
            (
                "control_rates_to_motor_rotation_speed",
                self.control_rates_to_motor_rotation_speed,
            ),
            (
                "motor_rotation_speed_to_thrust",
                self.motor_rotation_speed_to_thrust,
            ),
            ("arm_length", self.arm_length),
        ];
        for (name, value) in limits {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidLimit { name, value });
            }
        }

        let gains = [
            ("angle_gains.kp", self.angle_gains.kp),
            ("angle_gains.ki", self.angle_gains.ki),
            ("angle_gains.kd", self.angle_gains.kd),
            ("rate_gains.kp", self.rate_gains.kp),
            ("rate_gains.ki", self.rate_gains.ki),
            ("rate_gains.kd", self.rate_gains.kd),
        ];
        for (name, value) in gains {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidGain { name, value });
            }
        }

        Ok(())
    }
}
