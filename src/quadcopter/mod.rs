//! Flight controller for a quadrotor.
//!
//! Each tick the stick samples become setpoints. In angle mode an outer
//! loop turns roll/pitch angle errors into rate setpoints; the inner loop
//! turns rate errors into rate commands for all three axes. The mixer
//! spreads those commands and the collective thrust over four motors, and
//! the resulting body force and torque go to the rigid body.

mod attitude;
mod mixer;
mod params;
mod pid;

use bevy::log::{debug, info};
use na::Vector3;
use serde::{Deserialize, Serialize};
use sim_physics::{CollisionShape, RigidBody};

pub use attitude::Attitude;
pub use mixer::{MotorMixer, MotorOutput};
pub use params::QuadcopterParams;
pub use pid::{Pid, PidGains};

use crate::error::ConfigError;
use crate::game::ControlEvent;
use crate::world_object::{Behavior, WorldObject};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightMode {
    /// Roll/pitch sticks command angles, yaw stick commands a rate.
    #[default]
    Angle,
    /// All sticks command rates.
    Rate,
}

impl FlightMode {
    pub fn toggled(self) -> Self {
        match self {
            FlightMode::Angle => FlightMode::Rate,
            FlightMode::Rate => FlightMode::Angle,
        }
    }
}

/// Latest normalized stick samples, each in `[-1, 1]`.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct StickInput {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub thrust: f64,
}

/// What the sticks currently ask for.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Setpoints {
    /// Roll angle (angle mode) or roll rate (rate mode).
    pub roll: f64,
    /// Pitch angle (angle mode) or pitch rate (rate mode).
    pub pitch: f64,
    pub yaw_rate: f64,
    /// Collective thrust, N.
    pub thrust: f64,
}

/// Snapshot of the last control update.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub attitude: Attitude,
    /// Measured angular velocity in the body frame.
    pub body_rates: Vector3<f64>,
    pub setpoints: Setpoints,
    /// Rate setpoints fed to the inner loop.
    pub rate_setpoints: Vector3<f64>,
    pub motors: MotorOutput,
}

#[derive(Debug, Clone)]
pub struct Quadcopter {
    params: QuadcopterParams,
    mode: FlightMode,
    sticks: StickInput,

    roll_angle: Pid,
    pitch_angle: Pid,
    roll_rate: Pid,
    pitch_rate: Pid,
    yaw_rate: Pid,

    mixer: MotorMixer,
    telemetry: Telemetry,
}

fn sanitize_stick(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

impl Quadcopter {
    pub fn new(params: QuadcopterParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            mode: FlightMode::default(),
            sticks: StickInput::default(),
            roll_angle: Pid::new(params.angle_gains),
            pitch_angle: Pid::new(params.angle_gains),
            roll_rate: Pid::new(params.rate_gains),
            pitch_rate: Pid::new(params.rate_gains),
            yaw_rate: Pid::new(params.rate_gains),
            mixer: MotorMixer::new(
                params.control_rates_to_motor_rotation_speed,
                params.motor_rotation_speed_to_thrust,
                params.arm_length,
            ),
            telemetry: Telemetry::default(),
            params,
        })
    }

    pub fn with_mode(mut self, mode: FlightMode) -> Self {
        self.set_mode(mode);
        self
    }

    /// A world object flying this controller: a unit cube body with the
    /// controller's mass.
    pub fn into_world_object(self, label: impl Into<String>) -> sim_physics::Result<WorldObject> {
        let mass = self.params.mass;
        let mut object = WorldObject::new(label)
            .with_collision_shape(CollisionShape::unit_cube())?
            .with_behavior(self);
        object.set_mass(mass);
        Ok(object)
    }

    pub fn params(&self) -> &QuadcopterParams {
        &self.params
    }

    pub fn mode(&self) -> FlightMode {
        self.mode
    }

    pub fn sticks(&self) -> StickInput {
        self.sticks
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Integral terms of the roll/pitch angle loops then the roll/pitch/yaw rate loops.
    pub fn integral_terms(&self) -> [f64; 5] {
        [
            self.roll_angle.integral(),
            self.pitch_angle.integral(),
            self.roll_rate.integral(),
            self.pitch_rate.integral(),
            self.yaw_rate.integral(),
        ]
    }

    /// Switch mode. A change of mode restarts every loop.
    pub fn set_mode(&mut self, mode: FlightMode) {
        if mode == self.mode {
            return;
        }
        info!("flight mode {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
        self.reset_loops();
    }

    pub fn on_roll_thrust_input(&mut self, roll: f64, thrust: f64) {
        self.sticks.roll = sanitize_stick(roll);
        self.sticks.thrust = sanitize_stick(thrust);
    }

    pub fn on_yaw_pitch_input(&mut self, yaw: f64, pitch: f64) {
        self.sticks.yaw = sanitize_stick(yaw);
        self.sticks.pitch = sanitize_stick(pitch);
    }

    /// Restart the loops and center the sticks.
    pub fn reset(&mut self) {
        self.reset_loops();
        self.sticks = StickInput::default();
        self.telemetry = Telemetry::default();
    }

    fn reset_loops(&mut self) {
        for pid in [
            &mut self.roll_angle,
            &mut self.pitch_angle,
            &mut self.roll_rate,
            &mut self.pitch_rate,
            &mut self.yaw_rate,
        ] {
            pid.reset();
        }
    }

    /// Setpoints for the current sticks and mode.
    pub fn setpoints(&self) -> Setpoints {
        let p = &self.params;
        let s = &self.sticks;
        let (roll, pitch) = match self.mode {
            FlightMode::Angle => (s.roll * p.max_roll, s.pitch * p.max_pitch),
            FlightMode::Rate => (s.roll * p.max_roll_rate, s.pitch * p.max_pitch_rate),
        };
        Setpoints {
            roll,
            pitch,
            yaw_rate: s.yaw * p.max_yaw_rate,
            thrust: (s.thrust + 1.0) * 0.5 * p.max_thrust,
        }
    }

    /// Run one control step and queue the resulting force and torque on `body`.
    pub fn update(&mut self, body: &mut RigidBody, dt: f64) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }

        let r = body.transform().orientation;
        let attitude = Attitude::from_orientation(&r);
        let body_rates = r.transpose() * body.angular_velocity();
        let setpoints = self.setpoints();
        let p = &self.params;

        let (roll_rate_sp, pitch_rate_sp) = match self.mode {
            FlightMode::Angle => (
                self.roll_angle
                    .update(setpoints.roll - attitude.roll, dt, p.max_roll_rate),
                self.pitch_angle
                    .update(setpoints.pitch - attitude.pitch, dt, p.max_pitch_rate),
            ),
            FlightMode::Rate => (setpoints.roll, setpoints.pitch),
        };
        let rate_setpoints = Vector3::new(roll_rate_sp, pitch_rate_sp, setpoints.yaw_rate);

        let rates = Vector3::new(
            self.roll_rate
                .update(rate_setpoints.x - body_rates.x, dt, p.max_roll_rate),
            self.pitch_rate
                .update(rate_setpoints.y - body_rates.y, dt, p.max_pitch_rate),
            self.yaw_rate
                .update(rate_setpoints.z - body_rates.z, dt, p.max_yaw_rate),
        );

        let motors = self.mixer.mix(setpoints.thrust, &rates);
        self.telemetry = Telemetry {
            attitude,
            body_rates,
            setpoints,
            rate_setpoints,
            motors,
        };

        // A sleeping body stays asleep unless there is something to do.
        if !body.is_active() && motors.thrust == 0.0 && motors.torque == Vector3::zeros() {
            return;
        }

        body.apply_torque(r * motors.torque);
        body.apply_central_force(r.column(2) * motors.thrust);
    }
}

impl Behavior for Quadcopter {
    fn on_update(&mut self, body: Option<&mut RigidBody>, dt: f64) {
        match body {
            Some(body) => self.update(body, dt),
            None => debug!("quadcopter has no rigid body to fly"),
        }
    }

    fn on_control(&mut self, event: &ControlEvent) {
        match *event {
            ControlEvent::RollThrust { roll, thrust } => self.on_roll_thrust_input(roll, thrust),
            ControlEvent::YawPitch { yaw, pitch } => self.on_yaw_pitch_input(yaw, pitch),
            ControlEvent::SetMode(mode) => self.set_mode(mode),
            ControlEvent::ToggleMode => self.set_mode(self.mode.toggled()),
            ControlEvent::Reset => self.reset(),
        }
    }

    fn status(&self) -> Option<String> {
        let t = &self.telemetry;
        Some(format!(
            "{:?} roll {:6.1} pitch {:6.1} yaw {:6.1} deg, thrust {:5.2} N",
            self.mode,
            t.attitude.roll.to_degrees(),
            t.attitude.pitch.to_degrees(),
            t.attitude.yaw.to_degrees(),
            t.motors.thrust,
        ))
    }
}
