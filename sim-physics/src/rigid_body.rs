//! The rigid body a world object owns.
//!
//! `RigidBody` is the object-side half of a body: it keeps the authoritative
//! pose and velocities read back after the latest step, and buffers every
//! command (forces, teleports, velocity overrides, property changes) until
//! the engine applies them at the start of the next step. The engine-side
//! rapier body and collider are created when the body is registered.

use bevy::log::warn;
use na::{Matrix3, Vector3};
use rapier3d_f64::prelude as rapier;

use crate::error::{PhysicsError, Result};
use crate::pose::Pose;
use crate::shape::CollisionShape;

/// Rapier's default collider friction.
const DEFAULT_FRICTION: f64 = 0.5;

/// Which buffered changes still need to reach the engine.
#[derive(Debug, Default, Clone, Copy)]
struct Dirty {
    pose: bool,
    linvel: bool,
    angvel: bool,
    properties: bool,
    shape: bool,
}

#[derive(Debug)]
pub struct RigidBody {
    shape: CollisionShape,
    scale: Vector3<f64>,
    /// Zero mass makes the body fixed.
    mass: f64,
    linear_damping: f64,
    angular_damping: f64,
    friction: f64,

    handles: Option<(rapier::RigidBodyHandle, rapier::ColliderHandle)>,

    pose: Pose,
    linvel: Vector3<f64>,
    angvel: Vector3<f64>,
    active: bool,

    /// Force and torque accumulated for the next step, world frame.
    force: Vector3<f64>,
    torque: Vector3<f64>,
    dirty: Dirty,
}

impl RigidBody {
    /// A fixed body with the given shape at unit scale, identity pose.
    pub fn new(shape: CollisionShape) -> Self {
        Self {
            shape,
            scale: Vector3::repeat(1.0),
            mass: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            friction: DEFAULT_FRICTION,
            handles: None,
            pose: Pose::identity(),
            linvel: Vector3::zeros(),
            angvel: Vector3::zeros(),
            active: true,
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
            dirty: Dirty::default(),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.handles.is_some()
    }

    pub fn shape(&self) -> &CollisionShape {
        &self.shape
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn scale(&self) -> Vector3<f64> {
        self.scale
    }

    pub fn damping(&self) -> (f64, f64) {
        (self.linear_damping, self.angular_damping)
    }

    pub fn friction(&self) -> f64 {
        self.friction
    }

    /// Teleport the body. Momentum is kept; use the velocity overrides to stop it.
    ///
    /// A pose with non-finite components is ignored.
    pub fn set_pose(&mut self, orientation: Matrix3<f64>, position: Vector3<f64>) {
        let pose = Pose::new(orientation, position);
        if !pose.is_finite() {
            warn!("ignoring non-finite pose {pose:?}");
            return;
        }
        self.pose = pose;
        self.dirty.pose = true;
    }

    pub fn set_orientation(&mut self, orientation: Matrix3<f64>) {
        self.set_pose(orientation, self.pose.position);
    }

    pub fn set_position(&mut self, position: Vector3<f64>) {
        self.set_pose(self.pose.orientation, position);
    }

    /// The pose after the most recent step, or the last pose set since.
    pub fn transform(&self) -> Pose {
        self.pose
    }

    pub fn linear_velocity(&self) -> Vector3<f64> {
        self.linvel
    }

    /// Angular velocity in the world frame.
    pub fn angular_velocity(&self) -> Vector3<f64> {
        self.angvel
    }

    /// Whether the engine still integrates this body.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn applied_force(&self) -> Vector3<f64> {
        self.force
    }

    pub fn applied_torque(&self) -> Vector3<f64> {
        self.torque
    }

    pub fn apply_central_force(&mut self, force: Vector3<f64>) {
        self.force += finite_or_zero(force, "force");
    }

    pub fn apply_torque(&mut self, torque: Vector3<f64>) {
        self.torque += finite_or_zero(torque, "torque");
    }

    /// Apply `force` at `offset` from the center of mass, both in the world frame.
    pub fn apply_force(&mut self, force: Vector3<f64>, offset: Vector3<f64>) {
        let force = finite_or_zero(force, "force");
        let offset = finite_or_zero(offset, "force offset");
        self.force += force;
        self.torque += offset.cross(&force);
    }

    pub fn clear_forces(&mut self) {
        self.force = Vector3::zeros();
        self.torque = Vector3::zeros();
    }

    pub fn set_linear_velocity(&mut self, velocity: Vector3<f64>) {
        self.linvel = finite_or_zero(velocity, "linear velocity");
        self.dirty.linvel = true;
    }

    pub fn set_angular_velocity(&mut self, velocity: Vector3<f64>) {
        self.angvel = finite_or_zero(velocity, "angular velocity");
        self.dirty.angvel = true;
    }

    /// Set the mass. Zero makes the body fixed; negative or non-finite masses are ignored.
    pub fn set_mass(&mut self, mass: f64) {
        if !mass.is_finite() || mass < 0.0 {
            warn!("ignoring invalid rigid body mass {mass}");
            return;
        }
        self.mass = mass;
        self.dirty.properties = true;
    }

    pub fn set_damping(&mut self, linear: f64, angular: f64) {
        if !(linear.is_finite() && angular.is_finite() && linear >= 0.0 && angular >= 0.0) {
            warn!("ignoring invalid damping ({linear}, {angular})");
            return;
        }
        self.linear_damping = linear;
        self.angular_damping = angular;
        self.dirty.properties = true;
    }

    pub fn set_friction(&mut self, friction: f64) {
        if !friction.is_finite() || friction < 0.0 {
            warn!("ignoring invalid friction {friction}");
            return;
        }
        self.friction = friction;
        self.dirty.properties = true;
    }

    /// Rescale the collision shape. The engine recomputes inertia from the new shape.
    pub fn set_scale(&mut self, scale: Vector3<f64>) -> Result<()> {
        self.shape.scaled(&scale)?;
        self.scale = scale;
        self.dirty.shape = true;
        Ok(())
    }

    fn body_type(&self) -> rapier::RigidBodyType {
        if self.mass > 0.0 {
            rapier::RigidBodyType::Dynamic
        } else {
            rapier::RigidBodyType::Fixed
        }
    }

    /// Build the engine body and collider for registration.
    pub(crate) fn build(&self, owner: u128) -> Result<(rapier::RigidBody, rapier::Collider)> {
        if self.is_registered() {
            return Err(PhysicsError::AlreadyRegistered);
        }
        let shape = self.shape.scaled(&self.scale)?;

        let body = rapier::RigidBodyBuilder::new(self.body_type())
            .position(self.pose.to_isometry())
            .linvel(self.linvel)
            .angvel(self.angvel)
            .linear_damping(self.linear_damping)
            .angular_damping(self.angular_damping)
            .user_data(owner)
            .build();

        let mut collider = rapier::ColliderBuilder::new(shape).friction(self.friction);
        if self.mass > 0.0 {
            collider = collider.mass(self.mass);
        }
        Ok((body, collider.build()))
    }

    pub(crate) fn attach(&mut self, body: rapier::RigidBodyHandle, collider: rapier::ColliderHandle) {
        self.handles = Some((body, collider));
        // Everything buffered so far went into the builders.
        self.dirty = Dirty::default();
    }

    pub(crate) fn detach(&mut self) -> Option<(rapier::RigidBodyHandle, rapier::ColliderHandle)> {
        self.handles.take()
    }

    pub(crate) fn handle(&self) -> Option<rapier::RigidBodyHandle> {
        self.handles.map(|(body, _)| body)
    }

    /// Write buffered commands into the engine before a step.
    pub(crate) fn push(&mut self, bodies: &mut rapier::RigidBodySet, colliders: &mut rapier::ColliderSet) {
        let Some((body_handle, collider_handle)) = self.handles else {
            return;
        };

        if self.dirty.properties || self.dirty.shape {
            if let Some(collider) = colliders.get_mut(collider_handle) {
                if self.dirty.shape {
                    // Validated in set_scale.
                    if let Ok(shape) = self.shape.scaled(&self.scale) {
                        collider.set_shape(shape);
                    }
                }
                collider.set_friction(self.friction);
                if self.mass > 0.0 {
                    collider.set_mass(self.mass);
                }
            }
        }

        let Some(body) = bodies.get_mut(body_handle) else {
            return;
        };

        if self.dirty.properties {
            body.set_body_type(self.body_type(), true);
            body.set_linear_damping(self.linear_damping);
            body.set_angular_damping(self.angular_damping);
        }
        if self.dirty.pose {
            body.set_position(self.pose.to_isometry(), true);
        }
        if self.dirty.linvel {
            body.set_linvel(self.linvel, true);
        }
        if self.dirty.angvel {
            body.set_angvel(self.angvel, true);
        }

        // Rapier keeps user forces between steps, so replace rather than add.
        let wake = self.force != Vector3::zeros() || self.torque != Vector3::zeros();
        body.reset_forces(false);
        body.reset_torques(false);
        body.add_force(self.force, wake);
        body.add_torque(self.torque, wake);

        self.dirty = Dirty::default();
    }

    /// Read the stepped state back from the engine.
    pub(crate) fn pull(&mut self, bodies: &rapier::RigidBodySet) {
        let Some(body) = self.handle().and_then(|h| bodies.get(h)) else {
            return;
        };
        self.pose = Pose::from_isometry(body.position());
        self.linvel = *body.linvel();
        self.angvel = *body.angvel();
        self.active = !body.is_sleeping();
    }

    /// Forces only live for one step.
    pub(crate) fn end_step(&mut self) {
        self.clear_forces();
    }
}

fn finite_or_zero(v: Vector3<f64>, what: &str) -> Vector3<f64> {
    if v.iter().all(|c| c.is_finite()) {
        v
    } else {
        warn!("replacing non-finite {what} {:?} with zero", v.as_slice());
        Vector3::zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use na::Rotation3;

    #[test]
    fn transform_after_set_pose_is_exact() {
        let mut body = RigidBody::new(CollisionShape::unit_cube());
        let o = Rotation3::from_euler_angles(0.4, 0.1, -2.0).into_inner();
        let p = Vector3::new(0.25, -7.5, 3.0);
        body.set_pose(o, p);
        let pose = body.transform();
        assert_eq!(pose.orientation, o);
        assert_eq!(pose.position, p);
    }

    #[test]
    fn forces_accumulate_until_cleared() {
        let mut body = RigidBody::new(CollisionShape::unit_cube());
        body.apply_central_force(Vector3::new(1.0, 0.0, 0.0));
        body.apply_central_force(Vector3::new(0.0, 2.0, 0.0));
        body.apply_torque(Vector3::new(0.0, 0.0, 3.0));
        assert_eq!(body.applied_force(), Vector3::new(1.0, 2.0, 0.0));
        assert_eq!(body.applied_torque(), Vector3::new(0.0, 0.0, 3.0));

        body.clear_forces();
        assert_eq!(body.applied_force(), Vector3::zeros());
        assert_eq!(body.applied_torque(), Vector3::zeros());
    }

    #[test]
    fn offset_force_adds_torque() {
        let mut body = RigidBody::new(CollisionShape::unit_cube());
        body.apply_force(Vector3::new(0.0, 0.0, 1.0), Vector3::new(-1.0, 0.0, 0.0));
        assert_eq!(body.applied_force(), Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(body.applied_torque(), Vector3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn non_finite_inputs_become_zero() {
        let mut body = RigidBody::new(CollisionShape::unit_cube());
        body.apply_central_force(Vector3::new(1.0, 0.0, 0.0));
        body.apply_central_force(Vector3::new(f64::NAN, 0.0, 0.0));
        body.apply_torque(Vector3::new(0.0, f64::INFINITY, 0.0));
        body.set_linear_velocity(Vector3::new(0.0, 0.0, f64::NEG_INFINITY));
        assert_eq!(body.applied_force(), Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(body.applied_torque(), Vector3::zeros());
        assert_eq!(body.linear_velocity(), Vector3::zeros());
    }

    #[test]
    fn non_finite_pose_is_ignored() {
        let mut body = RigidBody::new(CollisionShape::unit_cube());
        let p = Vector3::new(1.0, 2.0, 3.0);
        body.set_position(p);
        body.set_position(Vector3::new(f64::NAN, 0.0, 5.0));
        let mut o = Matrix3::identity();
        o[(0, 0)] = f64::INFINITY;
        body.set_orientation(o);
        assert_eq!(body.transform(), Pose::new(Matrix3::identity(), p));
    }

    #[test]
    fn invalid_properties_are_ignored() {
        let mut body = RigidBody::new(CollisionShape::unit_cube());
        body.set_mass(2.0);
        body.set_mass(-1.0);
        body.set_damping(f64::NAN, 0.1);
        assert_eq!(body.mass(), 2.0);
        assert_eq!(body.damping(), (0.0, 0.0));
        assert!(body.set_scale(Vector3::new(1.0, 1.0, 0.0)).is_err());
        assert_eq!(body.scale(), Vector3::repeat(1.0));
    }
}
