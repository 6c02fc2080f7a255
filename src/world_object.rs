//! Objects placed in the world.
//!
//! A `WorldObject` is a labelled pose with a scale. It may own a rigid body,
//! in which case the body is authoritative and the visible pose is copied
//! back from it after every physics step, and it may own a behavior that
//! runs before the step.

use std::any::Any;

use bevy::log::{debug, warn};
use na::{Matrix3, Matrix4, Rotation3, Unit, Vector3};
use sim_physics::{
    CollisionShape, DEGENERATE_EPSILON, PhysicsError, Pose, RigidBody, any_orthonormal_vector,
    orthonormalize,
};

use crate::game::ControlEvent;

/// Per-tick logic attached to an object.
pub trait Behavior: Any + Send + Sync {
    /// Runs before the physics step; forces applied here act during it.
    fn on_update(&mut self, body: Option<&mut RigidBody>, dt: f64);

    fn on_control(&mut self, _event: &ControlEvent) {}

    /// One line of state for display.
    fn status(&self) -> Option<String> {
        None
    }
}

pub struct WorldObject {
    label: String,
    pose: Pose,
    scale: Vector3<f64>,
    body: Option<RigidBody>,
    behavior: Option<Box<dyn Behavior>>,
}

impl std::fmt::Debug for WorldObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldObject")
            .field("label", &self.label)
            .field("pose", &self.pose)
            .field("scale", &self.scale)
            .field("body", &self.body)
            .field("behavior", &self.behavior.is_some())
            .finish()
    }
}

impl WorldObject {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            pose: Pose::identity(),
            scale: Vector3::repeat(1.0),
            body: None,
            behavior: None,
        }
    }

    pub fn with_collision_shape(mut self, shape: CollisionShape) -> sim_physics::Result<Self> {
        self.set_collision_shape(shape)?;
        Ok(self)
    }

    pub fn with_behavior(mut self, behavior: impl Behavior) -> Self {
        self.behavior = Some(Box::new(behavior));
        self
    }

    /// Give the object a rigid body with `shape`, sized by the current scale.
    ///
    /// The body starts fixed at the object's pose; set a mass to make it
    /// dynamic. Only possible before the object enters a world.
    pub fn set_collision_shape(&mut self, shape: CollisionShape) -> sim_physics::Result<()> {
        if self.body.as_ref().is_some_and(RigidBody::is_registered) {
            return Err(PhysicsError::AlreadyRegistered);
        }
        let mut body = RigidBody::new(shape);
        body.set_scale(self.scale)?;
        body.set_pose(self.pose.orientation, self.pose.position);
        self.body = Some(body);
        Ok(())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn body(&self) -> Option<&RigidBody> {
        self.body.as_ref()
    }

    pub fn body_mut(&mut self) -> Option<&mut RigidBody> {
        self.body.as_mut()
    }

    /// The behavior, if it is a `T`.
    pub fn behavior<T: Behavior>(&self) -> Option<&T> {
        let behavior: &dyn Any = self.behavior.as_deref()?;
        behavior.downcast_ref::<T>()
    }

    pub fn status(&self) -> Option<String> {
        self.behavior.as_ref()?.status()
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn position(&self) -> Vector3<f64> {
        self.pose.position
    }

    pub fn orientation(&self) -> Matrix3<f64> {
        self.pose.orientation
    }

    pub fn orientation_x(&self) -> Vector3<f64> {
        self.pose.orientation.column(0).into_owned()
    }

    pub fn orientation_y(&self) -> Vector3<f64> {
        self.pose.orientation.column(1).into_owned()
    }

    pub fn orientation_z(&self) -> Vector3<f64> {
        self.pose.orientation.column(2).into_owned()
    }

    /// Forward, the body X axis.
    pub fn look_at_direction(&self) -> Vector3<f64> {
        self.orientation_x()
    }

    /// Up, the body Z axis.
    pub fn normal_direction(&self) -> Vector3<f64> {
        self.orientation_z()
    }

    pub fn scale(&self) -> Vector3<f64> {
        self.scale
    }

    /// BODY -> WORLD with the scale applied, for rendering.
    pub fn model_matrix(&self) -> Matrix4<f64> {
        self.pose.to_homogeneous_scaled(&self.scale)
    }

    /// Every pose change ends here. Non-finite poses never reach the body.
    fn commit_pose(&mut self, pose: Pose) {
        if !pose.is_finite() {
            warn!("{}: ignoring non-finite pose {pose:?}", self.label);
            return;
        }
        self.pose = pose;
        if let Some(body) = self.body.as_mut() {
            body.set_pose(pose.orientation, pose.position);
        }
    }

    pub fn set_pose(&mut self, orientation: Matrix3<f64>, position: Vector3<f64>) {
        let orientation = if Pose::new(orientation, position).is_orthonormal(DEGENERATE_EPSILON) {
            orientation
        } else {
            orthonormalize(&orientation)
        };
        self.commit_pose(Pose::new(orientation, position));
    }

    pub fn set_position(&mut self, position: Vector3<f64>) {
        self.commit_pose(Pose::new(self.pose.orientation, position));
    }

    /// Set the orientation. Non-orthonormal input is repaired first.
    pub fn set_orientation(&mut self, orientation: Matrix3<f64>) {
        self.set_pose(orientation, self.pose.position);
    }

    pub fn set_orientation_axes(&mut self, x: Vector3<f64>, y: Vector3<f64>, z: Vector3<f64>) {
        self.set_orientation(Matrix3::from_columns(&[x, y, z]));
    }

    /// Rotate by `angle` (rad) about an axis in the world frame.
    pub fn rotate(&mut self, angle: f64, axis: &Vector3<f64>) {
        let Some(axis) = Unit::try_new(*axis, DEGENERATE_EPSILON) else {
            warn!("{}: ignoring rotation about a zero axis", self.label);
            return;
        };
        let rotated = Rotation3::from_axis_angle(&axis, angle).into_inner() * self.pose.orientation;
        self.commit_pose(Pose::new(orthonormalize(&rotated), self.pose.position));
    }

    /// Translate in the world frame.
    pub fn translate(&mut self, translation: &Vector3<f64>) {
        self.set_position(self.pose.position + translation);
    }

    /// Translate in the object's own frame.
    pub fn translate_in_local_frame(&mut self, translation: &Vector3<f64>) {
        self.set_position(self.pose.position + self.pose.orientation * translation);
    }

    pub fn set_look_at_point(&mut self, point: &Vector3<f64>) {
        self.set_look_at_direction(&(point - self.pose.position));
    }

    /// Point forward along `direction`, keeping the current normal as close as possible.
    ///
    /// If `direction` is parallel to the current normal the rest of the basis
    /// is arbitrary; follow with `set_normal_direction`.
    pub fn set_look_at_direction(&mut self, direction: &Vector3<f64>) {
        let Some(x) = direction.try_normalize(DEGENERATE_EPSILON) else {
            warn!("{}: ignoring zero look-at direction", self.label);
            return;
        };
        let y = self
            .normal_direction()
            .cross(&x)
            .try_normalize(DEGENERATE_EPSILON)
            .unwrap_or_else(|| any_orthonormal_vector(&x));
        let z = x.cross(&y);
        self.commit_pose(Pose::new(
            Matrix3::from_columns(&[x, y, z]),
            self.pose.position,
        ));
    }

    /// Tilt so up is as close to `normal` as the current forward allows.
    ///
    /// If `normal` is parallel to forward the rest of the basis is arbitrary;
    /// follow with `set_look_at_direction`.
    pub fn set_normal_direction(&mut self, normal: &Vector3<f64>) {
        let Some(n) = normal.try_normalize(DEGENERATE_EPSILON) else {
            warn!("{}: ignoring zero normal direction", self.label);
            return;
        };
        let x = self.look_at_direction();
        let y = n
            .cross(&x)
            .try_normalize(DEGENERATE_EPSILON)
            .unwrap_or_else(|| any_orthonormal_vector(&x));
        let z = x.cross(&y);
        self.commit_pose(Pose::new(
            Matrix3::from_columns(&[x, y, z]),
            self.pose.position,
        ));
    }

    /// Resize the object, rebuilding the collision shape if it has one.
    pub fn set_scale(&mut self, scale: Vector3<f64>) -> sim_physics::Result<()> {
        match self.body.as_mut() {
            Some(body) => body.set_scale(scale)?,
            None if !scale.iter().all(|c| c.is_finite() && *c > 0.0) => {
                return Err(PhysicsError::DegenerateShape(format!(
                    "scale {:?}",
                    scale.as_slice()
                )));
            }
            None => {}
        }
        self.scale = scale;
        Ok(())
    }

    /// Zero makes the body fixed.
    pub fn set_mass(&mut self, mass: f64) {
        match self.body.as_mut() {
            Some(body) => body.set_mass(mass),
            None => debug!("{}: no rigid body, ignoring mass", self.label),
        }
    }

    pub fn set_damping(&mut self, linear: f64, angular: f64) {
        match self.body.as_mut() {
            Some(body) => body.set_damping(linear, angular),
            None => debug!("{}: no rigid body, ignoring damping", self.label),
        }
    }

    pub fn set_friction(&mut self, friction: f64) {
        match self.body.as_mut() {
            Some(body) => body.set_friction(friction),
            None => debug!("{}: no rigid body, ignoring friction", self.label),
        }
    }

    pub fn apply_central_force(&mut self, force: Vector3<f64>) {
        match self.body.as_mut() {
            Some(body) => body.apply_central_force(force),
            None => debug!("{}: no rigid body, ignoring force", self.label),
        }
    }

    /// Forward a host command to the behavior.
    pub fn control(&mut self, event: &ControlEvent) {
        match self.behavior.as_mut() {
            Some(behavior) => behavior.on_control(event),
            None => debug!("{}: no behavior for {event:?}", self.label),
        }
    }

    /// Runs before the physics step.
    pub fn on_update(&mut self, dt: f64) {
        if let Some(behavior) = self.behavior.as_mut() {
            behavior.on_update(self.body.as_mut(), dt);
        }
    }

    /// Copy the stepped body pose into the visible pose.
    pub fn update_from_physics(&mut self) {
        if let Some(body) = self.body.as_ref() {
            self.pose = body.transform();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_orthonormal(object: &WorldObject) {
        assert!(object.pose().is_orthonormal(1e-9), "{:?}", object.orientation());
        assert!(object.orientation().iter().all(|c| c.is_finite()));
    }

    #[test]
    fn look_at_then_normal_gives_orthonormal_basis() {
        let mut object = WorldObject::new("cam");
        let d = Vector3::new(1.0, 2.0, -0.5);
        object.set_look_at_direction(&d);
        object.set_normal_direction(&Vector3::new(0.2, 0.0, 1.0));
        assert_orthonormal(&object);
        assert!((object.look_at_direction() - d.normalize()).norm() < 1e-12);
        assert!(object.normal_direction().z > 0.0);
    }

    #[test]
    fn degenerate_framing_stays_finite() {
        let mut object = WorldObject::new("cam");
        // Forward straight along the current normal.
        object.set_look_at_direction(&Vector3::z());
        assert_orthonormal(&object);
        assert!((object.look_at_direction() - Vector3::z()).norm() < 1e-12);

        // Normal straight along forward.
        object.set_normal_direction(&Vector3::z());
        assert_orthonormal(&object);

        object.set_look_at_direction(&Vector3::zeros());
        assert_orthonormal(&object);
    }

    #[test]
    fn look_at_point_uses_position() {
        let mut object = WorldObject::new("cam");
        object.set_position(Vector3::new(-10.0, 5.0, 7.0));
        object.set_look_at_point(&Vector3::new(2.0, 0.0, 1.0));
        let expected = (Vector3::new(2.0, 0.0, 1.0) - Vector3::new(-10.0, 5.0, 7.0)).normalize();
        assert!((object.look_at_direction() - expected).norm() < 1e-12);
        assert_orthonormal(&object);
    }

    #[test]
    fn rotations_stay_orthonormal() {
        let mut object = WorldObject::new("spinner");
        for i in 0..10_000 {
            object.rotate(0.013, &Vector3::new(1.0, (i % 7) as f64, 0.3));
        }
        assert!(object.pose().is_orthonormal(1e-12));
    }

    #[test]
    fn translations() {
        let mut object = WorldObject::new("box");
        object.rotate(std::f64::consts::FRAC_PI_2, &Vector3::z());
        object.translate(&Vector3::new(1.0, 0.0, 0.0));
        object.translate_in_local_frame(&Vector3::new(1.0, 0.0, 0.0));
        assert!((object.position() - Vector3::new(1.0, 1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn non_finite_mutations_are_ignored() {
        let mut object = WorldObject::new("box")
            .with_collision_shape(CollisionShape::unit_cube())
            .unwrap();
        object.set_position(Vector3::new(1.0, 2.0, 3.0));
        object.rotate(0.3, &Vector3::z());
        let before = object.pose();

        object.rotate(f64::NAN, &Vector3::z());
        object.rotate(0.1, &Vector3::new(f64::INFINITY, 0.0, 0.0));
        object.set_look_at_direction(&Vector3::new(f64::INFINITY, 0.0, 0.0));
        object.set_normal_direction(&Vector3::new(0.0, f64::NAN, 1.0));
        object.translate(&Vector3::new(f64::NAN, 0.0, 0.0));
        object.set_position(Vector3::new(0.0, f64::NEG_INFINITY, 0.0));
        object.set_look_at_point(&Vector3::new(0.0, 0.0, f64::NAN));

        assert_eq!(object.pose(), before);
        assert_eq!(object.body().unwrap().transform(), before);
    }

    #[test]
    fn body_follows_pose_setters() {
        let mut object = WorldObject::new("box")
            .with_collision_shape(CollisionShape::unit_cube())
            .unwrap();
        object.set_position(Vector3::new(0.0, 0.0, 3.0));
        object.rotate(0.5, &Vector3::x());
        let body = object.body().unwrap().transform();
        assert_eq!(body, object.pose());
    }

    #[test]
    fn scale_sizes_model_and_body() {
        let mut object = WorldObject::new("floor")
            .with_collision_shape(CollisionShape::unit_cube())
            .unwrap();
        object.set_scale(Vector3::new(100.0, 100.0, 0.2)).unwrap();
        assert_eq!(object.model_matrix()[(2, 2)], 0.2);
        assert_eq!(object.body().unwrap().scale(), Vector3::new(100.0, 100.0, 0.2));
        assert!(object.set_scale(Vector3::new(1.0, 0.0, 1.0)).is_err());
        assert_eq!(object.scale(), Vector3::new(100.0, 100.0, 0.2));

        let mut plain = WorldObject::new("plain");
        assert!(plain.set_scale(Vector3::new(f64::NAN, 1.0, 1.0)).is_err());
        plain.set_scale(Vector3::new(2.0, 2.0, 2.0)).unwrap();
    }

    #[test]
    fn shape_after_scale_uses_it() {
        let mut object = WorldObject::new("box");
        object.set_scale(Vector3::new(2.0, 3.0, 4.0)).unwrap();
        object.set_collision_shape(CollisionShape::unit_cube()).unwrap();
        assert_eq!(object.body().unwrap().scale(), Vector3::new(2.0, 3.0, 4.0));
    }
}
