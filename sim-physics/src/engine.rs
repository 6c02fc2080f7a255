//! The rapier world the simulation steps.

use std::num::NonZeroUsize;

use bevy::log::{debug, info};
use na::{Point3, Vector3};
use rapier3d_f64::prelude as rapier;
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, Result};
use crate::rigid_body::RigidBody;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSettings {
    /// Gravity in the world frame (Z-up), m/s^2.
    pub gravity: Vector3<f64>,
    /// Solver iterations per step.
    pub solver_iterations: usize,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            gravity: Vector3::new(0.0, 0.0, -9.81),
            solver_iterations: 4,
        }
    }
}

/// Closest hit of a ray query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// The owner tag given when the hit body was registered.
    pub owner: u128,
    pub point: Vector3<f64>,
    pub normal: Vector3<f64>,
    /// Distance along the ray.
    pub distance: f64,
}

pub struct PhysicsEngine {
    gravity: Vector3<f64>,
    integration_parameters: rapier::IntegrationParameters,
    physics_pipeline: rapier::PhysicsPipeline,
    island_manager: rapier::IslandManager,
    broad_phase: rapier::DefaultBroadPhase,
    narrow_phase: rapier::NarrowPhase,
    rigid_body_set: rapier::RigidBodySet,
    collider_set: rapier::ColliderSet,
    impulse_joint_set: rapier::ImpulseJointSet,
    multibody_joint_set: rapier::MultibodyJointSet,
    ccd_solver: rapier::CCDSolver,
    query_pipeline: rapier::QueryPipeline,
    steps: u64,
}

impl PhysicsEngine {
    pub fn new(settings: &PhysicsSettings) -> Result<Self> {
        if !settings.gravity.iter().all(|c| c.is_finite()) {
            return Err(PhysicsError::InvalidSettings(format!(
                "gravity {:?} is not finite",
                settings.gravity.as_slice()
            )));
        }
        let iterations = NonZeroUsize::new(settings.solver_iterations).ok_or_else(|| {
            PhysicsError::InvalidSettings("solver_iterations must be at least 1".into())
        })?;

        let mut integration_parameters = rapier::IntegrationParameters::default();
        integration_parameters.num_solver_iterations = iterations;

        info!(
            "physics engine: gravity {:?}, {} solver iterations",
            settings.gravity.as_slice(),
            iterations
        );

        Ok(Self {
            gravity: settings.gravity,
            integration_parameters,
            physics_pipeline: rapier::PhysicsPipeline::new(),
            island_manager: rapier::IslandManager::new(),
            broad_phase: rapier::DefaultBroadPhase::new(),
            narrow_phase: rapier::NarrowPhase::new(),
            rigid_body_set: rapier::RigidBodySet::new(),
            collider_set: rapier::ColliderSet::new(),
            impulse_joint_set: rapier::ImpulseJointSet::new(),
            multibody_joint_set: rapier::MultibodyJointSet::new(),
            ccd_solver: rapier::CCDSolver::new(),
            query_pipeline: rapier::QueryPipeline::new(),
            steps: 0,
        })
    }

    pub fn gravity(&self) -> Vector3<f64> {
        self.gravity
    }

    /// Number of bodies the engine currently simulates.
    pub fn body_count(&self) -> usize {
        self.rigid_body_set.len()
    }

    /// Number of steps that actually advanced time.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Whether `body` is registered with this engine.
    pub fn contains(&self, body: &RigidBody) -> bool {
        body.handle()
            .is_some_and(|h| self.rigid_body_set.contains(h))
    }

    /// Create the engine-side body and collider. A body registers at most once.
    pub fn register(&mut self, body: &mut RigidBody, owner: u128) -> Result<()> {
        let (rb, collider) = body.build(owner)?;
        let body_handle = self.rigid_body_set.insert(rb);
        let collider_handle = self.collider_set.insert_with_parent(
            collider,
            body_handle,
            &mut self.rigid_body_set,
        );
        body.attach(body_handle, collider_handle);
        debug!("registered rigid body for owner {owner} (mass {})", body.mass());
        Ok(())
    }

    /// Remove `body` and its collider from the engine. Returns false if it was not registered.
    pub fn remove(&mut self, body: &mut RigidBody) -> bool {
        let Some((body_handle, _)) = body.detach() else {
            return false;
        };
        self.rigid_body_set
            .remove(
                body_handle,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            )
            .is_some()
    }

    /// Advance the world by `dt`.
    ///
    /// Buffered commands of every body are written first; after the step the
    /// new state is read back and the force buffers are cleared. A `dt` that
    /// is zero, negative or not finite integrates nothing: poses stay as they
    /// are and pending forces are discarded.
    pub fn step<'a>(&mut self, dt: f64, bodies: impl IntoIterator<Item = &'a mut RigidBody>) {
        let mut bodies: Vec<&mut RigidBody> = bodies.into_iter().collect();

        for body in bodies.iter_mut() {
            body.push(&mut self.rigid_body_set, &mut self.collider_set);
        }

        if dt.is_finite() && dt > 0.0 {
            self.integration_parameters.dt = dt;
            self.physics_pipeline.step(
                &self.gravity,
                &self.integration_parameters,
                &mut self.island_manager,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.rigid_body_set,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                &mut self.ccd_solver,
                Some(&mut self.query_pipeline),
                &(),
                &(),
            );
            self.steps += 1;

            for body in bodies.iter_mut() {
                body.pull(&self.rigid_body_set);
            }
        }

        for body in bodies.iter_mut() {
            body.end_step();
        }
    }

    /// Closest hit along the segment `from` -> `to`, against the last stepped state.
    pub fn raycast_closest(&self, from: Vector3<f64>, to: Vector3<f64>) -> Option<RayHit> {
        let delta = to - from;
        let length = delta.norm();
        if !length.is_finite() || length <= f64::EPSILON {
            return None;
        }
        let ray = rapier::Ray::new(Point3::from(from), delta / length);

        let (collider, intersection) = self.query_pipeline.cast_ray_and_get_normal(
            &self.rigid_body_set,
            &self.collider_set,
            &ray,
            length,
            true,
            rapier::QueryFilter::default(),
        )?;

        let parent = self.collider_set.get(collider)?.parent()?;
        let owner = self.rigid_body_set.get(parent)?.user_data;

        Some(RayHit {
            owner,
            point: ray.point_at(intersection.time_of_impact).coords,
            normal: intersection.normal,
            distance: intersection.time_of_impact,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::CollisionShape;
    use na::Rotation3;

    fn engine() -> PhysicsEngine {
        PhysicsEngine::new(&PhysicsSettings::default()).unwrap()
    }

    fn dynamic_box(mass: f64, position: Vector3<f64>) -> RigidBody {
        let mut body = RigidBody::new(CollisionShape::unit_cube());
        body.set_mass(mass);
        body.set_position(position);
        body
    }

    #[test]
    fn rejects_bad_settings() {
        let settings = PhysicsSettings {
            solver_iterations: 0,
            ..Default::default()
        };
        assert!(PhysicsEngine::new(&settings).is_err());

        let settings = PhysicsSettings {
            gravity: Vector3::new(0.0, 0.0, f64::NAN),
            ..Default::default()
        };
        assert!(PhysicsEngine::new(&settings).is_err());
    }

    #[test]
    fn registers_once() {
        let mut engine = engine();
        let mut body = dynamic_box(1.0, Vector3::zeros());
        engine.register(&mut body, 7).unwrap();
        assert_eq!(
            engine.register(&mut body, 7),
            Err(PhysicsError::AlreadyRegistered)
        );
        assert_eq!(engine.body_count(), 1);
        assert!(engine.contains(&body));
    }

    #[test]
    fn degenerate_shape_is_not_registered() {
        let mut engine = engine();
        let mut body = RigidBody::new(CollisionShape::Ball { radius: 0.0 });
        assert!(matches!(
            engine.register(&mut body, 0),
            Err(PhysicsError::DegenerateShape(_))
        ));
        assert!(!body.is_registered());
        assert_eq!(engine.body_count(), 0);
    }

    #[test]
    fn remove_unregisters() {
        let mut engine = engine();
        let mut body = dynamic_box(1.0, Vector3::zeros());
        engine.register(&mut body, 0).unwrap();
        assert!(engine.remove(&mut body));
        assert_eq!(engine.body_count(), 0);
        assert!(!body.is_registered());
        assert!(!engine.remove(&mut body));
    }

    #[test]
    fn gravity_pulls_dynamic_bodies_down() {
        let mut engine = engine();
        let mut body = dynamic_box(1.0, Vector3::new(0.0, 0.0, 10.0));
        engine.register(&mut body, 0).unwrap();
        for _ in 0..60 {
            engine.step(1.0 / 60.0, [&mut body]);
        }
        let z = body.transform().position.z;
        assert!(z < 6.0 && z > 4.0, "z = {z}");
        assert!(body.linear_velocity().z < -9.0);
    }

    #[test]
    fn fixed_bodies_stay_put() {
        let mut engine = engine();
        let mut body = dynamic_box(0.0, Vector3::new(1.0, 2.0, 3.0));
        engine.register(&mut body, 0).unwrap();
        for _ in 0..10 {
            engine.step(1.0 / 60.0, [&mut body]);
        }
        assert_eq!(body.transform().position, Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn forces_last_one_step() {
        let mut engine = PhysicsEngine::new(&PhysicsSettings {
            gravity: Vector3::zeros(),
            ..Default::default()
        })
        .unwrap();
        let mut body = dynamic_box(2.0, Vector3::zeros());
        engine.register(&mut body, 0).unwrap();

        body.apply_central_force(Vector3::new(4.0, 0.0, 0.0));
        engine.step(0.5, [&mut body]);
        assert_eq!(body.applied_force(), Vector3::zeros());
        let v = body.linear_velocity().x;
        assert!((v - 1.0).abs() < 1e-6, "v = {v}");

        // No new force: velocity holds.
        engine.step(0.5, [&mut body]);
        assert!((body.linear_velocity().x - v).abs() < 1e-6);
    }

    #[test]
    fn torque_spins_the_body() {
        let mut engine = PhysicsEngine::new(&PhysicsSettings {
            gravity: Vector3::zeros(),
            ..Default::default()
        })
        .unwrap();
        let mut body = dynamic_box(1.0, Vector3::zeros());
        engine.register(&mut body, 0).unwrap();
        body.apply_torque(Vector3::new(0.0, 0.0, 1.0));
        engine.step(0.1, [&mut body]);
        let w = body.angular_velocity();
        assert!(w.z > 0.0);
        assert!(w.x.abs() < 1e-9 && w.y.abs() < 1e-9);
        assert!(body.transform().is_orthonormal(1e-9));
    }

    #[test]
    fn rescaling_a_registered_body_recomputes_inertia() {
        let mut engine = PhysicsEngine::new(&PhysicsSettings {
            gravity: Vector3::zeros(),
            ..Default::default()
        })
        .unwrap();
        let mut small = dynamic_box(1.0, Vector3::new(-5.0, 0.0, 0.0));
        let mut large = dynamic_box(1.0, Vector3::new(5.0, 0.0, 0.0));
        engine.register(&mut small, 0).unwrap();
        engine.register(&mut large, 1).unwrap();
        engine.step(1.0 / 60.0, [&mut small, &mut large]);

        // Same mass, twice the size: four times the inertia.
        large.set_scale(Vector3::repeat(2.0)).unwrap();
        for body in [&mut small, &mut large] {
            body.apply_torque(Vector3::new(0.0, 0.0, 1.0));
        }
        engine.step(0.1, [&mut small, &mut large]);

        let ratio = small.angular_velocity().z / large.angular_velocity().z;
        assert!((ratio - 4.0).abs() < 1e-3, "ratio = {ratio}");
    }

    #[test]
    fn zero_dt_changes_nothing() {
        let mut engine = engine();
        let mut body = dynamic_box(1.0, Vector3::new(0.0, 0.0, 5.0));
        engine.register(&mut body, 0).unwrap();
        engine.step(1.0 / 60.0, [&mut body]);
        let before = body.transform();

        body.apply_central_force(Vector3::new(100.0, 0.0, 0.0));
        engine.step(0.0, [&mut body]);
        assert_eq!(body.transform(), before);
        assert_eq!(body.applied_force(), Vector3::zeros());
        assert_eq!(engine.steps(), 1);
    }

    #[test]
    fn set_pose_survives_registration_and_overrides_stop_motion() {
        let mut engine = engine();
        let mut body = dynamic_box(1.0, Vector3::new(0.0, 0.0, 5.0));
        engine.register(&mut body, 0).unwrap();
        engine.step(1.0 / 60.0, [&mut body]);

        let o = Rotation3::from_euler_angles(0.0, 0.0, 0.5).into_inner();
        let p = Vector3::new(3.0, 0.0, 1.0);
        body.set_pose(o, p);
        body.set_linear_velocity(Vector3::zeros());
        body.set_angular_velocity(Vector3::zeros());
        assert_eq!(body.transform(), crate::Pose::new(o, p));

        engine.step(1e-6, [&mut body]);
        let pose = body.transform();
        assert!((pose.position - p).norm() < 1e-6);
        assert!((pose.orientation - o).amax() < 1e-9);
        assert!(body.linear_velocity().norm() < 1e-3);
    }

    #[test]
    fn raycast_finds_the_closest_body() {
        let mut engine = engine();
        let mut near = dynamic_box(0.0, Vector3::new(0.0, 0.0, 2.0));
        let mut far = dynamic_box(0.0, Vector3::new(0.0, 0.0, 6.0));
        engine.register(&mut near, 1).unwrap();
        engine.register(&mut far, 2).unwrap();
        engine.step(1.0 / 60.0, [&mut near, &mut far]);

        let hit = engine
            .raycast_closest(Vector3::new(0.0, 0.0, 20.0), Vector3::new(0.0, 0.0, -20.0))
            .unwrap();
        assert_eq!(hit.owner, 2);
        assert!((hit.point.z - 6.5).abs() < 1e-6);
        assert!((hit.normal - Vector3::z()).norm() < 1e-6);

        assert!(
            engine
                .raycast_closest(Vector3::new(5.0, 5.0, 20.0), Vector3::new(5.0, 5.0, -20.0))
                .is_none()
        );
    }
}
