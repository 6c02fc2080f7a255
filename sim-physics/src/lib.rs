//! Rigid body physics for the flight simulator.
//!
//! A thin layer over rapier: objects own a [`RigidBody`] that buffers
//! commands and caches the stepped state, and the [`PhysicsEngine`] moves
//! both across once per tick. Z-up, right handed, SI units.

extern crate nalgebra as na;

mod engine;
mod error;
mod pose;
mod rigid_body;
mod shape;

pub use engine::{PhysicsEngine, PhysicsSettings, RayHit};
pub use error::{PhysicsError, Result};
pub use pose::{DEGENERATE_EPSILON, Pose, any_orthonormal_vector, orthonormalize};
pub use rigid_body::RigidBody;
pub use shape::CollisionShape;
