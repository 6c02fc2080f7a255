//! Collision shapes, described unscaled and sized by the owning object's scale.

use na::Vector3;
use rapier3d_f64::prelude::SharedShape;

use crate::error::{PhysicsError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollisionShape {
    /// Box given by its half extents at unit scale.
    Cuboid { half_extents: Vector3<f64> },
    /// Sphere given by its radius at unit scale.
    Ball { radius: f64 },
}

impl CollisionShape {
    /// A cube with unit edge length, matching a unit render mesh.
    pub fn unit_cube() -> Self {
        CollisionShape::Cuboid {
            half_extents: Vector3::repeat(0.5),
        }
    }

    /// Build the engine shape for the given per-axis scale.
    ///
    /// Balls can only scale uniformly, so they take the largest scale component.
    pub fn scaled(&self, scale: &Vector3<f64>) -> Result<SharedShape> {
        match *self {
            CollisionShape::Cuboid { half_extents } => {
                let he = half_extents.component_mul(scale);
                if he.iter().all(|c| c.is_finite() && *c > 0.0) {
                    Ok(SharedShape::cuboid(he.x, he.y, he.z))
                } else {
                    Err(PhysicsError::DegenerateShape(format!(
                        "cuboid half extents {:?}",
                        he.as_slice()
                    )))
                }
            }
            CollisionShape::Ball { radius } => {
                let r = radius * scale.amax();
                if r.is_finite() && r > 0.0 {
                    Ok(SharedShape::ball(r))
                } else {
                    Err(PhysicsError::DegenerateShape(format!("ball radius {r}")))
                }
            }
        }
    }
}
