//! The demo scene: a loose box, a floor and the UAV.

use bevy::log::info;
use na::{Matrix3, Vector3};
use sim_physics::CollisionShape;

use crate::error::Result;
use crate::game::{ControlEvent, Game, ObjectId, TouchHit, World};
use crate::quadcopter::{FlightMode, Quadcopter, QuadcopterParams};
use crate::world_object::WorldObject;

/// Push given to whatever a touch lands on, N.
pub const TOUCH_FORCE: f64 = 400.0;

/// Where the UAV goes back to after a touch.
pub const UAV_RESET_POSITION: Vector3<f64> = Vector3::new(0.0, 0.0, 0.5);

/// Ids of the demo objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoScene {
    pub crate_box: ObjectId,
    pub floor: ObjectId,
    pub uav: ObjectId,
}

/// Populate `game` with the demo scene and install its touch handler.
pub fn build_demo_scene(game: &mut Game, params: QuadcopterParams) -> Result<DemoScene> {
    let mut crate_box =
        WorldObject::new("crate").with_collision_shape(CollisionShape::unit_cube())?;
    crate_box.set_position(Vector3::new(4.0, 3.0, 5.0));
    crate_box.set_mass(1.0);
    let crate_box = game.add_to_world(crate_box)?;

    let mut floor = WorldObject::new("floor").with_collision_shape(CollisionShape::unit_cube())?;
    floor.set_scale(Vector3::new(100.0, 100.0, 0.2))?;
    floor.set_position(Vector3::zeros());
    floor.set_friction(1.0);
    let floor = game.add_to_world(floor)?;

    let mut uav = Quadcopter::new(params)?
        .with_mode(FlightMode::Angle)
        .into_world_object("uav")?;
    uav.set_scale(Vector3::new(0.363, 0.363, 0.053))?;
    uav.set_position(Vector3::new(0.0, 0.0, 3.0));
    uav.set_damping(0.25, 0.05);
    let uav = game.add_to_world(uav)?;

    game.set_touch_handler(move |world: &mut World, hit: &TouchHit| {
        push_and_reset(world, hit, uav);
    });

    info!("demo scene ready: {} objects", game.world().len());
    Ok(DemoScene {
        crate_box,
        floor,
        uav,
    })
}

/// Push the touched object along the touch ray and bring the UAV home.
fn push_and_reset(world: &mut World, hit: &TouchHit, uav: ObjectId) {
    if let Some(object) = world.get_mut(hit.object) {
        info!("pushing {}", object.label());
        object.apply_central_force(hit.direction * TOUCH_FORCE);
    }
    if let Some(uav) = world.get_mut(uav) {
        uav.set_orientation(Matrix3::identity());
        uav.set_position(UAV_RESET_POSITION);
        uav.control(&ControlEvent::Reset);
    }
}
