//! A quadrotor flight simulator.
//!
//! Pilot sticks drive a cascaded attitude/rate controller, whose motor
//! commands become forces on a rapier rigid body each tick. The world is
//! Z-up and right handed, like the physics crate underneath.

// Recommended alias.
extern crate nalgebra as na;

pub mod demo;
pub mod error;
pub mod game;
pub mod picking;
pub mod quadcopter;
pub mod world_object;

pub use error::{ConfigError, Result, SimError};
pub use game::{
    ControlEvent, Game, HostEvent, InputSender, ObjectId, RenderSink, SimSettings, TouchHandler,
    TouchHit, World,
};
pub use picking::{DepthConvention, Ray, Viewport};
pub use quadcopter::{FlightMode, Quadcopter, QuadcopterParams};
pub use world_object::{Behavior, WorldObject};
