//! The simulation loop.
//!
//! `Game` owns the world, the physics engine and the host input queue. The
//! host calls [`Game::on_update`] once per tick and [`Game::render`] when it
//! wants to draw; everything else arrives as [`HostEvent`]s through an
//! [`InputSender`].

use std::fmt;

use async_channel::{Receiver, Sender, TrySendError};
use bevy::log::{debug, info, warn};
use na::Vector3;
use serde::{Deserialize, Serialize};
use sim_physics::{PhysicsEngine, PhysicsSettings};

use crate::error::{ConfigError, Result, SimError};
use crate::picking::{Viewport, touch_ray};
use crate::quadcopter::FlightMode;
use crate::world_object::WorldObject;

/// Stable handle of an object in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl ObjectId {
    fn owner_tag(self) -> u128 {
        self.0 as u128
    }

    fn from_owner_tag(tag: u128) -> Option<Self> {
        usize::try_from(tag).ok().map(ObjectId)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Objects in insertion order. Ids are never reused, so a removed object
/// leaves an empty slot behind for the life of the world.
#[derive(Debug, Default)]
pub struct World {
    objects: Vec<Option<WorldObject>>,
}

impl World {
    pub fn get(&self, id: ObjectId) -> Option<&WorldObject> {
        self.objects.get(id.0)?.as_ref()
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut WorldObject> {
        self.objects.get_mut(id.0)?.as_mut()
    }

    pub fn len(&self) -> usize {
        self.objects.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &WorldObject)> {
        self.objects
            .iter()
            .enumerate()
            .filter_map(|(i, o)| Some((ObjectId(i), o.as_ref()?)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ObjectId, &mut WorldObject)> {
        self.objects
            .iter_mut()
            .enumerate()
            .filter_map(|(i, o)| Some((ObjectId(i), o.as_mut()?)))
    }

    /// First object with the given label.
    pub fn find(&self, label: &str) -> Option<ObjectId> {
        self.iter()
            .find(|(_, o)| o.label() == label)
            .map(|(id, _)| id)
    }

    fn objects_mut(&mut self) -> impl Iterator<Item = &mut WorldObject> {
        self.objects.iter_mut().flatten()
    }
}

/// Commands the host sends to an object's behavior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlEvent {
    /// Left stick: roll and thrust, both in `[-1, 1]`.
    RollThrust { roll: f64, thrust: f64 },
    /// Right stick: yaw and pitch, both in `[-1, 1]`.
    YawPitch { yaw: f64, pitch: f64 },
    SetMode(FlightMode),
    ToggleMode,
    /// Forget controller state, as after a teleport.
    Reset,
}

/// Something the host reports between ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostEvent {
    Control {
        target: ObjectId,
        event: ControlEvent,
    },
    /// Touch or click at window coordinates, y growing downwards.
    Touch { x: f64, y: f64 },
}

/// Cloneable handle the host uses to queue events.
#[derive(Debug, Clone)]
pub struct InputSender {
    tx: Sender<HostEvent>,
}

impl InputSender {
    /// Queue an event for the next tick. A full queue drops it.
    pub fn send(&self, event: HostEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!("input queue full, dropping {event:?}");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("input queue closed");
                false
            }
        }
    }

    pub fn roll_thrust(&self, target: ObjectId, roll: f64, thrust: f64) -> bool {
        self.send(HostEvent::Control {
            target,
            event: ControlEvent::RollThrust { roll, thrust },
        })
    }

    pub fn yaw_pitch(&self, target: ObjectId, yaw: f64, pitch: f64) -> bool {
        self.send(HostEvent::Control {
            target,
            event: ControlEvent::YawPitch { yaw, pitch },
        })
    }

    pub fn control(&self, target: ObjectId, event: ControlEvent) -> bool {
        self.send(HostEvent::Control { target, event })
    }

    pub fn touch(&self, x: f64, y: f64) -> bool {
        self.send(HostEvent::Touch { x, y })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    pub physics: PhysicsSettings,
    /// Events held between ticks before new ones are dropped.
    pub input_queue_capacity: usize,
    /// How far a touch ray reaches into the scene, m.
    pub touch_ray_length: f64,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            physics: PhysicsSettings::default(),
            input_queue_capacity: 256,
            touch_ray_length: 1000.0,
        }
    }
}

impl SimSettings {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.input_queue_capacity == 0 {
            return Err(ConfigError::InvalidLimit {
                name: "input_queue_capacity",
                value: 0.0,
            });
        }
        if !(self.touch_ray_length.is_finite() && self.touch_ray_length > 0.0) {
            return Err(ConfigError::InvalidLimit {
                name: "touch_ray_length",
                value: self.touch_ray_length,
            });
        }
        Ok(())
    }
}

/// A touch that landed on an object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchHit {
    pub object: ObjectId,
    pub point: Vector3<f64>,
    /// Unit direction of the touch ray.
    pub direction: Vector3<f64>,
    pub normal: Vector3<f64>,
}

pub type TouchHandler = Box<dyn FnMut(&mut World, &TouchHit) + Send + Sync>;

/// Receives every object once per render, in world order.
pub trait RenderSink {
    fn draw(&mut self, id: ObjectId, object: &WorldObject);
}

pub struct Game {
    settings: SimSettings,
    world: World,
    physics: PhysicsEngine,
    input_tx: Sender<HostEvent>,
    input_rx: Receiver<HostEvent>,
    viewport: Option<Viewport>,
    touch_handler: Option<TouchHandler>,
    elapsed: f64,
    ticks: u64,
}

impl Game {
    pub fn new(settings: SimSettings) -> Result<Self> {
        settings.validate()?;
        let physics = PhysicsEngine::new(&settings.physics)?;
        let (input_tx, input_rx) = async_channel::bounded(settings.input_queue_capacity);
        info!(
            "game created, input queue holds {} events",
            settings.input_queue_capacity
        );
        Ok(Self {
            settings,
            world: World::default(),
            physics,
            input_tx,
            input_rx,
            viewport: None,
            touch_handler: None,
            elapsed: 0.0,
            ticks: 0,
        })
    }

    pub fn settings(&self) -> &SimSettings {
        &self.settings
    }

    pub fn input_sender(&self) -> InputSender {
        InputSender {
            tx: self.input_tx.clone(),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn physics(&self) -> &PhysicsEngine {
        &self.physics
    }

    /// Simulated time so far, s.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Add an object, registering its rigid body. On failure the object is
    /// not added.
    pub fn add_to_world(&mut self, mut object: WorldObject) -> Result<ObjectId> {
        let id = ObjectId(self.world.objects.len());
        if let Some(body) = object.body_mut() {
            self.physics.register(body, id.owner_tag())?;
        }
        debug!("added {:?} as {id}", object.label());
        self.world.objects.push(Some(object));
        Ok(id)
    }

    /// Take an object out of the world and the physics engine.
    pub fn remove_from_world(&mut self, id: ObjectId) -> Result<WorldObject> {
        let mut object = self
            .world
            .objects
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(SimError::UnknownObject(id))?;
        if let Some(body) = object.body_mut() {
            self.physics.remove(body);
        }
        debug!("removed {:?} ({id})", object.label());
        Ok(object)
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }

    pub fn set_touch_handler(
        &mut self,
        handler: impl FnMut(&mut World, &TouchHit) + Send + Sync + 'static,
    ) {
        self.touch_handler = Some(Box::new(handler));
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// Queued input is applied first, then every object's behavior runs, the
    /// physics steps and object poses are refreshed from it. A `dt` of zero
    /// integrates nothing.
    pub fn on_update(&mut self, dt: f64) {
        self.drain_input();

        for object in self.world.objects_mut() {
            object.on_update(dt);
        }

        self.physics.step(
            dt,
            self.world.objects_mut().filter_map(WorldObject::body_mut),
        );

        for object in self.world.objects_mut() {
            object.update_from_physics();
        }

        if dt.is_finite() && dt > 0.0 {
            self.elapsed += dt;
        }
        self.ticks += 1;
    }

    /// Visit every object in world order.
    pub fn render(&self, sink: &mut impl RenderSink) {
        for (id, object) in self.world.iter() {
            sink.draw(id, object);
        }
    }

    fn drain_input(&mut self) {
        while let Ok(event) = self.input_rx.try_recv() {
            match event {
                HostEvent::Control { target, event } => match self.world.get_mut(target) {
                    Some(object) => object.control(&event),
                    None => debug!("dropping {event:?} for missing object {target}"),
                },
                HostEvent::Touch { x, y } => self.touch(x, y),
            }
        }
    }

    /// Cast the touch ray and hand a hit to the touch handler.
    fn touch(&mut self, x: f64, y: f64) {
        let Some(viewport) = self.viewport else {
            debug!("touch at ({x}, {y}) before any viewport was set");
            return;
        };
        let Some(ray) = touch_ray(&viewport, x, y) else {
            debug!("no ray under touch at ({x}, {y})");
            return;
        };
        let Some(hit) = self
            .physics
            .raycast_closest(ray.origin, ray.point_at(self.settings.touch_ray_length))
        else {
            return;
        };
        let Some(object) = ObjectId::from_owner_tag(hit.owner) else {
            return;
        };

        let hit = TouchHit {
            object,
            point: hit.point,
            direction: ray.direction,
            normal: hit.normal,
        };
        debug!("touched {object} at {:?}", hit.point.as_slice());
        if let Some(handler) = self.touch_handler.as_mut() {
            handler(&mut self.world, &hit);
        }
    }
}
