use sim_physics::PhysicsError;
use thiserror::Error;

use crate::game::ObjectId;

/// Invalid configuration, reported at construction.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be positive and finite, got {value}")]
    InvalidLimit { name: &'static str, value: f64 },

    #[error("{name} must be finite and not negative, got {value}")]
    InvalidGain { name: &'static str, value: f64 },

    #[error("failed to parse configuration")]
    Parse(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Physics(#[from] PhysicsError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no object with id {0}")]
    UnknownObject(ObjectId),
}

pub type Result<T> = std::result::Result<T, SimError>;
