use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("degenerate collision shape: {0}")]
    DegenerateShape(String),

    #[error("rigid body is already registered with a physics engine")]
    AlreadyRegistered,

    #[error("invalid physics settings: {0}")]
    InvalidSettings(String),
}

pub type Result<T> = std::result::Result<T, PhysicsError>;
