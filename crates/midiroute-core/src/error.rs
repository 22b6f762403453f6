//! Error types for midiroute-core.
//!
//! Conditions that arise inside a cycle (`Overflow`, `QueueFull`) are small
//! values handled where they occur; [`Error`] is for setup and shutdown paths.

use std::time::Duration;

use thiserror::Error;

use crate::scene::SceneId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Unknown scene: {0}")]
    UnknownScene(SceneId),

    #[error("Async worker did not finish within {0:?}")]
    JoinTimeout(Duration),

    #[error("Async worker panicked")]
    WorkerPanicked,

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A fixed-capacity structure was full; the item was not stored.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("capacity of {capacity} exhausted")]
pub struct Overflow {
    pub capacity: usize,
}
