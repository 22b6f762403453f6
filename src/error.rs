//! Centralized error type for the midiroute umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] midiroute_core::Error),

    #[error("Control: {0}")]
    Control(#[from] midiroute_core::ControlError),

    #[error("Decode: {0}")]
    Decode(#[from] midiroute_event::DecodeError),

    #[error("Encode: {0}")]
    Encode(#[from] midiroute_event::EncodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
