//! Error types for the Cync protocol core

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// Buffer does not hold enough bytes for the requested structure
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    /// Payload length differs from the length declared in the header
    #[error("length mismatch: header declares {declared} bytes, payload has {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Payload exceeds what the 4-byte length field or a body length byte can carry
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Home id of zero cannot be used to derive mesh addresses
    #[error("invalid home id: {0}")]
    InvalidHomeId(u32),

    /// Device id is too far from the home id to map to a 2-byte mesh address
    #[error("mesh id out of range for device {device_id} in home {home_id}")]
    MeshIdOutOfRange { device_id: u32, home_id: u32 },
}
