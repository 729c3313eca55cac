//! Hub error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HubError>;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("unknown device: {0}")]
    UnknownDevice(u32),

    #[error("credentials unavailable: {0}")]
    Credentials(String),

    #[error("authentication rejected by relay (code {0})")]
    AuthenticationRejected(u16),

    #[error("hub is not running")]
    NotRunning,

    #[error("protocol error: {0}")]
    Protocol(#[from] cync_core::Error),
}
