//! Hotplug error types

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The platform or backend cannot deliver hotplug notifications
    #[error("Hotplug is not supported on this platform")]
    Unsupported,

    /// A filter was rejected during registration
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Space for a new registration could not be reserved
    #[error("Out of memory")]
    NoMemory,

    /// The backend failed to produce the current device list
    #[error("Device enumeration failed: {0}")]
    EnumerationFailed(String),

    /// The hotplug pipe rejected a message
    #[error("Hotplug channel write failed: {0}")]
    ChannelWriteFailed(String),

    /// The hotplug pipe was closed while the event thread waited on it
    #[error("Hotplug channel read failed: {0}")]
    ChannelReadFailed(String),

    /// The tracing subscriber could not be installed
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, Error>;
