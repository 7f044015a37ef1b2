//! Error types for serial port operations.
//!
//! Every native failure surfaces as an [`Error`] variant; nothing is logged
//! and swallowed. Each variant also carries a frozen numeric verdict (the
//! [`Error::raw_code`] bridge) for callers that persist or compare the
//! historical `-1..=-6` codes across a language boundary.

use std::time::Duration;

use thiserror::Error;

/// A specialized `Result` type for serial port operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during serial port operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The port exists but is held exclusively by another process.
    #[error("Serial port is busy: {0}")]
    Busy(String),

    /// The specified serial port was not found on the system.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// The caller lacks permission to open the port.
    #[error("Permission denied opening serial port: {0}")]
    PermissionDenied(String),

    /// The opened object failed the serial capability probe.
    #[error("Not a serial port: {0}")]
    NotASerialPort(String),

    /// The port could not be opened for a reason outside the mapped set.
    #[error("Serial port could not be opened")]
    NotOpened,

    /// The disconnect probe re-opened the port name, proving the existing
    /// handle no longer maps to the live device.
    #[error("Serial port handle is stale: {0}")]
    StaleHandle(String),

    /// An I/O error occurred during port operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A parameter was rejected before any native call was made.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A bounded read elapsed with no bytes transferred.
    #[error("Read timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Create a `Busy` error from a port name.
    pub fn busy(port_name: impl Into<String>) -> Self {
        Self::Busy(port_name.into())
    }

    /// Create a `NotFound` error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a `PermissionDenied` error from a port name.
    pub fn permission_denied(port_name: impl Into<String>) -> Self {
        Self::PermissionDenied(port_name.into())
    }

    /// Create a `NotASerialPort` error from a port name.
    pub fn not_a_serial_port(port_name: impl Into<String>) -> Self {
        Self::NotASerialPort(port_name.into())
    }

    /// Create a `StaleHandle` error from a port name.
    pub fn stale_handle(port_name: impl Into<String>) -> Self {
        Self::StaleHandle(port_name.into())
    }

    /// Create a `Config` error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a `Timeout` error from a duration.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// The frozen numeric verdict for this error.
    ///
    /// These values predate this crate and must not change:
    /// `-1` busy, `-2` not found, `-3` permission denied, `-4` not a serial
    /// port, `-5` not opened, `-6` stale handle. I/O, configuration, and
    /// timeout failures share the generic `-1`.
    pub fn raw_code(&self) -> i32 {
        match self {
            Error::Busy(_) => -1,
            Error::NotFound(_) => -2,
            Error::PermissionDenied(_) => -3,
            Error::NotASerialPort(_) => -4,
            Error::NotOpened => -5,
            Error::StaleHandle(_) => -6,
            Error::Io(_) | Error::Config(_) | Error::Timeout(_) => -1,
        }
    }
}

/// Lets ports slot into `std::io::Read`/`Write` adapters without losing
/// the timeout distinction.
impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(io) => io,
            Error::Timeout(_) => std::io::Error::new(std::io::ErrorKind::TimedOut, err),
            Error::NotFound(_) => std::io::Error::new(std::io::ErrorKind::NotFound, err),
            Error::PermissionDenied(_) => {
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, err)
            }
            other => std::io::Error::other(other),
        }
    }
}
