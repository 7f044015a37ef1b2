//! Cross-platform serial port control.
//!
//! This library owns the full lifecycle of a serial device handle: open,
//! parameter configuration, control lines and flow control, blocking byte
//! I/O with optional timeouts, buffer introspection, disconnect probing,
//! and close. Two build-time-selected backends do the native work: termios
//! over `libc` on Unix, the Win32 COMM API over `winapi` on Windows.
//!
//! The crate is the blocking native layer. It starts no threads, takes no
//! locks, and pulls in no async runtime; concurrency discipline belongs to
//! the caller. Reads and writes take `&self`, so one port wrapped in an
//! `Arc` supports the classic split of a reader thread and a writer
//! thread, and [`SerialPort::close`] consuming the value guarantees
//! nobody closes a port another thread still holds.
//!
//! # Modules
//!
//! - `config`: Port parameter types, masks, and validation
//! - `error`: Unified error handling with stable numeric codes
//! - `port`: The [`SerialPort`] owner type
//! - `list`: Port discovery
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use commport::{PortConfig, SerialPort};
//!
//! let port = SerialPort::open("/dev/ttyUSB0", true)?;
//! port.configure(&PortConfig::new(115_200))?;
//!
//! port.write(b"AT\r\n")?;
//! let mut buf = [0u8; 64];
//! let n = port.read(&mut buf, Some(Duration::from_millis(500)))?;
//! println!("reply: {:?}", &buf[..n]);
//!
//! port.close()?;
//! # Ok::<(), commport::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod list;
pub mod port;

mod sys;

// Re-export commonly used types for convenience
pub use config::{
    DataBits, FlowControl, LineStatus, ParamFlags, Parity, PortConfig, PurgeRequest, StopBits,
};
pub use error::{Error, Result};
pub use list::available_ports;
pub use port::SerialPort;

/// The version of this library, from the build manifest.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
