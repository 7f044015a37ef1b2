//! Build-time selected native backends.
//!
//! Exactly one backend compiles per target; everything above this module is
//! platform-neutral.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub(crate) use unix::TtyPort as RawPort;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub(crate) use windows::ComPort as RawPort;
#[cfg(windows)]
pub(crate) use windows::list_ports;
