//! Platform-neutral serial port owner.
//!
//! [`SerialPort`] owns exactly one native handle. The open/closed state
//! machine is encoded in ownership: [`SerialPort::close`] consumes the
//! value, so no operation on a closed port can be written. Reads and
//! writes take `&self`, which makes the one sanctioned concurrency pattern
//! explicit: wrap the port in an `Arc`, read from one thread and write
//! from another, and reclaim sole ownership before closing.

use std::fmt;
use std::io;
use std::time::Duration;

use tracing::{debug, trace};

use crate::config::{FlowControl, LineStatus, PortConfig, PurgeRequest};
use crate::error::{Error, Result};
use crate::sys;

/// An open serial port.
pub struct SerialPort {
    inner: sys::RawPort,
    /// `None` only for ports adopted from a raw descriptor.
    name: Option<String>,
}

impl SerialPort {
    /// Open a serial port by system name.
    ///
    /// The device is probed before the call returns: opening something
    /// that is not a serial port fails with [`Error::NotASerialPort`] and
    /// leaks nothing. `exclusive` requests an advisory platform lock where
    /// one exists (`TIOCEXCL`); on Windows every open is already
    /// exclusive and the flag has no extra effect.
    ///
    /// # Arguments
    /// * `name` - The system path to the serial port (e.g., "/dev/ttyUSB0" or "COM3")
    /// * `exclusive` - Whether to request exclusive access where supported
    ///
    /// # Example
    /// ```no_run
    /// use commport::{PortConfig, SerialPort};
    ///
    /// let port = SerialPort::open("/dev/ttyUSB0", true)?;
    /// port.configure(&PortConfig::new(115_200))?;
    /// # Ok::<(), commport::Error>(())
    /// ```
    pub fn open(name: &str, exclusive: bool) -> Result<Self> {
        let inner = sys::RawPort::open(name, exclusive)?;
        debug!(port = %name, exclusive, "opened serial port");
        Ok(SerialPort {
            inner,
            name: Some(name.to_string()),
        })
    }

    /// Open with exclusive access and apply the default 9600 8N1 setup.
    pub fn open_default(name: &str) -> Result<Self> {
        let port = Self::open(name, true)?;
        port.configure(&PortConfig::default())?;
        Ok(port)
    }

    /// The name this port was opened under, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Apply a full parameter set as one native commit.
    ///
    /// Validation failures leave the device untouched. The RTS and DTR
    /// levels from the configuration are applied after the commit. A port
    /// may be reconfigured at any time, including mid-traffic.
    pub fn configure(&self, config: &PortConfig) -> Result<()> {
        self.inner.configure(config)?;
        debug!(
            port = ?self.name,
            baud = config.baud_rate,
            data_bits = config.data_bits as u8,
            stop_bits = config.stop_bits as u8,
            parity = config.parity as u8,
            "configured serial port"
        );
        Ok(())
    }

    /// Set the RTS line level.
    pub fn set_rts(&self, level: bool) -> Result<()> {
        self.inner.set_rts(level)?;
        trace!(port = ?self.name, level, "set RTS");
        Ok(())
    }

    /// Set the DTR line level.
    pub fn set_dtr(&self, level: bool) -> Result<()> {
        self.inner.set_dtr(level)?;
        trace!(port = ?self.name, level, "set DTR");
        Ok(())
    }

    /// Select flow control directions. The empty set disables flow control.
    ///
    /// Note the POSIX read-back asymmetry: hardware flow control is one
    /// combined termios flag there, so enabling a single hardware
    /// direction reads back as both. See [`SerialPort::flow_control`].
    pub fn set_flow_control(&self, mode: FlowControl) -> Result<()> {
        self.inner.set_flow_control(mode)?;
        trace!(port = ?self.name, ?mode, "set flow control");
        Ok(())
    }

    /// Decode the currently active flow control directions.
    pub fn flow_control(&self) -> Result<FlowControl> {
        self.inner.flow_control()
    }

    /// Read the current modem input lines.
    pub fn line_status(&self) -> Result<LineStatus> {
        self.inner.line_status()
    }

    /// Hold the TX line in break for `duration`, blocking the caller.
    ///
    /// Returns `Ok(false)` without touching the device when `duration`
    /// is zero. The break is cleared before returning.
    pub fn send_break(&self, duration: Duration) -> Result<bool> {
        let sent = self.inner.send_break(duration)?;
        trace!(port = ?self.name, ?duration, sent, "sent break");
        Ok(sent)
    }

    /// Discard or abort buffered data per `request`.
    ///
    /// An empty request is rejected before any native call. Abort bits
    /// are accepted on both platforms but carry no portable guarantee.
    pub fn purge(&self, request: PurgeRequest) -> Result<()> {
        if request.is_empty() {
            return Err(Error::config("empty purge request"));
        }
        self.inner.purge(request)?;
        trace!(port = ?self.name, ?request, "purged buffers");
        Ok(())
    }

    /// Read once the device has data, or fail after `timeout`.
    ///
    /// Blocks until at least one byte is available, then performs a single
    /// bounded native read and returns however many bytes it yielded,
    /// which may be less than `buf.len()`. Partial reads are normal; loop
    /// to accumulate. `None` waits indefinitely. `Some(d)` bounds the wait
    /// and yields [`Error::Timeout`] if it elapses with nothing
    /// transferred; `Some(Duration::ZERO)` is a pure poll.
    ///
    /// `Ok(0)` is possible and is not an error: it reports a read that
    /// completed without data (end of stream, or a byte consumed between
    /// readiness and the read). An empty `buf` returns `Ok(0)` without
    /// waiting.
    pub fn read(&self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize> {
        self.inner.read(buf, timeout)
    }

    /// Single-byte [`SerialPort::read`].
    ///
    /// `Ok(None)` reports a native read that completed without data.
    pub fn read_byte(&self, timeout: Option<Duration>) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        let n = self.inner.read(&mut byte, timeout)?;
        Ok(if n == 0 { None } else { Some(byte[0]) })
    }

    /// Write once; the device may accept fewer bytes than offered.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.inner.write(buf)
    }

    /// Single-byte [`SerialPort::write`].
    pub fn write_byte(&self, value: u8) -> Result<usize> {
        self.inner.write(&[value])
    }

    /// Unread bytes waiting in the input buffer.
    pub fn bytes_to_read(&self) -> Result<u32> {
        self.inner.bytes_to_read()
    }

    /// Untransmitted bytes waiting in the output buffer.
    pub fn bytes_to_write(&self) -> Result<u32> {
        self.inner.bytes_to_write()
    }

    /// Probe whether the handle still maps a live device.
    ///
    /// Detects surprise removal of USB adapters. On POSIX the existing
    /// descriptor is probed directly; on Windows the stored name is
    /// re-opened, because a dead device keeps its handle alive there.
    /// The probe never disturbs the byte streams.
    pub fn check_alive(&self) -> Result<()> {
        self.inner.check_alive(self.name.as_deref())
    }

    /// Close the port, surfacing the release error `Drop` would swallow.
    ///
    /// Consuming `self` is what makes use-after-close unrepresentable; it
    /// also means a shared (`Arc`) port can only be closed once every
    /// other reference is gone.
    pub fn close(self) -> Result<()> {
        let mut this = self;
        this.inner.close()?;
        debug!(port = ?this.name, "closed serial port");
        Ok(())
    }
}

impl fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialPort")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl io::Read for SerialPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        SerialPort::read(self, buf, None).map_err(Into::into)
    }
}

impl io::Read for &SerialPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        SerialPort::read(self, buf, None).map_err(Into::into)
    }
}

impl io::Write for SerialPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        SerialPort::write(self, buf).map_err(Into::into)
    }

    // The layer exposes no drain primitive; writes go straight to the OS.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for &SerialPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        SerialPort::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
impl std::os::unix::io::AsRawFd for SerialPort {
    fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
        self.inner.raw_fd()
    }
}

#[cfg(unix)]
impl std::os::unix::io::IntoRawFd for SerialPort {
    fn into_raw_fd(self) -> std::os::unix::io::RawFd {
        self.inner.into_raw()
    }
}

#[cfg(unix)]
impl std::os::unix::io::FromRawFd for SerialPort {
    /// Adopt an already open descriptor. The port has no name, so the
    /// Windows-style by-name probe is unavailable; everything else works.
    unsafe fn from_raw_fd(fd: std::os::unix::io::RawFd) -> Self {
        SerialPort {
            inner: sys::RawPort::from_raw(fd),
            name: None,
        }
    }
}

#[cfg(windows)]
impl std::os::windows::io::AsRawHandle for SerialPort {
    fn as_raw_handle(&self) -> std::os::windows::io::RawHandle {
        self.inner.raw_handle()
    }
}

#[cfg(windows)]
impl std::os::windows::io::IntoRawHandle for SerialPort {
    fn into_raw_handle(self) -> std::os::windows::io::RawHandle {
        self.inner.into_raw()
    }
}

#[cfg(windows)]
impl std::os::windows::io::FromRawHandle for SerialPort {
    unsafe fn from_raw_handle(handle: std::os::windows::io::RawHandle) -> Self {
        SerialPort {
            inner: sys::RawPort::from_raw(handle),
            name: None,
        }
    }
}
