//! Shared test utilities for the serial port test suites.
//!
//! This module provides common test infrastructure including:
//! - Pseudo-terminal pairs standing in for real serial hardware (unix)
//! - Helpers for driving the control side of a pty
//! - Environment-gated hardware test configuration
//! - Timing assertion helpers

#![allow(dead_code)]

use std::env;
use std::time::Duration;

/// A pseudo-terminal pair.
///
/// The slave end is a real tty that can be opened by path, which makes it
/// the closest hardware-free stand-in for a local serial device: bytes
/// written to the master side appear on the slave's input, and bytes the
/// slave transmits can be collected from the master.
///
/// The pair keeps its own slave descriptor open for the whole lifetime so
/// the master never sees a hangup between test steps.
#[cfg(unix)]
pub struct PtyPair {
    master: libc::c_int,
    slave: libc::c_int,
    path: String,
}

#[cfg(unix)]
impl PtyPair {
    /// Allocate a fresh pseudo-terminal pair.
    ///
    /// # Example
    /// ```ignore
    /// let pty = PtyPair::open();
    /// let port = SerialPort::open(pty.slave_path(), false).unwrap();
    /// ```
    pub fn open() -> Self {
        let mut master: libc::c_int = -1;
        let mut slave: libc::c_int = -1;
        let mut name: [libc::c_char; 128] = [0; 128];
        let rc = unsafe {
            libc::openpty(
                &mut master,
                &mut slave,
                name.as_mut_ptr(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(rc, 0, "openpty failed: {}", std::io::Error::last_os_error());

        let path = unsafe { std::ffi::CStr::from_ptr(name.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        assert!(!path.is_empty(), "openpty returned an empty slave name");

        PtyPair {
            master,
            slave,
            path,
        }
    }

    /// Path of the slave device node, e.g. `/dev/pts/3`.
    pub fn slave_path(&self) -> &str {
        &self.path
    }

    /// Push bytes into the slave's input stream via the master side.
    pub fn feed(&self, bytes: &[u8]) {
        let mut offset = 0;
        while offset < bytes.len() {
            let n = unsafe {
                libc::write(
                    self.master,
                    bytes[offset..].as_ptr() as *const libc::c_void,
                    bytes.len() - offset,
                )
            };
            assert!(
                n > 0,
                "pty master write failed: {}",
                std::io::Error::last_os_error()
            );
            offset += n as usize;
        }
    }

    /// Collect up to `want` bytes the slave side transmitted, waiting at
    /// most `timeout` overall. Returns whatever arrived in time.
    pub fn drain(&self, want: usize, timeout: Duration) -> Vec<u8> {
        let deadline = std::time::Instant::now() + timeout;
        let mut out = Vec::with_capacity(want);

        while out.len() < want {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                break;
            }

            let mut fds = libc::pollfd {
                fd: self.master,
                events: libc::POLLIN,
                revents: 0,
            };
            let millis = remaining.as_millis().min(1000) as libc::c_int;
            let rc = unsafe { libc::poll(&mut fds, 1, millis.max(1)) };
            if rc <= 0 {
                continue;
            }

            let mut buf = [0u8; 512];
            let n = unsafe {
                libc::read(self.master, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
            };
            if n <= 0 {
                break;
            }
            out.extend_from_slice(&buf[..n as usize]);
        }
        out
    }
}

#[cfg(unix)]
impl Drop for PtyPair {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.master);
            libc::close(self.slave);
        }
    }
}

/// Hardware test configuration from environment variables.
pub struct TestPortConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub loopback_enabled: bool,
}

impl TestPortConfig {
    /// Read the test configuration, or `None` when no hardware is set up.
    pub fn from_env() -> Option<Self> {
        let port_name = env::var("TEST_PORT").ok()?;
        let baud_rate = env::var("TEST_BAUD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(9600);
        let loopback_enabled = env::var("TEST_LOOPBACK").ok().as_deref() == Some("1");

        Some(TestPortConfig {
            port_name,
            baud_rate,
            loopback_enabled,
        })
    }
}

/// Skip helper: returns the hardware configuration or prints why the test
/// is being skipped.
pub fn hardware_config() -> Option<TestPortConfig> {
    let config = TestPortConfig::from_env();
    if config.is_none() {
        println!("⏭️  Skipping hardware test: TEST_PORT not set");
        println!("   Set TEST_PORT=/dev/ttyUSB0 (or COM3) to run hardware tests");
    }
    config
}

/// Assert that a measured duration falls within `expected ± tolerance`.
pub fn assert_duration_within(
    actual: Duration,
    expected: Duration,
    tolerance: Duration,
    message: &str,
) {
    let lower = expected.saturating_sub(tolerance);
    let upper = expected + tolerance;

    assert!(
        actual >= lower && actual <= upper,
        "{}: expected {:?} ± {:?}, got {:?}",
        message,
        expected,
        tolerance,
        actual
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_pty_pair_allocates_named_slave() {
        let pty = PtyPair::open();
        assert!(pty.slave_path().starts_with("/dev/"));
    }

    #[cfg(unix)]
    #[test]
    fn test_pty_drain_times_out_empty() {
        let pty = PtyPair::open();
        let collected = pty.drain(8, Duration::from_millis(50));
        assert!(collected.is_empty());
    }

    #[test]
    fn test_assert_duration_within() {
        assert_duration_within(
            Duration::from_millis(100),
            Duration::from_millis(95),
            Duration::from_millis(10),
            "should be within tolerance",
        );
    }

    #[test]
    #[should_panic]
    fn test_assert_duration_out_of_range() {
        assert_duration_within(
            Duration::from_millis(200),
            Duration::from_millis(100),
            Duration::from_millis(10),
            "should panic",
        );
    }
}
