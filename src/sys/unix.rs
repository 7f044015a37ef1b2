//! POSIX serial backend over raw termios.
//!
//! All native calls live here. Each wrapper reads `errno` immediately after
//! a failing call and converts it to an [`io::Error`] before anything else
//! runs. The descriptor is owned by [`TtyPort`] and released on drop.

use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{
    FlowControl, LineStatus, ParamFlags, Parity, PortConfig, PurgeRequest, StopBits,
};
use crate::error::{Error, Result};

#[cfg(target_os = "linux")]
const CMSPAR: libc::tcflag_t = 0o10_000_000_000;

/// Linux legacy custom-divisor interface (`linux/serial.h`).
#[cfg(target_os = "linux")]
mod divisor {
    pub const TIOCGSERIAL: libc::c_ulong = 0x541E;
    pub const TIOCSSERIAL: libc::c_ulong = 0x541F;
    pub const ASYNC_SPD_CUST: libc::c_int = 0x0030;

    #[repr(C)]
    #[derive(Clone, Copy)]
    pub struct SerialStruct {
        pub type_: libc::c_int,
        pub line: libc::c_int,
        pub port: libc::c_uint,
        pub irq: libc::c_int,
        pub flags: libc::c_int,
        pub xmit_fifo_size: libc::c_int,
        pub custom_divisor: libc::c_int,
        pub baud_base: libc::c_int,
        pub close_delay: libc::c_ushort,
        pub io_type: libc::c_char,
        pub reserved_char: [libc::c_char; 1],
        pub hub6: libc::c_int,
        pub closing_wait: libc::c_ushort,
        pub closing_wait2: libc::c_ushort,
        pub iomem_base: *mut libc::c_uchar,
        pub iomem_reg_shift: libc::c_ushort,
        pub port_high: libc::c_uint,
        pub iomap_base: libc::c_ulong,
    }
}

// IOKit _IOW('T', 2, speed_t); the length field depends on the platform
// width of speed_t.
#[cfg(target_os = "macos")]
const IOSSIOSPEED: libc::c_ulong = 0x8000_0000
    | ((mem::size_of::<libc::speed_t>() as libc::c_ulong & 0x1FFF) << 16)
    | (b'T' as libc::c_ulong) << 8
    | 2;

/// Map a numeric baud rate to its termios constant.
///
/// Rates absent from this table take the custom-rate path in
/// [`TtyPort::configure`] (Linux divisor fallback, macOS `IOSSIOSPEED`).
pub(crate) fn baud_to_speed(baud: u32) -> Option<libc::speed_t> {
    match baud {
        0 => Some(libc::B0),
        50 => Some(libc::B50),
        75 => Some(libc::B75),
        110 => Some(libc::B110),
        134 => Some(libc::B134),
        150 => Some(libc::B150),
        200 => Some(libc::B200),
        300 => Some(libc::B300),
        600 => Some(libc::B600),
        1200 => Some(libc::B1200),
        1800 => Some(libc::B1800),
        2400 => Some(libc::B2400),
        4800 => Some(libc::B4800),
        9600 => Some(libc::B9600),
        19200 => Some(libc::B19200),
        38400 => Some(libc::B38400),
        57600 => Some(libc::B57600),
        115200 => Some(libc::B115200),
        230400 => Some(libc::B230400),
        #[cfg(target_os = "linux")]
        460800 => Some(libc::B460800),
        #[cfg(target_os = "linux")]
        500000 => Some(libc::B500000),
        #[cfg(target_os = "linux")]
        576000 => Some(libc::B576000),
        #[cfg(target_os = "linux")]
        921600 => Some(libc::B921600),
        #[cfg(target_os = "linux")]
        1000000 => Some(libc::B1000000),
        #[cfg(target_os = "linux")]
        1152000 => Some(libc::B1152000),
        #[cfg(target_os = "linux")]
        1500000 => Some(libc::B1500000),
        #[cfg(target_os = "linux")]
        2000000 => Some(libc::B2000000),
        #[cfg(target_os = "linux")]
        2500000 => Some(libc::B2500000),
        #[cfg(target_os = "linux")]
        3000000 => Some(libc::B3000000),
        #[cfg(target_os = "linux")]
        3500000 => Some(libc::B3500000),
        #[cfg(target_os = "linux")]
        4000000 => Some(libc::B4000000),
        _ => None,
    }
}

/// A serial port backed by a file descriptor.
#[derive(Debug)]
pub(crate) struct TtyPort {
    fd: RawFd,
}

impl TtyPort {
    fn read_attrs(&self) -> io::Result<libc::termios> {
        let mut tio: libc::termios = unsafe { mem::zeroed() };
        if unsafe { libc::tcgetattr(self.fd, &mut tio) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(tio)
    }

    fn write_attrs(&self, tio: &libc::termios) -> Result<()> {
        if unsafe { libc::tcsetattr(self.fd, libc::TCSANOW, tio) } != 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Open and probe a device node.
    pub fn open(path: &str, exclusive: bool) -> Result<Self> {
        let c_path = std::ffi::CString::new(path)
            .map_err(|_| Error::config("port name contains an interior NUL byte"))?;

        let fd = unsafe {
            libc::open(
                c_path.as_ptr(),
                libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK,
            )
        };
        if fd < 0 {
            let err = io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::EBUSY) => Error::busy(path),
                Some(libc::ENOENT) => Error::not_found(path),
                Some(libc::EACCES) => Error::permission_denied(path),
                _ => Error::not_found(path),
            });
        }
        let port = TtyPort { fd };

        // Capability probe: only real terminal devices answer tcgetattr.
        if port.read_attrs().is_err() {
            return Err(Error::not_a_serial_port(path));
        }

        // Advisory exclusivity; unsupported or denied is not fatal.
        if exclusive {
            unsafe {
                libc::ioctl(fd, libc::TIOCEXCL as _);
            }
        }

        // The non-blocking flag was only for the open itself.
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        if unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) } < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        Ok(port)
    }

    /// Apply a full parameter set as one `tcsetattr` commit.
    pub fn configure(&self, config: &PortConfig) -> Result<()> {
        config.validate()?;
        let mut tio = self.read_attrs()?;

        match baud_to_speed(config.baud_rate) {
            Some(speed) => {
                let rc = unsafe {
                    if libc::cfsetispeed(&mut tio, speed) < 0 {
                        -1
                    } else {
                        libc::cfsetospeed(&mut tio, speed)
                    }
                };
                if rc < 0 {
                    return Err(Error::Io(io::Error::last_os_error()));
                }
            }
            None => self.prepare_custom_baud(&mut tio, config.baud_rate)?,
        }

        tio.c_cflag &= !libc::CSIZE;
        tio.c_cflag |= match config.data_bits as u8 {
            5 => libc::CS5,
            6 => libc::CS6,
            7 => libc::CS7,
            _ => libc::CS8,
        };

        // termios cannot express 1.5 stop bits; both map to two.
        match config.stop_bits {
            StopBits::One => tio.c_cflag &= !libc::CSTOPB,
            StopBits::OnePointFive | StopBits::Two => tio.c_cflag |= libc::CSTOPB,
        }

        tio.c_cflag |= libc::CREAD | libc::CLOCAL;
        tio.c_cflag &= !libc::CRTSCTS;

        tio.c_lflag &= !(libc::ICANON
            | libc::ECHO
            | libc::ECHOE
            | libc::ECHOK
            | libc::ECHONL
            | libc::ECHOCTL
            | libc::ECHOPRT
            | libc::ECHOKE
            | libc::ISIG
            | libc::IEXTEN);
        tio.c_oflag &= !libc::OPOST;
        tio.c_iflag &= !(libc::IXON
            | libc::IXOFF
            | libc::IXANY
            | libc::INPCK
            | libc::IGNPAR
            | libc::PARMRK
            | libc::ISTRIP
            | libc::IGNBRK
            | libc::BRKINT
            | libc::INLCR
            | libc::IGNCR
            | libc::ICRNL);
        #[cfg(target_os = "linux")]
        {
            tio.c_iflag &= !libc::IUCLC;
        }

        if config.flags.contains(ParamFlags::IGNORE_PARITY_ERRORS) {
            tio.c_iflag |= libc::IGNPAR;
        }
        if config.flags.contains(ParamFlags::MARK_PARITY_ERRORS) {
            tio.c_iflag |= libc::PARMRK;
        }

        // The native read itself never blocks; waiting happens in poll.
        tio.c_cc[libc::VMIN] = 0;
        tio.c_cc[libc::VTIME] = 0;

        tio.c_cflag &= !(libc::PARENB | libc::PARODD);
        #[cfg(target_os = "linux")]
        {
            tio.c_cflag &= !CMSPAR;
        }
        match config.parity {
            Parity::None => {}
            Parity::Odd => {
                tio.c_cflag |= libc::PARENB | libc::PARODD;
                tio.c_iflag |= libc::INPCK;
            }
            Parity::Even => {
                tio.c_cflag |= libc::PARENB;
                tio.c_iflag |= libc::INPCK;
            }
            Parity::Mark | Parity::Space => {
                #[cfg(target_os = "linux")]
                {
                    tio.c_cflag |= libc::PARENB | CMSPAR;
                    if config.parity == Parity::Mark {
                        tio.c_cflag |= libc::PARODD;
                    }
                    tio.c_iflag |= libc::INPCK;
                }
                #[cfg(not(target_os = "linux"))]
                return Err(Error::config(
                    "mark/space parity is not supported on this platform",
                ));
            }
        }

        self.write_attrs(&tio)?;

        // IOSSIOSPEED only works after the tcsetattr commit. Table rates
        // were already applied by it.
        #[cfg(target_os = "macos")]
        {
            if baud_to_speed(config.baud_rate).is_none() {
                let speed = config.baud_rate as libc::speed_t;
                if unsafe { libc::ioctl(self.fd, IOSSIOSPEED as _, &speed) } < 0 {
                    return Err(Error::Io(io::Error::last_os_error()));
                }
            }
        }

        self.apply_initial_levels(config)
    }

    /// Program the legacy divisor registers for a rate outside the table.
    #[cfg(target_os = "linux")]
    fn prepare_custom_baud(&self, tio: &mut libc::termios, baud_rate: u32) -> Result<()> {
        use divisor::{SerialStruct, ASYNC_SPD_CUST, TIOCGSERIAL, TIOCSSERIAL};

        let mut serial: SerialStruct = unsafe { mem::zeroed() };
        if unsafe { libc::ioctl(self.fd, TIOCGSERIAL as _, &mut serial) } < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        let divisor = (serial.baud_base as i64) / i64::from(baud_rate);
        if serial.baud_base <= 0 || divisor == 0 {
            return Err(Error::config(format!(
                "baud rate {} exceeds the base clock {}",
                baud_rate, serial.baud_base
            )));
        }
        serial.custom_divisor = divisor as libc::c_int;
        serial.flags |= ASYNC_SPD_CUST;
        if unsafe { libc::ioctl(self.fd, TIOCSSERIAL as _, &mut serial) } < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        // B38400 is the placeholder the divisor hangs off.
        let rc = unsafe {
            if libc::cfsetispeed(tio, libc::B38400) < 0 {
                -1
            } else {
                libc::cfsetospeed(tio, libc::B38400)
            }
        };
        if rc < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// On macOS the exact rate is applied post-commit via `IOSSIOSPEED`.
    #[cfg(target_os = "macos")]
    fn prepare_custom_baud(&self, _tio: &mut libc::termios, _baud_rate: u32) -> Result<()> {
        Ok(())
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    fn prepare_custom_baud(&self, _tio: &mut libc::termios, baud_rate: u32) -> Result<()> {
        Err(Error::config(format!(
            "non-standard baud rate {baud_rate} is not supported on this platform"
        )))
    }

    /// Set RTS and DTR to their configured levels after the commit.
    ///
    /// Devices without modem-control lines (pseudo-terminals, some USB
    /// adapters) answer `ENOTTY` or `EINVAL` here; for those the levels are
    /// simply inapplicable and the configuration stands.
    fn apply_initial_levels(&self, config: &PortConfig) -> Result<()> {
        let mut bits: libc::c_int = 0;
        if unsafe { libc::ioctl(self.fd, libc::TIOCMGET as _, &mut bits) } < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::ENOTTY) | Some(libc::EINVAL) => Ok(()),
                _ => Err(Error::Io(err)),
            };
        }
        for (level, bit) in [(config.rts, libc::TIOCM_RTS), (config.dtr, libc::TIOCM_DTR)] {
            if level {
                bits |= bit;
            } else {
                bits &= !bit;
            }
        }
        if unsafe { libc::ioctl(self.fd, libc::TIOCMSET as _, &bits) } < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    fn set_modem_bit(&self, bit: libc::c_int, level: bool) -> Result<()> {
        let mut bits: libc::c_int = 0;
        if unsafe { libc::ioctl(self.fd, libc::TIOCMGET as _, &mut bits) } < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        if level {
            bits |= bit;
        } else {
            bits &= !bit;
        }
        if unsafe { libc::ioctl(self.fd, libc::TIOCMSET as _, &bits) } < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    pub fn set_rts(&self, level: bool) -> Result<()> {
        self.set_modem_bit(libc::TIOCM_RTS, level)
    }

    pub fn set_dtr(&self, level: bool) -> Result<()> {
        self.set_modem_bit(libc::TIOCM_DTR, level)
    }

    pub fn set_flow_control(&self, mode: FlowControl) -> Result<()> {
        let mut tio = self.read_attrs()?;
        tio.c_cflag &= !libc::CRTSCTS;
        tio.c_iflag &= !(libc::IXON | libc::IXOFF);
        // CRTSCTS is one combined flag: either hardware direction enables it.
        if mode.intersects(FlowControl::RTSCTS_IN | FlowControl::RTSCTS_OUT) {
            tio.c_cflag |= libc::CRTSCTS;
        }
        if mode.contains(FlowControl::XONXOFF_IN) {
            tio.c_iflag |= libc::IXOFF;
        }
        if mode.contains(FlowControl::XONXOFF_OUT) {
            tio.c_iflag |= libc::IXON;
        }
        self.write_attrs(&tio)
    }

    pub fn flow_control(&self) -> Result<FlowControl> {
        let tio = self.read_attrs()?;
        let mut mode = FlowControl::empty();
        if tio.c_cflag & libc::CRTSCTS != 0 {
            mode |= FlowControl::RTSCTS_IN | FlowControl::RTSCTS_OUT;
        }
        if tio.c_iflag & libc::IXOFF != 0 {
            mode |= FlowControl::XONXOFF_IN;
        }
        if tio.c_iflag & libc::IXON != 0 {
            mode |= FlowControl::XONXOFF_OUT;
        }
        Ok(mode)
    }

    pub fn line_status(&self) -> Result<LineStatus> {
        let mut bits: libc::c_int = 0;
        if unsafe { libc::ioctl(self.fd, libc::TIOCMGET as _, &mut bits) } < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        let mut status = LineStatus::empty();
        if bits & libc::TIOCM_CTS != 0 {
            status |= LineStatus::CTS;
        }
        if bits & libc::TIOCM_DSR != 0 {
            status |= LineStatus::DSR;
        }
        if bits & libc::TIOCM_RNG != 0 {
            status |= LineStatus::RING;
        }
        if bits & libc::TIOCM_CAR != 0 {
            status |= LineStatus::RLSD;
        }
        Ok(status)
    }

    pub fn send_break(&self, duration: Duration) -> Result<bool> {
        if duration.is_zero() {
            return Ok(false);
        }
        if unsafe { libc::ioctl(self.fd, libc::TIOCSBRK as _) } < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        thread::sleep(duration);
        if unsafe { libc::ioctl(self.fd, libc::TIOCCBRK as _) } < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(true)
    }

    pub fn purge(&self, request: PurgeRequest) -> Result<()> {
        let rx = request.contains(PurgeRequest::RX_CLEAR);
        let tx = request.contains(PurgeRequest::TX_CLEAR);
        let selector = match (rx, tx) {
            (true, true) => libc::TCIOFLUSH,
            (true, false) => libc::TCIFLUSH,
            (false, true) => libc::TCOFLUSH,
            // Abort-only requests have no POSIX counterpart.
            (false, false) => return Ok(()),
        };
        if unsafe { libc::tcflush(self.fd, selector) } < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Park the caller until the descriptor is readable or the timeout ends.
    fn wait_readable(&self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.and_then(|d| Instant::now().checked_add(d));
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        loop {
            let timeout_ms: libc::c_int = match deadline {
                None => -1,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    remaining
                        .as_nanos()
                        .div_ceil(1_000_000)
                        .min(libc::c_int::MAX as u128) as libc::c_int
                }
            };
            let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            if ret > 0 {
                return Ok(());
            }
            if ret == 0 {
                return Err(Error::timeout(timeout.unwrap_or(Duration::ZERO)));
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(Error::Io(err));
            }
        }
    }

    /// One bounded read after readiness; partial results are normal.
    pub fn read(&self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.wait_readable(timeout)?;
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(n as usize)
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = unsafe { libc::write(self.fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        if n < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(n as usize)
    }

    pub fn bytes_to_read(&self) -> Result<u32> {
        let mut count: libc::c_int = 0;
        if unsafe { libc::ioctl(self.fd, libc::FIONREAD as _, &mut count) } < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(count.max(0) as u32)
    }

    pub fn bytes_to_write(&self) -> Result<u32> {
        let mut count: libc::c_int = 0;
        if unsafe { libc::ioctl(self.fd, libc::TIOCOUTQ as _, &mut count) } < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(count.max(0) as u32)
    }

    /// Liveness probe: a live descriptor still answers the count ioctl.
    pub fn check_alive(&self, _name: Option<&str>) -> Result<()> {
        self.bytes_to_read().map(|_| ())
    }

    /// Release the descriptor. Safe to call twice; the second is a no-op.
    pub fn close(&mut self) -> io::Result<()> {
        if self.fd < 0 {
            return Ok(());
        }
        let fd = self.fd;
        self.fd = -1;
        unsafe {
            libc::ioctl(fd, libc::TIOCNXCL as _);
        }
        if unsafe { libc::close(fd) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd
    }

    pub fn from_raw(fd: RawFd) -> Self {
        TtyPort { fd }
    }

    pub fn into_raw(mut self) -> RawFd {
        mem::replace(&mut self.fd, -1)
    }
}

impl Drop for TtyPort {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
