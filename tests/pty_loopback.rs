//! End-to-end tests over pseudo-terminal pairs.
//!
//! A pty slave is a real tty that can be opened by path, so everything
//! short of modem-line electronics can be exercised without hardware:
//! lifecycle, configuration commits, loopback byte flow, timeouts, purge,
//! and buffer counts. Operations a pty cannot honor (modem lines, break)
//! are asserted for totality rather than for a particular outcome.

#![cfg(unix)]

mod common;

use std::io::{Read as _, Write as _};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use commport::{DataBits, Error, FlowControl, Parity, PortConfig, PurgeRequest, SerialPort, StopBits};

/// Accumulate `want` bytes from the port, retrying short reads.
fn read_exact_with_deadline(port: &SerialPort, want: usize, overall: Duration) -> Vec<u8> {
    let deadline = Instant::now() + overall;
    let mut out = Vec::with_capacity(want);
    let mut buf = [0u8; 256];
    while out.len() < want && Instant::now() < deadline {
        match port.read(&mut buf, Some(Duration::from_millis(100))) {
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(Error::Timeout(_)) => continue,
            Err(err) => panic!("read failed: {err}"),
        }
    }
    out
}

#[test]
fn test_library_reports_version() {
    let version = commport::version();
    assert!(version.contains('.'), "unexpected version: {version}");
}

#[test]
fn test_lifecycle_open_configure_close() {
    let pty = common::PtyPair::open();

    let port = SerialPort::open(pty.slave_path(), false).unwrap();
    assert_eq!(port.name(), Some(pty.slave_path()));
    port.configure(&PortConfig::new(115_200)).unwrap();
    port.close().unwrap();

    // The descriptor is fully released; an independent open succeeds.
    let port = SerialPort::open(pty.slave_path(), true).unwrap();
    port.close().unwrap();
}

#[test]
fn test_open_missing_device_is_not_found() {
    let err = SerialPort::open("/dev/nonexistent_port_12345", true).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(err.raw_code(), -2);
}

#[test]
fn test_open_regular_file_fails_capability_probe() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.path().to_str().unwrap();

    let err = SerialPort::open(path, false).unwrap_err();
    assert!(matches!(err, Error::NotASerialPort(_)));
    assert_eq!(err.raw_code(), -4);
}

#[test]
fn test_exclusive_reopen_is_busy() {
    if unsafe { libc::geteuid() } == 0 {
        println!("⏭️  Skipping: root bypasses exclusive tty locks");
        return;
    }

    let pty = common::PtyPair::open();
    let holder = SerialPort::open(pty.slave_path(), true).unwrap();

    let err = SerialPort::open(pty.slave_path(), true).unwrap_err();
    assert!(matches!(err, Error::Busy(_)));
    assert_eq!(err.raw_code(), -1);

    holder.close().unwrap();
    let port = SerialPort::open(pty.slave_path(), true).unwrap();
    port.close().unwrap();
}

#[test]
fn test_configure_applies_parameter_sets() {
    let pty = common::PtyPair::open();
    let port = SerialPort::open(pty.slave_path(), false).unwrap();

    port.configure(&PortConfig::new(9600)).unwrap();

    let mut config = PortConfig::new(19_200);
    config.data_bits = DataBits::Seven;
    config.parity = Parity::Even;
    config.stop_bits = StopBits::Two;
    config.rts = false;
    config.dtr = false;
    port.configure(&config).unwrap();

    // Reconfiguration is allowed at any time on an open port.
    port.configure(&PortConfig::new(115_200)).unwrap();
}

#[test]
fn test_custom_baud_fails_cleanly_on_pty() {
    let pty = common::PtyPair::open();
    let port = SerialPort::open(pty.slave_path(), false).unwrap();
    port.configure(&PortConfig::new(9600)).unwrap();

    // Ptys have no divisor registers, so a rate outside the termios table
    // must fail and leave the port usable.
    let err = port.configure(&PortConfig::new(31_250)).unwrap_err();
    assert!(matches!(err, Error::Io(_) | Error::Config(_)));

    port.check_alive().unwrap();
    pty.feed(b"z");
    let byte = port.read_byte(Some(Duration::from_secs(2))).unwrap();
    assert_eq!(byte, Some(b'z'));
}

#[test]
fn test_flow_control_roundtrip() {
    let pty = common::PtyPair::open();
    let port = SerialPort::open(pty.slave_path(), false).unwrap();
    port.configure(&PortConfig::new(9600)).unwrap();

    assert_eq!(port.flow_control().unwrap(), FlowControl::empty());

    let software = FlowControl::XONXOFF_IN | FlowControl::XONXOFF_OUT;
    port.set_flow_control(software).unwrap();
    assert_eq!(port.flow_control().unwrap(), software);

    // Hardware flow control is one combined termios flag, so requesting a
    // single direction reads back as both.
    port.set_flow_control(FlowControl::RTSCTS_IN).unwrap();
    let active = port.flow_control().unwrap();
    assert!(active.contains(FlowControl::RTSCTS_IN));
    assert!(active.contains(FlowControl::RTSCTS_OUT));

    port.set_flow_control(FlowControl::empty()).unwrap();
    assert_eq!(port.flow_control().unwrap(), FlowControl::empty());
}

#[test]
fn test_loopback_master_to_port() {
    let pty = common::PtyPair::open();
    let port = SerialPort::open(pty.slave_path(), false).unwrap();
    port.configure(&PortConfig::new(115_200)).unwrap();

    pty.feed(b"hello");
    let got = read_exact_with_deadline(&port, 5, Duration::from_secs(2));
    assert_eq!(got, b"hello");
}

#[test]
fn test_loopback_port_to_master() {
    let pty = common::PtyPair::open();
    let port = SerialPort::open(pty.slave_path(), false).unwrap();
    port.configure(&PortConfig::new(115_200)).unwrap();

    let mut written = 0;
    while written < 5 {
        written += port.write(&b"world"[written..]).unwrap();
    }
    assert_eq!(pty.drain(5, Duration::from_secs(2)), b"world");
}

#[test]
fn test_read_byte_returns_fed_byte() {
    let pty = common::PtyPair::open();
    let port = SerialPort::open(pty.slave_path(), false).unwrap();
    port.configure(&PortConfig::new(9600)).unwrap();

    pty.feed(&[0x42]);
    let byte = port.read_byte(Some(Duration::from_secs(2))).unwrap();
    assert_eq!(byte, Some(0x42));
}

#[test]
fn test_write_byte_transmits() {
    let pty = common::PtyPair::open();
    let port = SerialPort::open(pty.slave_path(), false).unwrap();
    port.configure(&PortConfig::new(9600)).unwrap();

    assert_eq!(port.write_byte(b'x').unwrap(), 1);
    assert_eq!(pty.drain(1, Duration::from_secs(2)), b"x");
}

#[test]
fn test_empty_buffers_complete_immediately() {
    let pty = common::PtyPair::open();
    let port = SerialPort::open(pty.slave_path(), false).unwrap();
    port.configure(&PortConfig::new(9600)).unwrap();

    // Zero-length transfers return 0 without touching the device, so an
    // empty read does not wait even with no timeout and no data pending.
    let started = Instant::now();
    assert_eq!(port.read(&mut [], None).unwrap(), 0);
    assert_eq!(port.write(&[]).unwrap(), 0);
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[test]
fn test_read_timeout_elapses_without_data() {
    let pty = common::PtyPair::open();
    let port = SerialPort::open(pty.slave_path(), false).unwrap();
    port.configure(&PortConfig::new(9600)).unwrap();

    let timeout = Duration::from_millis(150);
    let started = Instant::now();
    let mut buf = [0u8; 16];
    let err = port.read(&mut buf, Some(timeout)).unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, Error::Timeout(d) if d == timeout));
    assert_eq!(err.raw_code(), -1);
    assert!(elapsed >= Duration::from_millis(140), "returned after {elapsed:?}");
}

#[test]
fn test_zero_timeout_is_pure_poll() {
    let pty = common::PtyPair::open();
    let port = SerialPort::open(pty.slave_path(), false).unwrap();
    port.configure(&PortConfig::new(9600)).unwrap();

    let started = Instant::now();
    let mut buf = [0u8; 16];
    let err = port.read(&mut buf, Some(Duration::ZERO)).unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert!(started.elapsed() < Duration::from_millis(100));

    pty.feed(b"k");
    thread::sleep(Duration::from_millis(50));
    let n = port.read(&mut buf, Some(Duration::ZERO)).unwrap();
    assert_eq!(&buf[..n], b"k");
}

#[test]
fn test_bytes_to_read_tracks_input_and_purge_clears() {
    let pty = common::PtyPair::open();
    let port = SerialPort::open(pty.slave_path(), false).unwrap();
    port.configure(&PortConfig::new(9600)).unwrap();

    assert_eq!(port.bytes_to_read().unwrap(), 0);

    pty.feed(b"abcd");
    let deadline = Instant::now() + Duration::from_secs(2);
    while port.bytes_to_read().unwrap() < 4 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(port.bytes_to_read().unwrap(), 4);

    port.purge(PurgeRequest::RX_CLEAR).unwrap();
    assert_eq!(port.bytes_to_read().unwrap(), 0);

    // Output counts may be unsupported on some devices; failure is Io.
    match port.bytes_to_write() {
        Ok(n) => assert_eq!(n, 0),
        Err(Error::Io(_)) => {}
        Err(err) => panic!("unexpected error: {err}"),
    }
}

#[test]
fn test_purge_requires_nonempty_request() {
    let pty = common::PtyPair::open();
    let port = SerialPort::open(pty.slave_path(), false).unwrap();
    port.configure(&PortConfig::new(9600)).unwrap();

    let err = port.purge(PurgeRequest::empty()).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_purge_abort_bits_accepted() {
    let pty = common::PtyPair::open();
    let port = SerialPort::open(pty.slave_path(), false).unwrap();
    port.configure(&PortConfig::new(9600)).unwrap();

    port.purge(PurgeRequest::TX_ABORT | PurgeRequest::RX_ABORT)
        .unwrap();
}

#[test]
fn test_check_alive_on_live_port() {
    let pty = common::PtyPair::open();
    let port = SerialPort::open(pty.slave_path(), false).unwrap();
    port.configure(&PortConfig::new(9600)).unwrap();

    port.check_alive().unwrap();
}

#[test]
fn test_line_status_and_break_are_total() {
    let pty = common::PtyPair::open();
    let port = SerialPort::open(pty.slave_path(), false).unwrap();
    port.configure(&PortConfig::new(9600)).unwrap();

    // Ptys have no modem lines; the calls must fail cleanly if at all.
    assert!(matches!(port.line_status(), Ok(_) | Err(Error::Io(_))));
    assert!(matches!(port.set_rts(true), Ok(()) | Err(Error::Io(_))));
    assert!(matches!(port.set_dtr(false), Ok(()) | Err(Error::Io(_))));

    assert!(!port.send_break(Duration::ZERO).unwrap());
    assert!(matches!(
        port.send_break(Duration::from_millis(20)),
        Ok(true) | Err(Error::Io(_))
    ));
}

#[test]
fn test_io_trait_adapters() {
    let pty = common::PtyPair::open();
    let port = SerialPort::open(pty.slave_path(), false).unwrap();
    port.configure(&PortConfig::new(115_200)).unwrap();

    (&port).write_all(b"ping").unwrap();
    assert_eq!(pty.drain(4, Duration::from_secs(2)), b"ping");

    pty.feed(b"pong");
    let mut buf = [0u8; 4];
    (&port).read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"pong");
}

#[test]
fn test_concurrent_read_write_via_arc() {
    let pty = common::PtyPair::open();
    let port = Arc::new(SerialPort::open(pty.slave_path(), false).unwrap());
    port.configure(&PortConfig::new(115_200)).unwrap();

    let reader = {
        let port = Arc::clone(&port);
        thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(3);
            let mut got = Vec::new();
            let mut buf = [0u8; 8];
            while got.len() < 3 && Instant::now() < deadline {
                match port.read(&mut buf, Some(Duration::from_millis(200))) {
                    Ok(n) => got.extend_from_slice(&buf[..n]),
                    Err(Error::Timeout(_)) => continue,
                    Err(err) => panic!("reader failed: {err}"),
                }
            }
            got
        })
    };

    thread::sleep(Duration::from_millis(50));
    pty.feed(b"abc");
    let mut written = 0;
    while written < 3 {
        written += port.write(&b"xyz"[written..]).unwrap();
    }

    assert_eq!(pty.drain(3, Duration::from_secs(2)), b"xyz");
    assert_eq!(reader.join().unwrap(), b"abc");
}

#[test]
fn test_raw_fd_adoption_round_trip() {
    use std::os::unix::io::{FromRawFd, IntoRawFd};

    let pty = common::PtyPair::open();
    let port = SerialPort::open(pty.slave_path(), false).unwrap();
    port.configure(&PortConfig::new(9600)).unwrap();

    let fd = port.into_raw_fd();
    assert!(fd >= 0);

    let adopted = unsafe { SerialPort::from_raw_fd(fd) };
    assert_eq!(adopted.name(), None);

    pty.feed(b"Q");
    let byte = adopted.read_byte(Some(Duration::from_secs(2))).unwrap();
    assert_eq!(byte, Some(b'Q'));
    adopted.close().unwrap();
}
