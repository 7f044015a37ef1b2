//! Tests requiring a real serial device.
//!
//! Compiled only under the `hardware-tests` feature and skipped unless the
//! environment names a port.
//!
//! # Running Hardware Tests
//!
//! ```bash
//! export TEST_PORT=/dev/ttyUSB0          # or COM3 on Windows
//! export TEST_BAUD=115200                # optional, default: 9600
//! export TEST_LOOPBACK=1                 # if TX and RX are wired together
//!
//! cargo test --features hardware-tests
//! ```

#![cfg(feature = "hardware-tests")]

mod common;

use std::time::{Duration, Instant};

use serial_test::serial;

use commport::{Error, LineStatus, PortConfig, PurgeRequest, SerialPort};

fn open_configured(config: &common::TestPortConfig) -> SerialPort {
    let port = match SerialPort::open(&config.port_name, true) {
        Ok(p) => p,
        Err(e) => panic!("failed to open {}: {}", config.port_name, e),
    };
    port.configure(&PortConfig::new(config.baud_rate)).unwrap();
    port
}

#[test]
#[serial]
fn test_hardware_open_close() {
    let Some(config) = common::hardware_config() else {
        return;
    };
    println!("Testing {} at {} baud", config.port_name, config.baud_rate);

    let port = open_configured(&config);
    assert_eq!(port.name(), Some(config.port_name.as_str()));
    port.close().unwrap();

    // The device is released; a fresh exclusive open succeeds.
    let port = SerialPort::open(&config.port_name, true).unwrap();
    port.close().unwrap();
    println!("✅ Open/close cycle passed");
}

#[test]
#[serial]
fn test_hardware_probe_and_counts() {
    let Some(config) = common::hardware_config() else {
        return;
    };

    let port = open_configured(&config);
    port.check_alive().unwrap();

    let rx = port.bytes_to_read().unwrap();
    let tx = port.bytes_to_write().unwrap();
    println!("buffers: rx={rx} tx={tx}");

    port.purge(PurgeRequest::RX_CLEAR | PurgeRequest::TX_CLEAR)
        .unwrap();
    assert_eq!(port.bytes_to_read().unwrap(), 0);
    port.close().unwrap();
}

#[test]
#[serial]
fn test_hardware_line_status() {
    let Some(config) = common::hardware_config() else {
        return;
    };

    let port = open_configured(&config);
    let lines = port.line_status().unwrap();
    println!(
        "CTS={} DSR={} RING={} RLSD={}",
        lines.contains(LineStatus::CTS),
        lines.contains(LineStatus::DSR),
        lines.contains(LineStatus::RING),
        lines.contains(LineStatus::RLSD),
    );

    port.set_rts(true).unwrap();
    port.set_dtr(true).unwrap();
    port.set_rts(false).unwrap();
    port.set_dtr(false).unwrap();
    port.close().unwrap();
}

#[test]
#[serial]
fn test_hardware_send_break() {
    let Some(config) = common::hardware_config() else {
        return;
    };

    let port = open_configured(&config);
    assert!(port.send_break(Duration::from_millis(250)).unwrap());
    assert!(!port.send_break(Duration::ZERO).unwrap());
    port.close().unwrap();
}

#[test]
#[serial]
fn test_hardware_loopback_echo() {
    let Some(config) = common::hardware_config() else {
        return;
    };
    if !config.loopback_enabled {
        println!("⏭️  Skipping: TEST_LOOPBACK not set to 1");
        println!("   This test requires a loopback adapter (TX wired to RX)");
        return;
    }

    let port = open_configured(&config);
    port.purge(PurgeRequest::RX_CLEAR | PurgeRequest::TX_CLEAR)
        .unwrap();

    let payload = b"commport-ping";
    let mut written = 0;
    while written < payload.len() {
        written += port.write(&payload[written..]).unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(3);
    let mut got = Vec::with_capacity(payload.len());
    let mut buf = [0u8; 64];
    while got.len() < payload.len() && Instant::now() < deadline {
        match port.read(&mut buf, Some(Duration::from_millis(200))) {
            Ok(n) => got.extend_from_slice(&buf[..n]),
            Err(Error::Timeout(_)) => continue,
            Err(err) => panic!("loopback read failed: {err}"),
        }
    }
    assert_eq!(got, payload);
    println!("✅ Loopback echoed {} bytes", got.len());
    port.close().unwrap();
}
