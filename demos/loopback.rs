//! Example demonstrating a loopback self-test.
//!
//! Wire the adapter's TX pin to its RX pin, then run with the port name.
//! Every byte written should arrive back on the read side.

use std::time::{Duration, Instant};

use commport::{Error, PortConfig, SerialPort};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let name = std::env::args().nth(1).unwrap_or_else(|| {
        eprintln!("usage: loopback <port>");
        std::process::exit(2);
    });

    println!("=== Loopback Self-Test ({name}) ===\n");

    let port = SerialPort::open(&name, true)?;
    port.configure(&PortConfig::new(115_200))?;
    println!("  Opened at 115200 baud, 8N1");

    let payload = b"loopback-probe-0123456789";
    let mut written = 0;
    while written < payload.len() {
        written += port.write(&payload[written..])?;
    }
    println!("  Wrote {written} bytes");

    let deadline = Instant::now() + Duration::from_secs(2);
    let mut got = Vec::with_capacity(payload.len());
    let mut buf = [0u8; 64];
    while got.len() < payload.len() && Instant::now() < deadline {
        match port.read(&mut buf, Some(Duration::from_millis(200))) {
            Ok(n) => got.extend_from_slice(&buf[..n]),
            Err(Error::Timeout(_)) => continue,
            Err(err) => return Err(err.into()),
        }
    }

    if got == payload {
        println!("  Echo verified: {} bytes round-tripped", got.len());
    } else {
        println!(
            "  Echo mismatch: sent {} bytes, received {}",
            payload.len(),
            got.len()
        );
        println!("  Is TX wired to RX?");
    }

    port.close()?;
    Ok(())
}
