//! Example demonstrating modem line inspection.
//!
//! Opens the named port in shared mode, reads the input lines and buffer
//! counts, and closes again without disturbing traffic.

use commport::{LineStatus, SerialPort};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let name = std::env::args().nth(1).unwrap_or_else(|| {
        eprintln!("usage: line_status <port>");
        std::process::exit(2);
    });

    println!("=== Line Status ({name}) ===\n");

    let port = SerialPort::open(&name, false)?;
    let lines = port.line_status()?;
    for (label, bit) in [
        ("CTS", LineStatus::CTS),
        ("DSR", LineStatus::DSR),
        ("RING", LineStatus::RING),
        ("RLSD", LineStatus::RLSD),
    ] {
        let state = if lines.contains(bit) { "on" } else { "off" };
        println!("  {label:<5} {state}");
    }

    println!("\n  rx buffered: {}", port.bytes_to_read()?);
    println!("  tx buffered: {}", port.bytes_to_write()?);

    port.close()?;
    Ok(())
}
