//! Example demonstrating port discovery.
//!
//! Prints every serial port name the system reports, without opening any
//! of them.

use commport::available_ports;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Serial Port Discovery ===\n");

    let ports = available_ports()?;
    if ports.is_empty() {
        println!("No serial ports detected on this system.");
        return Ok(());
    }

    println!("Found {} port(s):", ports.len());
    for (idx, name) in ports.iter().enumerate() {
        println!("  {}. {}", idx + 1, name);
    }

    Ok(())
}
