//! Serial port discovery.
//!
//! Enumeration is side-effect-free: no port is opened, no device state is
//! touched. An empty system yields `Ok(vec![])`.

use crate::error::Result;

/// Names of the serial ports present on this system, sorted and deduplicated.
///
/// On Linux this scans `/dev` for the classic serial device prefixes and
/// returns full paths such as `/dev/ttyUSB0`. On macOS it returns the
/// `cu.*` and `tty.*` nodes. On Windows it walks the
/// `HARDWARE\DEVICEMAP\SERIALCOMM` registry key and returns names such
/// as `COM3`.
///
/// # Example
/// ```no_run
/// for name in commport::available_ports()? {
///     println!("{name}");
/// }
/// # Ok::<(), commport::Error>(())
/// ```
pub fn available_ports() -> Result<Vec<String>> {
    let mut ports = collect()?;
    ports.sort();
    ports.dedup();
    Ok(ports)
}

#[cfg(unix)]
fn collect() -> Result<Vec<String>> {
    let mut ports = Vec::new();
    for entry in std::fs::read_dir("/dev")? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if is_serial_name(name) {
            ports.push(format!("/dev/{name}"));
        }
    }
    Ok(ports)
}

#[cfg(windows)]
fn collect() -> Result<Vec<String>> {
    crate::sys::list_ports()
}

/// Device-name filter for Linux and the other non-Apple Unixes: one of the
/// classic serial prefixes followed by a short numeric index.
#[cfg(all(unix, not(target_os = "macos")))]
fn is_serial_name(name: &str) -> bool {
    const PREFIXES: [&str; 6] = ["ttyS", "ttyUSB", "ttyACM", "ttyAMA", "rfcomm", "ttyO"];
    PREFIXES.iter().any(|prefix| {
        name.strip_prefix(prefix).is_some_and(|index| {
            !index.is_empty() && index.len() <= 3 && index.bytes().all(|b| b.is_ascii_digit())
        })
    })
}

/// macOS exposes each device twice, as a callout (`cu.*`) and a dial-in
/// (`tty.*`) node. Both are reported.
#[cfg(target_os = "macos")]
fn is_serial_name(name: &str) -> bool {
    name.starts_with("cu.") || name.starts_with("tty.")
}
