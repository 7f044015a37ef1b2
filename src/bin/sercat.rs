//! Serial port diagnostic tool.
//!
//! Thin command-line front end over the library: list ports, inspect line
//! status and buffer counts, pump a port to stdout, or send a line of text.

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commport::{DataBits, Error, LineStatus, Parity, PortConfig, SerialPort, StopBits};

#[derive(Parser, Debug)]
#[command(
    name = "sercat",
    version,
    about = "Serial port diagnostic tool",
    long_about = "Opens, inspects, and pumps bytes through serial ports. \
                  Set RUST_LOG to see the library's structured trace output."
)]
struct Cli {
    /// Enable debug-level logging (RUST_LOG overrides this).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the serial ports present on this system.
    List,

    /// Show modem lines, flow control, and buffer counts for a port.
    Status {
        /// Port name, e.g. /dev/ttyUSB0 or COM3.
        port: String,

        #[command(flatten)]
        params: PortParams,
    },

    /// Pump bytes from a port to stdout.
    Cat {
        /// Port name, e.g. /dev/ttyUSB0 or COM3.
        port: String,

        /// Per-read timeout in milliseconds; stop when it elapses.
        /// Omit to wait indefinitely.
        #[arg(long)]
        timeout_ms: Option<u64>,

        #[command(flatten)]
        params: PortParams,
    },

    /// Write text to a port and wait for it to drain.
    Send {
        /// Port name, e.g. /dev/ttyUSB0 or COM3.
        port: String,

        /// The text to transmit.
        text: String,

        /// Append a trailing newline.
        #[arg(short = 'n', long)]
        newline: bool,

        #[command(flatten)]
        params: PortParams,
    },
}

/// Port parameters shared by every subcommand that opens a port.
#[derive(ClapArgs, Debug)]
struct PortParams {
    /// Baud rate.
    #[arg(long, default_value_t = 9600)]
    baud: u32,

    /// Data bits: 5 through 8.
    #[arg(long, default_value_t = 8)]
    data_bits: u8,

    /// Stop bits: 1, 1.5, or 2.
    #[arg(long, default_value = "1")]
    stop_bits: String,

    /// Parity: none, odd, even, mark, or space.
    #[arg(long, default_value = "none")]
    parity: String,

    /// JSON file holding a full port configuration; overrides the flags above.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl PortParams {
    fn resolve(&self) -> Result<PortConfig, Box<dyn std::error::Error>> {
        if let Some(path) = &self.config {
            let text = std::fs::read_to_string(path)?;
            let config: PortConfig = serde_json::from_str(&text)?;
            return Ok(config);
        }

        let mut config = PortConfig::new(self.baud);
        config.data_bits = DataBits::try_from(self.data_bits)?;
        config.stop_bits = match self.stop_bits.as_str() {
            "1" => StopBits::One,
            "1.5" => StopBits::OnePointFive,
            "2" => StopBits::Two,
            other => return Err(format!("invalid stop bits: {other}").into()),
        };
        config.parity = match self.parity.as_str() {
            "none" => Parity::None,
            "odd" => Parity::Odd,
            "even" => Parity::Even,
            "mark" => Parity::Mark,
            "space" => Parity::Space,
            other => return Err(format!("invalid parity: {other}").into()),
        };
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "commport=debug" } else { "commport=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("sercat: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::List => {
            for name in commport::available_ports()? {
                println!("{name}");
            }
        }

        Command::Status { port, params } => {
            let config = params.resolve()?;
            // Shared access: a status probe must not evict the port's owner.
            let port = SerialPort::open(&port, false)?;
            port.configure(&config)?;

            let lines = port.line_status()?;
            println!("CTS:  {}", on_off(lines.contains(LineStatus::CTS)));
            println!("DSR:  {}", on_off(lines.contains(LineStatus::DSR)));
            println!("RING: {}", on_off(lines.contains(LineStatus::RING)));
            println!("RLSD: {}", on_off(lines.contains(LineStatus::RLSD)));
            println!("flow control: {:?}", port.flow_control()?);
            println!("rx buffered:  {}", port.bytes_to_read()?);
            println!("tx buffered:  {}", port.bytes_to_write()?);
            port.close()?;
        }

        Command::Cat {
            port,
            timeout_ms,
            params,
        } => {
            let config = params.resolve()?;
            let port = SerialPort::open(&port, true)?;
            port.configure(&config)?;

            let timeout = timeout_ms.map(Duration::from_millis);
            let mut stdout = std::io::stdout().lock();
            let mut buf = [0u8; 4096];
            loop {
                match port.read(&mut buf, timeout) {
                    // A completed read with no data means the stream ended.
                    Ok(0) => break,
                    Ok(n) => {
                        stdout.write_all(&buf[..n])?;
                        stdout.flush()?;
                    }
                    Err(Error::Timeout(_)) => break,
                    Err(err) => return Err(err.into()),
                }
            }
            port.close()?;
        }

        Command::Send {
            port,
            text,
            newline,
            params,
        } => {
            let config = params.resolve()?;
            let port = SerialPort::open(&port, true)?;
            port.configure(&config)?;

            let mut payload = text.into_bytes();
            if newline {
                payload.push(b'\n');
            }
            let mut written = 0;
            while written < payload.len() {
                written += port.write(&payload[written..])?;
            }
            while port.bytes_to_write()? > 0 {
                std::thread::sleep(Duration::from_millis(5));
            }
            println!("sent {written} bytes");
            port.close()?;
        }
    }
    Ok(())
}

fn on_off(level: bool) -> &'static str {
    if level {
        "on"
    } else {
        "off"
    }
}
