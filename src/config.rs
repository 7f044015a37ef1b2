//! Parameter and mask value objects.
//!
//! Every type here carries a frozen numeric encoding inherited from the
//! native serial ABI this crate implements: enum discriminants match the
//! Windows DCB values, and the bitflag literals match the historical
//! cross-platform mask tables. Changing any of them breaks callers that
//! persist raw values.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DataBits {
    Five = 5,
    Six = 6,
    Seven = 7,
    Eight = 8,
}

impl TryFrom<u8> for DataBits {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(Error::config(format!("invalid data bits: {other}"))),
        }
    }
}

/// Number of stop bits.
///
/// The discriminants are the native Windows encoding; POSIX termios cannot
/// express 1.5 stop bits and maps both `OnePointFive` and `Two` to two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum StopBits {
    One = 0,
    OnePointFive = 1,
    Two = 2,
}

impl TryFrom<u8> for StopBits {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(StopBits::One),
            1 => Ok(StopBits::OnePointFive),
            2 => Ok(StopBits::Two),
            other => Err(Error::config(format!("invalid stop bits: {other}"))),
        }
    }
}

/// Parity checking modes.
///
/// `Mark` and `Space` need an extra-parity capability on POSIX platforms
/// ([`mark_space_parity_supported`]); configuration fails where it is
/// absent instead of silently degrading to odd or even parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Parity {
    None = 0,
    Odd = 1,
    Even = 2,
    Mark = 3,
    Space = 4,
}

impl TryFrom<u8> for Parity {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Parity::None),
            1 => Ok(Parity::Odd),
            2 => Ok(Parity::Even),
            3 => Ok(Parity::Mark),
            4 => Ok(Parity::Space),
            other => Err(Error::config(format!("invalid parity: {other}"))),
        }
    }
}

/// Whether the running platform can represent mark and space parity.
///
/// Windows supports both natively; on POSIX the capability is the Linux
/// `CMSPAR` flag.
pub fn mark_space_parity_supported() -> bool {
    cfg!(any(windows, target_os = "linux"))
}

bitflags! {
    /// Extra parameter flags applied by [`PortConfig`].
    ///
    /// POSIX-only effect (`IGNPAR` / `PARMRK` input flags); the Windows
    /// backend accepts and ignores them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ParamFlags: u32 {
        /// Discard bytes that arrive with parity errors.
        const IGNORE_PARITY_ERRORS = 0x01;
        /// Mark parity errors in the input stream.
        const MARK_PARITY_ERRORS = 0x02;
    }
}

bitflags! {
    /// Flow control directions. The empty set disables flow control.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FlowControl: u32 {
        /// Hardware (RTS/CTS) flow control on the inbound direction.
        const RTSCTS_IN = 0x01;
        /// Hardware (RTS/CTS) flow control on the outbound direction.
        const RTSCTS_OUT = 0x02;
        /// Software (XON/XOFF) flow control on the inbound direction.
        const XONXOFF_IN = 0x04;
        /// Software (XON/XOFF) flow control on the outbound direction.
        const XONXOFF_OUT = 0x08;
    }
}

bitflags! {
    /// Modem line states reported by [`crate::SerialPort::line_status`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct LineStatus: u32 {
        /// Clear To Send.
        const CTS = 0x01;
        /// Data Set Ready.
        const DSR = 0x02;
        /// Ring Indicator.
        const RING = 0x04;
        /// Receive Line Signal Detect (carrier detect).
        const RLSD = 0x08;
    }
}

bitflags! {
    /// Buffer purge selectors.
    ///
    /// The literals are the native Windows `PURGE_*` values and pass
    /// through unchanged there. POSIX maps the clear bits onto `tcflush`
    /// selectors; the abort bits are accepted without a portable effect.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct PurgeRequest: u32 {
        /// Terminate outstanding writes.
        const TX_ABORT = 0x01;
        /// Terminate outstanding reads.
        const RX_ABORT = 0x02;
        /// Discard the output buffer.
        const TX_CLEAR = 0x04;
        /// Discard the input buffer.
        const RX_CLEAR = 0x08;
    }
}

/// Configuration parameters applied to a port as one native commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    /// Baud rate (bits per second).
    #[serde(default = "default_baud")]
    pub baud_rate: u32,

    /// Number of data bits (5, 6, 7, or 8).
    #[serde(default = "default_data_bits")]
    pub data_bits: DataBits,

    /// Number of stop bits.
    #[serde(default = "default_stop_bits")]
    pub stop_bits: StopBits,

    /// Parity checking mode.
    #[serde(default = "default_parity")]
    pub parity: Parity,

    /// Level of the RTS line after the configuration commit.
    #[serde(default = "default_line_level")]
    pub rts: bool,

    /// Level of the DTR line after the configuration commit.
    #[serde(default = "default_line_level")]
    pub dtr: bool,

    /// Extra parameter flags.
    #[serde(default)]
    pub flags: ParamFlags,
}

pub fn default_baud() -> u32 {
    9600
}

pub fn default_data_bits() -> DataBits {
    DataBits::Eight
}

pub fn default_stop_bits() -> StopBits {
    StopBits::One
}

pub fn default_parity() -> Parity {
    Parity::None
}

pub fn default_line_level() -> bool {
    true
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            baud_rate: default_baud(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: default_parity(),
            rts: default_line_level(),
            dtr: default_line_level(),
            flags: ParamFlags::empty(),
        }
    }
}

impl PortConfig {
    /// Default 8N1 configuration at the given baud rate.
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }

    /// Pure pre-native validation.
    ///
    /// Baud rates are deliberately not checked here: arbitrary rates are
    /// legitimate on Windows and reach the custom-divisor fallback on
    /// Linux, so rejection happens inside the backend that knows.
    pub fn validate(&self) -> Result<()> {
        if matches!(self.parity, Parity::Mark | Parity::Space) && !mark_space_parity_supported() {
            return Err(Error::config(format!(
                "{:?} parity is not supported on this platform",
                self.parity
            )));
        }
        Ok(())
    }
}
