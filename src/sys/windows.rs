//! Windows serial backend over the Win32 COMM API.
//!
//! Handles are opened overlapped; every read and write creates its own
//! event object so two threads can drive the same handle in opposite
//! directions. Native parameter structures (`OVERLAPPED`, event handles,
//! registry keys) are held by RAII guards so no failure path leaks them.

use std::ffi::OsStr;
use std::io;
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::RawHandle;
use std::ptr;
use std::thread;
use std::time::Duration;

use winapi::shared::minwindef::{DWORD, FALSE, HKEY, LPVOID, TRUE};
use winapi::shared::winerror::{
    ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_IO_PENDING, ERROR_NO_MORE_ITEMS,
    ERROR_SUCCESS, WAIT_TIMEOUT,
};
use winapi::um::commapi::{
    ClearCommBreak, ClearCommError, EscapeCommFunction, GetCommModemStatus, GetCommState,
    PurgeComm, SetCommBreak, SetCommState, SetCommTimeouts,
};
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::fileapi::{CreateFileW, ReadFile, WriteFile, OPEN_EXISTING};
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::ioapiset::{CancelIoEx, GetOverlappedResult};
use winapi::um::minwinbase::OVERLAPPED;
use winapi::um::synchapi::{CreateEventW, WaitForSingleObject};
use winapi::um::winbase::{
    CLRDTR, CLRRTS, COMMTIMEOUTS, COMSTAT, DCB, DTR_CONTROL_DISABLE, DTR_CONTROL_ENABLE,
    FILE_FLAG_OVERLAPPED, INFINITE, MS_CTS_ON, MS_DSR_ON, MS_RING_ON, MS_RLSD_ON,
    RTS_CONTROL_DISABLE, RTS_CONTROL_ENABLE, RTS_CONTROL_HANDSHAKE, SETDTR, SETRTS,
    WAIT_OBJECT_0,
};
use winapi::um::winnt::{GENERIC_READ, GENERIC_WRITE, HANDLE, KEY_READ, LONG, REG_SZ};
use winapi::um::winreg::{HKEY_LOCAL_MACHINE, RegCloseKey, RegEnumValueW, RegOpenKeyExW};

use crate::config::{FlowControl, LineStatus, PortConfig, PurgeRequest};
use crate::error::{Error, Result};

const MAXDWORD: DWORD = u32::MAX;

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

fn last_error() -> Error {
    Error::Io(io::Error::last_os_error())
}

/// Manual-reset event for one overlapped operation.
struct EventHandle(HANDLE);

impl EventHandle {
    fn new() -> Result<Self> {
        let handle = unsafe { CreateEventW(ptr::null_mut(), TRUE, FALSE, ptr::null()) };
        if handle.is_null() {
            return Err(last_error());
        }
        Ok(EventHandle(handle))
    }

    fn raw(&self) -> HANDLE {
        self.0
    }
}

impl Drop for EventHandle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

struct RegKey(HKEY);

impl Drop for RegKey {
    fn drop(&mut self) {
        unsafe {
            RegCloseKey(self.0);
        }
    }
}

/// A serial port backed by an overlapped COMM handle.
#[derive(Debug)]
pub(crate) struct ComPort {
    handle: HANDLE,
}

// The handle is not bound to the creating thread, and every overlapped
// operation carries its own event and OVERLAPPED block.
unsafe impl Send for ComPort {}
unsafe impl Sync for ComPort {}

impl ComPort {
    /// Open and probe a COM device. `exclusive` is accepted for interface
    /// parity; a zero-share `CreateFileW` is already exclusive.
    pub fn open(name: &str, _exclusive: bool) -> Result<Self> {
        if name.contains('\0') {
            return Err(Error::config("port name contains an interior NUL byte"));
        }
        let path = if name.starts_with(r"\\.\") {
            name.to_string()
        } else {
            format!(r"\\.\{name}")
        };
        let wide_path = wide(&path);

        let handle = unsafe {
            CreateFileW(
                wide_path.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                0,
                ptr::null_mut(),
                OPEN_EXISTING,
                FILE_FLAG_OVERLAPPED,
                ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(match unsafe { GetLastError() } {
                ERROR_ACCESS_DENIED => Error::busy(name),
                ERROR_FILE_NOT_FOUND => Error::not_found(name),
                _ => Error::NotOpened,
            });
        }
        let port = ComPort { handle };

        // Capability probe: only genuine COMM handles answer GetCommState.
        let mut dcb: DCB = unsafe { mem::zeroed() };
        dcb.DCBlength = mem::size_of::<DCB>() as DWORD;
        if unsafe { GetCommState(port.handle, &mut dcb) } == 0 {
            return Err(Error::not_a_serial_port(name));
        }

        Ok(port)
    }

    fn comm_state(&self) -> Result<DCB> {
        let mut dcb: DCB = unsafe { mem::zeroed() };
        dcb.DCBlength = mem::size_of::<DCB>() as DWORD;
        if unsafe { GetCommState(self.handle, &mut dcb) } == 0 {
            return Err(last_error());
        }
        Ok(dcb)
    }

    fn set_comm_state(&self, dcb: &mut DCB) -> Result<()> {
        if unsafe { SetCommState(self.handle, dcb) } == 0 {
            return Err(last_error());
        }
        Ok(())
    }

    /// Apply a full parameter set as one `SetCommState` commit.
    pub fn configure(&self, config: &PortConfig) -> Result<()> {
        config.validate()?;
        let mut dcb = self.comm_state()?;

        // The enum discriminants are the native DCB encodings.
        dcb.BaudRate = config.baud_rate;
        dcb.ByteSize = config.data_bits as u8;
        dcb.StopBits = config.stop_bits as u8;
        dcb.Parity = config.parity as u8;

        dcb.set_fRtsControl(if config.rts {
            RTS_CONTROL_ENABLE
        } else {
            RTS_CONTROL_DISABLE
        });
        dcb.set_fDtrControl(if config.dtr {
            DTR_CONTROL_ENABLE
        } else {
            DTR_CONTROL_DISABLE
        });
        dcb.set_fOutxCtsFlow(0);
        dcb.set_fOutxDsrFlow(0);
        dcb.set_fDsrSensitivity(0);
        dcb.set_fTXContinueOnXoff(1);
        dcb.set_fOutX(0);
        dcb.set_fInX(0);
        dcb.set_fErrorChar(0);
        dcb.set_fNull(0);
        dcb.set_fAbortOnError(1);
        dcb.XonLim = 2048;
        dcb.XoffLim = 512;
        dcb.XonChar = 0x11;
        dcb.XoffChar = 0x13;

        self.set_comm_state(&mut dcb)?;

        // First-byte profile: clears timeouts left by other applications
        // and makes a device read complete once at least one byte exists,
        // so partial reads behave the same as on the POSIX backend.
        let mut timeouts = COMMTIMEOUTS {
            ReadIntervalTimeout: MAXDWORD,
            ReadTotalTimeoutMultiplier: MAXDWORD,
            ReadTotalTimeoutConstant: MAXDWORD - 1,
            WriteTotalTimeoutMultiplier: 0,
            WriteTotalTimeoutConstant: 0,
        };
        if unsafe { SetCommTimeouts(self.handle, &mut timeouts) } == 0 {
            return Err(last_error());
        }
        Ok(())
    }

    fn escape(&self, function: DWORD) -> Result<()> {
        if unsafe { EscapeCommFunction(self.handle, function) } == 0 {
            return Err(last_error());
        }
        Ok(())
    }

    pub fn set_rts(&self, level: bool) -> Result<()> {
        self.escape(if level { SETRTS } else { CLRRTS })
    }

    pub fn set_dtr(&self, level: bool) -> Result<()> {
        self.escape(if level { SETDTR } else { CLRDTR })
    }

    pub fn set_flow_control(&self, mode: FlowControl) -> Result<()> {
        let mut dcb = self.comm_state()?;
        dcb.set_fRtsControl(if mode.contains(FlowControl::RTSCTS_IN) {
            RTS_CONTROL_HANDSHAKE
        } else {
            RTS_CONTROL_ENABLE
        });
        dcb.set_fOutxCtsFlow(mode.contains(FlowControl::RTSCTS_OUT) as DWORD);
        dcb.set_fInX(mode.contains(FlowControl::XONXOFF_IN) as DWORD);
        dcb.set_fOutX(mode.contains(FlowControl::XONXOFF_OUT) as DWORD);
        self.set_comm_state(&mut dcb)
    }

    pub fn flow_control(&self) -> Result<FlowControl> {
        let dcb = self.comm_state()?;
        let mut mode = FlowControl::empty();
        if dcb.fRtsControl() == RTS_CONTROL_HANDSHAKE {
            mode |= FlowControl::RTSCTS_IN;
        }
        if dcb.fOutxCtsFlow() != 0 {
            mode |= FlowControl::RTSCTS_OUT;
        }
        if dcb.fInX() != 0 {
            mode |= FlowControl::XONXOFF_IN;
        }
        if dcb.fOutX() != 0 {
            mode |= FlowControl::XONXOFF_OUT;
        }
        Ok(mode)
    }

    pub fn line_status(&self) -> Result<LineStatus> {
        let mut modem: DWORD = 0;
        if unsafe { GetCommModemStatus(self.handle, &mut modem) } == 0 {
            return Err(last_error());
        }
        let mut status = LineStatus::empty();
        if modem & MS_CTS_ON != 0 {
            status |= LineStatus::CTS;
        }
        if modem & MS_DSR_ON != 0 {
            status |= LineStatus::DSR;
        }
        if modem & MS_RING_ON != 0 {
            status |= LineStatus::RING;
        }
        if modem & MS_RLSD_ON != 0 {
            status |= LineStatus::RLSD;
        }
        Ok(status)
    }

    pub fn send_break(&self, duration: Duration) -> Result<bool> {
        if duration.is_zero() {
            return Ok(false);
        }
        if unsafe { SetCommBreak(self.handle) } == 0 {
            return Err(last_error());
        }
        thread::sleep(duration);
        if unsafe { ClearCommBreak(self.handle) } == 0 {
            return Err(last_error());
        }
        Ok(true)
    }

    /// The mask literals are the native `PURGE_*` values.
    pub fn purge(&self, request: PurgeRequest) -> Result<()> {
        if unsafe { PurgeComm(self.handle, request.bits()) } == 0 {
            return Err(last_error());
        }
        Ok(())
    }

    fn comm_status(&self) -> Result<COMSTAT> {
        let mut errors: DWORD = 0;
        let mut status: COMSTAT = unsafe { mem::zeroed() };
        if unsafe { ClearCommError(self.handle, &mut errors, &mut status) } == 0 {
            return Err(last_error());
        }
        Ok(status)
    }

    pub fn bytes_to_read(&self) -> Result<u32> {
        Ok(self.comm_status()?.cbInQue)
    }

    pub fn bytes_to_write(&self) -> Result<u32> {
        Ok(self.comm_status()?.cbOutQue)
    }

    /// One bounded read after at least one byte is available.
    pub fn read(&self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let event = EventHandle::new()?;
        let mut overlapped: OVERLAPPED = unsafe { mem::zeroed() };
        overlapped.hEvent = event.raw();
        let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        let mut transferred: DWORD = 0;

        let immediate = unsafe {
            ReadFile(
                self.handle,
                buf.as_mut_ptr() as LPVOID,
                len,
                &mut transferred,
                &mut overlapped,
            )
        };
        if immediate != 0 {
            return Ok(transferred as usize);
        }
        let err = unsafe { GetLastError() };
        if err != ERROR_IO_PENDING {
            return Err(Error::Io(io::Error::from_raw_os_error(err as i32)));
        }

        let wait = match timeout {
            None => INFINITE,
            Some(d) => d.as_millis().min((INFINITE - 1) as u128) as DWORD,
        };
        match unsafe { WaitForSingleObject(overlapped.hEvent, wait) } {
            WAIT_OBJECT_0 => {
                if unsafe { GetOverlappedResult(self.handle, &mut overlapped, &mut transferred, FALSE) }
                    == 0
                {
                    return Err(last_error());
                }
                Ok(transferred as usize)
            }
            WAIT_TIMEOUT => {
                // The request must retire before the buffer can be reused.
                unsafe {
                    CancelIoEx(self.handle, &mut overlapped);
                }
                let finished = unsafe {
                    GetOverlappedResult(self.handle, &mut overlapped, &mut transferred, TRUE)
                };
                if finished != 0 && transferred > 0 {
                    // Bytes raced the cancellation; a partial read wins.
                    return Ok(transferred as usize);
                }
                Err(Error::timeout(timeout.unwrap_or(Duration::ZERO)))
            }
            _ => Err(last_error()),
        }
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let event = EventHandle::new()?;
        let mut overlapped: OVERLAPPED = unsafe { mem::zeroed() };
        overlapped.hEvent = event.raw();
        let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        let mut transferred: DWORD = 0;

        let immediate = unsafe {
            WriteFile(
                self.handle,
                buf.as_ptr() as *const _,
                len,
                &mut transferred,
                &mut overlapped,
            )
        };
        if immediate != 0 {
            return Ok(transferred as usize);
        }
        let err = unsafe { GetLastError() };
        if err != ERROR_IO_PENDING {
            return Err(Error::Io(io::Error::from_raw_os_error(err as i32)));
        }
        if unsafe { GetOverlappedResult(self.handle, &mut overlapped, &mut transferred, TRUE) } == 0
        {
            return Err(last_error());
        }
        Ok(transferred as usize)
    }

    /// Disconnect probe by name: handles outlive an unplug here, so the
    /// stored handle proves nothing and the name is re-opened instead.
    pub fn check_alive(&self, name: Option<&str>) -> Result<()> {
        let name = name.ok_or_else(|| Error::config("disconnect probe requires a port name"))?;
        match ComPort::open(name, false) {
            // A fresh open succeeding means our handle lost the device.
            Ok(_probe) => Err(Error::stale_handle(name)),
            Err(Error::Busy(_)) => Ok(()),
            Err(Error::NotASerialPort(_)) => Err(Error::not_a_serial_port(name)),
            Err(Error::NotFound(_)) => Err(Error::not_found(name)),
            Err(_) => Err(Error::NotOpened),
        }
    }

    /// Release the handle. Safe to call twice; the second is a no-op.
    pub fn close(&mut self) -> io::Result<()> {
        if self.handle.is_null() {
            return Ok(());
        }
        let handle = mem::replace(&mut self.handle, ptr::null_mut());
        if unsafe { CloseHandle(handle) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn raw_handle(&self) -> RawHandle {
        self.handle as RawHandle
    }

    pub fn from_raw(handle: RawHandle) -> Self {
        ComPort {
            handle: handle as HANDLE,
        }
    }

    pub fn into_raw(mut self) -> RawHandle {
        mem::replace(&mut self.handle, ptr::null_mut()) as RawHandle
    }
}

impl Drop for ComPort {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Walk `HARDWARE\DEVICEMAP\SERIALCOMM`; the value data are the port names.
pub(crate) fn list_ports() -> Result<Vec<String>> {
    let key_path = wide("HARDWARE\\DEVICEMAP\\SERIALCOMM");
    let mut raw_key: HKEY = ptr::null_mut();
    let status = unsafe {
        RegOpenKeyExW(
            HKEY_LOCAL_MACHINE,
            key_path.as_ptr(),
            0,
            KEY_READ,
            &mut raw_key,
        )
    };
    if status != ERROR_SUCCESS as LONG {
        // The key only exists once a serial device has been present.
        if status == ERROR_FILE_NOT_FOUND as LONG {
            return Ok(Vec::new());
        }
        return Err(Error::Io(io::Error::from_raw_os_error(status)));
    }
    let key = RegKey(raw_key);

    let mut names = Vec::new();
    let mut index: DWORD = 0;
    loop {
        let mut value_name = [0u16; 256];
        let mut name_len = value_name.len() as DWORD;
        let mut data = [0u8; 256];
        let mut data_len = data.len() as DWORD;
        let mut value_type: DWORD = 0;
        let status = unsafe {
            RegEnumValueW(
                key.0,
                index,
                value_name.as_mut_ptr(),
                &mut name_len,
                ptr::null_mut(),
                &mut value_type,
                data.as_mut_ptr(),
                &mut data_len,
            )
        };
        if status == ERROR_NO_MORE_ITEMS as LONG {
            break;
        }
        if status != ERROR_SUCCESS as LONG {
            return Err(Error::Io(io::Error::from_raw_os_error(status)));
        }
        if value_type == REG_SZ {
            let units: Vec<u16> = data[..data_len as usize]
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .take_while(|&unit| unit != 0)
                .collect();
            names.push(String::from_utf16_lossy(&units));
        }
        index += 1;
    }
    names.sort();
    names.dedup();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_rejects_missing_device() {
        let err = ComPort::open("COM_DOES_NOT_EXIST_12345", false).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.raw_code(), -2);
    }

    #[test]
    fn test_device_prefix_is_applied_once() {
        // Probing an already prefixed name must not double the prefix;
        // a missing device still maps to NotFound either way.
        let err = ComPort::open(r"\\.\COM_DOES_NOT_EXIST_12345", false).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_enumeration_never_fails_without_devices() {
        let ports = list_ports().unwrap();
        for name in &ports {
            assert!(!name.is_empty());
        }
    }
}
