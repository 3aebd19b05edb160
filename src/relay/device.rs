//! Relay device I/O
//!
//! Every ON or OFF command is its own short-lived acquisition: open, write,
//! flush, close. Some relay boards drop the connection between writes, so a
//! handle is never held across the hold interval.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Duration;

use crate::error::{AppError, Result};

/// Open handle to a relay device, dropped after one command
pub type DeviceHandle = Box<dyn Write + Send>;

/// Opens relay devices for a single command write
pub trait DeviceOpener: Send + Sync {
    fn open(&self, path: &str) -> Result<DeviceHandle>;
}

/// Whether a node should be driven as a serial port rather than a raw HID node
pub fn is_serial_path(path: &str) -> bool {
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.starts_with("tty") || name.starts_with("cu.") || path.contains("/serial/")
}

/// Opener for real hardware: hidraw nodes as files, TTYs through `serialport`
pub struct SystemDeviceOpener {
    baud_rate: u32,
    io_timeout: Duration,
}

impl SystemDeviceOpener {
    pub fn new(baud_rate: u32, io_timeout: Duration) -> Self {
        Self {
            baud_rate,
            io_timeout,
        }
    }

    fn serial_error(path: &str, e: serialport::Error) -> AppError {
        match e.kind() {
            serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                AppError::PermissionDenied {
                    path: path.to_string(),
                    reason: e.to_string(),
                }
            }
            _ if e.description.contains("Permission denied") => AppError::PermissionDenied {
                path: path.to_string(),
                reason: e.to_string(),
            },
            _ => AppError::DeviceIo {
                path: path.to_string(),
                reason: format!("serial open failed: {}", e),
            },
        }
    }
}

impl DeviceOpener for SystemDeviceOpener {
    fn open(&self, path: &str) -> Result<DeviceHandle> {
        if is_serial_path(path) {
            let port = serialport::new(path, self.baud_rate)
                .timeout(self.io_timeout)
                .open()
                .map_err(|e| Self::serial_error(path, e))?;
            Ok(Box::new(port))
        } else {
            // Non-blocking so a wedged HID node fails fast instead of hanging the request
            let file = OpenOptions::new()
                .write(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(path)
                .map_err(|e| AppError::from_device_io(path, &e))?;
            Ok(Box::new(file))
        }
    }
}

/// Open, write and flush one command
pub fn send_command(opener: &dyn DeviceOpener, path: &str, bytes: &[u8]) -> Result<()> {
    let mut handle = opener.open(path)?;
    handle
        .write_all(bytes)
        .and_then(|_| handle.flush())
        .map_err(|e| AppError::from_device_io(path, &e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_serial_path_detection() {
        assert!(is_serial_path("/dev/ttyUSB0"));
        assert!(is_serial_path("/dev/ttyACM1"));
        assert!(is_serial_path("/dev/serial/by-id/usb-1a86_USB_Serial-if00-port0"));
        assert!(!is_serial_path("/dev/hidraw0"));
    }

    #[test]
    fn test_file_write_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hidraw0");
        std::fs::write(&path, b"").unwrap();
        let path = path.to_string_lossy().into_owned();

        let opener = SystemDeviceOpener::new(9600, Duration::from_millis(100));
        send_command(&opener, &path, &[0xA0, 0x01, 0x01, 0xA2]).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xA0, 0x01, 0x01, 0xA2]);
    }

    #[test]
    fn test_missing_device_is_io_error() {
        let opener = SystemDeviceOpener::new(9600, Duration::from_millis(100));
        let err = send_command(&opener, "/nonexistent/hidraw9", &[0x01]).unwrap_err();
        assert_eq!(err.failure_kind(), "device_io");
    }
}
