//! Recording test doubles for the device and GPIO layers

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::time::Instant;

use super::device::{DeviceHandle, DeviceOpener};
use super::encoding::ENCODINGS;
use super::enumerate::{ListedPort, PortLister};
use super::gpio::{GpioBackend, OutputLine};
use super::types::{DeviceCandidate, KeySource};
use crate::error::{AppError, Result};

/// Candidates keyed by basename, in the given order
pub fn candidates(paths: &[&str]) -> Vec<DeviceCandidate> {
    paths
        .iter()
        .map(|p| DeviceCandidate {
            path: p.to_string(),
            stable_key: Path::new(p)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            key_source: KeySource::Basename,
        })
        .collect()
}

/// Port listing returning a fixed set of ports
pub struct FixedPorts(pub Vec<ListedPort>);

impl FixedPorts {
    /// Ports without USB metadata
    pub fn paths<S: AsRef<str>>(paths: impl IntoIterator<Item = S>) -> Self {
        Self(
            paths
                .into_iter()
                .map(|p| ListedPort::bare(p.as_ref()))
                .collect(),
        )
    }
}

impl PortLister for FixedPorts {
    fn list_ports(&self) -> Result<Vec<ListedPort>> {
        Ok(self.0.clone())
    }
}

/// Per-path device behaviour; unscripted paths accept everything
#[derive(Debug, Clone, Copy)]
pub enum Script {
    DenyOpen,
    RejectAll,
    /// accept only the ON/OFF pair of this encoding index
    AcceptEncoding(usize),
    RejectBytes(&'static [u8]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub path: String,
    pub bytes: Vec<u8>,
    pub at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Opened { path: String },
    OpenDenied { path: String },
    Written(WriteRecord),
    Rejected { path: String, bytes: Vec<u8> },
}

#[derive(Default)]
pub struct SpyOpener {
    scripts: Mutex<HashMap<String, Script>>,
    events: Arc<Mutex<Vec<DeviceEvent>>>,
}

impl SpyOpener {
    pub fn script(&self, path: &str, script: Script) {
        self.scripts.lock().insert(path.to_string(), script);
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.events.lock().clone()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DeviceEvent::Written(w) => Some(w),
                _ => None,
            })
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, DeviceEvent::Opened { .. } | DeviceEvent::OpenDenied { .. }))
            .count()
    }

    pub fn opens_for(&self, path: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| match e {
                DeviceEvent::Opened { path: p } | DeviceEvent::OpenDenied { path: p } => p == path,
                _ => false,
            })
            .count()
    }
}

impl DeviceOpener for SpyOpener {
    fn open(&self, path: &str) -> Result<DeviceHandle> {
        let script = self.scripts.lock().get(path).copied();
        if let Some(Script::DenyOpen) = script {
            self.events.lock().push(DeviceEvent::OpenDenied {
                path: path.to_string(),
            });
            return Err(AppError::PermissionDenied {
                path: path.to_string(),
                reason: "Permission denied (os error 13)".to_string(),
            });
        }
        self.events.lock().push(DeviceEvent::Opened {
            path: path.to_string(),
        });
        Ok(Box::new(SpyHandle {
            path: path.to_string(),
            script,
            buffer: Vec::new(),
            events: self.events.clone(),
        }))
    }
}

struct SpyHandle {
    path: String,
    script: Option<Script>,
    buffer: Vec<u8>,
    events: Arc<Mutex<Vec<DeviceEvent>>>,
}

impl SpyHandle {
    fn accepts(&self, bytes: &[u8]) -> bool {
        match self.script {
            None | Some(Script::DenyOpen) => true,
            Some(Script::RejectAll) => false,
            Some(Script::AcceptEncoding(index)) => ENCODINGS
                .get(index)
                .is_some_and(|e| e.on == bytes || e.off == bytes),
            Some(Script::RejectBytes(rejected)) => rejected != bytes,
        }
    }
}

impl Write for SpyHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let bytes = std::mem::take(&mut self.buffer);
        if self.accepts(&bytes) {
            self.events.lock().push(DeviceEvent::Written(WriteRecord {
                path: self.path.clone(),
                bytes,
                at: Instant::now(),
            }));
            Ok(())
        } else {
            self.events.lock().push(DeviceEvent::Rejected {
                path: self.path.clone(),
                bytes,
            });
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "device rejected write"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpioEvent {
    Requested { line: u32 },
    Set { line: u32, high: bool, at: Instant },
    Released { line: u32 },
}

/// GPIO backend recording every transition
#[derive(Default)]
pub struct SpyGpio {
    events: Arc<Mutex<Vec<GpioEvent>>>,
    fail_high: bool,
    fail_request: bool,
}

impl SpyGpio {
    pub fn failing_high() -> Self {
        Self {
            fail_high: true,
            ..Default::default()
        }
    }

    pub fn failing_request() -> Self {
        Self {
            fail_request: true,
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<GpioEvent> {
        self.events.lock().clone()
    }
}

impl GpioBackend for SpyGpio {
    fn name(&self) -> &'static str {
        "spy"
    }

    fn request_output(&self, line: u32) -> Result<Box<dyn OutputLine>> {
        if self.fail_request {
            return Err(AppError::Gpio(format!("line {} busy", line)));
        }
        self.events.lock().push(GpioEvent::Requested { line });
        Ok(Box::new(SpyLine {
            line,
            fail_high: self.fail_high,
            events: self.events.clone(),
        }))
    }
}

struct SpyLine {
    line: u32,
    fail_high: bool,
    events: Arc<Mutex<Vec<GpioEvent>>>,
}

impl OutputLine for SpyLine {
    fn set(&mut self, high: bool) -> Result<()> {
        if high && self.fail_high {
            return Err(AppError::Gpio("set failed".to_string()));
        }
        self.events.lock().push(GpioEvent::Set {
            line: self.line,
            high,
            at: Instant::now(),
        });
        Ok(())
    }

    fn release(self: Box<Self>) -> Result<()> {
        self.events
            .lock()
            .push(GpioEvent::Released { line: self.line });
        Ok(())
    }
}
