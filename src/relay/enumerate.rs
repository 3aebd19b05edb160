//! Device candidate enumeration
//!
//! Builds a fresh, deterministic list of plausible relay device paths on every
//! call. Three sources are merged in order: the channel's preferred path, the
//! serial-port listing (optionally filtered by USB vendor/product), and glob
//! patterns over the device tree. Order of the result is by stable key.

use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use super::stable_key::{DeviceProperties, StableKeyResolver};
use super::types::DeviceCandidate;
use crate::error::{AppError, Result};

/// Default device-class patterns: HID raw, USB-serial TTYs, by-id symlinks
pub const DEFAULT_PATTERNS: [&str; 4] = [
    "/dev/hidraw*",
    "/dev/ttyUSB*",
    "/dev/ttyACM*",
    "/dev/serial/by-id/*",
];

/// USB vendor/product filter, written as `vvvv` or `vvvv:pppp` (hex)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UsbId {
    pub vid: u16,
    pub pid: Option<u16>,
}

impl UsbId {
    /// QinHeng CH340 USB-serial converter
    pub const CH340: UsbId = UsbId {
        vid: 0x1a86,
        pid: Some(0x7523),
    };

    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid.map_or(true, |p| p == pid)
    }
}

impl FromStr for UsbId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |part: &str| {
            u16::from_str_radix(part.trim().trim_start_matches("0x"), 16)
                .map_err(|e| AppError::Config(format!("Invalid USB id '{}': {}", s, e)))
        };
        match s.split_once(':') {
            Some((vid, pid)) => Ok(Self {
                vid: parse(vid)?,
                pid: Some(parse(pid)?),
            }),
            None => Ok(Self {
                vid: parse(s)?,
                pid: None,
            }),
        }
    }
}

impl TryFrom<String> for UsbId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<UsbId> for String {
    fn from(id: UsbId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for UsbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "{:04x}:{:04x}", self.vid, pid),
            None => write!(f, "{:04x}", self.vid),
        }
    }
}

/// A device path, with the USB metadata its source reported if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedPort {
    pub path: String,
    pub usb: Option<DeviceProperties>,
}

impl ListedPort {
    pub fn bare(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            usb: None,
        }
    }
}

/// Structured port listing (platform serial-port enumeration)
pub trait PortLister: Send + Sync {
    fn list_ports(&self) -> Result<Vec<ListedPort>>;
}

/// Port listing backed by `serialport::available_ports`
pub struct SerialPortLister {
    filters: Vec<UsbId>,
}

impl SerialPortLister {
    /// An empty filter list accepts every USB port
    pub fn new(filters: Vec<UsbId>) -> Self {
        Self { filters }
    }
}

impl PortLister for SerialPortLister {
    fn list_ports(&self) -> Result<Vec<ListedPort>> {
        let ports = serialport::available_ports()
            .map_err(|e| AppError::Internal(format!("Serial port enumeration failed: {}", e)))?;

        Ok(ports
            .into_iter()
            .filter_map(|port| match port.port_type {
                serialport::SerialPortType::UsbPort(info)
                    if self.filters.is_empty()
                        || self.filters.iter().any(|f| f.matches(info.vid, info.pid)) =>
                {
                    let usb = DeviceProperties::from_usb(
                        info.vid,
                        info.pid,
                        info.serial_number.as_deref(),
                        info.manufacturer.as_deref(),
                        info.product.as_deref(),
                    );
                    Some(ListedPort {
                        path: port.port_name,
                        usb: Some(usb),
                    })
                }
                _ => None,
            })
            .collect())
    }
}

/// Glob pattern split into a literal base directory and a matcher
#[derive(Debug, Clone)]
struct DevicePattern {
    base: PathBuf,
    depth: usize,
    matcher: GlobMatcher,
}

fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}

impl DevicePattern {
    fn new(raw: &str) -> Result<Self> {
        let matcher = Glob::new(raw)
            .map_err(|e| AppError::Config(format!("Invalid device pattern '{}': {}", raw, e)))?
            .compile_matcher();

        let mut base = PathBuf::new();
        let mut depth = 0;
        for component in Path::new(raw).components() {
            match component {
                Component::Normal(part) if depth > 0 || has_glob_meta(&part.to_string_lossy()) => {
                    depth += 1
                }
                other => base.push(other),
            }
        }

        Ok(Self {
            base,
            depth,
            matcher,
        })
    }

    /// Expand against the filesystem, sorted for a repeatable first-seen order
    fn expand(&self) -> Vec<PathBuf> {
        if self.depth == 0 {
            return if self.base.exists() {
                vec![self.base.clone()]
            } else {
                Vec::new()
            };
        }

        let mut level = vec![self.base.clone()];
        for _ in 0..self.depth {
            let mut next = Vec::new();
            for dir in &level {
                if let Ok(entries) = std::fs::read_dir(dir) {
                    next.extend(entries.flatten().map(|e| e.path()));
                }
            }
            level = next;
        }

        let mut matches: Vec<PathBuf> = level
            .into_iter()
            .filter(|p| self.matcher.is_match(p))
            .collect();
        matches.sort();
        matches
    }
}

/// Scans the host for plausible relay devices
pub struct DeviceEnumerator {
    patterns: Vec<DevicePattern>,
    lister: Option<Arc<dyn PortLister>>,
    resolver: StableKeyResolver,
}

impl DeviceEnumerator {
    pub fn new(
        patterns: &[String],
        lister: Option<Arc<dyn PortLister>>,
        resolver: StableKeyResolver,
    ) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| DevicePattern::new(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            patterns,
            lister,
            resolver,
        })
    }

    /// Raw candidates, deduplicated, in first-seen order
    ///
    /// A duplicate contributes its USB metadata if the first sighting had none.
    pub fn scan(&self, preferred: Option<&str>) -> Vec<ListedPort> {
        let mut seen: HashMap<PathBuf, usize> = HashMap::new();
        let mut ports: Vec<ListedPort> = Vec::new();
        let mut push = |port: ListedPort| {
            // by-id symlinks and their targets are one device
            let canonical =
                std::fs::canonicalize(&port.path).unwrap_or_else(|_| PathBuf::from(&port.path));
            match seen.get(&canonical) {
                Some(&index) => {
                    let first = &mut ports[index];
                    if first.usb.is_none() {
                        first.usb = port.usb;
                    }
                }
                None => {
                    seen.insert(canonical, ports.len());
                    ports.push(port);
                }
            }
        };

        if let Some(preferred) = preferred {
            if Path::new(preferred).exists() {
                push(ListedPort::bare(preferred));
            } else {
                debug!("Preferred device {} not present", preferred);
            }
        }

        if let Some(lister) = &self.lister {
            match lister.list_ports() {
                Ok(listed) => listed.into_iter().for_each(&mut push),
                Err(e) => warn!("Port listing unavailable, falling back to globs: {}", e),
            }
        }

        for pattern in &self.patterns {
            for path in pattern.expand() {
                push(ListedPort::bare(path.to_string_lossy()));
            }
        }

        ports
    }

    /// Candidates with stable keys, ordered by key; empty means no hardware
    pub fn enumerate(&self, preferred: Option<&str>) -> Vec<DeviceCandidate> {
        let mut candidates: Vec<DeviceCandidate> = self
            .scan(preferred)
            .into_iter()
            .map(|port| self.resolver.candidate(port.path, port.usb.as_ref()))
            .collect();
        candidates.sort_by(|a, b| a.stable_key.cmp(&b.stable_key));

        debug!(
            "Enumerated {} relay candidate(s): {:?}",
            candidates.len(),
            candidates.iter().map(|c| c.path.as_str()).collect::<Vec<_>>()
        );
        candidates
    }
}
