//! Stable device identifier resolution
//!
//! Device nodes like `/dev/hidraw0` are renumbered across reboots and replugs,
//! so candidates are ordered by a key derived from USB metadata instead:
//!
//! 1. vendor + model + short serial
//! 2. vendor + model + long serial
//! 3. vendor + model
//! 4. the path's final segment
//!
//! Metadata comes from the udev database (`/run/udev/data/c<major>:<minor>`)
//! and, for anything missing there, from the USB device's sysfs attributes.
//! Resolution never fails; it degrades to the basename.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

use super::types::{DeviceCandidate, KeySource};
use crate::error::{AppError, Result};

/// Device classes searched under `<sys>/class`
const DEVICE_CLASSES: [&str; 2] = ["hidraw", "tty"];

/// Vendor/model/serial metadata for one device node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceProperties {
    pub vendor_id: Option<String>,
    pub model_id: Option<String>,
    pub serial_short: Option<String>,
    pub serial: Option<String>,
}

impl DeviceProperties {
    fn merge_missing(&mut self, other: DeviceProperties) {
        self.vendor_id = self.vendor_id.take().or(other.vendor_id);
        self.model_id = self.model_id.take().or(other.model_id);
        self.serial_short = self.serial_short.take().or(other.serial_short);
        self.serial = self.serial.take().or(other.serial);
    }

    /// Metadata reported by a USB port listing
    pub fn from_usb(
        vid: u16,
        pid: u16,
        serial_number: Option<&str>,
        manufacturer: Option<&str>,
        product: Option<&str>,
    ) -> Self {
        let serial_short = serial_number.and_then(non_empty);
        Self {
            vendor_id: Some(format!("{:04x}", vid)),
            model_id: Some(format!("{:04x}", pid)),
            serial: long_serial(manufacturer, product, serial_short.as_deref()),
            serial_short,
        }
    }

    fn is_complete(&self) -> bool {
        self.vendor_id.is_some()
            && self.model_id.is_some()
            && self.serial_short.is_some()
            && self.serial.is_some()
    }
}

/// OS device-property lookup
pub trait PropertySource: Send + Sync {
    fn properties(&self, path: &Path) -> Result<DeviceProperties>;
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn read_attr(dir: &Path, name: &str) -> Option<String> {
    std::fs::read_to_string(dir.join(name))
        .ok()
        .and_then(|v| non_empty(&v))
}

/// udev replaces whitespace and unsafe characters with '_' in ID_SERIAL
fn udev_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "#+-.:=@_".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// ID_SERIAL as udev builds it: manufacturer_product_serial
fn long_serial(
    manufacturer: Option<&str>,
    product: Option<&str>,
    serial_short: Option<&str>,
) -> Option<String> {
    let long = [manufacturer, product, serial_short]
        .into_iter()
        .flatten()
        .filter_map(non_empty)
        .map(|part| udev_safe(&part))
        .collect::<Vec<_>>()
        .join("_");
    non_empty(&long)
}

/// Property source reading the udev database and sysfs
pub struct SysfsPropertySource {
    sys_root: PathBuf,
    udev_data: PathBuf,
}

impl SysfsPropertySource {
    pub fn new(sys_root: impl Into<PathBuf>, udev_data: impl Into<PathBuf>) -> Self {
        Self {
            sys_root: sys_root.into(),
            udev_data: udev_data.into(),
        }
    }

    fn class_dir(&self, node_name: &str) -> Option<PathBuf> {
        DEVICE_CLASSES
            .iter()
            .map(|class| self.sys_root.join("class").join(class).join(node_name))
            .find(|dir| dir.exists())
    }

    /// `E:KEY=VALUE` lines from the udev database entry for this node
    fn udev_properties(&self, class_dir: &Path) -> Option<DeviceProperties> {
        let devnum = read_attr(class_dir, "dev")?;
        let content = std::fs::read_to_string(self.udev_data.join(format!("c{}", devnum))).ok()?;

        let env: HashMap<&str, &str> = content
            .lines()
            .filter_map(|line| line.strip_prefix("E:"))
            .filter_map(|kv| kv.split_once('='))
            .collect();
        let get = |key: &str| env.get(key).and_then(|v| non_empty(v));

        Some(DeviceProperties {
            vendor_id: get("ID_VENDOR_ID"),
            model_id: get("ID_MODEL_ID"),
            serial_short: get("ID_SERIAL_SHORT"),
            serial: get("ID_SERIAL"),
        })
    }

    /// Walk up from the class device to the owning USB device
    fn usb_attributes(&self, class_dir: &Path) -> Option<DeviceProperties> {
        let device_dir = std::fs::canonicalize(class_dir).ok()?;
        let sys_root = std::fs::canonicalize(&self.sys_root).ok()?;

        let usb_dir = device_dir
            .ancestors()
            .take_while(|dir| dir.starts_with(&sys_root) && *dir != sys_root)
            .find(|dir| dir.join("idVendor").exists())?;

        let serial_short = read_attr(usb_dir, "serial");
        let serial = long_serial(
            read_attr(usb_dir, "manufacturer").as_deref(),
            read_attr(usb_dir, "product").as_deref(),
            serial_short.as_deref(),
        );

        Some(DeviceProperties {
            vendor_id: read_attr(usb_dir, "idVendor"),
            model_id: read_attr(usb_dir, "idProduct"),
            serial_short,
            serial,
        })
    }
}

impl PropertySource for SysfsPropertySource {
    fn properties(&self, path: &Path) -> Result<DeviceProperties> {
        let node = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let name = node
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::Internal(format!("No device name in {}", path.display())))?;

        let class_dir = self
            .class_dir(&name)
            .ok_or_else(|| AppError::Internal(format!("No sysfs entry for {}", name)))?;

        let mut props = self.udev_properties(&class_dir).unwrap_or_default();
        if !props.is_complete() {
            if let Some(attrs) = self.usb_attributes(&class_dir) {
                props.merge_missing(attrs);
            }
        }
        Ok(props)
    }
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Derive the ordering key from metadata, most specific first
pub fn key_from_properties(path: &str, props: &DeviceProperties) -> (String, KeySource) {
    match (&props.vendor_id, &props.model_id) {
        (Some(vendor), Some(model)) => {
            if let Some(serial) = &props.serial_short {
                (format!("{}:{}:{}", vendor, model, serial), KeySource::SerialShort)
            } else if let Some(serial) = &props.serial {
                (format!("{}:{}:{}", vendor, model, serial), KeySource::Serial)
            } else {
                (format!("{}:{}", vendor, model), KeySource::VendorModel)
            }
        }
        _ => (basename(path), KeySource::Basename),
    }
}

/// Resolves hardware-stable keys for candidate paths
#[derive(Clone)]
pub struct StableKeyResolver {
    source: Arc<dyn PropertySource>,
}

impl StableKeyResolver {
    pub fn new(source: Arc<dyn PropertySource>) -> Self {
        Self { source }
    }

    /// Resolver over a sysfs tree and udev database directory
    pub fn sysfs(sys_root: impl Into<PathBuf>, udev_data: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(SysfsPropertySource::new(sys_root, udev_data)))
    }

    /// Key and its origin; never fails
    pub fn resolve_with_source(&self, path: &str) -> (String, KeySource) {
        self.resolve_listed(path, None)
    }

    /// Key for a path whose USB metadata a port listing already reported
    ///
    /// Listed metadata wins; the property source only fills what it lacks.
    pub fn resolve_listed(
        &self,
        path: &str,
        listed: Option<&DeviceProperties>,
    ) -> (String, KeySource) {
        let props = match listed {
            Some(listed) if listed.is_complete() => listed.clone(),
            Some(listed) => {
                let mut props = listed.clone();
                match self.source.properties(Path::new(path)) {
                    Ok(found) => props.merge_missing(found),
                    Err(e) => trace!("Property lookup for listed {} failed: {}", path, e),
                }
                props
            }
            None => match self.source.properties(Path::new(path)) {
                Ok(found) => found,
                Err(e) => {
                    trace!("Property lookup for {} failed: {}", path, e);
                    return (basename(path), KeySource::Basename);
                }
            },
        };
        key_from_properties(path, &props)
    }

    pub fn candidate(&self, path: String, listed: Option<&DeviceProperties>) -> DeviceCandidate {
        let (stable_key, key_source) = self.resolve_listed(&path, listed);
        DeviceCandidate {
            path,
            stable_key,
            key_source,
        }
    }
}
