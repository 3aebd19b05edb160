use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::relay::enumerate::{UsbId, DEFAULT_PATTERNS};
use crate::relay::gpio::{GpioBackendKind, PinNumbering};
use crate::relay::{
    default_channels, Channel, ChannelMap, DeviceEnumerator, StableKeyResolver, DEFAULT_HOLD,
};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Command socket settings
    pub server: ServerConfig,
    /// HTTP forwarder settings
    pub forwarder: ForwarderConfig,
    /// GPIO settings
    pub gpio: GpioConfig,
    /// Relay device discovery and I/O
    pub devices: DeviceConfig,
    /// Relay channel table and timing
    pub relay: RelayConfig,
    /// Defaults for the brand dispatcher
    pub brand: BrandConfig,
}

impl AppConfig {
    /// Reject configurations the engine cannot be built from
    pub fn validate(&self) -> Result<()> {
        ChannelMap::new(self.relay.channels.clone())?;

        // Compiles every pattern
        DeviceEnumerator::new(
            &self.devices.patterns,
            None,
            StableKeyResolver::sysfs(&self.devices.sys_root, &self.devices.udev_data),
        )?;

        if self.devices.baud_rate == 0 {
            return Err(AppError::Config(
                "Relay serial baud_rate must be greater than 0".to_string(),
            ));
        }
        if self.server.port == 0 {
            return Err(AppError::Config(
                "Command socket port must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Command socket configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub bind_address: String,
    /// TCP port
    pub port: u16,
    /// How long to wait for the request line
    pub read_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 9747,
            read_timeout_ms: 5000,
        }
    }
}

/// HTTP forwarder configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForwarderConfig {
    pub bind_address: String,
    pub port: u16,
    /// Command socket the relay number is forwarded to
    pub target: String,
    /// Connect/write timeout toward the target
    pub timeout_ms: u64,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5050,
            target: "127.0.0.1:9747".to_string(),
            timeout_ms: 3000,
        }
    }
}

/// GPIO configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GpioConfig {
    /// Backend: auto, cdev or simulated
    pub backend: GpioBackendKind,
    /// GPIO chip device (e.g., /dev/gpiochip0)
    pub chip: String,
    /// Pin numbering used in the channel table
    pub numbering: PinNumbering,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            backend: GpioBackendKind::Auto,
            chip: "/dev/gpiochip0".to_string(),
            numbering: PinNumbering::Board,
        }
    }
}

/// Relay device discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device path glob patterns
    pub patterns: Vec<String>,
    /// Query the platform serial-port listing
    pub use_port_listing: bool,
    /// USB vendor[:product] filters for the port listing (empty = any USB port)
    pub usb_filters: Vec<UsbId>,
    /// Serial relay baud rate
    pub baud_rate: u32,
    /// Open/write timeout for serial relays
    pub io_timeout_ms: u64,
    /// sysfs mount point
    pub sys_root: String,
    /// udev runtime database
    pub udev_data: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect(),
            use_port_listing: true,
            usb_filters: Vec::new(),
            baud_rate: 9600,
            io_timeout_ms: 1000,
            sys_root: "/sys".to_string(),
            udev_data: "/run/udev/data".to_string(),
        }
    }
}

/// Relay channel configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Hold time when a request carries no duration
    pub default_hold_ms: u64,
    /// Relay number → GPIO pin / device path
    pub channels: Vec<Channel>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            default_hold_ms: DEFAULT_HOLD.as_millis() as u64,
            channels: default_channels(),
        }
    }
}

/// Brand dispatcher defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrandConfig {
    /// Brand used by `send` when none is given
    pub default: Option<String>,
    /// Remote host for network brands
    pub host: Option<String>,
    /// Remote port for network brands
    pub port: Option<u16>,
    /// Connect/read timeout for network brands
    pub timeout_ms: u64,
}

impl Default for BrandConfig {
    fn default() -> Self {
        Self {
            default: None,
            host: None,
            port: None,
            timeout_ms: 3000,
        }
    }
}
