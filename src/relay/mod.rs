//! Relay Actuation Module
//!
//! Actuates USB-HID/serial relay boards and GPIO-driven relays on command.
//!
//! # Flow
//!
//! 1. The relay number is resolved to a [`Channel`] (GPIO pin and/or device path)
//! 2. The GPIO pin, if any, is pulsed for the hold duration
//! 3. Candidate devices are enumerated fresh and ordered by a hardware-stable key
//! 4. The selected device is tried with each known command encoding until an
//!    ON, hold, OFF round trip succeeds
//!
//! # Hardware Support
//!
//! - **GPIO**: Linux GPIO character device, or a simulated backend on other hosts
//! - **USB HID relay**: `/dev/hidraw*` nodes written directly
//! - **USB serial relay**: LCUS/CH340 style boards on `/dev/ttyUSB*`, `/dev/ttyACM*`
//!
//! # Example
//!
//! ```ignore
//! use relayd::relay::RelayEngine;
//!
//! let engine = RelayEngine::from_config(&config)?;
//! let result = engine.trigger(1, Some(500)).await;
//! assert!(result.success);
//! ```

pub mod actuator;
pub mod channel;
pub mod device;
pub mod encoding;
pub mod engine;
pub mod enumerate;
pub mod fallback;
pub mod gpio;
mod locks;
pub mod stable_key;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use actuator::{select_device_index, HidActuator};
pub use channel::{default_channels, ChannelMap};
pub use device::{DeviceOpener, SystemDeviceOpener};
pub use encoding::{CommandEncoding, ENCODINGS};
pub use engine::RelayEngine;
pub use enumerate::{DeviceEnumerator, ListedPort, PortLister, SerialPortLister, UsbId};
pub use gpio::{GpioActuator, GpioBackend, GpioBackendKind, PinNumbering};
pub use locks::KeyedLocks;
pub use stable_key::{DeviceProperties, PropertySource, StableKeyResolver};
pub use types::{
    hold_from_millis, ActuationResult, Channel, DeviceCandidate, GpioOutcome,
    KeySource, RelayNumber, DEFAULT_HOLD,
};
