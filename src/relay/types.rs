//! Relay data types
//!
//! Shared value types passed between the enumerator, the actuators and the
//! engine. Nothing here is persisted; every actuation builds them afresh.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Hold duration used when a request carries none (or an unusable one)
pub const DEFAULT_HOLD: Duration = Duration::from_millis(300);

/// Logical 1-based relay identifier, independent of wiring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RelayNumber(u32);

impl RelayNumber {
    /// Create a relay number, rejecting zero
    pub fn new(value: u32) -> Option<Self> {
        (value >= 1).then_some(Self(value))
    }
}

impl TryFrom<u32> for RelayNumber {
    type Error = String;

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "relay numbers are 1-based".to_string())
    }
}

impl From<RelayNumber> for u32 {
    fn from(relay: RelayNumber) -> Self {
        relay.0
    }
}

impl fmt::Display for RelayNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolve an optional millisecond count into a hold interval
pub fn hold_from_millis(millis: Option<u64>, default: Duration) -> Duration {
    millis.map(Duration::from_millis).unwrap_or(default)
}

/// Where a candidate's stable key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeySource {
    /// vendor + model + short serial
    SerialShort,
    /// vendor + model + long serial
    Serial,
    /// vendor + model only
    VendorModel,
    /// last path segment
    Basename,
}

/// A path potentially backing a physical relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCandidate {
    /// OS device node or port identifier
    pub path: String,
    /// Hardware-derived ordering key
    pub stable_key: String,
    /// Which metadata produced the key
    pub key_source: KeySource,
}

/// Static binding from relay number to GPIO pin and/or device path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub relay: RelayNumber,
    #[serde(default)]
    pub gpio_pin: Option<u32>,
    #[serde(default)]
    pub device_path: Option<String>,
}

/// GPIO stage outcome, kept for logging and the aggregated result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpioOutcome {
    pub pin: u32,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one actuation call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_device_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_encoding_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpio: Option<GpioOutcome>,
}

impl ActuationResult {
    /// Successful HID/serial round trip
    pub fn device_success(path: impl Into<String>, encoding_index: usize) -> Self {
        Self {
            success: true,
            used_device_path: Some(path.into()),
            used_encoding_index: Some(encoding_index),
            ..Default::default()
        }
    }

    /// Success with no device involved (GPIO-only channels, network boxes)
    pub fn succeeded() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            failure_reason: Some(reason.into()),
            ..Default::default()
        }
    }
}
