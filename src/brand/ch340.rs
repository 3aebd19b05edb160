use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::RelayActuator;
use crate::config::AppConfig;
use crate::error::Result;
use crate::relay::{
    hold_from_millis, ActuationResult, DeviceEnumerator, HidActuator, SerialPortLister,
    StableKeyResolver, SystemDeviceOpener, UsbId,
};

/// CH340 boards are pulsed for a full second unless told otherwise
pub const CH340_DEFAULT_HOLD: Duration = Duration::from_secs(1);

/// USB relay behind a CH340 serial converter on this host
///
/// Only ports the platform reports as CH340 (1a86:7523) are considered; no
/// GPIO is driven.
pub struct Ch340Relay {
    enumerator: DeviceEnumerator,
    hid: HidActuator,
    default_hold: Duration,
    device_index: Option<usize>,
}

impl Ch340Relay {
    pub fn new(enumerator: DeviceEnumerator, hid: HidActuator, default_hold: Duration) -> Self {
        Self {
            enumerator,
            hid,
            default_hold,
            device_index: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let devices = &config.devices;
        let enumerator = DeviceEnumerator::new(
            &[],
            Some(Arc::new(SerialPortLister::new(vec![UsbId::CH340]))),
            StableKeyResolver::sysfs(&devices.sys_root, &devices.udev_data),
        )?;
        let hid = HidActuator::new(Arc::new(SystemDeviceOpener::new(
            devices.baud_rate,
            Duration::from_millis(devices.io_timeout_ms),
        )));
        Ok(Self::new(enumerator, hid, CH340_DEFAULT_HOLD))
    }

    /// Pin the converter by position in stable-key order instead of relay number
    pub fn with_device_index(mut self, index: Option<usize>) -> Self {
        self.device_index = index;
        self
    }
}

#[async_trait]
impl RelayActuator for Ch340Relay {
    fn name(&self) -> &'static str {
        "ch340"
    }

    async fn trigger(&self, relay: u32, duration_ms: Option<u64>) -> ActuationResult {
        let hold = hold_from_millis(duration_ms, self.default_hold);
        let mut candidates = self.enumerator.enumerate(None);

        if let Some(index) = self.device_index {
            if index >= candidates.len() {
                warn!(
                    "CH340 device index {} not found ({} present)",
                    index,
                    candidates.len()
                );
                return ActuationResult::failure(format!("CH340 device index {} not found", index));
            }
            candidates = vec![candidates.swap_remove(index)];
        }

        if let Some(first) = candidates.first() {
            info!("CH340 converter candidates start at {}", first.path);
        }
        self.hid.actuate(&candidates, Some(relay), hold).await
    }
}
