//! Relay actuation engine
//!
//! Resolves a relay number to its channel, pulses the channel's GPIO pin and
//! drives its HID/serial device, and folds both into one [`ActuationResult`].
//! Actuations of the same relay are serialized.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::actuator::HidActuator;
use super::channel::ChannelMap;
use super::device::SystemDeviceOpener;
use super::enumerate::{DeviceEnumerator, PortLister, SerialPortLister};
use super::gpio::{build_backend, GpioActuator};
use super::locks::KeyedLocks;
use super::stable_key::StableKeyResolver;
use super::types::{hold_from_millis, ActuationResult, DeviceCandidate};
use crate::config::AppConfig;
use crate::error::Result;

pub struct RelayEngine {
    channels: ChannelMap,
    gpio: GpioActuator,
    enumerator: DeviceEnumerator,
    hid: HidActuator,
    default_hold: Duration,
    relay_locks: KeyedLocks,
}

impl RelayEngine {
    pub fn new(
        channels: ChannelMap,
        gpio: GpioActuator,
        enumerator: DeviceEnumerator,
        hid: HidActuator,
        default_hold: Duration,
    ) -> Self {
        Self {
            channels,
            gpio,
            enumerator,
            hid,
            default_hold,
            relay_locks: KeyedLocks::new(),
        }
    }

    /// Build an engine on real hardware backends
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let channels = ChannelMap::new(config.relay.channels.clone())?;

        let gpio = GpioActuator::new(
            build_backend(config.gpio.backend, &config.gpio.chip),
            config.gpio.numbering,
        );

        let devices = &config.devices;
        let lister = devices.use_port_listing.then(|| {
            Arc::new(SerialPortLister::new(devices.usb_filters.clone())) as Arc<dyn PortLister>
        });
        let enumerator = DeviceEnumerator::new(
            &devices.patterns,
            lister,
            StableKeyResolver::sysfs(&devices.sys_root, &devices.udev_data),
        )?;

        let hid = HidActuator::new(Arc::new(SystemDeviceOpener::new(
            devices.baud_rate,
            Duration::from_millis(devices.io_timeout_ms),
        )));

        info!(
            "Relay engine ready: {} channel(s), {} GPIO backend",
            channels.len(),
            gpio.backend_name()
        );

        Ok(Self::new(
            channels,
            gpio,
            enumerator,
            hid,
            Duration::from_millis(config.relay.default_hold_ms),
        ))
    }

    /// Current candidates, as the HID stage would see them without a preferred path
    pub fn list_devices(&self) -> Vec<DeviceCandidate> {
        self.enumerator.enumerate(None)
    }

    /// Actuate `relay`, holding for `duration_ms` (default hold when absent)
    pub async fn trigger(&self, relay: u32, duration_ms: Option<u64>) -> ActuationResult {
        let hold = hold_from_millis(duration_ms, self.default_hold);

        let channel = match self.channels.resolve(relay) {
            Ok(channel) => channel.clone(),
            Err(e) => {
                warn!("Rejecting relay {}: {}", relay, e);
                return ActuationResult::failure(e.to_string());
            }
        };

        let _guard = self.relay_locks.lock(&format!("relay-{}", relay)).await;
        info!("Triggering relay {} for {:?}", relay, hold);

        let gpio = match channel.gpio_pin {
            Some(pin) => Some(self.gpio.pulse_outcome(pin, hold).await),
            None => None,
        };

        let mut result = match (&channel.device_path, &gpio) {
            (Some(path), _) => {
                let candidates = self.enumerator.enumerate(Some(path));
                self.hid.actuate(&candidates, Some(relay), hold).await
            }
            (None, Some(outcome)) if outcome.success => ActuationResult::succeeded(),
            (None, Some(outcome)) => ActuationResult::failure(
                outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| "GPIO pulse failed".to_string()),
            ),
            (None, None) => {
                ActuationResult::failure(format!("Relay {} has no GPIO pin or device", relay))
            }
        };
        result.gpio = gpio;

        if result.success {
            info!("Relay {} actuated", relay);
        } else {
            warn!(
                "Relay {} actuation failed: {}",
                relay,
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::gpio::PinNumbering;
    use crate::relay::testing::{GpioEvent, Script, SpyGpio, SpyOpener};
    use crate::relay::types::{Channel, RelayNumber};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        engine: RelayEngine,
        gpio: Arc<SpyGpio>,
        devices: Arc<SpyOpener>,
        paths: Vec<String>,
    }

    fn channel(relay: u32, pin: Option<u32>, path: Option<&str>) -> Channel {
        Channel {
            relay: RelayNumber::new(relay).unwrap(),
            gpio_pin: pin,
            device_path: path.map(str::to_string),
        }
    }

    /// Engine over a fake /dev with `device_count` hidraw nodes
    fn fixture(
        device_count: usize,
        gpio: SpyGpio,
        channels: impl Fn(&[String]) -> Vec<Channel>,
    ) -> Fixture {
        let dir = TempDir::new().unwrap();
        let paths: Vec<String> = (0..device_count)
            .map(|i| {
                let path = dir.path().join(format!("hidraw{}", i));
                std::fs::write(&path, b"").unwrap();
                path.to_string_lossy().into_owned()
            })
            .collect();

        let enumerator = DeviceEnumerator::new(
            &[format!("{}/hidraw*", dir.path().display())],
            None,
            StableKeyResolver::sysfs(dir.path().join("sys"), dir.path().join("udev")),
        )
        .unwrap();

        let gpio = Arc::new(gpio);
        let devices = Arc::new(SpyOpener::default());
        let engine = RelayEngine::new(
            ChannelMap::new(channels(&paths)).unwrap(),
            GpioActuator::new(gpio.clone(), PinNumbering::Line),
            enumerator,
            HidActuator::new(devices.clone()),
            Duration::from_millis(300),
        );

        Fixture {
            _dir: dir,
            engine,
            gpio,
            devices,
            paths,
        }
    }

    fn default_like(paths: &[String]) -> Vec<Channel> {
        vec![
            channel(1, Some(16), paths.first().map(String::as_str)),
            channel(2, Some(18), paths.get(1).map(String::as_str)),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_relay_touches_nothing() {
        let f = fixture(2, SpyGpio::default(), default_like);
        for relay in [0, 3, 99] {
            let result = f.engine.trigger(relay, Some(100)).await;
            assert!(!result.success);
            assert_eq!(
                result.failure_reason,
                Some(format!("Unsupported relay number: {}", relay))
            );
        }
        assert_eq!(f.devices.open_count(), 0);
        assert!(f.gpio.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gpio_and_hid_both_driven() {
        let f = fixture(2, SpyGpio::default(), default_like);
        let result = f.engine.trigger(2, Some(150)).await;

        assert!(result.success);
        assert_eq!(result.used_device_path.as_deref(), Some(f.paths[1].as_str()));
        assert_eq!(result.used_encoding_index, Some(0));
        assert!(result.gpio.as_ref().unwrap().success);

        let gpio = f.gpio.events();
        assert_eq!(gpio.first(), Some(&GpioEvent::Requested { line: 18 }));
        let writes = f.devices.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[1].at - writes[0].at, Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_hold() {
        let f = fixture(1, SpyGpio::default(), default_like);
        assert!(f.engine.trigger(1, None).await.success);
        let writes = f.devices.writes();
        assert_eq!(writes[1].at - writes[0].at, Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gpio_failure_does_not_block_hid() {
        let f = fixture(1, SpyGpio::failing_request(), default_like);
        let result = f.engine.trigger(1, Some(50)).await;
        assert!(result.success);
        assert!(!result.gpio.unwrap().success);
        assert_eq!(f.devices.writes().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hid_failure_is_reported_after_gpio_pulse() {
        let f = fixture(1, SpyGpio::default(), default_like);
        f.devices.script(&f.paths[0], Script::RejectAll);

        let result = f.engine.trigger(1, Some(50)).await;
        assert!(!result.success);
        assert!(result.gpio.unwrap().success);
        assert_eq!(f.gpio.events().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_device_present() {
        let f = fixture(0, SpyGpio::default(), |_| {
            vec![channel(1, None, Some("/nonexistent/hidraw0"))]
        });
        let result = f.engine.trigger(1, None).await;
        assert!(!result.success);
        assert_eq!(result.failure_reason.as_deref(), Some("No relay device found"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gpio_only_channel() {
        let f = fixture(1, SpyGpio::default(), |_| vec![channel(1, Some(16), None)]);
        let result = f.engine.trigger(1, None).await;
        assert!(result.success);
        assert!(result.used_device_path.is_none());
        assert_eq!(f.devices.open_count(), 0);

        let f = fixture(1, SpyGpio::failing_high(), |_| vec![channel(1, Some(16), None)]);
        assert!(!f.engine.trigger(1, None).await.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_beyond_devices_falls_back_to_last() {
        let f = fixture(1, SpyGpio::default(), |paths| {
            vec![channel(4, None, paths.first().map(String::as_str))]
        });
        let result = f.engine.trigger(4, None).await;
        assert_eq!(result.used_device_path.as_deref(), Some(f.paths[0].as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_relay_triggers_do_not_interleave() {
        let f = Arc::new(fixture(1, SpyGpio::default(), |paths| {
            vec![channel(1, None, paths.first().map(String::as_str))]
        }));

        let a = {
            let f = f.clone();
            tokio::spawn(async move { f.engine.trigger(1, Some(100)).await })
        };
        let b = {
            let f = f.clone();
            tokio::spawn(async move { f.engine.trigger(1, Some(100)).await })
        };
        assert!(a.await.unwrap().success);
        assert!(b.await.unwrap().success);

        let bytes: Vec<Vec<u8>> = f.devices.writes().into_iter().map(|w| w.bytes).collect();
        let on = vec![0xA0, 0x01, 0x01, 0xA2];
        let off = vec![0xA0, 0x01, 0x00, 0xA1];
        assert_eq!(bytes, vec![on.clone(), off.clone(), on, off]);
    }
}
