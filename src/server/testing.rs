//! Live command socket over spy hardware, shared by socket and client tests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

use super::socket::CommandServer;
use crate::relay::gpio::{GpioActuator, PinNumbering};
use crate::relay::testing::{SpyGpio, SpyOpener};
use crate::relay::{
    Channel, ChannelMap, DeviceEnumerator, HidActuator, RelayEngine, RelayNumber,
    StableKeyResolver,
};

pub(crate) struct SocketHarness {
    _dir: TempDir,
    pub addr: SocketAddr,
    pub gpio: Arc<SpyGpio>,
    pub devices: Arc<SpyOpener>,
    pub device_path: String,
}

/// Relay 1 on board pin 16 and a fake hidraw node
pub(crate) async fn start_command_socket() -> SocketHarness {
    let dir = TempDir::new().unwrap();
    let device = dir.path().join("hidraw0");
    std::fs::write(&device, b"").unwrap();
    let device_path = device.to_string_lossy().into_owned();

    let channels = ChannelMap::new([Channel {
        relay: RelayNumber::new(1).unwrap(),
        gpio_pin: Some(16),
        device_path: Some(device_path.clone()),
    }])
    .unwrap();
    let enumerator = DeviceEnumerator::new(
        &[format!("{}/hidraw*", dir.path().display())],
        None,
        StableKeyResolver::sysfs(dir.path().join("sys"), dir.path().join("udev")),
    )
    .unwrap();

    let gpio = Arc::new(SpyGpio::default());
    let devices = Arc::new(SpyOpener::default());
    let engine = RelayEngine::new(
        channels,
        GpioActuator::new(gpio.clone(), PinNumbering::Board),
        enumerator,
        HidActuator::new(devices.clone()),
        Duration::from_millis(300),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(CommandServer::new(Arc::new(engine), Duration::from_secs(2)));
    tokio::spawn(server.serve(listener));

    SocketHarness {
        _dir: dir,
        addr,
        gpio,
        devices,
        device_path,
    }
}
