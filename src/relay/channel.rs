//! Relay-to-channel map

use std::collections::BTreeMap;

use super::types::{Channel, RelayNumber};
use crate::error::{AppError, Result};

/// Static lookup table from relay number to channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMap {
    channels: BTreeMap<RelayNumber, Channel>,
}

impl ChannelMap {
    /// Build a map, rejecting duplicate relay numbers
    pub fn new(channels: impl IntoIterator<Item = Channel>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for channel in channels {
            let relay = channel.relay;
            if map.insert(relay, channel).is_some() {
                return Err(AppError::Config(format!(
                    "Relay {} is configured more than once",
                    relay
                )));
            }
        }
        Ok(Self { channels: map })
    }

    /// Look up the channel for a relay; a miss is terminal for the actuation
    pub fn resolve(&self, relay: u32) -> Result<&Channel> {
        RelayNumber::new(relay)
            .and_then(|r| self.channels.get(&r))
            .ok_or(AppError::UnsupportedRelay(relay))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Factory default wiring: two relays, each on a GPIO pin and a HID node
pub fn default_channels() -> Vec<Channel> {
    [(1, 16, "/dev/hidraw0"), (2, 18, "/dev/hidraw1")]
        .into_iter()
        .filter_map(|(relay, pin, path)| {
            Some(Channel {
                relay: RelayNumber::new(relay)?,
                gpio_pin: Some(pin),
                device_path: Some(path.to_string()),
            })
        })
        .collect()
}

impl Default for ChannelMap {
    fn default() -> Self {
        let channels = default_channels()
            .into_iter()
            .map(|c| (c.relay, c))
            .collect();
        Self { channels }
    }
}
