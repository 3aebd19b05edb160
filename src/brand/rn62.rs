use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{info, warn};

use super::{Endpoint, RelayActuator};
use crate::error::{AppError, Result};
use crate::relay::ActuationResult;
use crate::utils::{connect_with_timeout, hex};

/// Relays on an RN-62 box
pub const RN62_RELAYS: [u32; 2] = [1, 2];

/// Fixed trigger frame for an RN-62 relay (1 or 2)
pub fn rn62_frame(relay: u32) -> Result<[u8; 9]> {
    match relay {
        1 | 2 => Ok([0x63, 0x03, 0x03, 0x07, 0x07, 0x09, 0x09, relay as u8, 0x01]),
        _ => Err(AppError::UnsupportedRelay(relay)),
    }
}

/// Both relay frames back to back, pulsing every relay in one send
pub fn rn62_all_frames() -> Vec<u8> {
    RN62_RELAYS
        .into_iter()
        .filter_map(|relay| rn62_frame(relay).ok())
        .flatten()
        .collect()
}

/// RN-62 network relay box
///
/// The box pulses the relay itself; the hold duration is not sent.
pub struct Rn62Client {
    endpoint: Endpoint,
    timeout: Duration,
}

impl Rn62Client {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    async fn send(&self, frame: &[u8]) -> Result<Vec<u8>> {
        let address = self.endpoint.address();
        let mut stream = connect_with_timeout(&address, self.timeout).await?;
        stream.write_all(frame).await?;
        info!("RN-62 frame sent to {}: {}", address, hex(frame));

        let mut buf = [0u8; 1024];
        let n = timeout(self.timeout, stream.read(&mut buf))
            .await
            .map_err(|_| AppError::Network(format!("No response from {}", address)))??;
        Ok(buf[..n].to_vec())
    }

    /// Pulse every relay on the box with one combined send
    pub async fn trigger_all(&self) -> ActuationResult {
        self.deliver("all relays", &rn62_all_frames()).await
    }

    async fn deliver(&self, target: &str, frame: &[u8]) -> ActuationResult {
        match self.send(frame).await {
            Ok(response) => {
                info!("RN-62 response: {}", hex(&response));
                ActuationResult::succeeded()
            }
            Err(e) => {
                warn!("RN-62 {} failed: {}", target, e);
                ActuationResult::failure(e.to_string())
            }
        }
    }
}

#[async_trait]
impl RelayActuator for Rn62Client {
    fn name(&self) -> &'static str {
        "rn-62"
    }

    async fn trigger(&self, relay: u32, _duration_ms: Option<u64>) -> ActuationResult {
        let frame = match rn62_frame(relay) {
            Ok(frame) => frame,
            Err(e) => return ActuationResult::failure(e.to_string()),
        };

        self.deliver(&format!("relay {}", relay), &frame).await
    }
}
