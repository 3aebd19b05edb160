use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{info, warn};

use super::{Endpoint, RelayActuator, RelayBrand};
use crate::error::{AppError, Result};
use crate::relay::{ActuationResult, ENCODINGS};
use crate::server::protocol::{TriggerRequest, REPLY_TOGGLED};
use crate::utils::connect_with_timeout;

/// Hold used to size the reply deadline when the request carries none
const ASSUMED_REMOTE_HOLD: Duration = Duration::from_secs(1);

/// Longest the remote may spend before answering a request with `hold`
///
/// The remote pulses GPIO for one hold, then every encoding whose ON lands
/// costs another hold whether or not its OFF does.
pub fn reply_deadline(timeout: Duration, hold: Duration) -> Duration {
    timeout + hold * (1 + ENCODINGS.len() as u32)
}

/// Client for a remote command socket (Raspberry Pi, Jetson or desktop host)
pub struct EmbedClient {
    brand: RelayBrand,
    endpoint: Endpoint,
    timeout: Duration,
}

impl EmbedClient {
    pub fn new(brand: RelayBrand, endpoint: Endpoint, timeout: Duration) -> Self {
        Self {
            brand,
            endpoint,
            timeout,
        }
    }

    /// Send one request and return the reply text
    ///
    /// The remote answers only after actuating, so the read is bounded by
    /// [`reply_deadline`] rather than the bare `timeout`.
    pub async fn request(&self, request: TriggerRequest, hold: Duration) -> Result<String> {
        let address = self.endpoint.address();
        let mut stream = connect_with_timeout(&address, self.timeout).await?;
        stream.write_all(request.encode().as_bytes()).await?;
        info!(
            "{} relay {} requested at {}",
            self.brand, request.relay, address
        );

        let mut reply = Vec::new();
        timeout(
            reply_deadline(self.timeout, hold),
            stream.read_to_end(&mut reply),
        )
            .await
            .map_err(|_| AppError::Network(format!("No reply from {}", address)))??;
        Ok(String::from_utf8_lossy(&reply).trim().to_string())
    }
}

#[async_trait]
impl RelayActuator for EmbedClient {
    fn name(&self) -> &'static str {
        self.brand.name_str()
    }

    async fn trigger(&self, relay: u32, duration_ms: Option<u64>) -> ActuationResult {
        let request = TriggerRequest { relay, duration_ms };
        let hold = duration_ms.map_or(ASSUMED_REMOTE_HOLD, Duration::from_millis);

        match self.request(request, hold).await {
            Ok(reply) if reply == REPLY_TOGGLED => {
                info!("Response: {}", reply);
                ActuationResult::succeeded()
            }
            Ok(reply) => {
                warn!("{} rejected relay {}: {}", self.brand, relay, reply);
                ActuationResult::failure(reply)
            }
            Err(e) => {
                warn!("{} relay {} failed: {}", self.brand, relay, e);
                ActuationResult::failure(e.to_string())
            }
        }
    }
}
