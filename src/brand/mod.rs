//! Relay brand dispatcher
//!
//! Maps a product tag to the actuator that drives it. Network relay boxes and
//! remote embed hosts are reached over TCP; `ch340` and `local` run the
//! in-process engine.

mod ch340;
mod embed;
mod rn62;

pub use ch340::{Ch340Relay, CH340_DEFAULT_HOLD};
pub use embed::EmbedClient;
pub use rn62::{rn62_all_frames, rn62_frame, Rn62Client, RN62_RELAYS};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::relay::{ActuationResult, RelayEngine};

/// Port the embed command socket listens on by default
pub const DEFAULT_SOCKET_PORT: u16 = 9747;

/// Supported relay products
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelayBrand {
    /// RN-62 network relay box
    #[serde(rename = "rn-62")]
    Rn62,
    RaspberryEmbed,
    JetsonEmbed,
    DesktopEmbed,
    /// CH340 USB-serial relay on this host
    Ch340,
    /// GPIO + HID engine from the configured channel table
    Local,
}

impl RelayBrand {
    pub const ALL: [RelayBrand; 6] = [
        Self::Rn62,
        Self::RaspberryEmbed,
        Self::JetsonEmbed,
        Self::DesktopEmbed,
        Self::Ch340,
        Self::Local,
    ];

    pub fn name_str(&self) -> &'static str {
        match self {
            Self::Rn62 => "rn-62",
            Self::RaspberryEmbed => "raspberry-embed",
            Self::JetsonEmbed => "jetson-embed",
            Self::DesktopEmbed => "desktop-embed",
            Self::Ch340 => "ch340",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for RelayBrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name_str())
    }
}

impl FromStr for RelayBrand {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|b| b.name_str() == tag)
            .ok_or_else(|| AppError::Config(format!("Unsupported relay brand: {}", s)))
    }
}

/// Remote host and port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Anything that can actuate a relay by number
#[async_trait]
pub trait RelayActuator: Send + Sync {
    /// Brand tag for logging
    fn name(&self) -> &'static str;

    /// Actuate `relay`; `duration_ms` is ignored by brands with a fixed pulse
    async fn trigger(&self, relay: u32, duration_ms: Option<u64>) -> ActuationResult;
}

#[async_trait]
impl RelayActuator for RelayEngine {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn trigger(&self, relay: u32, duration_ms: Option<u64>) -> ActuationResult {
        RelayEngine::trigger(self, relay, duration_ms).await
    }
}

/// Build the actuator for `brand`
///
/// `host`/`port` override the configured brand endpoint. Embed brands default
/// to the local command socket; `rn-62` needs an explicit host.
pub fn build_actuator(
    brand: RelayBrand,
    host: Option<String>,
    port: Option<u16>,
    config: &AppConfig,
) -> Result<Arc<dyn RelayActuator>> {
    Ok(match brand {
        RelayBrand::Rn62 => Arc::new(build_rn62(host, port, config)?),
        RelayBrand::RaspberryEmbed | RelayBrand::JetsonEmbed | RelayBrand::DesktopEmbed => {
            let timeout = Duration::from_millis(config.brand.timeout_ms);
            let host = host
                .or_else(|| config.brand.host.clone())
                .unwrap_or_else(|| "127.0.0.1".to_string());
            let port = port.or(config.brand.port).unwrap_or(DEFAULT_SOCKET_PORT);
            Arc::new(EmbedClient::new(brand, Endpoint::new(host, port), timeout))
        }
        RelayBrand::Ch340 => Arc::new(Ch340Relay::from_config(config)?),
        RelayBrand::Local => Arc::new(RelayEngine::from_config(config)?),
    })
}

/// RN-62 client for `host`/`port`, falling back to the configured endpoint
pub fn build_rn62(
    host: Option<String>,
    port: Option<u16>,
    config: &AppConfig,
) -> Result<Rn62Client> {
    let host = host
        .or_else(|| config.brand.host.clone())
        .ok_or_else(|| AppError::Config("rn-62 requires a host address".to_string()))?;
    let port = port.or(config.brand.port).unwrap_or(DEFAULT_SOCKET_PORT);
    Ok(Rn62Client::new(
        Endpoint::new(host, port),
        Duration::from_millis(config.brand.timeout_ms),
    ))
}
