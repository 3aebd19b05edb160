//! Configuration
//!
//! JSON-file backed configuration with serde defaults for every section.

mod schema;
mod store;

pub use schema::{
    AppConfig, BrandConfig, DeviceConfig, ForwarderConfig, GpioConfig, RelayConfig, ServerConfig,
};
pub use store::{config_path, ConfigStore, DEFAULT_CONFIG_PATH};
