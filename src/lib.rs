//! relayd - relay actuation daemon
//!
//! Drives USB-HID and USB-serial relay boards and GPIO-wired relays from an
//! abstract relay number, with a line-based command socket, an HTTP forwarder
//! and clients for network relay products.

pub mod brand;
pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod utils;

pub use error::{AppError, Result};
