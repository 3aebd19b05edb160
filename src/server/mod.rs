//! Network front doors
//!
//! - [`socket`]: the line-based command socket backed by the relay engine
//! - [`forwarder`]: HTTP service relaying `relayNumber` payloads to a command socket

pub mod forwarder;
pub mod protocol;
pub mod socket;

#[cfg(test)]
pub(crate) mod testing;

pub use forwarder::{create_router, extract_relay_number, Forwarder};
pub use protocol::{parse_request, TriggerRequest, REPLY_TOGGLED};
pub use socket::CommandServer;
