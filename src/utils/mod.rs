//! Utility modules for relayd

pub mod net;

pub use net::{bind_addr, bind_tcp_listener, bind_tokio_listener, connect_with_timeout, hex};
