//! Command socket server
//!
//! One request per connection: read the request, actuate, write one reply,
//! close. Each connection runs on its own task; actuations of the same relay
//! and device are serialized inside the engine.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::protocol::{malformed_reply, parse_request, REPLY_TOGGLED};
use crate::error::Result;
use crate::relay::RelayEngine;

/// Largest request accepted in one read
const MAX_REQUEST: usize = 1024;

pub struct CommandServer {
    engine: Arc<RelayEngine>,
    read_timeout: Duration,
}

impl CommandServer {
    pub fn new(engine: Arc<RelayEngine>, read_timeout: Duration) -> Self {
        Self {
            engine,
            read_timeout,
        }
    }

    /// Accept connections until the listener fails
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("Command socket listening on {}", addr);
        }
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    // EMFILE and friends are transient
                    warn!("Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, peer).await {
                    warn!("Connection {} failed: {}", peer, e);
                }
            });
        }
    }

    /// Serve a single connection to completion
    pub async fn handle_connection(&self, mut stream: TcpStream, peer: SocketAddr) -> Result<()> {
        debug!("Connection established: {}", peer);

        let mut buf = [0u8; MAX_REQUEST];
        let n = match timeout(self.read_timeout, stream.read(&mut buf)).await {
            Ok(read) => read?,
            Err(_) => {
                warn!("No request from {} within {:?}", peer, self.read_timeout);
                return Ok(());
            }
        };
        if n == 0 {
            debug!("No data received from {}", peer);
            return Ok(());
        }

        let line = String::from_utf8_lossy(&buf[..n]);
        let reply = match parse_request(&line) {
            Ok(request) => {
                info!(
                    "Request from {}: relay {} duration {:?}",
                    peer, request.relay, request.duration_ms
                );
                let result = self.engine.trigger(request.relay, request.duration_ms).await;
                if !result.success {
                    warn!(
                        "Relay {} requested by {} did not actuate: {}",
                        request.relay,
                        peer,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
                REPLY_TOGGLED
            }
            Err(e) => {
                warn!("Rejecting request from {}: {}", peer, e);
                malformed_reply(&line)
            }
        };

        stream.write_all(reply.as_bytes()).await?;
        stream.shutdown().await?;
        debug!("Replied {:?} to {}", reply, peer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::GpioEvent;
    use crate::server::testing::start_command_socket as start;

    async fn request(addr: SocketAddr, line: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(line.as_bytes()).await.unwrap();
        let mut reply = String::new();
        stream.read_to_string(&mut reply).await.unwrap();
        reply
    }

    #[tokio::test]
    async fn test_end_to_end_toggle() {
        let h = start().await;
        assert_eq!(request(h.addr, "1,500").await, "Relay toggled.");

        // Board pin 16 is line 23
        let sets: Vec<(bool, tokio::time::Instant)> = h
            .gpio
            .events()
            .into_iter()
            .filter_map(|e| match e {
                GpioEvent::Set { line: 23, high, at } => Some((high, at)),
                _ => None,
            })
            .collect();
        assert_eq!(sets.len(), 2);
        assert!(sets[0].0 && !sets[1].0);
        assert!(sets[1].1 - sets[0].1 >= Duration::from_millis(500));
        assert_eq!(h.gpio.events().last(), Some(&GpioEvent::Released { line: 23 }));

        let writes = h.devices.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].bytes, vec![0xA0, 0x01, 0x01, 0xA2]);
        assert_eq!(writes[1].bytes, vec![0xA0, 0x01, 0x00, 0xA1]);
        assert!(writes.iter().all(|w| w.path == h.device_path));
    }

    #[tokio::test]
    async fn test_malformed_requests() {
        let h = start().await;
        assert_eq!(request(h.addr, "abc").await, "Invalid relay number.");
        assert_eq!(
            request(h.addr, "x,100").await,
            "Invalid relay number or duration."
        );
        assert_eq!(h.devices.open_count(), 0);
        assert!(h.gpio.events().is_empty());
    }

    #[tokio::test]
    async fn test_failed_actuation_still_acknowledged() {
        let h = start().await;
        assert_eq!(request(h.addr, "7,10").await, "Relay toggled.");
        assert_eq!(h.devices.open_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_connection_gets_no_reply() {
        let h = start().await;
        let mut stream = TcpStream::connect(h.addr).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut reply = String::new();
        stream.read_to_string(&mut reply).await.unwrap();
        assert!(reply.is_empty());
    }
}
