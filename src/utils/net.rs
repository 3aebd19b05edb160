//! Networking helpers for the command socket, the forwarder and network relay clients.

use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd};
use std::time::Duration;

use nix::sys::socket::{
    self, sockopt, AddressFamily, Backlog, SockFlag, SockProtocol, SockType, SockaddrIn,
    SockaddrIn6,
};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{AppError, Result};

fn socket_addr_family(addr: &SocketAddr) -> AddressFamily {
    match addr {
        SocketAddr::V4(_) => AddressFamily::Inet,
        SocketAddr::V6(_) => AddressFamily::Inet6,
    }
}

/// Parse a configured bind address and port
pub fn bind_addr(address: &str, port: u16) -> Result<SocketAddr> {
    let ip: IpAddr = address
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("Invalid bind address: {}", address)))?;
    Ok(SocketAddr::new(ip, port))
}

/// Bind a TCP listener with SO_REUSEADDR, and IPv6-only set for IPv6 sockets.
///
/// The command socket is restarted often on embedded targets; reusing the
/// address avoids waiting out TIME_WAIT.
pub fn bind_tcp_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let domain = socket_addr_family(&addr);
    let fd = socket::socket(
        domain,
        SockType::Stream,
        SockFlag::SOCK_CLOEXEC,
        SockProtocol::Tcp,
    )
    .map_err(io::Error::from)?;

    socket::setsockopt(&fd, sockopt::ReuseAddr, &true).map_err(io::Error::from)?;

    if matches!(addr, SocketAddr::V6(_)) {
        socket::setsockopt(&fd, sockopt::Ipv6V6Only, &true).map_err(io::Error::from)?;
    }

    match addr {
        SocketAddr::V4(v4) => {
            let sockaddr = SockaddrIn::from(v4);
            socket::bind(fd.as_raw_fd(), &sockaddr).map_err(io::Error::from)?;
        }
        SocketAddr::V6(v6) => {
            let sockaddr = SockaddrIn6::from(v6);
            socket::bind(fd.as_raw_fd(), &sockaddr).map_err(io::Error::from)?;
        }
    }
    socket::listen(&fd, Backlog::MAXCONN).map_err(io::Error::from)?;

    let listener = unsafe { TcpListener::from_raw_fd(fd.into_raw_fd()) };
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Bind and hand the listener to tokio
pub fn bind_tokio_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    let listener = bind_tcp_listener(addr)
        .map_err(|e| AppError::Network(format!("Failed to bind {}: {}", addr, e)))?;
    Ok(tokio::net::TcpListener::from_std(listener)?)
}

/// Connect to `target` ("host:port"), giving up after `limit`
pub async fn connect_with_timeout(target: &str, limit: Duration) -> Result<TcpStream> {
    match timeout(limit, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(AppError::Network(format!("Connect to {} failed: {}", target, e))),
        Err(_) => Err(AppError::Network(format!(
            "Connect to {} timed out after {:?}",
            target, limit
        ))),
    }
}

/// Lowercase hex rendering for logging binary frames
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
