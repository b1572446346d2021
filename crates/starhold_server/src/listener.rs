//! Listening socket provisioning.
//!
//! Given nothing but the configured port, this module resolves the usable
//! wildcard addresses (IPv4 and IPv6), and opens one bound, listening,
//! non-blocking socket per address family. A family that cannot be bound is
//! logged and skipped; ending up with no socket at all aborts startup.

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener as StdTcpListener};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::error::ServerError;

/// A listening socket ready to hand to the reactor.
///
/// Registered with the reactor exactly once; dropped (and thereby closed)
/// exactly once, during the shutdown sequence.
pub struct BoundListener {
    /// The non-blocking tokio listener
    pub listener: TcpListener,
    /// Address actually bound, with the OS-assigned port when port 0 was requested
    pub local_addr: SocketAddr,
}

/// Open listening sockets for every usable address family on `port`.
///
/// Each socket is marked for address reuse, set non-blocking, and placed
/// into the listening state with the given backlog. The IPv6 socket is
/// restricted to IPv6 traffic so both wildcard families can share the port.
///
/// # Errors
///
/// Returns `ServerError::Network` when no address family could be bound.
/// Individual bind failures are logged at warn level and tolerated.
pub fn provision_listeners(port: u16, backlog: u32) -> Result<Vec<BoundListener>, ServerError> {
    let candidates = [
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)),
    ];

    let mut listeners = Vec::new();
    for addr in candidates {
        match bind_address(addr, backlog) {
            Ok(bound) => {
                info!("✅ Listener bound on {}", bound.local_addr);
                listeners.push(bound);
            }
            Err(e) => {
                warn!("Could not bind {}: {}", addr, e);
            }
        }
    }

    if listeners.is_empty() {
        return Err(ServerError::Network(
            "failed to bind a listening socket on any address".to_string(),
        ));
    }

    Ok(listeners)
}

/// Build one listening socket for `addr`.
fn bind_address(addr: SocketAddr, backlog: u32) -> std::io::Result<BoundListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    if addr.is_ipv6() {
        socket.set_only_v6(true)?;
    }
    socket.bind(&addr.into())?;
    socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;

    let std_listener: StdTcpListener = socket.into();
    std_listener.set_nonblocking(true)?;
    let local_addr = std_listener.local_addr()?;
    let listener = TcpListener::from_std(std_listener)?;

    Ok(BoundListener {
        listener,
        local_addr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_provision_ephemeral_port() {
        let listeners = provision_listeners(0, 16).unwrap();
        assert!(!listeners.is_empty());

        // The first candidate is the IPv4 wildcard
        assert!(listeners[0].local_addr.is_ipv4());
        assert_ne!(listeners[0].local_addr.port(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_provisioned_listener_accepts() {
        let listeners = provision_listeners(0, 16).unwrap();
        let port = listeners[0].local_addr.port();

        let (accepted, connected) = tokio::join!(
            listeners[0].listener.accept(),
            TcpStream::connect(("127.0.0.1", port))
        );

        assert!(accepted.is_ok());
        assert!(connected.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_families_get_distinct_sockets() {
        let listeners = provision_listeners(0, 16).unwrap();

        // Every bound listener carries its own resolved address
        for pair in listeners.windows(2) {
            assert_ne!(pair[0].local_addr, pair[1].local_addr);
        }
    }
}
