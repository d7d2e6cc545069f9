use async_trait::async_trait;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time;
use tracing::trace;

use crate::types::ProbeState;

/// A single connect-style reachability check against one port.
#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn probe(&self, target: IpAddr, port: u16, timeout: Duration) -> ProbeState;
}

/// Plain TCP connect probe bounded by `tokio::time::timeout`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnectProbe;

#[async_trait]
impl PortProbe for TcpConnectProbe {
    async fn probe(&self, target: IpAddr, port: u16, timeout: Duration) -> ProbeState {
        probe(target, port, timeout).await
    }
}

/// Attempt one TCP connection to `target:port`.
///
/// The stream is dropped before returning on every path, which closes the socket.
/// A refused connection is `Closed`; timeouts and every other failure are `Unreachable`.
pub async fn probe(target: IpAddr, port: u16, timeout: Duration) -> ProbeState {
    let addr = SocketAddr::new(target, port);
    match time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            ProbeState::Open
        }
        Ok(Err(e)) => {
            trace!(%addr, error = %e, "connect failed");
            classify_connect_error(e.kind())
        }
        Err(_) => {
            trace!(%addr, "connect timed out");
            ProbeState::Unreachable
        }
    }
}

fn classify_connect_error(kind: ErrorKind) -> ProbeState {
    match kind {
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => ProbeState::Closed,
        _ => ProbeState::Unreachable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn refused_maps_to_closed() {
        assert_eq!(
            classify_connect_error(ErrorKind::ConnectionRefused),
            ProbeState::Closed
        );
        assert_eq!(
            classify_connect_error(ErrorKind::AddrNotAvailable),
            ProbeState::Unreachable
        );
    }

    #[tokio::test]
    async fn listening_port_is_open() {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = probe(LOCALHOST, port, Duration::from_secs(1)).await;
        assert_eq!(state, ProbeState::Open);
    }

    #[tokio::test]
    async fn released_port_is_not_open() {
        let port = {
            let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let state = probe(LOCALHOST, port, Duration::from_secs(1)).await;
        assert!(!state.is_open());
    }
}
