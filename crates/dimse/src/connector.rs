//! Outbound connection establishment
//!
//! Resolution and the TCP handshake together are bounded by the connect
//! timeout. In force-port mode the local endpoint is bound before anything
//! else, so an unusable endpoint fails without touching the network.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tracing::debug;

use crate::config::RemoteNode;
use crate::{DimseError, Result};

/// Connect to `node`, waiting at most `timeout`
pub async fn connect(node: &RemoteNode, timeout: Duration) -> Result<TcpStream> {
    debug!("Connecting to {} (timeout {:?})", node, timeout);

    bounded(node, timeout, async {
        let addr = resolve(node, None).await?;
        TcpStream::connect(addr)
            .await
            .map_err(|source| connect_error(node, source))
    })
    .await
}

/// Connect to `node` from the fixed local endpoint `local`
pub async fn connect_from(
    node: &RemoteNode,
    local: SocketAddr,
    timeout: Duration,
) -> Result<TcpStream> {
    let socket = bind_local(local)?;
    debug!("Connecting to {} from {} (timeout {:?})", node, local, timeout);

    bounded(node, timeout, async {
        let addr = resolve(node, Some(local)).await?;
        socket
            .connect(addr)
            .await
            .map_err(|source| connect_error(node, source))
    })
    .await
}

/// Bind a fresh, unconnected socket to `local`
///
/// Fails with `LocalBind` if the address does not belong to this host or
/// the port is already taken.
pub fn bind_local(local: SocketAddr) -> Result<TcpSocket> {
    let bind_error = |source| DimseError::LocalBind {
        addr: local,
        source,
    };

    let socket = Socket::new(Domain::for_address(local), Type::STREAM, Some(Protocol::TCP))
        .map_err(bind_error)?;
    socket.set_reuse_address(true).map_err(bind_error)?;
    socket.set_nonblocking(true).map_err(bind_error)?;
    socket.bind(&local.into()).map_err(bind_error)?;

    let stream: std::net::TcpStream = socket.into();
    Ok(TcpSocket::from_std_stream(stream))
}

/// Resolve the node's address, preferring the family of `local` when given
async fn resolve(node: &RemoteNode, local: Option<SocketAddr>) -> Result<SocketAddr> {
    let mut candidates = lookup_host(node.address())
        .await
        .map_err(|source| connect_error(node, source))?
        .collect::<Vec<_>>();

    if let Some(local) = local {
        candidates.retain(|addr| addr.is_ipv4() == local.is_ipv4());
    }

    candidates.into_iter().next().ok_or_else(|| {
        connect_error(
            node,
            io::Error::new(io::ErrorKind::AddrNotAvailable, "no usable address"),
        )
    })
}

async fn bounded<F>(node: &RemoteNode, timeout: Duration, attempt: F) -> Result<TcpStream>
where
    F: Future<Output = Result<TcpStream>>,
{
    match tokio::time::timeout(timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(DimseError::ConnectTimeout {
            peer: node.address(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

fn connect_error(node: &RemoteNode, source: io::Error) -> DimseError {
    DimseError::Connect {
        peer: node.address(),
        source,
    }
}
