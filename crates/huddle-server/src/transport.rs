//! TCP transport.
//!
//! Plain TCP carrying newline-terminated text. There is no TLS and no
//! framing beyond the newline.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};

use crate::error::ServerError;

/// Listening TCP socket.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind a listener.
    ///
    /// # Errors
    ///
    /// - `Config` if `address` is not a socket address
    /// - `Transport` if the address cannot be bound
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

        tracing::info!("TCP transport bound to {}", addr);

        Ok(Self { listener })
    }

    /// Accept the next connection.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if accepting fails; the listener stays usable.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ServerError> {
        let (stream, peer) = self.listener.accept().await?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %e, "failed to set TCP_NODELAY");
        }

        Ok((stream, peer))
    }

    /// Local address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the socket cannot report its address.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_malformed_address() {
        let result = TcpTransport::bind("not-an-address").await;
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn binds_ephemeral_port_and_accepts() {
        let transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (_stream, peer) = transport.accept().await.unwrap();
        let client = client.await.unwrap();

        assert_eq!(peer, client.local_addr().unwrap());
    }
}
