//! Direct TCP transport: one plaintext or TLS socket per connection,
//! resolved through [`DnsConfig`], with an incremental, short-read-aware
//! `rawrecv` and an in-place `starttls` upgrade.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::connect::{AsyncReadAndWrite, DnsConfig};
use crate::error::{Error, TransportError};

/// Default chunk size for a single `rawrecv`/`recv` round, matching the
/// reference implementation's `socket.recv(1024)`.
pub const DEFAULT_RECV_SIZE: usize = 1024;

/// A single TCP (optionally TLS) connection to an XMPP server.
pub struct TcpTransport {
    dns: DnsConfig,
    socket: Option<Box<dyn AsyncReadAndWrite>>,
    buffer: Vec<u8>,
}

impl TcpTransport {
    /// Builds a transport that will resolve `host` via the usual
    /// `_xmpp-client._tcp` SRV record, falling back to port 5222.
    #[cfg(feature = "dns")]
    pub fn new(host: impl Into<String>) -> TcpTransport {
        TcpTransport {
            dns: DnsConfig::srv_default_client(&host.into()),
            socket: None,
            buffer: Vec::new(),
        }
    }

    /// Builds a transport over an already-resolved [`DnsConfig`] (e.g. a
    /// fixed address, for tests or for servers that skip SRV lookups).
    pub fn with_dns_config(dns: DnsConfig) -> TcpTransport {
        TcpTransport {
            dns,
            socket: None,
            buffer: Vec::new(),
        }
    }

    /// Resolves and connects the socket. Idempotent only in the sense that
    /// calling it again opens a second connection, discarding the first —
    /// callers that want a fresh connection after `disconnect()` should
    /// build a new `TcpTransport` or call this again.
    pub async fn connect(&mut self) -> Result<(), Error> {
        let stream = self.dns.resolve().await?;
        stream.set_nodelay(true).ok();
        self.socket = Some(Box::new(stream));
        Ok(())
    }

    fn socket_mut(&mut self) -> Result<&mut Box<dyn AsyncReadAndWrite>, Error> {
        self.socket
            .as_mut()
            .ok_or_else(|| TransportError::DeadSocket.into())
    }

    /// Writes `data` to the socket in full.
    pub async fn send(&mut self, data: &[u8]) -> Result<usize, Error> {
        self.socket_mut()?.write_all(data).await?;
        Ok(data.len())
    }

    /// Reads whatever is available, in chunks of `size`, appending each
    /// chunk to the internal buffer, until a short (or zero-length) read
    /// signals the socket has nothing more buffered right now. If *nothing
    /// at all* was read, the socket is considered dead (P5's TCP half).
    pub async fn rawrecv(&mut self, size: usize) -> Result<(), Error> {
        let mut chunk = vec![0u8; size];
        let mut got_any = false;
        loop {
            let n = self.socket_mut()?.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            got_any = true;
            self.buffer.extend_from_slice(&chunk[..n]);
            if n < size {
                break;
            }
        }
        if !got_any {
            return Err(TransportError::DeadSocket.into());
        }
        Ok(())
    }

    /// Drains up to `size` bytes of already-received data from the buffer.
    pub fn recv(&mut self, size: usize) -> Vec<u8> {
        let take = size.min(self.buffer.len());
        self.buffer.drain(..take).collect()
    }

    /// Shuts the socket down and forgets it.
    pub async fn disconnect(&mut self) -> Result<(), Error> {
        if let Some(mut socket) = self.socket.take() {
            socket.shutdown().await.ok();
        }
        Ok(())
    }

    /// Upgrades the current socket to TLS in place, preserving the
    /// underlying file descriptor: the TLS stream wraps the very same boxed
    /// socket rather than opening a new connection.
    #[cfg(feature = "tls-rust")]
    pub async fn starttls(&mut self, domain: &str) -> Result<(), Error> {
        let plain = self
            .socket
            .take()
            .ok_or(Error::Transport(TransportError::DeadSocket))?;
        let upgraded = crate::connect::tls::upgrade(plain, domain).await?;
        self.socket = Some(upgraded);
        Ok(())
    }

    /// Whether unread data is already buffered.
    pub fn ready_read(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Whether the socket is connected and can accept writes.
    pub fn ready_write(&self) -> bool {
        self.socket.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recv_drains_only_what_was_asked() {
        let mut t = TcpTransport::with_dns_config(DnsConfig::addr("127.0.0.1:1"));
        t.buffer = b"hello world".to_vec();
        assert_eq!(t.recv(5), b"hello");
        assert_eq!(t.buffer, b" world");
    }

    #[tokio::test]
    async fn send_without_connect_is_dead_socket() {
        let mut t = TcpTransport::with_dns_config(DnsConfig::addr("127.0.0.1:1"));
        let err = t.send(b"x").await.unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::DeadSocket)));
    }
}
