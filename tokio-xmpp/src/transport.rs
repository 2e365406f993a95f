//! The transport-agnostic face `Stream` is driven through: a direct TCP
//! socket or a BOSH long-polled HTTP session, modeled as a sum type rather
//! than a trait object, since the two variants' capability sets line up
//! exactly (`send`, `rawrecv`, `recv`, `disconnect`, `ready_read`,
//! `ready_write`) and nothing else ever needs to implement this interface.

use crate::bosh::BoshTransport;
use crate::connect::tcp::TcpTransport;
use crate::error::Error;

/// Either kind of transport an XMPP stream's bytes can travel over.
pub enum Transport {
    /// A direct TCP (optionally TLS) socket.
    Tcp(TcpTransport),
    /// An HTTP long-polled BOSH session. Boxed because `BoshTransport` is
    /// considerably larger than `TcpTransport` (a connection pool plus
    /// pending-request bookkeeping) and this enum is often moved by value.
    Bosh(Box<BoshTransport>),
}

impl Transport {
    /// Writes `data` out over whichever transport this is.
    pub async fn send(&mut self, data: &[u8]) -> Result<usize, Error> {
        match self {
            Transport::Tcp(t) => t.send(data).await,
            Transport::Bosh(b) => b.send(data).await,
        }
    }

    /// Blocks until at least one new chunk of data has been buffered, or
    /// the transport is found to be dead/disconnected.
    pub async fn rawrecv(&mut self, size: usize) -> Result<(), Error> {
        match self {
            Transport::Tcp(t) => t.rawrecv(size).await,
            Transport::Bosh(b) => b.rawrecv(size).await,
        }
    }

    /// Drains up to `size` bytes already buffered by a prior `rawrecv`.
    pub fn recv(&mut self, size: usize) -> Vec<u8> {
        match self {
            Transport::Tcp(t) => t.recv(size),
            Transport::Bosh(b) => b.recv(size),
        }
    }

    /// Tears the transport down.
    pub async fn disconnect(&mut self) -> Result<(), Error> {
        match self {
            Transport::Tcp(t) => t.disconnect().await,
            Transport::Bosh(b) => b.disconnect().await,
        }
    }

    /// Whether unread data is already buffered.
    pub fn ready_read(&self) -> bool {
        match self {
            Transport::Tcp(t) => t.ready_read(),
            Transport::Bosh(b) => b.ready_read(),
        }
    }

    /// Whether the transport can currently accept a `send`.
    pub fn ready_write(&self) -> bool {
        match self {
            Transport::Tcp(t) => t.ready_write(),
            Transport::Bosh(b) => b.ready_write(),
        }
    }
}

impl From<TcpTransport> for Transport {
    fn from(t: TcpTransport) -> Self {
        Transport::Tcp(t)
    }
}

impl From<BoshTransport> for Transport {
    fn from(b: BoshTransport) -> Self {
        Transport::Bosh(Box::new(b))
    }
}
