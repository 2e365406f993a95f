//! Connection establishment: DNS resolution and the transport-agnostic
//! async I/O trait the TCP transport's socket is boxed behind.

use tokio::io::{AsyncRead, AsyncWrite};

pub mod dns;
pub mod tcp;
#[cfg(feature = "tls-rust")]
pub mod tls;

pub use dns::DnsConfig;

/// A boxable socket: plain TCP or a TLS stream wrapping one.
///
/// `TcpTransport` holds its socket as `Box<dyn AsyncReadAndWrite>` so that
/// [`TcpTransport::starttls`] can swap a plaintext socket for a TLS one in
/// place, without changing the field's type — the same trick the teacher
/// uses to let a single `ServerConnector::Stream` type cover both states.
pub trait AsyncReadAndWrite: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncReadAndWrite for T {}
