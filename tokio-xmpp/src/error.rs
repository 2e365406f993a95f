//! Error types for the stream state machine and the two transports.

#[cfg(feature = "dns")]
use hickory_resolver::{
    error::ResolveError as DnsResolveError, proto::error::ProtoError as DnsProtoError,
};
use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;
use std::net::AddrParseError;

/// Top-level error type returned by [`crate::stream::Stream`] and the
/// transports.
#[derive(Debug)]
pub enum Error {
    /// I/O error from the underlying socket or HTTP connection.
    Io(IoError),
    /// The stream layer rejected something in the XML it was fed.
    Stream(StreamError),
    /// A transport-level failure: a dead socket, a dropped BOSH session, an
    /// unexpected HTTP status, and so on.
    Transport(TransportError),
    /// The XML parser or serializer failed outside of a handler (a handler
    /// failure surfaces as [`Error::Stream`] instead, see
    /// [`StreamError`]'s `From<minidom::Error>` impl below).
    Xml(minidom::Error),
    /// Invalid IP/port address.
    Addr(AddrParseError),
    /// DNS protocol error.
    #[cfg(feature = "dns")]
    Dns(DnsProtoError),
    /// DNS resolution error.
    #[cfg(feature = "dns")]
    Resolve(DnsResolveError),
    /// DNS label conversion error, no details available from module `idna`.
    #[cfg(feature = "dns")]
    Idna,
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(fmt, "I/O error: {}", e),
            Error::Stream(e) => write!(fmt, "stream error: {}", e),
            Error::Transport(e) => write!(fmt, "transport error: {}", e),
            Error::Xml(e) => write!(fmt, "XML error: {}", e),
            Error::Addr(e) => write!(fmt, "invalid network address: {}", e),
            #[cfg(feature = "dns")]
            Error::Dns(e) => write!(fmt, "{:?}", e),
            #[cfg(feature = "dns")]
            Error::Resolve(e) => write!(fmt, "{:?}", e),
            #[cfg(feature = "dns")]
            Error::Idna => write!(fmt, "IDNA error"),
        }
    }
}

impl StdError for Error {
    fn cause(&self) -> Option<&dyn StdError> {
        match self {
            Error::Io(e) => Some(e),
            Error::Stream(e) => Some(e),
            Error::Transport(e) => Some(e),
            Error::Xml(e) => Some(e),
            Error::Addr(e) => Some(e),
            #[cfg(feature = "dns")]
            Error::Dns(e) => Some(e),
            #[cfg(feature = "dns")]
            Error::Resolve(e) => Some(e),
            #[cfg(feature = "dns")]
            Error::Idna => None,
        }
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Io(e)
    }
}

impl From<StreamError> for Error {
    fn from(e: StreamError) -> Self {
        Error::Stream(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<AddrParseError> for Error {
    fn from(e: AddrParseError) -> Self {
        Error::Addr(e)
    }
}

#[cfg(feature = "dns")]
impl From<idna::Errors> for Error {
    fn from(_e: idna::Errors) -> Self {
        Error::Idna
    }
}

#[cfg(feature = "dns")]
impl From<DnsResolveError> for Error {
    fn from(e: DnsResolveError) -> Error {
        Error::Resolve(e)
    }
}

#[cfg(feature = "dns")]
impl From<DnsProtoError> for Error {
    fn from(e: DnsProtoError) -> Error {
        Error::Dns(e)
    }
}

/// A [`minidom::Error::Handler`] raised by the stream layer's own start/end
/// handlers carries a boxed [`StreamError`]; everything else from the parser
/// is a plain XML-level failure.
impl From<minidom::Error> for Error {
    fn from(e: minidom::Error) -> Self {
        match e {
            minidom::Error::Handler(boxed) => match boxed.downcast::<StreamError>() {
                Ok(stream_err) => Error::Stream(*stream_err),
                Err(other) => Error::Xml(minidom::Error::Handler(other)),
            },
            other => Error::Xml(other),
        }
    }
}

/// Errors the stream state machine's start-tag handlers can raise while
/// examining an incoming (or outgoing) `<stream:stream>` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The root element of a stream was not `<stream:stream>`.
    UnexpectedRoot(String),
    /// The `version` attribute did not match the one this stream speaks.
    VersionMismatch(String),
    /// `start()` was called on a stream with no `to` set.
    MissingTo,
}

impl fmt::Display for StreamError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StreamError::UnexpectedRoot(tag) => {
                write!(fmt, "unexpected root element <{}>, expected <stream:stream>", tag)
            }
            StreamError::VersionMismatch(version) => {
                write!(fmt, "unsupported stream version {:?}", version)
            }
            StreamError::MissingTo => write!(fmt, "start() requires `to` to be set"),
        }
    }
}

impl StdError for StreamError {}

/// Transport-level failures common to both the TCP and BOSH transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// A `rawrecv` round received zero bytes from a socket that previously
    /// delivered data: the TCP connection is dead.
    DeadSocket,
    /// The BOSH session was torn down by the connection manager (HTTP 404,
    /// or any status other than 200/400/403/404).
    Disconnected,
    /// The BOSH response body's root element was not `<body/>`.
    NotABody,
    /// The connection manager sent `type="terminate"`, optionally with a
    /// `condition` attribute.
    Terminate(Option<String>),
    /// HTTP 400: the client sent a malformed request.
    ProtocolViolation,
    /// HTTP 403: the connection manager refused the request.
    PolicyViolation,
    /// HTTP 404: the `sid` is unknown to the connection manager.
    InvalidSession,
    /// Any other HTTP status.
    UnknownStatus(u16),
}

impl fmt::Display for TransportError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransportError::DeadSocket => write!(fmt, "dead socket"),
            TransportError::Disconnected => write!(fmt, "Disconnected from server"),
            TransportError::NotABody => write!(fmt, "BOSH response root was not <body/>"),
            TransportError::Terminate(Some(condition)) => {
                write!(fmt, "BOSH session terminated: {}", condition)
            }
            TransportError::Terminate(None) => write!(fmt, "BOSH session terminated"),
            TransportError::ProtocolViolation => write!(fmt, "BOSH protocol violation (HTTP 400)"),
            TransportError::PolicyViolation => write!(fmt, "BOSH policy violation (HTTP 403)"),
            TransportError::InvalidSession => write!(fmt, "unknown BOSH session (HTTP 404)"),
            TransportError::UnknownStatus(code) => write!(fmt, "unexpected HTTP status {}", code),
        }
    }
}

impl StdError for TransportError {}
