//! BOSH (XEP-0124/XEP-0206): an HTTP long-polling transport carrying the
//! same stream bytes a TCP socket would, a connection pool of one or more
//! keep-alive HTTP connections instead of one persistent socket.
//!
//! The wire-level translation in both directions (`xmlstream_to_bosh`,
//! `bosh_to_xmlstream`) matches the reference implementation byte for
//! byte, quirks included: see [`bosh_to_xmlstream`]'s doc comment for the
//! one namespace bug preserved on purpose.

use std::collections::{HashMap, VecDeque};
use std::os::fd::{AsRawFd, RawFd};
use std::pin::Pin;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::CONTENT_ENCODING;
use http::{Request, Response, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::task::{JoinError, JoinHandle};

use minidom::{to_string, Node, Parser};

use crate::error::{Error, TransportError};

const NS_HTTP_BIND: &str = "http://jabber.org/protocol/httpbind";
const NS_XBOSH: &str = "urn:xmpp:xbosh";
const DOCHEAD: &str = "<?xml version='1.0'?>";

/// The `rid` (request id) sequence: random-initialized on first use, then
/// strictly incrementing. [`Rid::set`] primes the counter so the *next*
/// read yields exactly the given value — used both for `bind()` (resuming
/// a session at a known rid) and for the dead-connection resend path.
#[derive(Debug, Default, Clone, Copy)]
struct Rid(Option<u64>);

impl Rid {
    fn new() -> Rid {
        Rid(None)
    }

    fn next(&mut self) -> u64 {
        let v = match self.0 {
            None => rand::random::<u64>() % 10_000_000,
            Some(v) => v + 1,
        };
        self.0 = Some(v);
        v
    }

    fn peek(&self) -> Option<u64> {
        self.0
    }

    fn set(&mut self, next_value: u64) {
        self.0 = Some(next_value.saturating_sub(1));
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Idle,
    Busy,
}

struct PooledConnection {
    fd: RawFd,
    send_request: SendRequest<Full<Bytes>>,
    driver: JoinHandle<()>,
    state: ConnState,
}

/// One outstanding HTTP request: its eventual response, and enough of what
/// was sent to resend it verbatim if the connection it went out on turns
/// out to have been dead.
struct Pending {
    handle: JoinHandle<Result<Response<Incoming>, hyper::Error>>,
    body: Vec<u8>,
    rid: u64,
}

/// A BOSH (XEP-0124) connection to an HTTP(S) connection manager.
///
/// Mirrors [`crate::connect::tcp::TcpTransport`]'s capability set
/// (`send`/`rawrecv`/`recv`/`disconnect`/`ready_read`/`ready_write`) so
/// both can live behind [`crate::transport::Transport`], plus BOSH-specific
/// session bookkeeping (`bind`, `xmlstream_to_bosh`, `bosh_to_xmlstream`).
pub struct BoshTransport {
    host: String,
    port: u16,
    path: String,
    https: bool,
    route_server: Option<String>,
    route_port: Option<u16>,

    sid: Option<String>,
    auth_id: Option<String>,
    rid: Rid,
    /// Longest time (seconds) the connection manager may hold a request
    /// open waiting for data (XEP-0124 `wait`).
    pub wait: u32,
    /// Maximum number of requests the connection manager will hold at once
    /// (XEP-0124 `hold`).
    pub hold: u32,
    /// Maximum simultaneous in-flight requests this client will keep open.
    pub requests: u32,
    /// Minimum seconds between polling requests when idle.
    pub polling: u64,
    /// Reuse a single connection for every request rather than opening one
    /// per request (XEP-0124 §7, "pipelining"). Off by default.
    pub pipeline: bool,
    gzip: bool,
    bound: bool,
    xml_lang: String,

    pool: Vec<PooledConnection>,
    pending: HashMap<RawFd, VecDeque<Pending>>,
    buffer: Vec<u8>,
    last_response_at: Option<Instant>,
}

impl BoshTransport {
    /// Parses a BOSH connection manager endpoint URL (`http://host[:port]/path`
    /// or `https://...`) into a fresh, unconnected transport.
    pub fn new(endpoint: &str) -> Result<BoshTransport, Error> {
        let uri: Uri = endpoint
            .parse()
            .map_err(|_| Error::Transport(TransportError::Disconnected))?;
        let https = uri.scheme_str() == Some("https");
        let host = uri
            .host()
            .ok_or(Error::Transport(TransportError::Disconnected))?
            .to_owned();
        let port = uri.port_u16().unwrap_or(if https { 443 } else { 80 });
        let path = if uri.path().is_empty() {
            "/".to_owned()
        } else {
            uri.path().to_owned()
        };
        Ok(BoshTransport {
            host,
            port,
            path,
            https,
            route_server: None,
            route_port: None,
            sid: None,
            auth_id: None,
            rid: Rid::new(),
            wait: 80,
            hold: 4,
            requests: 5,
            polling: 10,
            pipeline: false,
            gzip: true,
            bound: false,
            xml_lang: "en".to_owned(),
            pool: Vec::new(),
            pending: HashMap::new(),
            buffer: Vec::new(),
            last_response_at: None,
        })
    }

    /// Advertises a `route` attribute on session creation when the actual
    /// XMPP server differs from the HTTP endpoint's host (XEP-0124 `route`).
    pub fn set_route(&mut self, server: impl Into<String>, port: Option<u16>) {
        self.route_server = Some(server.into());
        self.route_port = port;
    }

    /// Disables gzip advertisement/decoding (on by default).
    pub fn set_gzip(&mut self, gzip: bool) {
        self.gzip = gzip;
    }

    /// Adopts a previously bound session's parameters, so this transport
    /// can resume it rather than create a new one.
    pub fn bind(&mut self, rid: u64, sid: impl Into<String>, hold: u32, wait: u32, requests: u32, polling: u64) {
        self.rid.set(rid);
        self.sid = Some(sid.into());
        self.hold = hold;
        self.wait = wait;
        self.requests = requests;
        self.polling = polling;
        self.bound = true;
    }

    /// Opens the first pooled HTTP connection.
    pub async fn connect(&mut self) -> Result<(), Error> {
        let conn = self.open_connection().await?;
        self.pool.push(conn);
        self.bound = true;
        Ok(())
    }

    async fn open_connection(&self) -> Result<PooledConnection, Error> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port)).await?;
        tcp.set_nodelay(true).ok();
        if self.https {
            #[cfg(feature = "tls-rust")]
            {
                let fd = tcp.as_raw_fd();
                let boxed: Box<dyn crate::connect::AsyncReadAndWrite> = Box::new(tcp);
                let tls = crate::connect::tls::upgrade(boxed, &self.host).await?;
                let (send_request, conn) = http1::handshake(TokioIo::new(tls))
                    .await
                    .map_err(|_| Error::Transport(TransportError::Disconnected))?;
                let driver = tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        log::debug!("BOSH https connection driver ended: {}", e);
                    }
                });
                return Ok(PooledConnection {
                    fd,
                    send_request,
                    driver,
                    state: ConnState::Idle,
                });
            }
            #[cfg(not(feature = "tls-rust"))]
            {
                return Err(Error::Transport(TransportError::Disconnected));
            }
        }
        let fd = tcp.as_raw_fd();
        let (send_request, conn) = http1::handshake(TokioIo::new(tcp))
            .await
            .map_err(|_| Error::Transport(TransportError::Disconnected))?;
        let driver = tokio::spawn(async move {
            if let Err(e) = conn.await {
                log::debug!("BOSH connection driver ended: {}", e);
            }
        });
        Ok(PooledConnection {
            fd,
            send_request,
            driver,
            state: ConnState::Idle,
        })
    }

    /// Picks a connection to send the next request on: under `pipeline`,
    /// always the first connection (reset to idle); otherwise the first
    /// idle one, or a freshly opened one if every pooled connection is busy.
    async fn connection(&mut self) -> Result<usize, Error> {
        if self.pipeline && !self.pool.is_empty() {
            self.pool[0].state = ConnState::Idle;
            return Ok(0);
        }
        if let Some(idx) = self.pool.iter().position(|c| c.state == ConnState::Idle) {
            return Ok(idx);
        }
        let conn = self.open_connection().await?;
        self.pool.push(conn);
        Ok(self.pool.len() - 1)
    }

    /// Tears down the connection identified by `fd` and discards anything
    /// still pending on it (the caller is responsible for resending
    /// anything worth keeping, per XEP-0124's "dead keep-alive" recovery).
    fn reconnect(&mut self, fd: RawFd) {
        if let Some(pos) = self.pool.iter().position(|c| c.fd == fd) {
            let conn = self.pool.remove(pos);
            conn.driver.abort();
        }
        self.pending.remove(&fd);
    }

    /// The file descriptors of every open pooled connection.
    pub fn fileno(&self) -> Vec<RawFd> {
        assert!(!self.pool.is_empty(), "no BOSH connection is open");
        self.pool.iter().map(|c| c.fd).collect()
    }

    /// Whether this transport may open another request right now, per
    /// XEP-0124 `hold`/`polling` bookkeeping.
    pub fn accepts_more_requests(&self) -> bool {
        if !self.bound {
            return false;
        }
        if let Some(last) = self.last_response_at {
            if last.elapsed() < Duration::from_secs(self.polling) {
                return false;
            }
        }
        let outstanding: usize = self.pending.values().map(|q| q.len()).sum();
        if outstanding == 0 {
            return true;
        }
        outstanding < self.requests.saturating_sub(1) as usize
    }

    /// Translates a fragment of raw stream bytes — the stream header, or a
    /// single serialized stanza, or nothing at all (a bare poll) — into a
    /// `<body/>` envelope ready to POST.
    pub fn xmlstream_to_bosh(&mut self, stream_bytes: &[u8]) -> Result<Vec<u8>, Error> {
        let text = String::from_utf8_lossy(stream_bytes);
        let mut body = if let Some(after_prolog) = text.strip_prefix(DOCHEAD) {
            // A stream header: still open (no matching end tag), so make it
            // look self-closed before handing it to the parser.
            let sanitized = after_prolog.replacen('>', "/>", 1);
            let mut parser = Parser::new("bosh-restart-scan");
            parser.feed(sanitized.as_bytes())?;
            let header = parser
                .roots()
                .pop()
                .ok_or_else(|| Error::Transport(TransportError::Disconnected))?;
            if header.attr("id").is_some() {
                let mut restart = Node::bare("body");
                restart.declare_ns(Some("xmpp".to_owned()), NS_XBOSH);
                restart.set_attr("xmpp:restart", "true");
                restart
            } else {
                let mut create = Node::bare("body");
                create.set_attr("hold", self.hold.to_string());
                create.set_attr("wait", self.wait.to_string());
                create.set_attr("ver", "1.6");
                create.declare_ns(Some("xmpp".to_owned()), NS_XBOSH);
                if let Some(version) = header.attr("version") {
                    create.set_attr("xmpp:version", version);
                }
                if let Some(to) = header.attr("to") {
                    create.set_attr("to", to);
                }
                if let Some(server) = &self.route_server {
                    if server != &self.host {
                        let route = match self.route_port {
                            Some(port) => format!("{}:{}", server, port),
                            None => server.clone(),
                        };
                        create.set_attr("route", route);
                    }
                }
                create
            }
        } else {
            let trimmed = text.trim();
            let mut body = Node::bare("body");
            if !trimmed.is_empty() {
                let mut parser = Parser::new("bosh-stanza-scan");
                parser.feed(trimmed.as_bytes())?;
                for stanza in parser.roots() {
                    body.append_child(stanza);
                }
            }
            body
        };

        body.declare_ns(None, NS_HTTP_BIND);
        body.set_attr("content", "text/xml; charset=utf-8");
        body.set_attr("xml:lang", self.xml_lang.clone());
        body.set_attr("rid", self.rid.next().to_string());
        if let Some(sid) = &self.sid {
            body.set_attr("sid", sid.clone());
        }
        Ok(to_string(&body).into_bytes())
    }

    /// Translates a `<body/>` envelope received from the connection manager
    /// back into raw stream bytes.
    ///
    /// When the body carries a `sid`, it is the session-creation response:
    /// this synthesizes the `<stream:stream>` header the rest of the crate
    /// expects to see, adopting `sid`/`wait`/`hold`/`polling`/`requests`/
    /// `authid` as offered. That synthesized header declares `jabber:client`
    /// against the `stream` prefix itself (`xmlns:stream="jabber:client"`)
    /// rather than as a proper default namespace — a namespace-setter bug
    /// in the reference implementation, kept here on purpose since it's
    /// otherwise unobservable (the header is never re-parsed with namespace
    /// resolution turned on) and changing it would make this transport
    /// disagree with every other implementation's test fixtures for the
    /// session-creation handshake.
    pub fn bosh_to_xmlstream(&mut self, body: &Node) -> Vec<u8> {
        if let Some(sid) = body.attr("sid") {
            self.sid = Some(sid.to_owned());
            self.auth_id = body.attr("authid").map(|s| s.to_owned());
            if let Some(wait) = body.attr("wait").and_then(|v| v.parse().ok()) {
                self.wait = wait;
            }
            if let Some(hold) = body.attr("hold").and_then(|v| v.parse().ok()) {
                self.hold = hold;
            }
            if let Some(polling) = body.attr("polling").and_then(|v| v.parse().ok()) {
                self.polling = polling;
            }
            if let Some(requests) = body.attr("requests").and_then(|v| v.parse().ok()) {
                self.requests = requests;
            }

            let mut stream = Node::new("stream:stream", Vec::new());
            for child in body.children() {
                stream.append_child(child.to_owned_node());
            }
            stream.declare_ns(Some("stream".to_owned()), "jabber:client");
            stream.set_attr("version", "1.0");
            stream.set_attr("id", sid);

            let serialized = to_string(&stream);
            let trimmed = serialized
                .strip_suffix("</stream:stream>")
                .unwrap_or(&serialized);
            format!("{}{}", DOCHEAD, trimmed).into_bytes()
        } else {
            let mut out = String::new();
            for child in body.children() {
                out.push_str(&to_string(&child.to_owned_node()));
            }
            out.into_bytes()
        }
    }

    /// Serializes and POSTs `raw_data` (stream header or a single stanza)
    /// to the connection manager.
    pub async fn send(&mut self, raw_data: &[u8]) -> Result<usize, Error> {
        let body = self.xmlstream_to_bosh(raw_data)?;
        let rid = self.rid.peek().unwrap_or(0);
        let conn_idx = self.connection().await?;
        self.post_body(conn_idx, body, rid).await?;
        Ok(raw_data.len())
    }

    async fn post_body(&mut self, conn_idx: usize, body: Vec<u8>, rid: u64) -> Result<(), Error> {
        let fd = self.pool[conn_idx].fd;
        let mut builder = Request::post(self.path.clone())
            .header("Host", format!("{}:{}", self.host, self.port))
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("Content-Length", body.len().to_string());
        if self.gzip {
            builder = builder.header("Accept-Encoding", "gzip, deflate");
        }
        let request = builder
            .body(Full::new(Bytes::from(body.clone())))
            .map_err(|_| Error::Transport(TransportError::Disconnected))?;

        let send_request = &mut self.pool[conn_idx].send_request;
        send_request
            .ready()
            .await
            .map_err(|_| Error::Transport(TransportError::Disconnected))?;
        let handle = tokio::spawn(send_request.send_request(request));

        self.pool[conn_idx].state = ConnState::Busy;
        self.pending
            .entry(fd)
            .or_default()
            .push_back(Pending { handle, body, rid });
        Ok(())
    }

    async fn resend(&mut self, body: Vec<u8>, rid: u64) -> Result<(), Error> {
        let conn_idx = self.connection().await?;
        self.post_body(conn_idx, body, rid).await
    }

    /// Waits for whichever pooled connection's oldest in-flight request
    /// resolves first, handles it (translating a successful response into
    /// buffered stream bytes, or recovering from a dropped keep-alive by
    /// resending everything still pending on that connection, in order),
    /// and returns.
    pub async fn rawrecv(&mut self, _size: usize) -> Result<(), Error> {
        if self.pending.is_empty() {
            return Err(Error::Transport(TransportError::Disconnected));
        }
        let mut fds = Vec::new();
        let mut futs = Vec::new();
        for (&fd, queue) in self.pending.iter_mut() {
            if let Some(front) = queue.front_mut() {
                fds.push(fd);
                futs.push(Pin::new(&mut front.handle));
            }
        }
        if futs.is_empty() {
            return Err(Error::Transport(TransportError::Disconnected));
        }
        let (result, idx, _remaining) = futures::future::select_all(futs).await;
        let fd = fds[idx];
        self.finish_pending(fd, result).await
    }

    async fn finish_pending(
        &mut self,
        fd: RawFd,
        result: Result<Result<Response<Incoming>, hyper::Error>, JoinError>,
    ) -> Result<(), Error> {
        let completed = {
            let queue = self
                .pending
                .get_mut(&fd)
                .expect("pending queue vanished for a handle that had just resolved");
            let item = queue
                .pop_front()
                .expect("pending queue was non-empty a moment ago");
            if queue.is_empty() {
                self.pending.remove(&fd);
            }
            item
        };

        match result {
            Ok(Ok(response)) => self.handle_response(fd, response).await,
            Ok(Err(hyper_err)) => {
                log::debug!(
                    "BOSH connection {} dropped before a response arrived ({}), resending",
                    fd,
                    hyper_err
                );
                let remaining: Vec<(Vec<u8>, u64)> = self
                    .pending
                    .remove(&fd)
                    .map(|q| q.into_iter().map(|p| (p.body, p.rid)).collect())
                    .unwrap_or_default();
                self.reconnect(fd);
                let highest_rid = highest_resent_rid(completed.rid, &remaining);
                self.resend(completed.body, completed.rid).await?;
                for (body, rid) in remaining {
                    self.resend(body, rid).await?;
                }
                // Verbatim reposts don't consume `rid.next()`; prime the
                // generator past the highest rid just resent so the next
                // genuine send doesn't repeat or undercut it (P5).
                self.rid.set(highest_rid + 1);
                Ok(())
            }
            Err(_join_err) => {
                self.reconnect(fd);
                Err(Error::Transport(TransportError::Disconnected))
            }
        }
    }

    async fn handle_response(&mut self, fd: RawFd, response: Response<Incoming>) -> Result<(), Error> {
        if let Some(conn) = self.pool.iter_mut().find(|c| c.fd == fd) {
            conn.state = ConnState::Idle;
        }
        self.last_response_at = Some(Instant::now());

        let status = response.status().as_u16();
        let gzip = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("gzip"))
            .unwrap_or(false);

        if status != 200 {
            return Err(Error::Transport(match status {
                400 => TransportError::ProtocolViolation,
                403 => TransportError::PolicyViolation,
                404 => TransportError::InvalidSession,
                other => TransportError::UnknownStatus(other),
            }));
        }

        let collected = response
            .into_body()
            .collect()
            .await
            .map_err(|_| Error::Transport(TransportError::Disconnected))?
            .to_bytes();
        let raw = if gzip {
            use std::io::Read;
            let mut decoder = flate2::read::GzDecoder::new(&collected[..]);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            out
        } else {
            collected.to_vec()
        };

        let mut parser = Parser::new("bosh-response");
        parser.feed(&raw)?;
        let node = parser
            .roots()
            .pop()
            .ok_or(Error::Transport(TransportError::Disconnected))?;
        if node.tag() != "body" {
            return Err(Error::Transport(TransportError::NotABody));
        }
        if node.attr("type") == Some("terminate") {
            let condition = node.attr("condition").map(|s| s.to_owned());
            return Err(Error::Transport(TransportError::Terminate(condition)));
        }

        let fragment = self.bosh_to_xmlstream(&node);
        self.buffer.extend_from_slice(&fragment);
        Ok(())
    }

    /// Drains up to `size` bytes of already-translated stream bytes.
    pub fn recv(&mut self, size: usize) -> Vec<u8> {
        let take = size.min(self.buffer.len());
        self.buffer.drain(..take).collect()
    }

    /// Closes every pooled connection and discards pending state.
    pub async fn disconnect(&mut self) -> Result<(), Error> {
        for conn in self.pool.drain(..) {
            conn.driver.abort();
        }
        self.pending.clear();
        self.bound = false;
        Ok(())
    }

    /// Whether translated stream bytes are already buffered.
    pub fn ready_read(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Whether another request can be sent right now.
    pub fn ready_write(&self) -> bool {
        self.accepts_more_requests()
    }
}

/// The highest `rid` among a just-completed dead-connection resend and
/// whatever was still queued behind it, used to re-prime [`Rid`] afterwards
/// since the resends themselves are verbatim reposts that don't advance it.
fn highest_resent_rid(completed_rid: u64, remaining: &[(Vec<u8>, u64)]) -> u64 {
    remaining
        .iter()
        .map(|(_, rid)| *rid)
        .fold(completed_rid, u64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rid_random_initializes_then_increments() {
        let mut rid = Rid::new();
        let first = rid.next();
        assert!(first < 10_000_000);
        assert_eq!(rid.next(), first + 1);
        assert_eq!(rid.next(), first + 2);
    }

    #[test]
    fn rid_set_primes_the_next_read() {
        let mut rid = Rid::new();
        rid.set(42);
        assert_eq!(rid.next(), 42);
        assert_eq!(rid.next(), 43);
    }

    #[test]
    fn parses_endpoint_url() {
        let t = BoshTransport::new("http://bosh.example.com:5280/http-bind").unwrap();
        assert_eq!(t.host, "bosh.example.com");
        assert_eq!(t.port, 5280);
        assert_eq!(t.path, "/http-bind");
        assert!(!t.https);
    }

    #[test]
    fn https_endpoint_defaults_to_443() {
        let t = BoshTransport::new("https://bosh.example.com/http-bind").unwrap();
        assert_eq!(t.port, 443);
        assert!(t.https);
    }

    #[test]
    fn xmlstream_to_bosh_wraps_session_creation_header() {
        let mut t = BoshTransport::new("http://bosh.example.com/http-bind").unwrap();
        t.rid.set(100);
        let header = format!(
            "{}<stream:stream xmlns:stream='http://etherx.jabber.org/streams' \
             xmlns='jabber:client' to='example.com' version='1.0'>",
            DOCHEAD
        );
        let body = t.xmlstream_to_bosh(header.as_bytes()).unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("to=\"example.com\""));
        assert!(text.contains("rid=\"100\""));
        assert!(text.contains("hold=\""));
        assert!(text.contains(NS_HTTP_BIND));
    }

    #[test]
    fn xmlstream_to_bosh_wraps_a_single_stanza() {
        let mut t = BoshTransport::new("http://bosh.example.com/http-bind").unwrap();
        t.sid = Some("sess1".to_owned());
        let body = t
            .xmlstream_to_bosh(b"<message to='a@b'><body>hi</body></message>")
            .unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("sid=\"sess1\""));
        assert!(text.contains("<message"));
    }

    #[test]
    fn bosh_to_xmlstream_synthesizes_header_with_the_known_namespace_quirk() {
        let mut t = BoshTransport::new("http://bosh.example.com/http-bind").unwrap();
        let mut body = Node::bare("body");
        body.set_attr("sid", "sess1");
        body.set_attr("wait", "60");
        let out = String::from_utf8(t.bosh_to_xmlstream(&body)).unwrap();
        assert!(out.contains("xmlns:stream=\"jabber:client\""));
        assert!(out.contains("id=\"sess1\""));
        assert_eq!(t.sid.as_deref(), Some("sess1"));
        assert_eq!(t.wait, 60);
    }

    #[test]
    fn bosh_to_xmlstream_without_sid_just_unwraps_stanzas() {
        let mut t = BoshTransport::new("http://bosh.example.com/http-bind").unwrap();
        let mut body = Node::bare("body");
        body.append_child(Node::bare("message").with_attr("to", "a@b"));
        let out = String::from_utf8(t.bosh_to_xmlstream(&body)).unwrap();
        assert!(out.contains("<message"));
        assert!(!out.contains("stream:stream"));
    }

    #[test]
    fn accepts_more_requests_respects_hold() {
        let mut t = BoshTransport::new("http://bosh.example.com/http-bind").unwrap();
        t.bound = true;
        t.requests = 2;
        assert!(t.accepts_more_requests());
    }

    /// P5: after a dead-connection resend, the `rid` generator is re-primed
    /// past the highest rid that went out verbatim, so the next genuine
    /// send neither repeats nor undercuts it.
    #[test]
    fn rid_reprimed_past_highest_resent_rid_keeps_monotonicity() {
        let remaining = vec![(b"b2".to_vec(), 102u64), (b"b3".to_vec(), 103u64)];
        let highest = highest_resent_rid(101, &remaining);
        assert_eq!(highest, 103);

        let mut rid = Rid::new();
        rid.set(highest + 1);
        assert_eq!(rid.next(), 104);
    }

    #[test]
    fn highest_resent_rid_with_no_remaining_is_just_the_completed_one() {
        assert_eq!(highest_resent_rid(57, &[]), 57);
    }
}
