// Copyright (c) 2020 lumi <lumi@pew.im>
// Copyright (c) 2020 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The stream state machine: the synchronous, transport-agnostic core of an
//! XMPP connection. `Stream` never touches a socket — it turns bytes coming
//! off the wire into stanzas (`parse`/`recvnode`) and turns stanzas going
//! onto the wire into bytes (`sendnode`/`getoutput`), tracking the
//! `<stream:stream>` header's `to`/`from`/`id` identity along the way. A
//! transport (TCP, BOSH) drives it by feeding `parse` whatever it reads and
//! writing out whatever `getoutput` hands back.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use minidom::{to_string, Dispatch, Handler, Node, NodeRef, Parser};

use crate::error::{Error, StreamError};
use crate::id::next_id;

/// `xmlns:stream` namespace for the stream envelope itself.
pub const NS_STREAMS: &str = "http://etherx.jabber.org/streams";
/// Default stanza namespace for ordinary client-to-server streams.
pub const NS_CLIENT: &str = "jabber:client";

const DOCHEAD: &str = "<?xml version='1.0'?>";
const VERSION: &str = "1.0";

/// Which side of the header exchange has completed so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Started {
    /// Neither side has sent/received a `<stream:stream>` header yet.
    NotStarted,
    /// The input side has seen the peer's header (adopted `to`/`from`).
    AsTo,
    /// The output side has emitted our own header.
    AsFrom,
}

struct Inner {
    to: Option<String>,
    from: Option<String>,
    session_id: Option<String>,
    xml_lang: String,
    default_xmlns: String,
    started: Started,
    input_buffer: VecDeque<Node>,
    output_buffer: VecDeque<Vec<u8>>,
}

/// The RFC 6120 stream state machine, independent of whatever transport
/// carries its bytes.
///
/// Construct one with [`Stream::new_initiator`] (the client/initiating
/// side, which already knows who it's talking `to`) or
/// [`Stream::new_responder`] (which learns `to`/`from` from the peer's
/// header). [`Stream::restart`] rebuilds the parsers (fresh TLS or BOSH
/// session) while keeping the established `to`/`from`/`session_id` (P4).
pub struct Stream {
    inner: Rc<RefCell<Inner>>,
    input_parser: Parser,
    output_parser: Parser,
}

impl Stream {
    /// Builds a stream that already knows which server it's talking to
    /// (the usual client role).
    pub fn new_initiator(to: impl Into<String>) -> Stream {
        Self::build(Some(to.into()), None, None)
    }

    /// Builds a stream that will learn `to`/`from` from the first header it
    /// receives (the server-facing role).
    pub fn new_responder() -> Stream {
        Self::build(None, None, None)
    }

    fn build(to: Option<String>, from: Option<String>, session_id: Option<String>) -> Stream {
        let inner = Rc::new(RefCell::new(Inner {
            to,
            from,
            session_id,
            xml_lang: "en".to_owned(),
            default_xmlns: NS_CLIENT.to_owned(),
            started: Started::NotStarted,
            input_buffer: VecDeque::new(),
            output_buffer: VecDeque::new(),
        }));
        let (input_parser, output_parser) = Self::build_parsers(inner.clone());
        Stream {
            inner,
            input_parser,
            output_parser,
        }
    }

    fn build_parsers(inner: Rc<RefCell<Inner>>) -> (Parser, Parser) {
        let mut input_parser = Parser::new("input");
        input_parser.register_start_handler(input_node_start(inner.clone()));
        input_parser.register_end_handler(buffering_end_handler(inner.clone(), Side::Input));

        let mut output_parser = Parser::new("output");
        output_parser.register_start_handler(output_node_start(inner.clone()));
        output_parser.register_end_handler(buffering_end_handler(inner.clone(), Side::Output));

        (input_parser, output_parser)
    }

    /// Sets the `xml:lang` advertised in the stream header (default `en`).
    pub fn set_xml_lang(&mut self, lang: impl Into<String>) {
        self.inner.borrow_mut().xml_lang = lang.into();
    }

    /// Sets the default stanza namespace advertised in the stream header
    /// (default [`NS_CLIENT`]; a component connection would use its own).
    pub fn set_default_namespace(&mut self, xmlns: impl Into<String>) {
        self.inner.borrow_mut().default_xmlns = xmlns.into();
    }

    /// The server this stream is (or will be) addressed `to`.
    pub fn to(&self) -> Option<String> {
        self.inner.borrow().to.clone()
    }

    /// The identity this stream presents as `from`, once known.
    pub fn from(&self) -> Option<String> {
        self.inner.borrow().from.clone()
    }

    /// The negotiated stream `id`, once known.
    pub fn session_id(&self) -> Option<String> {
        self.inner.borrow().session_id.clone()
    }

    /// Whether, and on which side, the header handshake has completed.
    pub fn started(&self) -> Started {
        self.inner.borrow().started
    }

    fn build_header_node(&self) -> Node {
        let inner = self.inner.borrow();
        let mut node = Node::new("stream:stream", Vec::new());
        node.declare_ns(None, inner.default_xmlns.clone());
        node.declare_ns(Some("stream".to_owned()), NS_STREAMS);
        if let Some(to) = &inner.to {
            node.set_attr("to", to.clone());
        }
        if let Some(from) = &inner.from {
            node.set_attr("from", from.clone());
        }
        if let Some(id) = &inner.session_id {
            node.set_attr("id", id.clone());
        }
        node.set_attr("xml:lang", inner.xml_lang.clone());
        node.set_attr("version", VERSION);
        node
    }

    /// Produces just the opening-header bytes this stream would send,
    /// without touching the output parser/buffer. Useful for logging or for
    /// a transport (BOSH) that needs to synthesize one independently of
    /// `start()`.
    pub fn header(&self) -> Vec<u8> {
        let node = self.build_header_node();
        let serialized = to_string(&node).replacen("/>", ">", 1);
        format!("{}{}", DOCHEAD, serialized).into_bytes()
    }

    /// Sends the opening `<stream:stream>` header. Requires `to` to be set
    /// (the initiator always has it; a responder must have adopted it from
    /// the peer's own header, or set it explicitly, before calling this).
    pub fn start(&mut self) -> Result<(), Error> {
        if self.inner.borrow().to.is_none() {
            return Err(StreamError::MissingTo.into());
        }
        let node = self.build_header_node();
        self.sendnode(node)?;
        Ok(())
    }

    /// Rebuilds both parsers from scratch (fresh state, same identity) and
    /// re-sends the opening header. Used after a BOSH session restart or a
    /// TLS upgrade, where the old stream is void but `to`/`from`/`session_id`
    /// carry over (P4).
    pub fn restart(&mut self) -> Result<(), Error> {
        let (input_parser, output_parser) = Self::build_parsers(self.inner.clone());
        self.input_parser = input_parser;
        self.output_parser = output_parser;
        self.inner.borrow_mut().started = Started::NotStarted;
        self.start()
    }

    /// Feeds bytes read from the transport to the input parser. Completed
    /// level-2 stanzas land in the input buffer for [`Stream::recvnode`];
    /// a malformed or out-of-place `<stream:stream>` header aborts with a
    /// [`StreamError`].
    pub fn parse(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.input_parser.feed(bytes).map_err(Error::from)
    }

    /// Pops the oldest stanza that has arrived, if any.
    pub fn recvnode(&mut self) -> Option<Node> {
        self.inner.borrow_mut().input_buffer.pop_front()
    }

    /// Serializes `node` and feeds it to the output parser, assigning a
    /// fresh id (P3) to any `message`/`presence`/`iq` that doesn't already
    /// carry one. Returns the id that ended up on the stanza, if any.
    pub fn sendnode(&mut self, mut node: Node) -> Result<Option<String>, Error> {
        if matches!(node.tag(), "message" | "presence" | "iq") && node.attr("id").is_none() {
            node.set_attr("id", next_id());
        }
        let msgid = node.attr("id").map(|s| s.to_owned());
        let mut data = to_string(&node);
        if node.tag() == "stream" {
            // The header is otherwise serialized self-closing (it has no
            // children yet); open it instead so the output parser sees a
            // genuine stream start, not a complete, already-closed document.
            data = data.replacen("/>", ">", 1);
        }
        self.output_parser.feed(data.as_bytes())?;
        Ok(msgid)
    }

    /// Pops the oldest chunk of bytes the output side has produced, if any.
    pub fn getoutput(&mut self) -> Option<Vec<u8>> {
        self.inner.borrow_mut().output_buffer.pop_front()
    }

    /// Nesting level the output parser currently sits at. Test-only: used
    /// to tell a freshly rebuilt parser (level 1, one open header and
    /// nothing else) apart from a stale one that had accumulated state
    /// across a restart.
    #[cfg(test)]
    fn output_level(&self) -> usize {
        self.output_parser.level()
    }
}

#[derive(Clone, Copy)]
enum Side {
    Input,
    Output,
}

fn check_header(node: NodeRef) -> Result<(), StreamError> {
    if node.tag() != "stream" {
        return Err(StreamError::UnexpectedRoot(node.tag().to_owned()));
    }
    if let Some(version) = node.attr("version") {
        if version != VERSION {
            return Err(StreamError::VersionMismatch(version.to_owned()));
        }
    }
    Ok(())
}

fn input_node_start(inner: Rc<RefCell<Inner>>) -> Handler {
    Box::new(move |_name, level, node, ctl: &mut Dispatch| {
        if level != 1 {
            return Ok(());
        }
        check_header(node)?;
        let mut state = inner.borrow_mut();
        if state.started == Started::NotStarted {
            if state.to.is_none() {
                if let Some(from) = node.attr("from") {
                    state.to = Some(from.to_owned());
                }
            }
            if state.from.is_none() {
                if let Some(to) = node.attr("to") {
                    state.from = Some(to.to_owned());
                }
            }
            if state.session_id.is_none() {
                if let Some(id) = node.attr("id") {
                    state.session_id = Some(id.to_owned());
                }
            }
            state.started = Started::AsTo;
        } else {
            if state.session_id.is_none() {
                if let Some(id) = node.attr("id") {
                    state.session_id = Some(id.to_owned());
                }
            }
            if let Some(from) = node.attr("from") {
                if state.to.as_deref() != Some(from) {
                    log::warn!(
                        "stream header `from` changed across restart: expected {:?}, got {:?}",
                        state.to,
                        from
                    );
                }
            }
            if let Some(to) = node.attr("to") {
                if state.from.as_deref() != Some(to) {
                    log::warn!(
                        "stream header `to` changed across restart: expected {:?}, got {:?}",
                        state.from,
                        to
                    );
                }
            }
        }
        drop(state);
        ctl.unregister_self();
        Ok(())
    })
}

fn output_node_start(inner: Rc<RefCell<Inner>>) -> Handler {
    Box::new(move |_name, level, node, ctl: &mut Dispatch| {
        if level != 1 {
            return Ok(());
        }
        check_header(node)?;
        let mut state = inner.borrow_mut();
        if state.started == Started::NotStarted {
            let header = to_string(&node.to_owned_node()).replacen("/>", ">", 1);
            state.output_buffer.push_back(format!("{}{}", DOCHEAD, header).into_bytes());
            state.started = Started::AsFrom;
        } else if state.session_id.is_none() {
            if let Some(id) = node.attr("id") {
                state.session_id = Some(id.to_owned());
            }
        }
        drop(state);
        ctl.unregister_self();
        Ok(())
    })
}

fn buffering_end_handler(inner: Rc<RefCell<Inner>>, side: Side) -> Handler {
    Box::new(move |_name, level, node, _ctl| {
        if level != 2 {
            return Ok(());
        }
        let mut state = inner.borrow_mut();
        match side {
            Side::Input => state.input_buffer.push_back(node.to_owned_node()),
            Side::Output => {
                let bytes = to_string(&node.to_owned_node()).into_bytes();
                state.output_buffer.push_back(bytes);
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_produces_header_and_adopts_identity() {
        let mut stream = Stream::new_initiator("example.com");
        stream.set_xml_lang("en");
        stream.start().unwrap();
        let out = stream.getoutput().expect("header should be queued");
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with(DOCHEAD));
        assert!(text.contains("to=\"example.com\""));
        assert!(text.contains("version=\"1.0\""));
        assert_eq!(stream.started(), Started::AsFrom);
    }

    #[test]
    fn start_without_to_fails() {
        let mut stream = Stream::new_responder();
        let err = stream.start().unwrap_err();
        assert!(matches!(err, Error::Stream(StreamError::MissingTo)));
    }

    #[test]
    fn parse_splits_header_from_stanza() {
        let mut stream = Stream::new_initiator("example.com");
        stream
            .parse(
                b"<stream:stream xmlns:stream='http://etherx.jabber.org/streams' \
                   xmlns='jabber:client' from='example.com' id='abc' version='1.0'>",
            )
            .unwrap();
        assert_eq!(stream.session_id(), Some("abc".to_owned()));
        assert_eq!(stream.started(), Started::AsTo);
        stream
            .parse(b"<message to='a@b'><body>hi</body></message>")
            .unwrap();
        let stanza = stream.recvnode().expect("stanza should be buffered");
        assert_eq!(stanza.tag(), "message");
        assert_eq!(stanza.get_child("body").unwrap().text(), "hi");
    }

    #[test]
    fn unexpected_root_is_rejected() {
        let mut stream = Stream::new_initiator("example.com");
        let err = stream.parse(b"<notstream/>").unwrap_err();
        match err {
            Error::Stream(StreamError::UnexpectedRoot(tag)) => assert_eq!(tag, "notstream"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut stream = Stream::new_initiator("example.com");
        let err = stream
            .parse(b"<stream:stream version='2.0'>")
            .unwrap_err();
        assert!(matches!(err, Error::Stream(StreamError::VersionMismatch(_))));
    }

    #[test]
    fn sendnode_assigns_ids_only_to_stanzas() {
        let mut stream = Stream::new_initiator("example.com");
        stream.start().unwrap();
        stream.getoutput(); // drain the header

        let id = stream
            .sendnode(Node::bare("message"))
            .unwrap()
            .expect("message should get an id");
        let out = String::from_utf8(stream.getoutput().unwrap()).unwrap();
        assert!(out.contains(&format!("id=\"{}\"", id)));

        let iq_id = stream.sendnode(Node::bare("iq").with_attr("id", "custom")).unwrap();
        assert_eq!(iq_id, Some("custom".to_owned()));
    }

    #[test]
    fn restart_preserves_identity_with_fresh_parsers() {
        let mut stream = Stream::new_initiator("example.com");
        stream.start().unwrap();
        stream.getoutput();
        stream
            .parse(
                b"<stream:stream xmlns:stream='http://etherx.jabber.org/streams' \
                   xmlns='jabber:client' from='example.com' to='me@example.com' \
                   id='abc' version='1.0'>",
            )
            .unwrap();

        stream.restart().unwrap();

        // A fresh parser starts each restart: exactly one open header and
        // nothing left over from before the restart (a reused parser would
        // instead sit at level 2, the old header still open around this
        // one).
        assert_eq!(stream.output_level(), 1);
        assert_eq!(stream.to(), Some("example.com".to_owned()));
        assert_eq!(stream.session_id(), Some("abc".to_owned()));
    }

    #[test]
    fn recvnode_yields_stanzas_in_receive_order() {
        let mut stream = Stream::new_initiator("example.com");
        stream
            .parse(b"<stream:stream xmlns:stream='http://etherx.jabber.org/streams'>")
            .unwrap();
        stream
            .parse(b"<message id='1'/><presence id='2'/><iq id='3'/>")
            .unwrap();

        let first = stream.recvnode().expect("first stanza");
        let second = stream.recvnode().expect("second stanza");
        let third = stream.recvnode().expect("third stanza");
        assert_eq!(first.tag(), "message");
        assert_eq!(second.tag(), "presence");
        assert_eq!(third.tag(), "iq");
        assert!(stream.recvnode().is_none());
    }

    #[test]
    fn features_with_starttls_child_is_delivered_whole() {
        let mut stream = Stream::new_initiator("agent@orvant.com");
        stream
            .parse(
                b"<?xml version='1.0'?><stream:stream xmlns='jabber:client' \
                   xmlns:stream='http://etherx.jabber.org/streams' \
                   to='agent@orvant.com' from='orvant.com' version='1.0' xml:lang='en'>\
                   <stream:features><starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/></stream:features>",
            )
            .unwrap();
        let features = stream.recvnode().expect("features stanza");
        assert_eq!(features.tag(), "features");
        assert!(features.get_child("starttls").is_some());
    }
}
