// Copyright (c) 2020 lumi <lumi@pew.im>
// Copyright (c) 2020 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! An incremental, push-based XML parser that builds [`Node`] trees.
//!
//! `Parser` is fed arbitrary byte slices via [`Parser::feed`] — callers are
//! never required to hand over whole tags, attributes or text runs in one
//! piece, since a TCP segment or a BOSH HTTP body boundary can split any of
//! those. Internally it holds back anything it can't yet make sense of and
//! resumes from there on the next `feed`.
//!
//! Every start and end tag is delivered to any handlers registered via
//! [`Parser::register_start_handler`] / [`Parser::register_end_handler`],
//! tagged with the nesting `level` (1 = the stream root, 2 = a stanza and so
//! on). A handler can ask to be removed right from its own invocation by
//! calling [`Dispatch::unregister_self`] — `Stream` relies on this to run
//! its one-shot stream-header handler exactly once.

use crate::error::{Error, Result};
use crate::tree::{Node, NodeId, NodeRef};

/// Control handle passed to every handler invocation.
pub struct Dispatch {
    unregister: bool,
}

impl Dispatch {
    /// Removes the handler currently running from the registry it came
    /// from. Only effective when called during that handler's own call;
    /// harmless if called more than once.
    pub fn unregister_self(&mut self) {
        self.unregister = true;
    }
}

/// A start- or end-tag callback: `(parser name, nesting level, node)`.
///
/// Returning `Err` aborts the in-progress [`Parser::feed`] call immediately
/// — the handler's error is wrapped in [`Error::Handler`] and surfaced to
/// the caller, the same way a stream-layer protocol violation noticed
/// mid-document (e.g. a bad `version` attribute) aborts parsing in the
/// reference implementation.
pub type Handler =
    Box<dyn FnMut(&str, usize, NodeRef, &mut Dispatch) -> std::result::Result<(), HandlerError>>;

/// The error type a [`Handler`] may fail with; boxed so `Stream` and other
/// callers can report their own error types through it.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Factory used in place of [`Node::new`] to build the node for a start tag,
/// given `(parser name, tag, attrs, level)`. Lets a caller (e.g. `Stream`)
/// stash extra bookkeeping on nodes as they're built, without subclassing.
pub type NodeBuilder = Box<dyn FnMut(&str, &str, &[(String, String)], usize) -> Node>;

fn fire(handlers: &mut Vec<Option<Handler>>, name: &str, level: usize, node: NodeRef) -> Result<()> {
    let mut taken = std::mem::take(handlers);
    let mut result = Ok(());
    for slot in taken.iter_mut() {
        if let Some(h) = slot {
            let mut ctl = Dispatch { unregister: false };
            if let Err(e) = h(name, level, node, &mut ctl) {
                result = Err(Error::Handler(e));
            }
            if ctl.unregister {
                *slot = None;
            }
            if result.is_err() {
                break;
            }
        }
    }
    *handlers = taken;
    result
}

/// One entry in the currently-open-element stack: its arena id plus the
/// qualified name it was opened with, so a mismatched end tag is caught.
struct OpenTag {
    id: NodeId,
    name: String,
}

/// An incremental push parser, one per XML document (for us: one per XMPP
/// stream connection — a fresh `Parser` is built on every `restart()`).
pub struct Parser {
    name: String,
    buf: Vec<u8>,
    level: usize,
    building: Option<Node>,
    stack: Vec<OpenTag>,
    roots: Vec<Node>,
    start_handlers: Vec<Option<Handler>>,
    end_handlers: Vec<Option<Handler>>,
    node_builder: Option<NodeBuilder>,
}

impl Parser {
    /// Creates a parser identified by `name` (surfaced to handlers, and in
    /// error messages — useful when a process runs more than one stream).
    pub fn new(name: impl Into<String>) -> Parser {
        Parser {
            name: name.into(),
            buf: Vec::new(),
            level: 0,
            building: None,
            stack: Vec::new(),
            roots: Vec::new(),
            start_handlers: Vec::new(),
            end_handlers: Vec::new(),
            node_builder: None,
        }
    }

    /// Installs a factory used instead of [`Node::new`] for every start tag.
    pub fn set_node_builder(&mut self, builder: NodeBuilder) {
        self.node_builder = Some(builder);
    }

    /// Registers a handler fired on every start tag, at every level.
    pub fn register_start_handler(&mut self, handler: Handler) {
        self.start_handlers.push(Some(handler));
    }

    /// Registers a handler fired on every end tag, at every level.
    pub fn register_end_handler(&mut self, handler: Handler) {
        self.end_handlers.push(Some(handler));
    }

    /// Nesting depth of whatever is currently open (0 between documents).
    pub fn level(&self) -> usize {
        self.level
    }

    /// Completed top-level (level-1) elements produced so far, oldest first.
    pub fn roots(&mut self) -> Vec<Node> {
        std::mem::take(&mut self.roots)
    }

    /// Feeds another chunk of bytes, running the tokenizer as far forward
    /// as the buffered data allows, firing handlers as elements open and
    /// close. Leftover partial data (a tag or text run still in flight) is
    /// kept for the next call.
    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(data);
        loop {
            if self.buf.is_empty() {
                return Ok(());
            }
            if self.buf.starts_with(b"<?") {
                match find_subslice(&self.buf, b"?>") {
                    Some(end) => {
                        self.buf.drain(..end + 2);
                        continue;
                    }
                    None => return Ok(()),
                }
            }
            if self.buf[0] == b'<' {
                if self.buf.len() >= 2 && self.buf[1] == b'/' {
                    match find_byte(&self.buf, b'>') {
                        Some(end) => {
                            let name = std::str::from_utf8(&self.buf[2..end])
                                .map_err(|_| Error::Syntax("end tag is not valid UTF-8".into()))?
                                .trim()
                                .to_owned();
                            self.handle_end(&name)?;
                            self.buf.drain(..end + 1);
                            continue;
                        }
                        None => return Ok(()),
                    }
                } else {
                    match find_tag_close(&self.buf) {
                        Some(end) => {
                            let self_closing = self.buf[end - 1] == b'/';
                            let head_end = if self_closing { end - 1 } else { end };
                            let head = std::str::from_utf8(&self.buf[1..head_end])
                                .map_err(|_| Error::Syntax("start tag is not valid UTF-8".into()))?
                                .to_owned();
                            let (name, attrs) = parse_tag_head(&head)?;
                            self.handle_start(&name, attrs)?;
                            if self_closing {
                                self.handle_end(&name)?;
                            }
                            self.buf.drain(..end + 1);
                            continue;
                        }
                        None => return Ok(()),
                    }
                }
            } else {
                match find_byte(&self.buf, b'<') {
                    Some(next_lt) => {
                        let text_bytes: Vec<u8> = self.buf[..next_lt].to_vec();
                        let text = String::from_utf8(text_bytes)
                            .map_err(|_| Error::Syntax("character data is not valid UTF-8".into()))?;
                        self.handle_text(&unescape(&text))?;
                        self.buf.drain(..next_lt);
                        continue;
                    }
                    None => return Ok(()),
                }
            }
        }
    }

    fn handle_start(&mut self, name: &str, attrs: Vec<(String, String)>) -> Result<()> {
        self.level += 1;
        let node = match self.node_builder.as_mut() {
            Some(f) => f(&self.name, name, &attrs, self.level),
            None => Node::new(name, attrs),
        };
        let id = if self.level == 1 {
            if self.building.is_some() {
                return Err(Error::MultipleRoots);
            }
            self.building = Some(node);
            self.building.as_ref().unwrap().root
        } else {
            let parent = self
                .stack
                .last()
                .map(|open| open.id)
                .ok_or(Error::UnbalancedTags)?;
            let building = self
                .building
                .as_mut()
                .ok_or_else(|| Error::Syntax("element started outside any root".into()))?;
            building.append_child_at(parent, node)
        };
        self.stack.push(OpenTag {
            id,
            name: name.to_owned(),
        });
        log::trace!("{}: start element <{}> at level {}", self.name, name, self.level);
        if let Some(building) = self.building.as_ref() {
            let node_ref = NodeRef::new(building, id);
            fire(&mut self.start_handlers, &self.name, self.level, node_ref)?;
        }
        Ok(())
    }

    fn handle_end(&mut self, name: &str) -> Result<()> {
        let open = self.stack.pop().ok_or(Error::UnbalancedTags)?;
        if open.name != name {
            return Err(Error::Syntax(format!(
                "end tag </{}> does not match open tag <{}>",
                name, open.name
            )));
        }
        log::trace!("{}: end element </{}> at level {}", self.name, name, self.level);
        if let Some(building) = self.building.as_ref() {
            let node_ref = NodeRef::new(building, open.id);
            fire(&mut self.end_handlers, &self.name, self.level, node_ref)?;
        }
        if self.level == 1 {
            let finished = self
                .building
                .take()
                .ok_or(Error::UnbalancedTags)?;
            self.roots.push(finished);
        }
        self.level -= 1;
        Ok(())
    }

    fn handle_text(&mut self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let current = self
            .stack
            .last()
            .map(|open| open.id)
            .ok_or(Error::Syntax("character data outside any element".into()))?;
        let building = self
            .building
            .as_mut()
            .ok_or_else(|| Error::Syntax("character data outside any root".into()))?;
        building.append_text_at(current, text);
        Ok(())
    }
}

fn find_byte(buf: &[u8], needle: u8) -> Option<usize> {
    buf.iter().position(|&b| b == needle)
}

fn find_subslice(buf: &[u8], needle: &[u8]) -> Option<usize> {
    buf.windows(needle.len()).position(|w| w == needle)
}

/// Scans forward from a start tag's `<` for the `>` that ends it, skipping
/// over any `>` that falls inside a single- or double-quoted attribute
/// value.
fn find_tag_close(buf: &[u8]) -> Option<usize> {
    let mut in_quote: Option<u8> = None;
    for (i, &b) in buf.iter().enumerate().skip(1) {
        match in_quote {
            Some(q) => {
                if b == q {
                    in_quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => in_quote = Some(b),
                b'>' => return Some(i),
                _ => {}
            },
        }
    }
    None
}

/// Splits a start tag's already-extracted head (everything between `<` and
/// `>` or `/>`, exclusive) into its name and attribute list.
fn parse_tag_head(head: &str) -> Result<(String, Vec<(String, String)>)> {
    let head = head.trim();
    let name_end = head.find(char::is_whitespace).unwrap_or(head.len());
    let name = head[..name_end].to_owned();
    let mut rest = head[name_end..].trim_start();
    let mut attrs = Vec::new();
    while !rest.is_empty() {
        let eq = rest
            .find('=')
            .ok_or_else(|| Error::Syntax(format!("attribute without a value in <{}>", name)))?;
        let key = rest[..eq].trim().to_owned();
        let after_eq = rest[eq + 1..].trim_start();
        let quote = after_eq
            .chars()
            .next()
            .ok_or_else(|| Error::Syntax(format!("unterminated attribute in <{}>", name)))?;
        if quote != '"' && quote != '\'' {
            return Err(Error::Syntax(format!(
                "attribute value for {} must be quoted",
                key
            )));
        }
        let value_region = &after_eq[1..];
        let close = value_region
            .find(quote)
            .ok_or_else(|| Error::Syntax(format!("unterminated attribute value for {}", key)))?;
        let raw_value = &value_region[..close];
        attrs.push((key, unescape(raw_value)));
        rest = value_region[close + 1..].trim_start();
    }
    Ok((name, attrs))
}

/// Decodes the handful of XML entity forms a conforming peer may send:
/// the five predefined named entities plus decimal and hex numeric
/// references. Unknown `&...;` sequences are passed through unchanged
/// rather than rejected, since a lenient parser is friendlier to whatever
/// slightly-off server is on the other end of the stream.
fn unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_owned();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match tail.find(';') {
            Some(semi) if semi <= 10 => {
                let entity = &tail[1..semi];
                out.push_str(&decode_entity(entity).unwrap_or_else(|| tail[..=semi].to_owned()));
                rest = &tail[semi + 1..];
            }
            _ => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<String> {
    match entity {
        "amp" => Some("&".to_owned()),
        "lt" => Some("<".to_owned()),
        "gt" => Some(">".to_owned()),
        "apos" => Some("'".to_owned()),
        "quot" => Some("\"".to_owned()),
        _ => {
            let numeric = entity.strip_prefix('#')?;
            if let Some(hex) = numeric.strip_prefix('x').or_else(|| numeric.strip_prefix('X')) {
                u32::from_str_radix(hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
            } else {
                numeric
                    .parse::<u32>()
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_stanza() {
        let mut p = Parser::new("test");
        p.feed(b"<stream:stream xmlns:stream='ns'>").unwrap();
        p.feed(b"<message to='a@b'>hi</message>").unwrap();
        assert_eq!(p.level(), 1);
    }

    #[test]
    fn split_across_feeds_still_parses() {
        let mut p = Parser::new("test");
        let whole = b"<stream:stream><message to='a'>he".to_vec();
        let rest = b"llo</message>";
        p.feed(&whole).unwrap();
        p.feed(rest).unwrap();
        assert_eq!(p.level(), 1);
    }

    #[test]
    fn split_mid_utf8_character_recovers() {
        let text = "héllo";
        let bytes = text.as_bytes();
        let mut p = Parser::new("test");
        p.feed(b"<stream:stream><message>").unwrap();
        // Split the multi-byte 'é' (0xC3 0xA9) across two feeds.
        let split_at = text.find('é').unwrap() + 1;
        p.feed(&bytes[..split_at]).unwrap();
        p.feed(&bytes[split_at..]).unwrap();
        p.feed(b"</message>").unwrap();
        assert_eq!(p.level(), 1);
    }

    #[test]
    fn self_closing_fires_both_start_and_end() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let starts = Rc::new(RefCell::new(0));
        let ends = Rc::new(RefCell::new(0));
        let mut p = Parser::new("test");
        {
            let starts = starts.clone();
            p.register_start_handler(Box::new(move |_, _, _, _| {
                *starts.borrow_mut() += 1;
                Ok(())
            }));
        }
        {
            let ends = ends.clone();
            p.register_end_handler(Box::new(move |_, _, _, _| {
                *ends.borrow_mut() += 1;
                Ok(())
            }));
        }
        p.feed(b"<stream:stream>").unwrap();
        p.feed(b"<presence/>").unwrap();
        assert_eq!(*starts.borrow(), 2);
        assert_eq!(*ends.borrow(), 1);
    }

    #[test]
    fn one_shot_handler_unregisters_itself() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let fired = Rc::new(RefCell::new(0));
        let mut p = Parser::new("test");
        {
            let fired = fired.clone();
            p.register_start_handler(Box::new(move |_, level, _, ctl| {
                if level == 1 {
                    *fired.borrow_mut() += 1;
                    ctl.unregister_self();
                }
                Ok(())
            }));
        }
        p.feed(b"<stream:stream>").unwrap();
        p.feed(b"<a><b/></a>").unwrap();
        p.feed(b"<c/>").unwrap();
        assert_eq!(*fired.borrow(), 1);
    }

    #[test]
    fn mismatched_end_tag_is_an_error() {
        let mut p = Parser::new("test");
        p.feed(b"<stream:stream>").unwrap();
        assert!(p.feed(b"<a></b>").is_err());
    }

    #[test]
    fn xml_declaration_is_skipped() {
        let mut p = Parser::new("test");
        p.feed(b"<?xml version='1.0'?><stream:stream/>").unwrap();
        assert_eq!(p.level(), 0);
    }

    #[test]
    fn numeric_and_named_entities_decode() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let text = Rc::new(RefCell::new(String::new()));
        let mut p = Parser::new("test");
        {
            let text = text.clone();
            p.register_end_handler(Box::new(move |_, level, node, _| {
                if level == 2 {
                    *text.borrow_mut() = node.text();
                }
                Ok(())
            }));
        }
        p.feed(b"<stream:stream><body>a &amp; b &#65; &#x42;</body></stream:stream>")
            .unwrap();
        assert_eq!(&*text.borrow(), "a & b A B");
    }
}
