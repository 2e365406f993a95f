// Copyright (c) 2020 lumi <lumi@pew.im>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Compact and indented serialization of a [`Node`].

use crate::escape::escape;
use crate::tree::{Node, NodeRef, PayloadItem};

fn write_open_tag(n: NodeRef, out: &mut String) {
    out.push('<');
    if let Some(prefix) = n.prefix() {
        out.push_str(prefix);
        out.push(':');
    }
    out.push_str(n.tag());
    for (prefix, uri) in n.local_nsmap() {
        match prefix {
            Some(p) => {
                out.push_str(" xmlns:");
                out.push_str(p);
            }
            None => out.push_str(" xmlns"),
        }
        out.push_str("=\"");
        out.push_str(&escape(uri));
        out.push('"');
    }
    for (key, val) in n.attrs() {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(val));
        out.push('"');
    }
}

fn write_node(n: NodeRef, out: &mut String, level: usize, pretty: bool) {
    if pretty {
        out.push_str(&"  ".repeat(level));
    }
    write_open_tag(n, out);
    if n.is_empty() {
        out.push_str("/>");
        if pretty {
            out.push('\n');
        }
        return;
    }
    out.push('>');
    if pretty {
        out.push('\n');
    }
    for item in n.payload_items() {
        match item {
            PayloadItem::Element(child) => write_node(child, out, level + 1, pretty),
            PayloadItem::Text(text) => {
                if pretty {
                    out.push_str(&"  ".repeat(level + 1));
                }
                out.push_str(&escape(text));
                if pretty {
                    out.push('\n');
                }
            }
        }
    }
    if pretty {
        out.push_str(&"  ".repeat(level));
    }
    out.push_str("</");
    if let Some(prefix) = n.prefix() {
        out.push_str(prefix);
        out.push(':');
    }
    out.push_str(n.tag());
    out.push('>');
    if pretty {
        out.push('\n');
    }
}

/// Compact serialization: `<prefix:tag attr="val">...</tag>`, no
/// whitespace beyond what the tree itself contains.
pub fn to_string(node: &Node) -> String {
    let mut out = String::new();
    write_node(node.as_ref(), &mut out, 0, false);
    out.trim().to_owned()
}

/// Indented serialization: two spaces per nesting level, a trailing
/// newline after every tag and text chunk.
pub fn to_string_pretty(node: &Node) -> String {
    let mut out = String::new();
    write_node(node.as_ref(), &mut out, 0, true);
    out.trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Node;

    #[test]
    fn self_closing_when_empty() {
        let n = Node::bare("foo");
        assert_eq!(to_string(&n), "<foo/>");
    }

    #[test]
    fn attrs_and_prefix() {
        let mut n = Node::new("stream:stream", vec![("to".into(), "a.org".into())]);
        n.declare_ns(Some("stream".into()), "http://etherx.jabber.org/streams");
        n.append_text("placeholder");
        let s = to_string(&n);
        assert!(s.starts_with("<stream:stream"));
        assert!(s.contains("xmlns:stream=\"http://etherx.jabber.org/streams\""));
        assert!(s.contains("to=\"a.org\""));
        assert!(s.ends_with("</stream:stream>"));
    }

    #[test]
    fn indented_has_newlines() {
        let mut n = Node::bare("outer");
        n.append_child(Node::bare("inner"));
        let s = to_string_pretty(&n);
        assert!(s.contains("\n"));
        assert!(s.contains("  <inner/>"));
    }
}
